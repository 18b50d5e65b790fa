//! Mobile authenticator sub-document.
//!
//! The state document treats the authenticator as an opaque serializable
//! unit: it validates the two secrets it cannot work without and carries any
//! other field through a load/save cycle untouched.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct MobileAuthenticator {
    /// Base64 secret used to derive login confirmation codes.
    pub shared_secret: String,
    /// Base64 secret used to sign trade confirmations.
    pub identity_secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    /// Fields this version does not know about.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MobileAuthenticator {
    pub fn new(shared_secret: impl Into<String>, identity_secret: impl Into<String>) -> Self {
        Self {
            shared_secret: shared_secret.into(),
            identity_secret: identity_secret.into(),
            device_id: None,
            extra: Map::new(),
        }
    }

    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    /// Check the fields required to generate codes.
    pub fn validate(&self) -> Result<(), String> {
        if self.shared_secret.trim().is_empty() {
            return Err("mobile_authenticator.shared_secret is empty".to_string());
        }
        if self.identity_secret.trim().is_empty() {
            return Err("mobile_authenticator.identity_secret is empty".to_string());
        }
        Ok(())
    }
}

// Secrets stay out of logs.
impl fmt::Debug for MobileAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MobileAuthenticator")
            .field("device_id", &self.device_id)
            .field("extra_fields", &self.extra.len())
            .finish_non_exhaustive()
    }
}
