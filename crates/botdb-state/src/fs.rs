//! Filesystem capability used by the persister.
//!
//! The persister only needs three things from the filesystem: an existence
//! check, a whole-file read and an atomic whole-file write. [`LocalFs`] is the
//! real implementation. With the `test-util` feature, `MemoryFs` keeps files
//! in memory, counts writes and can inject failures or slow writes down.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub trait StateFs: Send + Sync + 'static {
    fn exists(&self, path: &Path) -> bool;

    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Replace the file at `path` with `contents` so that readers observe
    /// either the previous file or the new one, never a partial write.
    fn write_atomic(&self, path: &Path, contents: &[u8], temp_suffix: &str) -> io::Result<()>;
}

/// Local disk: write a sibling temporary file, sync it, rename it over the target.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

/// `bot.json` + `tmp` → `bot.json.tmp`.
pub fn temp_path(path: &Path, temp_suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("state"));
    name.push(".");
    name.push(temp_suffix);
    path.with_file_name(name)
}

impl StateFs for LocalFs {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }

    fn write_atomic(&self, path: &Path, contents: &[u8], temp_suffix: &str) -> io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let tmp = temp_path(path, temp_suffix);
        let result = (|| {
            let mut file = File::create(&tmp)?;
            file.write_all(contents)?;
            file.sync_all()?;
            fs::rename(&tmp, path)
        })();

        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result
    }
}

#[cfg(any(test, feature = "test-util"))]
pub use memory::MemoryFs;

#[cfg(any(test, feature = "test-util"))]
mod memory {
    use std::collections::HashMap;
    use std::io;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::StateFs;

    /// In-memory filesystem that counts atomic writes.
    #[derive(Debug, Default)]
    pub struct MemoryFs {
        files: Mutex<HashMap<PathBuf, String>>,
        writes: AtomicUsize,
        fail_writes: AtomicBool,
        write_delay_ms: AtomicU64,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl MemoryFs {
        pub fn new() -> Self {
            Self::default()
        }

        /// Seed a file before the persister sees it.
        pub fn with_file(self, path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
            self.files.lock().insert(path.into(), contents.into());
            self
        }

        pub fn contents(&self, path: &Path) -> Option<String> {
            self.files.lock().get(path).cloned()
        }

        /// Number of successful atomic writes so far.
        pub fn write_count(&self) -> usize {
            self.writes.load(Ordering::SeqCst)
        }

        /// Make subsequent writes fail with an I/O error.
        pub fn set_fail_writes(&self, fail: bool) {
            self.fail_writes.store(fail, Ordering::SeqCst);
        }

        /// Block every subsequent write for `delay` before it commits.
        pub fn set_write_delay(&self, delay: Duration) {
            self.write_delay_ms
                .store(delay.as_millis() as u64, Ordering::SeqCst);
        }

        /// Writes currently between start and commit.
        pub fn writes_in_flight(&self) -> usize {
            self.in_flight.load(Ordering::SeqCst)
        }

        /// Highest number of writes ever in flight at once.
        pub fn max_concurrent_writes(&self) -> usize {
            self.max_in_flight.load(Ordering::SeqCst)
        }

        fn commit(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
            let text = String::from_utf8(contents.to_vec())
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            self.files.lock().insert(path.to_path_buf(), text);
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    impl StateFs for MemoryFs {
        fn exists(&self, path: &Path) -> bool {
            self.files.lock().contains_key(path)
        }

        fn read_to_string(&self, path: &Path) -> io::Result<String> {
            self.files
                .lock()
                .get(path)
                .cloned()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
        }

        fn write_atomic(&self, path: &Path, contents: &[u8], _temp_suffix: &str) -> io::Result<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(io::Error::other("simulated write failure"));
            }

            let active = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(active, Ordering::SeqCst);
            let delay = self.write_delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                std::thread::sleep(Duration::from_millis(delay));
            }
            let result = self.commit(path, contents);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }
}
