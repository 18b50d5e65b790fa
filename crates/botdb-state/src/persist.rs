//! Persister — coalescing background writer for one state document.
//!
//! Mutations never touch the disk. They call [`SaveSignal::request`], which
//! sets a dirty flag and wakes the document's writer task. The writer waits
//! out the debounce window, clears the flag, renders the whole document and
//! hands the bytes to [`StateFs::write_atomic`] on the blocking pool.
//!
//! Only one physical write runs at a time per document: the writer task and
//! [`Persister::flush`] both go through the same async write gate, and the
//! gate guard moves into the blocking write so it is held until the bytes are
//! committed even if the awaiting future is dropped. A request that arrives
//! while a write is in flight leaves the flag set and a wake-up permit stored,
//! so it is folded into the next write instead of producing an interleaved one.
//!
//! Background write failures are logged and dropped. The in-memory document
//! stays authoritative and the next mutation triggers the next attempt.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{Mutex as AsyncMutex, Notify, OwnedMutexGuard, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, Span, debug, error, warn};

use botdb_core::PersistenceConfig;

use crate::error::{StateError, StateResult};
use crate::fs::StateFs;

/// Something that can render itself into the canonical on-disk text.
pub trait Persist: Send + Sync + 'static {
    fn render(&self, pretty: bool) -> StateResult<String>;
}

/// Lifecycle of a state document.
///
/// `Loading` spans the `create_or_load` future only. No handle exists until
/// the load succeeds, so a handle always reports `Live` or `Disposed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Lifecycle {
    Loading = 0,
    Live = 1,
    Disposed = 2,
}

impl Lifecycle {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Lifecycle::Loading,
            1 => Lifecycle::Live,
            _ => Lifecycle::Disposed,
        }
    }
}

/// Dirty marker shared between a document's change hooks and its writer.
#[derive(Debug)]
pub struct SaveSignal {
    dirty: AtomicBool,
    armed: AtomicBool,
    wake: Notify,
}

impl Default for SaveSignal {
    fn default() -> Self {
        Self {
            dirty: AtomicBool::new(false),
            armed: AtomicBool::new(true),
            wake: Notify::new(),
        }
    }
}

impl SaveSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the document dirty and wake the writer. No-op once disarmed.
    pub fn request(&self) {
        if !self.armed.load(Ordering::Acquire) {
            return;
        }
        self.dirty.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    /// Stop accepting requests. Pending dirty state is discarded.
    fn disarm(&self) {
        self.armed.store(false, Ordering::Release);
        self.dirty.store(false, Ordering::Release);
    }
}

struct WriterInner {
    path: PathBuf,
    fs: Arc<dyn StateFs>,
    source: Arc<dyn Persist>,
    signal: Arc<SaveSignal>,
    state: AtomicU8,
    gate: Arc<AsyncMutex<()>>,
    /// Set when the last physical write failed; `flush` retries it.
    stale: Arc<AtomicBool>,
    pretty: bool,
    temp_suffix: String,
    span: Span,
}

impl WriterInner {
    fn lifecycle(&self) -> Lifecycle {
        Lifecycle::from_u8(self.state.load(Ordering::Acquire))
    }

    fn disposed(&self) -> StateError {
        StateError::Disposed(self.path.display().to_string())
    }

    /// Write the current snapshot if the document is dirty (or, with
    /// `include_stale`, if the last write failed). Returns true if a write
    /// happened.
    async fn write_pending(&self, include_stale: bool) -> StateResult<bool> {
        let gate = self.gate.clone().lock_owned().await;
        if self.lifecycle() == Lifecycle::Disposed {
            return Err(self.disposed());
        }

        let dirty = self.signal.take_dirty();
        let stale = include_stale && self.stale.load(Ordering::Acquire);
        if !dirty && !stale {
            return Ok(false);
        }

        self.write_snapshot(gate).await.map(|()| true)
    }

    async fn write_snapshot(&self, gate: OwnedMutexGuard<()>) -> StateResult<()> {
        let content = match self.source.render(self.pretty) {
            Ok(content) => content,
            Err(e) => {
                self.stale.store(true, Ordering::Release);
                return Err(e);
            }
        };
        let fs = self.fs.clone();
        let path = self.path.clone();
        let suffix = self.temp_suffix.clone();
        let stale = self.stale.clone();
        let bytes = content.len();

        tokio::task::spawn_blocking(move || {
            let _gate = gate;
            let result = fs.write_atomic(&path, content.as_bytes(), &suffix);
            stale.store(result.is_err(), Ordering::Release);
            result
        })
        .await
        .map_err(|e| StateError::Write(format!("writer task failed: {e}")))?
        .map_err(|e| StateError::Write(format!("{}: {e}", self.path.display())))?;

        debug!(bytes, "state saved");
        Ok(())
    }
}

/// Owns the background writer of one document.
pub struct Persister {
    inner: Arc<WriterInner>,
    /// Held shared by mutations, exclusively by `dispose`.
    live: RwLock<()>,
    shutdown_tx: watch::Sender<bool>,
    handle: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl Persister {
    /// Start the writer task. Must be called from within a tokio runtime.
    pub fn start(
        path: PathBuf,
        fs: Arc<dyn StateFs>,
        source: Arc<dyn Persist>,
        signal: Arc<SaveSignal>,
        config: &PersistenceConfig,
        span: Span,
    ) -> Self {
        let inner = Arc::new(WriterInner {
            path,
            fs,
            source,
            signal,
            state: AtomicU8::new(Lifecycle::Live as u8),
            gate: Arc::new(AsyncMutex::new(())),
            stale: Arc::new(AtomicBool::new(false)),
            pretty: config.pretty(),
            temp_suffix: config.temp_suffix().to_string(),
            span: span.clone(),
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let writer = inner.clone();
        let debounce = config.save_debounce();
        let handle = tokio::spawn(
            async move {
                run_writer(writer, debounce, shutdown_rx).await;
            }
            .instrument(span),
        );

        Self {
            inner,
            live: RwLock::new(()),
            shutdown_tx,
            handle: parking_lot::Mutex::new(Some(handle)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn span(&self) -> &Span {
        &self.inner.span
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.inner.lifecycle()
    }

    /// Fail with [`StateError::Disposed`] unless the document is live.
    pub fn ensure_live(&self) -> StateResult<()> {
        match self.lifecycle() {
            Lifecycle::Live => Ok(()),
            _ => Err(self.inner.disposed()),
        }
    }

    /// Run `f` only while the document is live. `dispose` waits for a running
    /// `f` to return, so a mutation either completes before disposal or fails
    /// with [`StateError::Disposed`].
    pub fn while_live<R>(&self, f: impl FnOnce() -> StateResult<R>) -> StateResult<R> {
        let _live = self.live.read();
        self.ensure_live()?;
        f()
    }

    /// Whether a change is waiting to be written.
    pub fn has_pending_save(&self) -> bool {
        self.inner.signal.is_dirty()
    }

    /// Write any pending change now and wait for it to land.
    ///
    /// Unlike background saves, failures are returned to the caller. Returns
    /// true if a write happened.
    pub async fn flush(&self) -> StateResult<bool> {
        self.ensure_live()?;
        self.inner.write_pending(true).await
    }

    /// Refuse further requests and tell the writer to stop. Does not flush,
    /// and does not wait for a write already in flight; use
    /// [`close`](Self::close) before handing the file to another owner.
    /// Returns false if the persister was already disposed.
    pub fn dispose(&self) -> bool {
        let _live = self.live.write();
        let previous = self
            .inner
            .state
            .swap(Lifecycle::Disposed as u8, Ordering::AcqRel);
        if Lifecycle::from_u8(previous) == Lifecycle::Disposed {
            return false;
        }

        self.inner.signal.disarm();
        let _ = self.shutdown_tx.send(true);
        true
    }

    /// Dispose, then wait until the writer task has exited and no physical
    /// write is in flight. Once this returns the file is no longer touched.
    pub async fn close(&self) {
        self.dispose();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(parent: &self.inner.span, error = %e, "writer task ended abnormally");
            }
        }
        let _idle = self.inner.gate.lock().await;
    }
}

impl Drop for Persister {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// The writer loop for a single document.
async fn run_writer(
    writer: Arc<WriterInner>,
    debounce: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(path = %writer.path.display(), "writer starting");

    loop {
        tokio::select! {
            _ = writer.signal.wake.notified() => {}
            _ = shutdown.changed() => break,
        }

        if !debounce.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(debounce) => {}
                _ = shutdown.changed() => break,
            }
        }

        match writer.write_pending(false).await {
            Ok(_) => {}
            Err(StateError::Disposed(_)) => break,
            Err(e @ StateError::Serialize(_)) => {
                error!(error = %e, "failed to render state; keeping in-memory copy");
            }
            Err(e) => {
                warn!(error = %e, "failed to save state; will retry on next change");
            }
        }
    }

    debug!("writer stopped");
}

/// Read the existing file at `path`.
///
/// Returns `Ok(None)` when there is no file, and a load error when the file
/// cannot be read or holds only whitespace.
pub fn read_existing(fs: &dyn StateFs, path: &Path) -> StateResult<Option<String>> {
    if !fs.exists(path) {
        return Ok(None);
    }
    let content = fs.read_to_string(path).map_err(|e| StateError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    if content.trim().is_empty() {
        return Err(StateError::Empty {
            path: path.display().to_string(),
        });
    }
    Ok(Some(content))
}
