//! Process backends.
//!
//! A [`ProcessBackend`] owns the OS-level (or synthetic) processes behind
//! sessions, keyed by session id. The registry decides *when* to spawn; the
//! backend still refuses duplicate spawns for an id it already tracks, so a
//! registry bug can never leak a second OS process for one session.
//!
//! Every spawned process produces a stream of [`ProcessEvent::Output`] chunks
//! followed by exactly one [`ProcessEvent::Exit`], after which the stream
//! ends.

pub mod fallback;
pub mod pty;

pub use fallback::FallbackBackend;
pub use pty::{PtyBackend, PtyCommand};

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Terminal geometry used at spawn time and for resizes.
#[derive(Debug, Clone, Copy)]
pub struct PtyGeometry {
    pub cols: u16,
    pub rows: u16,
}

impl Default for PtyGeometry {
    fn default() -> Self {
        Self { cols: 80, rows: 24 }
    }
}

/// Event emitted by a session's process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// A chunk of terminal output (lossily decoded UTF-8).
    Output(String),
    /// Terminal lifecycle event. Emitted exactly once, last.
    Exit { code: i32, signal: Option<i32> },
}

/// Per-process event stream handed out by [`ProcessBackend::spawn`].
pub type ProcessEvents = mpsc::Receiver<ProcessEvent>;

/// Errors from process backend operations.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Process already exists for session: {session_id}")]
    AlreadyExists { session_id: String },

    #[error("Failed to spawn process: {reason}")]
    SpawnFailed { reason: String },

    #[error("Process not running for session: {session_id}")]
    NotRunning { session_id: String },

    #[error("PTY operation failed: {reason}")]
    Backend { reason: String },
}

/// Capability interface over the process layer.
///
/// Implementations are selected explicitly at daemon construction time
/// ([`PtyBackend`] or [`FallbackBackend`]), never by ambient probing, so
/// tests can pick the deterministic one.
#[async_trait]
pub trait ProcessBackend: Send + Sync {
    /// Spawn the process for `session_id` and return its event stream.
    async fn spawn(
        &self,
        session_id: &str,
        geometry: PtyGeometry,
    ) -> Result<ProcessEvents, ProcessError>;

    /// Deliver bytes to the process input. Best-effort; fails with
    /// [`ProcessError::NotRunning`] once the process is gone.
    async fn write(&self, session_id: &str, data: &str) -> Result<(), ProcessError>;

    /// Change terminal geometry. Advisory; callers ignore failures.
    async fn resize(&self, session_id: &str, cols: u16, rows: u16) -> Result<(), ProcessError>;

    /// Terminate the process. Idempotent: killing an unknown or already-dead
    /// handle is a no-op.
    async fn kill(&self, session_id: &str, signal: Option<i32>) -> Result<(), ProcessError>;
}
