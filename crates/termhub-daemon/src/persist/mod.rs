//! Best-effort persistence of session output and lifecycle status.
//!
//! The bridge decouples the hot output path from storage: writes are
//! fire-and-forget tasks, and a failing store only ever costs a warning,
//! never a stalled or broken session.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

/// Lifecycle status mirrored to storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    Paused,
    Terminated,
}

impl SessionStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Terminated => "terminated",
        }
    }
}

/// Errors from the backing store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store operation failed: {0}")]
    Backend(String),
}

/// Sink for session output snapshots and status changes.
#[async_trait]
pub trait OutputStore: Send + Sync {
    /// Persist the latest replay snapshot for a session.
    async fn mirror_output(&self, session_id: &str, text: &str) -> Result<(), StoreError>;

    /// Record a session status change.
    async fn set_status(&self, session_id: &str, status: SessionStatus) -> Result<(), StoreError>;
}

/// Handle the registry's output pump writes through. Cloneable; all clones
/// share the same store.
#[derive(Clone)]
pub struct PersistenceBridge {
    store: Arc<dyn OutputStore>,
}

impl PersistenceBridge {
    pub fn new(store: Arc<dyn OutputStore>) -> Self {
        Self { store }
    }

    /// Mirror a replay snapshot. Returns immediately; the write happens on
    /// its own task and failures are logged, not surfaced.
    pub fn mirror_output(&self, session_id: &str, snapshot: String) {
        let store = Arc::clone(&self.store);
        let session_id = session_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = store.mirror_output(&session_id, &snapshot).await {
                warn!(session_id, error = %e, "Output mirroring failed");
            }
        });
    }

    /// Record a status change, fire-and-forget like [`Self::mirror_output`].
    pub fn set_status(&self, session_id: &str, status: SessionStatus) {
        let store = Arc::clone(&self.store);
        let session_id = session_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = store.set_status(&session_id, status).await {
                warn!(session_id, status = status.as_str(), error = %e, "Status update failed");
            }
        });
    }
}

/// Store that drops everything, for tests and storage-less deployments.
pub struct NullStore;

#[async_trait]
impl OutputStore for NullStore {
    async fn mirror_output(&self, _session_id: &str, _text: &str) -> Result<(), StoreError> {
        Ok(())
    }

    async fn set_status(&self, _session_id: &str, _status: SessionStatus) -> Result<(), StoreError> {
        Ok(())
    }
}
