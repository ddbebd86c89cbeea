//! Session registry types.

use tokio::sync::broadcast;

use crate::process::{ProcessError, PtyGeometry};

use super::buffer::MAX_REPLAY_CHARS;

/// Event fanned out to every client attached to a session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A chunk of live terminal output.
    Output(String),
    /// The backing process terminated. Last event for this incarnation.
    Exit { exit_code: i32 },
}

/// Registry tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct RegistryConfig {
    /// Broadcast channel depth per session. Slow clients past this lag
    /// drop frames rather than stalling the pump.
    pub broadcast_capacity: usize,
    /// Replay buffer cap in characters.
    pub replay_capacity: usize,
    /// Terminal geometry used for fresh spawns.
    pub geometry: PtyGeometry,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: 256,
            replay_capacity: MAX_REPLAY_CHARS,
            geometry: PtyGeometry::default(),
        }
    }
}

/// Errors from registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error(transparent)]
    Process(#[from] ProcessError),
}

/// Everything a freshly attached client needs: the catch-up snapshot taken
/// at attach time and a live event subscription that starts immediately
/// after it. Together they cover the output stream without gap or overlap.
#[derive(Debug)]
pub struct AttachGrant {
    pub replay: String,
    pub events: broadcast::Receiver<SessionEvent>,
}

/// Point-in-time registry counters, for logging and health output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    pub session_count: usize,
    pub total_clients: usize,
}
