//! Client/daemon event frames.
//!
//! All frames are JSON objects tagged by a `type` field. Payload strings are
//! raw terminal data (UTF-8, lossily decoded on the daemon side).

use serde::{Deserialize, Serialize};

use crate::roles::ParticipantRole;

/// First frame a client sends to identify itself. The transport layer in
/// front of the daemon authenticates the user; the daemon trusts `user_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename = "hello")]
pub struct Hello {
    pub user_id: String,
}

/// Frames a client sends after the hello.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Request attachment to a session.
    Join { session_id: String },
    /// Keystrokes/data. Forwarded to the process only for drive connections.
    Input { data: String },
    /// Terminal geometry hint. Advisory; failures are swallowed.
    Resize { cols: u16, rows: u16 },
    /// Detach from the current session.
    Leave,
}

/// Frames the daemon sends to a client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Attachment confirmed, carrying the resolved role.
    Joined {
        session_id: String,
        role: ParticipantRole,
    },
    /// Process output: either the one-shot catch-up buffer sent on join or
    /// a live chunk.
    Output { data: String },
    /// The session's process terminated.
    Exit { exit_code: i32 },
    /// Access denied / not-in-session / write failure. Never fatal to the
    /// connection.
    Error { message: String },
}
