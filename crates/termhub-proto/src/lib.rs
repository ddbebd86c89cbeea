//! Termhub wire protocol.
//!
//! JSON-over-WebSocket event types exchanged between the daemon and its
//! clients. Only `Hello` is special: it must be the first frame on a new
//! connection; everything after is a stream of [`ClientEvent`] /
//! [`ServerEvent`] frames.

pub mod events;
pub mod roles;

pub use events::{ClientEvent, Hello, ServerEvent};
pub use roles::{ParticipantRole, StoredRole};
