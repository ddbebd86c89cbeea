//! Session registry.
//!
//! The registry owns every live session: which process backs it, the bounded
//! replay buffer of recent output, and the broadcast channel fanning output
//! to attached clients. All per-session mutation happens under that session's
//! own lock; no lock ever spans two sessions.

pub mod buffer;
pub mod registry;
pub mod types;

pub use buffer::{MAX_REPLAY_CHARS, ReplayBuffer};
pub use registry::SessionRegistry;
pub use types::{AttachGrant, RegistryConfig, RegistryError, RegistryStats, SessionEvent};
