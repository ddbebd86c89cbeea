//! Termhub core library.
//!
//! Shared pieces used by the daemon (and by future binaries):
//! - role-to-permission policy
//! - sqlite helpers
//! - tracing/logging initialization

pub mod access;
pub mod db;
pub mod tracing_init;
