//! Termhub Daemon Library
//!
//! Core functionality for the termhub daemon:
//! - PTY process backends (real and synthetic)
//! - Session registry with bounded replay buffers
//! - Role resolution for joining clients
//! - Per-connection fan-out gateway
//! - Best-effort output persistence
//! - WebSocket server for client connections

pub mod access;
pub mod gateway;
pub mod persist;
pub mod process;
pub mod server;
pub mod session;
pub mod storage;
