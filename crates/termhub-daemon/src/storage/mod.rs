//! `SQLite` storage: session output mirrors, lifecycle status, and the role
//! directory backing the access gate.

pub mod db;
pub mod models;
pub mod queries;

pub use db::Database;
