//! Row types.

use sqlx::FromRow;

/// A session as stored, including its mirrored output snapshot.
#[derive(Debug, Clone, FromRow)]
pub struct SessionRecord {
    pub id: String,
    pub status: String,
    pub output: String,
    pub created_at: i64,
    pub updated_at: i64,
}
