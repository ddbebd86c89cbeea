//! Query layer over [`Database`], plus the trait impls that plug storage
//! into the access gate and the persistence bridge.

use async_trait::async_trait;
use termhub_core::db::unix_timestamp;
use termhub_proto::StoredRole;

use crate::access::{DirectoryError, RoleDirectory};
use crate::persist::{OutputStore, SessionStatus, StoreError};

use super::db::{Database, DatabaseError};
use super::models::SessionRecord;

impl Database {
    /// Replace the stored output snapshot for a session, creating the row on
    /// first write.
    pub async fn upsert_session_output(
        &self,
        session_id: &str,
        output: &str,
    ) -> Result<(), DatabaseError> {
        let now = unix_timestamp();
        sqlx::query(
            "INSERT INTO sessions (id, status, output, created_at, updated_at)
             VALUES (?, 'active', ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 output = excluded.output,
                 updated_at = excluded.updated_at",
        )
        .bind(session_id)
        .bind(output)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Record a session status change, creating the row if needed.
    pub async fn update_session_status(
        &self,
        session_id: &str,
        status: &str,
    ) -> Result<(), DatabaseError> {
        let now = unix_timestamp();
        sqlx::query(
            "INSERT INTO sessions (id, status, output, created_at, updated_at)
             VALUES (?, ?, '', ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 status = excluded.status,
                 updated_at = excluded.updated_at",
        )
        .bind(session_id)
        .bind(status)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn get_session(&self, session_id: &str) -> Result<SessionRecord, DatabaseError> {
        sqlx::query_as::<_, SessionRecord>(
            "SELECT id, status, output, created_at, updated_at FROM sessions WHERE id = ?",
        )
        .bind(session_id)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("session: {session_id}")))
    }

    pub async fn upsert_user(&self, user_id: &str, is_admin: bool) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO users (id, is_admin, created_at) VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET is_admin = excluded.is_admin",
        )
        .bind(user_id)
        .bind(i64::from(is_admin))
        .bind(unix_timestamp())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Grant (or change) a user's role in a session.
    pub async fn add_member(
        &self,
        session_id: &str,
        user_id: &str,
        role: StoredRole,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO session_members (session_id, user_id, role, created_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(session_id, user_id) DO UPDATE SET role = excluded.role",
        )
        .bind(session_id)
        .bind(user_id)
        .bind(role.as_str())
        .bind(unix_timestamp())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Stored role of a user in a session. Rows with an unrecognised role
    /// string count as no membership.
    pub async fn member_role(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<Option<StoredRole>, DatabaseError> {
        let role: Option<(String,)> = sqlx::query_as(
            "SELECT role FROM session_members WHERE session_id = ? AND user_id = ?",
        )
        .bind(session_id)
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(role.and_then(|(r,)| StoredRole::parse(&r)))
    }

    /// Admin flag for a user; unknown users are not admins.
    pub async fn is_admin(&self, user_id: &str) -> Result<bool, DatabaseError> {
        let flag: Option<(i64,)> = sqlx::query_as("SELECT is_admin FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(flag.is_some_and(|(f,)| f != 0))
    }
}

#[async_trait]
impl OutputStore for Database {
    async fn mirror_output(&self, session_id: &str, text: &str) -> Result<(), StoreError> {
        self.upsert_session_output(session_id, text)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn set_status(&self, session_id: &str, status: SessionStatus) -> Result<(), StoreError> {
        self.update_session_status(session_id, status.as_str())
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}

#[async_trait]
impl RoleDirectory for Database {
    async fn member_role(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<Option<StoredRole>, DirectoryError> {
        Self::member_role(self, session_id, user_id)
            .await
            .map_err(|e| DirectoryError::Lookup(e.to_string()))
    }

    async fn is_admin(&self, user_id: &str) -> Result<bool, DirectoryError> {
        Self::is_admin(self, user_id)
            .await
            .map_err(|e| DirectoryError::Lookup(e.to_string()))
    }
}
