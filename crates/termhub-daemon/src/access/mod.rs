//! Access gate: who may join a session, and with which capability.
//!
//! Role records live in storage; this module resolves them into the two
//! wire-level capabilities (observe or drive) and fails closed when the
//! directory cannot answer.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use termhub_proto::{ParticipantRole, StoredRole};
use tracing::warn;

use termhub_core::access::effective_role;

/// Errors from role lookups.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("Role lookup failed: {0}")]
    Lookup(String),
}

/// Source of stored membership roles and admin flags.
#[async_trait]
pub trait RoleDirectory: Send + Sync {
    /// Stored role of `user_id` in `session_id`, `None` when not a member.
    async fn member_role(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<Option<StoredRole>, DirectoryError>;

    /// Whether `user_id` holds the admin flag.
    async fn is_admin(&self, user_id: &str) -> Result<bool, DirectoryError>;
}

/// Resolves a user's capability for a session at join time.
#[derive(Clone)]
pub struct AccessGate {
    directory: Arc<dyn RoleDirectory>,
}

impl AccessGate {
    pub fn new(directory: Arc<dyn RoleDirectory>) -> Self {
        Self { directory }
    }

    /// Resolve the capability `user_id` gets in `session_id`, or `None` to
    /// deny the join. Directory failures deny rather than guess.
    pub async fn resolve(&self, session_id: &str, user_id: &str) -> Option<ParticipantRole> {
        let stored = match self.directory.member_role(session_id, user_id).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(session_id, user_id, error = %e, "Role lookup failed, denying join");
                return None;
            }
        };

        // Admin only matters for non-members.
        let is_admin = if stored.is_none() {
            match self.directory.is_admin(user_id).await {
                Ok(flag) => flag,
                Err(e) => {
                    warn!(user_id, error = %e, "Admin lookup failed, denying join");
                    return None;
                }
            }
        } else {
            false
        };

        effective_role(stored, is_admin)
    }
}

/// Fixed in-memory role table, for tests and single-tenant setups without a
/// database.
#[derive(Default)]
pub struct StaticDirectory {
    members: HashMap<(String, String), StoredRole>,
    admins: HashSet<String>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_member(&mut self, session_id: &str, user_id: &str, role: StoredRole) {
        self.members
            .insert((session_id.to_string(), user_id.to_string()), role);
    }

    pub fn add_admin(&mut self, user_id: &str) {
        self.admins.insert(user_id.to_string());
    }
}

#[async_trait]
impl RoleDirectory for StaticDirectory {
    async fn member_role(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<Option<StoredRole>, DirectoryError> {
        Ok(self
            .members
            .get(&(session_id.to_string(), user_id.to_string()))
            .copied())
    }

    async fn is_admin(&self, user_id: &str) -> Result<bool, DirectoryError> {
        Ok(self.admins.contains(user_id))
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    struct BrokenDirectory;

    #[async_trait]
    impl RoleDirectory for BrokenDirectory {
        async fn member_role(
            &self,
            _: &str,
            _: &str,
        ) -> Result<Option<StoredRole>, DirectoryError> {
            Err(DirectoryError::Lookup("database gone".into()))
        }

        async fn is_admin(&self, _: &str) -> Result<bool, DirectoryError> {
            Err(DirectoryError::Lookup("database gone".into()))
        }
    }

    fn gate(build: impl FnOnce(&mut StaticDirectory)) -> AccessGate {
        let mut dir = StaticDirectory::new();
        build(&mut dir);
        AccessGate::new(Arc::new(dir))
    }

    #[tokio::test]
    async fn owner_and_operator_drive() {
        let gate = gate(|d| {
            d.add_member("s", "alice", StoredRole::Owner);
            d.add_member("s", "bob", StoredRole::Operator);
        });
        assert_eq!(gate.resolve("s", "alice").await, Some(ParticipantRole::Drive));
        assert_eq!(gate.resolve("s", "bob").await, Some(ParticipantRole::Drive));
    }

    #[tokio::test]
    async fn viewer_observes() {
        let gate = gate(|d| d.add_member("s", "carol", StoredRole::Viewer));
        assert_eq!(
            gate.resolve("s", "carol").await,
            Some(ParticipantRole::Observe)
        );
    }

    #[tokio::test]
    async fn admin_without_membership_observes() {
        let gate = gate(|d| d.add_admin("root"));
        assert_eq!(
            gate.resolve("s", "root").await,
            Some(ParticipantRole::Observe)
        );
    }

    #[tokio::test]
    async fn stranger_denied() {
        let gate = gate(|_| {});
        assert_eq!(gate.resolve("s", "mallory").await, None);
    }

    #[tokio::test]
    async fn directory_failure_denies() {
        let gate = AccessGate::new(Arc::new(BrokenDirectory));
        assert_eq!(gate.resolve("s", "alice").await, None);
    }
}
