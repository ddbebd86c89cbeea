//! Fan-out gateway: per-connection session operations.
//!
//! Each client connection holds one [`ClientConnection`]; the [`Gateway`]
//! applies the access gate on join and enforces the observe/drive split on
//! every input. Transport code (the WebSocket layer) stays free of policy.

use std::sync::Arc;

use termhub_proto::ParticipantRole;
use tracing::{debug, info};
use uuid::Uuid;

use crate::access::AccessGate;
use crate::session::{AttachGrant, RegistryError, SessionRegistry};

/// Errors surfaced to clients as `error` events.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Access denied to session: {session_id}")]
    AccessDenied { session_id: String },

    #[error("Not joined to any session")]
    NotInSession,

    #[error("Input requires drive capability")]
    PermissionDenied,

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// One authenticated client connection and its current attachment.
pub struct ClientConnection {
    client_id: String,
    user_id: String,
    attachment: Option<Attachment>,
}

struct Attachment {
    session_id: String,
    role: ParticipantRole,
}

impl ClientConnection {
    pub fn new(user_id: &str) -> Self {
        Self {
            client_id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            attachment: None,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn session_id(&self) -> Option<&str> {
        self.attachment.as_ref().map(|a| a.session_id.as_str())
    }

    pub fn role(&self) -> Option<ParticipantRole> {
        self.attachment.as_ref().map(|a| a.role)
    }

    /// Forget the attachment without detaching, after the session already
    /// ended on the registry side.
    pub fn clear_attachment(&mut self) {
        self.attachment = None;
    }
}

/// Result of a successful join.
#[derive(Debug)]
pub struct Joined {
    pub session_id: String,
    pub role: ParticipantRole,
    pub grant: AttachGrant,
}

/// Applies access policy and routes connection operations to the registry.
pub struct Gateway {
    registry: Arc<SessionRegistry>,
    gate: AccessGate,
}

impl Gateway {
    pub fn new(registry: Arc<SessionRegistry>, gate: AccessGate) -> Self {
        Self { registry, gate }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Join `conn` to a session. Resolves the user's capability first; a
    /// connection already attached elsewhere leaves that session implicitly.
    pub async fn join(
        &self,
        conn: &mut ClientConnection,
        session_id: &str,
    ) -> Result<Joined, GatewayError> {
        let Some(role) = self.gate.resolve(session_id, &conn.user_id).await else {
            info!(
                session_id,
                user_id = %conn.user_id,
                "Join denied"
            );
            return Err(GatewayError::AccessDenied {
                session_id: session_id.to_string(),
            });
        };

        self.leave(conn).await;

        let grant = self.registry.attach(session_id, &conn.client_id).await?;
        conn.attachment = Some(Attachment {
            session_id: session_id.to_string(),
            role,
        });
        info!(
            session_id,
            user_id = %conn.user_id,
            client_id = %conn.client_id,
            role = ?role,
            "Client joined session"
        );
        Ok(Joined {
            session_id: session_id.to_string(),
            role,
            grant,
        })
    }

    /// Forward input to the attached session's process. Observers are
    /// rejected before the input can reach the registry.
    pub async fn input(&self, conn: &ClientConnection, data: &str) -> Result<(), GatewayError> {
        let attachment = conn.attachment.as_ref().ok_or(GatewayError::NotInSession)?;
        if !attachment.role.can_drive() {
            debug!(
                session_id = %attachment.session_id,
                user_id = %conn.user_id,
                "Input from observer rejected"
            );
            return Err(GatewayError::PermissionDenied);
        }
        self.registry.write(&attachment.session_id, data).await?;
        Ok(())
    }

    /// Resize the attached terminal. Advisory: failures and unattached
    /// connections are both silent no-ops.
    pub async fn resize(&self, conn: &ClientConnection, cols: u16, rows: u16) {
        if let Some(attachment) = conn.attachment.as_ref() {
            if let Err(e) = self
                .registry
                .resize(&attachment.session_id, cols, rows)
                .await
            {
                debug!(session_id = %attachment.session_id, error = %e, "Resize ignored");
            }
        }
    }

    /// Leave the current session, if any. The process keeps running.
    pub async fn leave(&self, conn: &mut ClientConnection) {
        if let Some(attachment) = conn.attachment.take() {
            self.registry
                .detach(&attachment.session_id, &conn.client_id)
                .await;
        }
    }

    /// Connection closed: same cleanup as an explicit leave.
    pub async fn disconnect(&self, conn: &mut ClientConnection) {
        self.leave(conn).await;
        debug!(client_id = %conn.client_id, "Client disconnected");
    }
}
