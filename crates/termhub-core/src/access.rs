//! Role-to-permission policy.
//!
//! The daemon never decides *whether* a user may join a session; the
//! membership directory reports a stored role (or none) and this module maps
//! it to an effective permission class. Pure function, no I/O.

use termhub_proto::{ParticipantRole, StoredRole};

/// Map a directory lookup to an effective permission.
///
/// - owner and operator drive the session
/// - viewer observes
/// - no membership: a global administrator may observe (visibility, never
///   input), anyone else has no access
pub const fn effective_role(
    stored: Option<StoredRole>,
    is_admin: bool,
) -> Option<ParticipantRole> {
    match stored {
        Some(StoredRole::Owner | StoredRole::Operator) => Some(ParticipantRole::Drive),
        Some(StoredRole::Viewer) => Some(ParticipantRole::Observe),
        None => {
            if is_admin {
                Some(ParticipantRole::Observe)
            } else {
                None
            }
        }
    }
}
