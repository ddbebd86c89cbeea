//! Role vocabulary shared between the directory (stored roles) and the
//! session protocol (effective permission classes).

use serde::{Deserialize, Serialize};

/// Role as recorded by the membership directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoredRole {
    /// Session creator. Full control.
    Owner,
    /// Invited collaborator with input rights.
    Operator,
    /// Read-only attendee.
    Viewer,
}

impl StoredRole {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Operator => "operator",
            Self::Viewer => "viewer",
        }
    }

    /// Parse the database representation. Unknown strings map to `None`
    /// rather than erroring so a directory with newer role names degrades
    /// to "no access" instead of breaking joins.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "owner" => Some(Self::Owner),
            "operator" => Some(Self::Operator),
            "viewer" => Some(Self::Viewer),
            _ => None,
        }
    }
}

/// Effective permission class for an attached connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    /// May receive output only.
    Observe,
    /// May receive output and send input/resize.
    Drive,
}

impl ParticipantRole {
    pub const fn can_drive(self) -> bool {
        matches!(self, Self::Drive)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn stored_role_round_trips_through_db_strings() {
        for role in [StoredRole::Owner, StoredRole::Operator, StoredRole::Viewer] {
            assert_eq!(StoredRole::parse(role.as_str()), Some(role));
        }
    }

    #[test]
    fn unknown_stored_role_is_none() {
        assert_eq!(StoredRole::parse("superuser"), None);
        assert_eq!(StoredRole::parse(""), None);
    }

    #[test]
    fn participant_role_serializes_lowercase() {
        let json = serde_json::to_string(&ParticipantRole::Drive).unwrap();
        assert_eq!(json, "\"drive\"");
    }
}
