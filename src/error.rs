//! Error types shared by the decision components.

use thiserror::Error;
use uuid::Uuid;

/// Failures raised by the external stores (cache, role store, history store).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced to callers of the decision components.
///
/// Only authoritative failures end up here; cache, reputation and alerting
/// problems are logged and absorbed where they happen.
#[derive(Debug, Error)]
pub enum TrustError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("System role {0} cannot be modified")]
    SystemRole(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TrustError {
    pub(crate) fn role_not_found(role_id: Uuid) -> Self {
        Self::NotFound {
            entity: "Role",
            id: role_id.to_string(),
        }
    }

    pub(crate) fn session_not_found(session_id: Uuid) -> Self {
        Self::NotFound {
            entity: "Session",
            id: session_id.to_string(),
        }
    }
}

pub type Result<T, E = TrustError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_names_entity_and_id() {
        let id = Uuid::nil();
        let err = TrustError::role_not_found(id);
        assert_eq!(
            err.to_string(),
            "Role not found: 00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn store_errors_are_transparent() {
        let err = TrustError::from(StoreError::Unavailable("connection refused".to_string()));
        assert_eq!(err.to_string(), "Store unavailable: connection refused");
    }
}
