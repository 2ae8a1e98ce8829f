//! Backend error types.

use thiserror::Error;

/// Errors raised by a [`MediaPlanBackend`](super::MediaPlanBackend).
#[derive(Debug, Error)]
pub enum BackendError {
    /// The requested workspace or media plan does not exist.
    #[error("{entity} not found: '{id}'")]
    NotFound { entity: String, id: String },

    /// The request was rejected by the backend's own checks.
    #[error("invalid request: {reason}")]
    Invalid { reason: String },

    /// The request collides with existing data.
    #[error("conflict: {reason}")]
    Conflict { reason: String },

    /// Database, filesystem or serialization failure.
    #[error("storage error: {reason}")]
    Storage { reason: String },
}

impl BackendError {
    pub fn not_found(entity: &str, id: impl Into<String>) -> Self {
        BackendError::NotFound {
            entity: entity.to_string(),
            id: id.into(),
        }
    }
}

impl From<rusqlite::Error> for BackendError {
    fn from(e: rusqlite::Error) -> Self {
        BackendError::Storage {
            reason: format!("database: {e}"),
        }
    }
}

impl From<std::io::Error> for BackendError {
    fn from(e: std::io::Error) -> Self {
        BackendError::Storage {
            reason: format!("io: {e}"),
        }
    }
}

impl From<serde_yaml::Error> for BackendError {
    fn from(e: serde_yaml::Error) -> Self {
        BackendError::Storage {
            reason: format!("workspace config: {e}"),
        }
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(e: serde_json::Error) -> Self {
        BackendError::Storage {
            reason: format!("json: {e}"),
        }
    }
}
