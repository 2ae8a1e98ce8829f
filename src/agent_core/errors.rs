//! Agent Core error types.
//!
//! Every failure that reaches the LLM or the user is one of six kinds. The
//! dispatcher is the only place that translates collaborator errors (backend,
//! handler panics, timeouts) into this taxonomy.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::BackendError;

/// Errors surfaced by the agent core.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Tool arguments or a filter spec are malformed.
    #[error("validation failed: {reason}")]
    Validation { reason: String },

    /// The session is not in a state that allows the operation.
    #[error("precondition failed: {reason}")]
    Precondition { reason: String },

    /// A referenced entity does not exist.
    #[error("{entity} not found: '{id}'")]
    NotFound { entity: String, id: String },

    /// The request collides with current state (over-budget, duplicate id).
    #[error("conflict: {reason}")]
    Conflict { reason: String },

    /// A destructive operation was attempted without a matching confirmation.
    #[error("confirmation required before deleting '{target}'")]
    ConfirmationRequired { target: String },

    /// The backend or the LLM transport failed, timed out, or faulted.
    #[error("backend failure: {reason}")]
    Backend { reason: String },
}

/// Serializable discriminant of [`AgentError`], fed back to the LLM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    ValidationError,
    PreconditionError,
    NotFoundError,
    ConflictError,
    ConfirmationRequiredError,
    BackendError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ValidationError => "ValidationError",
            ErrorKind::PreconditionError => "PreconditionError",
            ErrorKind::NotFoundError => "NotFoundError",
            ErrorKind::ConflictError => "ConflictError",
            ErrorKind::ConfirmationRequiredError => "ConfirmationRequiredError",
            ErrorKind::BackendError => "BackendError",
        }
    }

    /// Whether the LLM may adjust and retry within the same turn.
    ///
    /// Backend failures are still reported to the LLM, but the core never
    /// re-issues the call on its own.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ErrorKind::BackendError)
    }
}

impl AgentError {
    pub fn validation(reason: impl Into<String>) -> Self {
        AgentError::Validation {
            reason: reason.into(),
        }
    }

    pub fn precondition(reason: impl Into<String>) -> Self {
        AgentError::Precondition {
            reason: reason.into(),
        }
    }

    pub fn backend(reason: impl Into<String>) -> Self {
        AgentError::Backend {
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AgentError::Validation { .. } => ErrorKind::ValidationError,
            AgentError::Precondition { .. } => ErrorKind::PreconditionError,
            AgentError::NotFound { .. } => ErrorKind::NotFoundError,
            AgentError::Conflict { .. } => ErrorKind::ConflictError,
            AgentError::ConfirmationRequired { .. } => ErrorKind::ConfirmationRequiredError,
            AgentError::Backend { .. } => ErrorKind::BackendError,
        }
    }

    /// The normalized `{ok, error_kind, detail}` payload sent back to the LLM.
    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "ok": false,
            "error_kind": self.kind().as_str(),
            "detail": self.to_string(),
        })
    }
}

impl From<BackendError> for AgentError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::NotFound { entity, id } => AgentError::NotFound { entity, id },
            BackendError::Invalid { reason } => AgentError::Validation { reason },
            BackendError::Conflict { reason } => AgentError::Conflict { reason },
            other => AgentError::Backend {
                reason: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serializes_as_taxonomy_name() {
        let json = serde_json::to_string(&ErrorKind::ConfirmationRequiredError).unwrap();
        assert_eq!(json, "\"ConfirmationRequiredError\"");
        assert_eq!(ErrorKind::NotFoundError.as_str(), "NotFoundError");
    }

    #[test]
    fn test_payload_shape() {
        let err = AgentError::NotFound {
            entity: "media plan".into(),
            id: "mp_1".into(),
        };
        let payload = err.to_payload();
        assert_eq!(payload["ok"], false);
        assert_eq!(payload["error_kind"], "NotFoundError");
        assert!(payload["detail"].as_str().unwrap().contains("mp_1"));
    }

    #[test]
    fn test_backend_error_translation() {
        let not_found: AgentError = BackendError::NotFound {
            entity: "workspace".into(),
            id: "ws".into(),
        }
        .into();
        assert_eq!(not_found.kind(), ErrorKind::NotFoundError);

        let storage: AgentError = BackendError::Storage {
            reason: "disk full".into(),
        }
        .into();
        assert_eq!(storage.kind(), ErrorKind::BackendError);
        assert!(!storage.kind().is_recoverable());

        let invalid: AgentError = BackendError::Invalid {
            reason: "bad".into(),
        }
        .into();
        assert_eq!(invalid.kind(), ErrorKind::ValidationError);
    }
}
