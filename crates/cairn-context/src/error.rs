use cairn_common::WorkspaceStatus;

use crate::validation::{describe_violations, FieldViolation};

#[derive(Debug, Clone, thiserror::Error)]
pub enum ContextError {
    #[error("invalid configuration: {}", describe_violations(.violations))]
    InvalidConfiguration { violations: Vec<FieldViolation> },

    #[error("workspace '{0}' not found")]
    WorkspaceNotFound(String),

    #[error("workspace '{workspace_id}' is unavailable (status: {status})")]
    WorkspaceUnavailable {
        workspace_id: String,
        status: WorkspaceStatus,
    },

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("failed to reach workspace registry for '{workspace_id}': {message}")]
    ConnectionFailed {
        workspace_id: String,
        message: String,
    },
}

impl ContextError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ContextError::InvalidConfiguration { .. } => "INVALID_CONFIGURATION",
            ContextError::WorkspaceNotFound(_) => "WORKSPACE_NOT_FOUND",
            ContextError::WorkspaceUnavailable { .. } => "WORKSPACE_UNAVAILABLE",
            ContextError::PermissionDenied(_) => "PERMISSION_DENIED",
            ContextError::ConnectionFailed { .. } => "CONNECTION_FAILED",
        }
    }

    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        ContextError::InvalidConfiguration {
            violations: vec![FieldViolation::new(field, message)],
        }
    }
}

pub type Result<T> = std::result::Result<T, ContextError>;
