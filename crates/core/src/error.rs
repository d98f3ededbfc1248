use thiserror::Error;

use crate::model::EntityKind;

/// Failure reported by a remote gateway call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("network failure: {0}")]
    Network(String),
    #[error("not authenticated")]
    Unauthenticated,
    #[error("server responded with {status}: {message}")]
    Status { status: u16, message: String },
    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl GatewayError {
    /// Silent failures roll back without publishing a notice.
    pub fn is_silent(&self) -> bool {
        matches!(self, GatewayError::Unauthenticated)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MutationError {
    #[error("{kind} '{id}' not found")]
    NotFound { kind: EntityKind, id: String },
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Remote(#[from] GatewayError),
}

impl MutationError {
    pub fn not_found(kind: EntityKind, id: &str) -> Self {
        MutationError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, MutationError::Remote(GatewayError::Unauthenticated))
    }
}
