use thiserror::Error;

/// Core domain errors
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Integrity violation on '{field}': {constraint}")]
    IntegrityViolation { field: String, constraint: String },

    #[error("Decryption error: {message}")]
    Decryption { message: String },

    #[error("Unknown resource kind: {kind}")]
    UnknownResourceKind { kind: String },

    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DomainError {
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    pub fn integrity(field: impl Into<String>, constraint: impl Into<String>) -> Self {
        Self::IntegrityViolation {
            field: field.into(),
            constraint: constraint.into(),
        }
    }

    pub fn decryption(message: impl Into<String>) -> Self {
        Self::Decryption {
            message: message.into(),
        }
    }

    pub fn unknown_resource_kind(kind: impl Into<String>) -> Self {
        Self::UnknownResourceKind { kind: kind.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// True for errors raised by the validation policy (caller input problems)
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::MissingField { .. }
                | Self::IntegrityViolation { .. }
                | Self::UnknownResourceKind { .. }
        )
    }

    /// Field named by a validation error, if any
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::MissingField { field } | Self::IntegrityViolation { field, .. } => Some(field),
            _ => None,
        }
    }
}
