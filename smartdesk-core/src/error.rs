//! Error types for the Smart Desk sync layer.

use thiserror::Error;

/// Coarse classification of a calendar provider failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Token missing, expired or rejected. The user has to sign in again.
    Auth,
    /// Provider asked us to slow down.
    RateLimited,
    NotFound,
    /// Connection, timeout or other transport failure.
    Network,
    Other,
}

/// Errors that can occur in Smart Desk operations.
#[derive(Error, Debug)]
pub enum SmartDeskError {
    /// A required field was absent when building or patching an entity.
    #[error("Missing {0}")]
    MissingField(String),

    #[error("Invalid {entity} payload: {message}")]
    InvalidPayload { entity: String, message: String },

    #[error("User not authenticated")]
    NotAuthenticated,

    #[error("{0} not found")]
    NotFound(String),

    /// The remote table rejected or failed a request.
    #[error("{message}")]
    Backend { table: String, message: String },

    #[error("{provider}: {message}")]
    Provider {
        provider: String,
        kind: ProviderErrorKind,
        message: String,
    },

    #[error("ICS parse error: {0}")]
    IcsParse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Sync feature '{key}' failed to load: missing {missing}")]
    FeatureUnavailable { key: String, missing: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SmartDeskError {
    pub fn backend(table: &str, message: impl Into<String>) -> Self {
        SmartDeskError::Backend {
            table: table.to_string(),
            message: message.into(),
        }
    }

    pub fn provider(provider: &str, kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        SmartDeskError::Provider {
            provider: provider.to_string(),
            kind,
            message: message.into(),
        }
    }

    /// True when the failure means the session is gone and the user must sign in again.
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            SmartDeskError::NotAuthenticated
                | SmartDeskError::Provider {
                    kind: ProviderErrorKind::Auth,
                    ..
                }
        )
    }

    /// True for failures worth retrying after a delay.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SmartDeskError::Provider {
                kind: ProviderErrorKind::Network | ProviderErrorKind::RateLimited,
                ..
            }
        )
    }
}

/// Result type alias for Smart Desk operations.
pub type SmartDeskResult<T> = Result<T, SmartDeskError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_field_message_names_the_field() {
        let err = SmartDeskError::MissingField("createdAt".into());
        assert_eq!(err.to_string(), "Missing createdAt");
    }

    #[test]
    fn auth_and_transient_classification() {
        let auth = SmartDeskError::provider("google", ProviderErrorKind::Auth, "expired");
        assert!(auth.is_auth_error());
        assert!(!auth.is_transient());

        let limited = SmartDeskError::provider("google", ProviderErrorKind::RateLimited, "slow down");
        assert!(limited.is_transient());
        assert!(SmartDeskError::NotAuthenticated.is_auth_error());
        assert!(!SmartDeskError::backend("tasks", "boom").is_transient());
    }
}
