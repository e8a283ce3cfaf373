//! Error types for remote sessions.

use thiserror::Error;

use docsync_core::RemoteId;

/// Errors reported by a [`crate::RemoteSession`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The object does not exist (or no longer exists).
    #[error("object not found: {0}")]
    NotFound(RemoteId),

    /// The session may not read or write the object.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// An object with the same name already exists in the target folder.
    #[error("name conflict: {name} already exists in {parent}")]
    NameConflict { parent: RemoteId, name: String },

    /// The operation would violate a repository constraint.
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// The change token passed with an update is stale.
    #[error("update conflict on {0}")]
    UpdateConflict(RemoteId),

    /// The repository lacks a capability.
    #[error("not supported: {0}")]
    NotSupported(&'static str),

    /// A malformed argument, such as an unparseable change token.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Network failure.
    #[error("connection error: {0}")]
    Connection(String),

    /// The request timed out.
    #[error("request timed out")]
    Timeout,
}

impl RemoteError {
    /// Whether retrying the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Connection(_) | RemoteError::Timeout)
    }

    /// Whether the error concerns one object only.
    pub fn is_object_scoped(&self) -> bool {
        matches!(
            self,
            RemoteError::NotFound(_) | RemoteError::PermissionDenied(_)
        )
    }
}

/// Result type for remote operations.
pub type Result<T> = std::result::Result<T, RemoteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(RemoteError::Timeout.is_transient());
        assert!(RemoteError::Connection("reset".into()).is_transient());
        assert!(!RemoteError::NotFound(RemoteId::from("x")).is_transient());
        assert!(RemoteError::PermissionDenied("x".into()).is_object_scoped());
        assert!(!RemoteError::UpdateConflict(RemoteId::from("x")).is_object_scoped());
    }
}
