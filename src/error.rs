// ============================================================================
// Engine Errors - Classified Failures
// ============================================================================
//
// Every failure leaving the engine carries a stable ErrorKind so API layers
// can map it to a status code without inspecting messages.
//
// Domain rule violations live in per-domain enums (OrgError, UserError, ...)
// and are converted into this type at the command boundary.
//
// ============================================================================

/// Stable classification of an engine error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    PreconditionFailed,
    AlreadyExists,
    PermissionDenied,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("concurrency conflict on {aggregate}: stream advanced past sequence {observed}")]
    ConcurrencyConflict { aggregate: String, observed: u64 },

    #[error("request cancelled")]
    Cancelled,

    #[error("request deadline exceeded")]
    DeadlineExceeded,

    #[error("event payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage failure: {0}")]
    Storage(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::PreconditionFailed(_) => ErrorKind::PreconditionFailed,
            Error::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Error::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Error::ConcurrencyConflict { .. }
            | Error::Cancelled
            | Error::DeadlineExceeded
            | Error::Serialization(_)
            | Error::Storage(_)
            | Error::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, Error::ConcurrencyConflict { .. })
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Error::InvalidArgument(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Error::NotFound(message.into())
    }

    pub fn precondition_failed(message: impl Into<String>) -> Self {
        Error::PreconditionFailed(message.into())
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Error::AlreadyExists(message.into())
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Error::PermissionDenied(message.into())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_classes_keep_their_kind() {
        assert_eq!(Error::invalid_argument("name").kind(), ErrorKind::InvalidArgument);
        assert_eq!(Error::not_found("org").kind(), ErrorKind::NotFound);
        assert_eq!(Error::precondition_failed("inactive").kind(), ErrorKind::PreconditionFailed);
        assert_eq!(Error::already_exists("domain").kind(), ErrorKind::AlreadyExists);
        assert_eq!(Error::permission_denied("member").kind(), ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_infrastructure_failures_are_internal() {
        let conflict = Error::ConcurrencyConflict {
            aggregate: "org/org1".to_string(),
            observed: 3,
        };
        assert_eq!(conflict.kind(), ErrorKind::Internal);
        assert!(conflict.is_concurrency_conflict());
        assert_eq!(Error::Cancelled.kind(), ErrorKind::Internal);
        assert_eq!(Error::from(anyhow::anyhow!("boom")).kind(), ErrorKind::Internal);
        assert!(!Error::Cancelled.is_concurrency_conflict());
    }
}
