use crate::error::Error;

// ============================================================================
// Instance Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum InstanceError {
    #[error("Invalid trusted domain: {0:?}")]
    InvalidTrustedDomain(String),

    #[error("Trusted domain {0} already exists")]
    TrustedDomainAlreadyExists(String),

    #[error("Trusted domain {0} not found")]
    TrustedDomainNotFound(String),

    #[error("Instance not found")]
    NotFound,
}

impl From<InstanceError> for Error {
    fn from(error: InstanceError) -> Self {
        let message = error.to_string();
        match error {
            InstanceError::InvalidTrustedDomain(_) => Error::InvalidArgument(message),
            InstanceError::TrustedDomainAlreadyExists(_) => Error::AlreadyExists(message),
            InstanceError::TrustedDomainNotFound(_) | InstanceError::NotFound => Error::NotFound(message),
        }
    }
}
