use crate::error::Error;

// ============================================================================
// User Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("Username cannot be empty")]
    EmptyUsername,

    #[error("First name cannot be empty")]
    EmptyFirstName,

    #[error("Last name cannot be empty")]
    EmptyLastName,

    #[error("Email cannot be empty")]
    EmptyEmail,

    #[error("Invalid email format: {0}")]
    InvalidEmail(String),

    #[error("User not found")]
    NotFound,

    #[error("Organisation {0} not found")]
    OrgNotFound(String),

    #[error("User must be active to perform this operation")]
    NotActive,

    #[error("User must be inactive to reactivate")]
    NotInactive,

    #[error("Profile has not been changed")]
    NoChanges,
}

impl From<UserError> for Error {
    fn from(error: UserError) -> Self {
        let message = error.to_string();
        match error {
            UserError::EmptyUsername
            | UserError::EmptyFirstName
            | UserError::EmptyLastName
            | UserError::EmptyEmail
            | UserError::InvalidEmail(_) => Error::InvalidArgument(message),
            UserError::NotFound => Error::NotFound(message),
            UserError::OrgNotFound(_) | UserError::NotActive | UserError::NotInactive | UserError::NoChanges => {
                Error::PreconditionFailed(message)
            }
        }
    }
}
