use crate::error::Error;

// ============================================================================
// Org Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrgError {
    #[error("Org name must not be empty")]
    InvalidName,

    #[error("Invalid domain: {0:?}")]
    InvalidDomain(String),

    #[error("Member needs a user id and at least one role")]
    InvalidMember,

    #[error("Org not found")]
    NotFound,

    #[error("Org is not active")]
    NotActive,

    #[error("Org is not inactive")]
    NotInactive,

    #[error("Org name is unchanged")]
    NameUnchanged,

    #[error("User {0} not found or removed")]
    UserNotFound(String),

    #[error("Member already exists")]
    MemberAlreadyExists,

    #[error("Member not found")]
    MemberNotFound,

    #[error("Domain already exists on org")]
    DomainAlreadyExists,

    #[error("Domain not found on org")]
    DomainNotFound,

    #[error("Domain is not verified")]
    DomainNotVerified,

    #[error("Domain is already verified")]
    DomainAlreadyVerified,

    #[error("Domain is already primary")]
    DomainAlreadyPrimary,

    #[error("Primary domain cannot be removed")]
    PrimaryDomainNotDeletable,

    #[error("Domain verification was never requested")]
    DomainVerificationMissing,

    #[error("Domain verification failed: {0}")]
    DomainVerificationFailed(String),
}

impl From<OrgError> for Error {
    fn from(error: OrgError) -> Self {
        let message = error.to_string();
        match error {
            OrgError::InvalidName | OrgError::InvalidDomain(_) | OrgError::InvalidMember => {
                Error::InvalidArgument(message)
            }
            OrgError::NotFound | OrgError::MemberNotFound | OrgError::DomainNotFound => Error::NotFound(message),
            OrgError::MemberAlreadyExists | OrgError::DomainAlreadyExists => Error::AlreadyExists(message),
            OrgError::NotActive
            | OrgError::NotInactive
            | OrgError::NameUnchanged
            | OrgError::UserNotFound(_)
            | OrgError::DomainNotVerified
            | OrgError::DomainAlreadyVerified
            | OrgError::DomainAlreadyPrimary
            | OrgError::PrimaryDomainNotDeletable
            | OrgError::DomainVerificationMissing
            | OrgError::DomainVerificationFailed(_) => Error::PreconditionFailed(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_org_errors_are_classified() {
        assert_eq!(Error::from(OrgError::InvalidName).kind(), ErrorKind::InvalidArgument);
        assert_eq!(Error::from(OrgError::NotFound).kind(), ErrorKind::NotFound);
        assert_eq!(Error::from(OrgError::DomainAlreadyExists).kind(), ErrorKind::AlreadyExists);
        assert_eq!(Error::from(OrgError::UserNotFound("u1".into())).kind(), ErrorKind::PreconditionFailed);
    }
}
