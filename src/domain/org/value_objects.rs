use serde::{Deserialize, Serialize};

use crate::event_sourcing::core::ObjectDetails;
use super::errors::OrgError;

// ============================================================================
// Org Value Objects
// ============================================================================

pub const ORG_OWNER_ROLE: &str = "ORG_OWNER";

const MAX_LABEL_LENGTH: usize = 63;
const MAX_DOMAIN_LENGTH: usize = 253;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrgState {
    #[default]
    Unspecified,
    Active,
    Inactive,
    Removed,
}

impl OrgState {
    /// Added and not removed
    pub fn exists(self) -> bool {
        matches!(self, OrgState::Active | OrgState::Inactive)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrgDomainState {
    #[default]
    Unspecified,
    Active,
    Removed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemberState {
    #[default]
    Unspecified,
    Active,
    Removed,
}

/// How ownership of a custom domain is proven
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainValidationType {
    Http,
    Dns,
}

/// Result of adding an organisation
#[derive(Debug, Clone, PartialEq)]
pub struct Org {
    pub id: String,
    pub name: String,
    pub state: OrgState,
    pub primary_domain: String,
    pub details: ObjectDetails,
}

/// Trims and validates an org name
pub fn normalize_org_name(name: &str) -> Result<String, OrgError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(OrgError::InvalidName);
    }
    Ok(name.to_string())
}

/// Trims and lowercases a domain, rejecting characters outside a DNS name
pub fn normalize_domain(domain: &str) -> Result<String, OrgError> {
    let domain = domain.trim().to_lowercase();
    let valid = !domain.is_empty()
        && domain.len() <= MAX_DOMAIN_LENGTH
        && domain.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    if !valid {
        return Err(OrgError::InvalidDomain(domain));
    }
    Ok(domain)
}

/// Default domain an org gets below the IAM domain, e.g. "ACME Corp" -> "acme-corp.iam.example"
pub fn iam_domain_name(org_name: &str, iam_domain: &str) -> Result<String, OrgError> {
    let mut label: String = org_name
        .trim()
        .replace(' ', "-")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect();
    label.truncate(MAX_LABEL_LENGTH);

    let overflow = (label.len() + 1 + iam_domain.len()).saturating_sub(MAX_DOMAIN_LENGTH);
    label.truncate(label.len().saturating_sub(overflow));

    if label.is_empty() {
        return Err(OrgError::InvalidName);
    }
    Ok(format!("{}.{}", label.to_lowercase(), iam_domain))
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iam_domain_name() {
        assert_eq!(iam_domain_name("Org", "iam-domain").unwrap(), "org.iam-domain");
        assert_eq!(iam_domain_name(" ACME Corp ", "iam.example").unwrap(), "acme-corp.iam.example");
        assert_eq!(iam_domain_name("Müller & Söhne", "iam").unwrap(), "mller--shne.iam");
        assert!(iam_domain_name("!!!", "iam").is_err());
    }

    #[test]
    fn test_iam_domain_name_respects_length_limits() {
        let long = "a".repeat(100);
        let domain = iam_domain_name(&long, "iam").unwrap();
        assert_eq!(domain.len(), MAX_LABEL_LENGTH + ".iam".len());

        let iam = format!("{}.example", "b".repeat(240));
        let domain = iam_domain_name(&long, &iam).unwrap();
        assert_eq!(domain.len(), MAX_DOMAIN_LENGTH);
    }

    #[test]
    fn test_normalize_domain() {
        assert_eq!(normalize_domain("  Example.COM ").unwrap(), "example.com");
        assert!(normalize_domain("   ").is_err());
        assert!(normalize_domain("exa mple.com").is_err());
    }

    #[test]
    fn test_org_state_exists() {
        assert!(OrgState::Active.exists());
        assert!(OrgState::Inactive.exists());
        assert!(!OrgState::Removed.exists());
        assert!(!OrgState::Unspecified.exists());
    }
}
