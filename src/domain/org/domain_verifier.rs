use anyhow::bail;
use async_trait::async_trait;

use super::value_objects::DomainValidationType;

/// Checks that the token issued for a domain is published by its owner
/// (HTTP well-known file or DNS TXT record).
#[async_trait]
pub trait DomainVerifier: Send + Sync {
    async fn verify(&self, domain: &str, token: &str, validation_type: DomainValidationType) -> anyhow::Result<()>;
}

/// Verifier with a fixed answer, for local runs and tests
#[derive(Debug, Clone, Copy)]
pub struct StaticDomainVerifier {
    accept: bool,
}

impl StaticDomainVerifier {
    pub fn accepting() -> Self {
        Self { accept: true }
    }

    pub fn rejecting() -> Self {
        Self { accept: false }
    }
}

#[async_trait]
impl DomainVerifier for StaticDomainVerifier {
    async fn verify(&self, domain: &str, _token: &str, validation_type: DomainValidationType) -> anyhow::Result<()> {
        if !self.accept {
            bail!("token for {domain} not found via {validation_type:?}");
        }
        Ok(())
    }
}
