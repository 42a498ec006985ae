use std::sync::Arc;

use crate::context::Context;
use crate::error::Result;
use crate::event_sourcing::core::{append_and_reduce, hydrate, Command, ObjectDetails, WriteModel};
use crate::event_sourcing::EventStore;
use super::errors::InstanceError;
use super::events::{InstanceEvent, TrustedDomain};
use super::write_model::TrustedDomainsWriteModel;

// ============================================================================
// Instance Command Handler
// ============================================================================

pub struct InstanceCommandHandler {
    event_store: Arc<dyn EventStore>,
}

/// Host names with an optional port, e.g. "login.example.com:8080"
fn normalize_trusted_domain(domain: &str) -> Result<String, InstanceError> {
    let domain = domain.trim().to_lowercase();
    let valid = !domain.is_empty()
        && domain
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':'));
    if !valid {
        return Err(InstanceError::InvalidTrustedDomain(domain));
    }
    Ok(domain)
}

impl InstanceCommandHandler {
    pub fn new(event_store: Arc<dyn EventStore>) -> Self {
        Self { event_store }
    }

    async fn trusted_domains(&self, ctx: &Context) -> Result<TrustedDomainsWriteModel> {
        let model = hydrate(ctx, &self.event_store, TrustedDomainsWriteModel::new(ctx.instance_id())).await?;
        if model.removed {
            return Err(InstanceError::NotFound.into());
        }
        Ok(model)
    }

    async fn push_into(
        &self,
        ctx: &Context,
        mut model: TrustedDomainsWriteModel,
        event: InstanceEvent,
    ) -> Result<ObjectDetails> {
        let command = Command::new(ctx, &model.aggregate(), &event)?.guarded_by(&model);
        let events = self.event_store.push(ctx, vec![command]).await?;
        append_and_reduce(&mut model, &events)?;
        Ok(ObjectDetails::from_replay(model.replay()))
    }

    pub async fn add_trusted_domain(&self, ctx: &Context, domain: &str) -> Result<ObjectDetails> {
        let domain = normalize_trusted_domain(domain)?;
        let model = self.trusted_domains(ctx).await?;
        if model.contains(&domain) {
            return Err(InstanceError::TrustedDomainAlreadyExists(domain).into());
        }
        tracing::info!(instance_id = %ctx.instance_id(), domain = %domain, "Adding trusted domain");
        self.push_into(ctx, model, InstanceEvent::TrustedDomainAdded(TrustedDomain { domain }))
            .await
    }

    /// Removing an unknown domain is a no-op (`Ok(None)`) unless `error_if_not_found` is set
    pub async fn remove_trusted_domain(
        &self,
        ctx: &Context,
        domain: &str,
        error_if_not_found: bool,
    ) -> Result<Option<ObjectDetails>> {
        let domain = normalize_trusted_domain(domain)?;
        let model = self.trusted_domains(ctx).await?;
        if !model.contains(&domain) {
            if error_if_not_found {
                return Err(InstanceError::TrustedDomainNotFound(domain).into());
            }
            tracing::debug!(instance_id = %ctx.instance_id(), domain = %domain, "Trusted domain already absent");
            return Ok(None);
        }
        let details = self
            .push_into(ctx, model, InstanceEvent::TrustedDomainRemoved(TrustedDomain { domain }))
            .await?;
        Ok(Some(details))
    }

    /// Removes the instance of the context and releases all of its unique constraints
    pub async fn remove_instance(&self, ctx: &Context) -> Result<ObjectDetails> {
        let model = self.trusted_domains(ctx).await?;
        tracing::info!(instance_id = %ctx.instance_id(), "Removing instance");
        self.push_into(ctx, model, InstanceEvent::Removed).await
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::org::{OrgCommandHandler, StaticDomainVerifier};
    use crate::error::ErrorKind;
    use crate::event_sourcing::InMemoryEventStore;
    use crate::id::PresetIdGenerator;

    fn handler() -> (InstanceCommandHandler, Arc<InMemoryEventStore>) {
        let store = Arc::new(InMemoryEventStore::new());
        (InstanceCommandHandler::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_add_trusted_domain_once() {
        let (handler, _) = handler();
        let ctx = Context::background("instance1");

        let details = handler.add_trusted_domain(&ctx, "Login.Example.com").await.unwrap();
        assert_eq!(details.sequence, 1);
        assert_eq!(details.resource_owner, "instance1");

        let duplicate = handler.add_trusted_domain(&ctx, "login.example.com").await.unwrap_err();
        assert_eq!(duplicate.kind(), ErrorKind::AlreadyExists);

        let invalid = handler.add_trusted_domain(&ctx, "bad domain").await.unwrap_err();
        assert_eq!(invalid.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_removing_unknown_domain_is_a_no_op() {
        let (handler, store) = handler();
        let ctx = Context::background("instance1");

        let removed = handler.remove_trusted_domain(&ctx, "missing.example.com", false).await.unwrap();
        assert_eq!(removed, None);
        assert!(store.is_empty().await);

        let error = handler
            .remove_trusted_domain(&ctx, "missing.example.com", true)
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_remove_existing_domain() {
        let (handler, _) = handler();
        let ctx = Context::background("instance1");
        handler.add_trusted_domain(&ctx, "login.example.com").await.unwrap();

        let details = handler.remove_trusted_domain(&ctx, "login.example.com", true).await.unwrap();
        assert_eq!(details.map(|d| d.sequence), Some(2));

        let model = handler.trusted_domains(&ctx).await.unwrap();
        assert!(model.domains.is_empty());
    }

    #[tokio::test]
    async fn test_trusted_domains_are_per_instance() {
        let (handler, _) = handler();
        handler
            .add_trusted_domain(&Context::background("instance1"), "login.example.com")
            .await
            .unwrap();

        let other = Context::background("instance2");
        handler.add_trusted_domain(&other, "login.example.com").await.unwrap();
        let removed = handler.remove_trusted_domain(&other, "login.example.com", true).await.unwrap();
        assert_eq!(removed.map(|d| d.resource_owner), Some("instance2".to_string()));
    }

    #[tokio::test]
    async fn test_remove_instance_releases_its_unique_constraints() {
        let store: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new());
        let instances = InstanceCommandHandler::new(store.clone());
        let orgs = OrgCommandHandler::new(
            store.clone(),
            Arc::new(PresetIdGenerator::new(["org1", "org2", "org3", "org4"])),
            "iam-domain",
            Arc::new(StaticDomainVerifier::accepting()),
        );
        let removed_ctx = Context::background("instance1");
        let other_ctx = Context::background("instance2");
        orgs.add_org(&removed_ctx, "Org", "").await.unwrap();
        orgs.add_org(&other_ctx, "Org", "").await.unwrap();
        instances.add_trusted_domain(&removed_ctx, "login.example.com").await.unwrap();

        let details = instances.remove_instance(&removed_ctx).await.unwrap();
        assert_eq!(details.sequence, 2);

        // names are free again in the removed instance only
        orgs.add_org(&removed_ctx, "Org", "").await.unwrap();
        let taken = orgs.add_org(&other_ctx, "Org", "").await.unwrap_err();
        assert_eq!(taken.kind(), ErrorKind::AlreadyExists);

        let again = instances.remove_instance(&removed_ctx).await.unwrap_err();
        assert_eq!(again.kind(), ErrorKind::NotFound);
        let trusted = instances.add_trusted_domain(&removed_ctx, "login.example.com").await.unwrap_err();
        assert_eq!(trusted.kind(), ErrorKind::NotFound);
    }
}
