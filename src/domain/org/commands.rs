use async_trait::async_trait;

use crate::context::Context;
use crate::domain::user::HumanUserWriteModel;
use crate::error::Result;
use crate::event_sourcing::core::{hydrate, AggregateRef, Command};
use crate::event_sourcing::{BuildCommands, EventFilter, Validation};
use super::errors::OrgError;
use super::events::{MemberAdded, OrgAdded, OrgEvent};
use super::value_objects::{normalize_domain, normalize_org_name, OrgDomainState, MemberState};
use super::write_model::{OrgDomainWriteModel, OrgMemberWriteModel, OrgWriteModel};

// ============================================================================
// Org Preparation Steps
// ============================================================================
//
// Each step validates its input first, then reads the org stream through the
// filter it is handed. Chained in one preparation, later steps see the
// commands of earlier ones (e.g. the domain added right before is verified).
//
// ============================================================================

async fn existing_org(ctx: &Context, filter: &dyn EventFilter, aggregate: &AggregateRef) -> Result<OrgWriteModel> {
    let org = hydrate(ctx, filter, OrgWriteModel::new(&aggregate.id, &aggregate.instance_id)).await?;
    if !org.state.exists() {
        return Err(OrgError::NotFound.into());
    }
    Ok(org)
}

async fn existing_domain(
    ctx: &Context,
    filter: &dyn EventFilter,
    aggregate: &AggregateRef,
    domain: &str,
) -> Result<OrgDomainWriteModel> {
    let model = hydrate(
        ctx,
        filter,
        OrgDomainWriteModel::new(&aggregate.id, &aggregate.instance_id, domain),
    )
    .await?;
    if model.state != OrgDomainState::Active {
        return Err(OrgError::DomainNotFound.into());
    }
    Ok(model)
}

// ============================================================================
// Add Org
// ============================================================================

pub struct AddOrgStep {
    aggregate: AggregateRef,
    name: String,
}

impl AddOrgStep {
    pub fn new(aggregate: AggregateRef, name: impl Into<String>) -> Self {
        Self { aggregate, name: name.into() }
    }
}

impl Validation for AddOrgStep {
    fn validate(mut self: Box<Self>) -> Result<Box<dyn BuildCommands>> {
        self.name = normalize_org_name(&self.name)?;
        Ok(self)
    }
}

#[async_trait]
impl BuildCommands for AddOrgStep {
    async fn build_commands(&self, ctx: &Context, _filter: &dyn EventFilter) -> Result<Vec<Command>> {
        let event = OrgEvent::Added(OrgAdded { name: self.name.clone() });
        Ok(vec![Command::new(ctx, &self.aggregate, &event)?])
    }
}

// ============================================================================
// Add Org Domain
// ============================================================================

pub struct AddOrgDomainStep {
    aggregate: AggregateRef,
    domain: String,
}

impl AddOrgDomainStep {
    pub fn new(aggregate: AggregateRef, domain: impl Into<String>) -> Self {
        Self { aggregate, domain: domain.into() }
    }
}

impl Validation for AddOrgDomainStep {
    fn validate(mut self: Box<Self>) -> Result<Box<dyn BuildCommands>> {
        self.domain = normalize_domain(&self.domain)?;
        Ok(self)
    }
}

#[async_trait]
impl BuildCommands for AddOrgDomainStep {
    async fn build_commands(&self, ctx: &Context, filter: &dyn EventFilter) -> Result<Vec<Command>> {
        existing_org(ctx, filter, &self.aggregate).await?;
        let domain = hydrate(
            ctx,
            filter,
            OrgDomainWriteModel::new(&self.aggregate.id, &self.aggregate.instance_id, &self.domain),
        )
        .await?;
        if domain.state == OrgDomainState::Active {
            return Err(OrgError::DomainAlreadyExists.into());
        }
        let event = OrgEvent::domain(OrgEvent::DomainAdded, &self.domain);
        Ok(vec![Command::new(ctx, &self.aggregate, &event)?.guarded_by(&domain)])
    }
}

// ============================================================================
// Verify Org Domain
// ============================================================================

/// Marks a domain verified without a proof; used for generated domains.
/// The domain's unique constraint guards it, not the write model.
pub struct VerifyOrgDomainStep {
    aggregate: AggregateRef,
    domain: String,
}

impl VerifyOrgDomainStep {
    pub fn new(aggregate: AggregateRef, domain: impl Into<String>) -> Self {
        Self { aggregate, domain: domain.into() }
    }
}

impl Validation for VerifyOrgDomainStep {
    fn validate(mut self: Box<Self>) -> Result<Box<dyn BuildCommands>> {
        self.domain = normalize_domain(&self.domain)?;
        Ok(self)
    }
}

#[async_trait]
impl BuildCommands for VerifyOrgDomainStep {
    async fn build_commands(&self, ctx: &Context, filter: &dyn EventFilter) -> Result<Vec<Command>> {
        let domain = existing_domain(ctx, filter, &self.aggregate, &self.domain).await?;
        if domain.verified {
            return Err(OrgError::DomainAlreadyVerified.into());
        }
        let event = OrgEvent::domain(OrgEvent::DomainVerified, &self.domain);
        Ok(vec![Command::new(ctx, &self.aggregate, &event)?])
    }
}

// ============================================================================
// Set Primary Org Domain
// ============================================================================

pub struct SetPrimaryOrgDomainStep {
    aggregate: AggregateRef,
    domain: String,
}

impl SetPrimaryOrgDomainStep {
    pub fn new(aggregate: AggregateRef, domain: impl Into<String>) -> Self {
        Self { aggregate, domain: domain.into() }
    }
}

impl Validation for SetPrimaryOrgDomainStep {
    fn validate(mut self: Box<Self>) -> Result<Box<dyn BuildCommands>> {
        self.domain = normalize_domain(&self.domain)?;
        Ok(self)
    }
}

#[async_trait]
impl BuildCommands for SetPrimaryOrgDomainStep {
    async fn build_commands(&self, ctx: &Context, filter: &dyn EventFilter) -> Result<Vec<Command>> {
        existing_org(ctx, filter, &self.aggregate).await?;
        let domain = existing_domain(ctx, filter, &self.aggregate, &self.domain).await?;
        if !domain.verified {
            return Err(OrgError::DomainNotVerified.into());
        }
        if domain.primary {
            return Err(OrgError::DomainAlreadyPrimary.into());
        }
        let event = OrgEvent::domain(OrgEvent::DomainPrimarySet, &self.domain);
        Ok(vec![Command::new(ctx, &self.aggregate, &event)?.guarded_by(&domain)])
    }
}

// ============================================================================
// Add Org Member
// ============================================================================

pub struct AddOrgMemberStep {
    aggregate: AggregateRef,
    user_id: String,
    roles: Vec<String>,
}

impl AddOrgMemberStep {
    pub fn new(aggregate: AggregateRef, user_id: impl Into<String>, roles: Vec<String>) -> Self {
        Self {
            aggregate,
            user_id: user_id.into(),
            roles,
        }
    }
}

impl Validation for AddOrgMemberStep {
    fn validate(mut self: Box<Self>) -> Result<Box<dyn BuildCommands>> {
        self.user_id = self.user_id.trim().to_string();
        self.roles.retain(|role| !role.trim().is_empty());
        if self.user_id.is_empty() || self.roles.is_empty() {
            return Err(OrgError::InvalidMember.into());
        }
        Ok(self)
    }
}

#[async_trait]
impl BuildCommands for AddOrgMemberStep {
    async fn build_commands(&self, ctx: &Context, filter: &dyn EventFilter) -> Result<Vec<Command>> {
        let user = hydrate(
            ctx,
            filter,
            HumanUserWriteModel::new(&self.user_id, "", &self.aggregate.instance_id),
        )
        .await?;
        if !user.state.exists() {
            return Err(OrgError::UserNotFound(self.user_id.clone()).into());
        }

        existing_org(ctx, filter, &self.aggregate).await?;
        let member = hydrate(
            ctx,
            filter,
            OrgMemberWriteModel::new(&self.aggregate.id, &self.aggregate.instance_id, &self.user_id),
        )
        .await?;
        if member.state == MemberState::Active {
            return Err(OrgError::MemberAlreadyExists.into());
        }

        let event = OrgEvent::MemberAdded(MemberAdded {
            user_id: self.user_id.clone(),
            roles: self.roles.clone(),
        });
        Ok(vec![Command::new(ctx, &self.aggregate, &event)?.guarded_by(&member)])
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
