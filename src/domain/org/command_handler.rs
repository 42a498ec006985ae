use std::sync::Arc;

use crate::context::Context;
use crate::error::Result;
use crate::event_sourcing::core::{append_and_reduce, hydrate, Command, ObjectDetails, WriteModel};
use crate::event_sourcing::{prepare_commands, push_detached, EventStore, Validation};
use crate::id::IdGenerator;
use super::commands::{AddOrgDomainStep, AddOrgMemberStep, AddOrgStep, SetPrimaryOrgDomainStep, VerifyOrgDomainStep};
use super::domain_verifier::DomainVerifier;
use super::errors::OrgError;
use super::events::{
    org_aggregate, DomainRemoved, DomainVerificationAdded, MemberRemoved, OrgChanged, OrgEvent, OrgRemoved,
};
use super::value_objects::{
    iam_domain_name, normalize_domain, normalize_org_name, DomainValidationType, MemberState, Org, OrgDomainState,
    OrgState, ORG_OWNER_ROLE,
};
use super::write_model::{OrgDomainWriteModel, OrgMemberWriteModel, OrgWriteModel};

// ============================================================================
// Org Command Handler
// ============================================================================
//
// Orchestrates: Preparation → Write Models → Commands → Push → Append & Reduce
//
// ============================================================================

pub struct OrgCommandHandler {
    event_store: Arc<dyn EventStore>,
    id_generator: Arc<dyn IdGenerator>,
    iam_domain: String,
    verifier: Arc<dyn DomainVerifier>,
}

impl OrgCommandHandler {
    pub fn new(
        event_store: Arc<dyn EventStore>,
        id_generator: Arc<dyn IdGenerator>,
        iam_domain: impl Into<String>,
        verifier: Arc<dyn DomainVerifier>,
    ) -> Self {
        Self {
            event_store,
            id_generator,
            iam_domain: iam_domain.into(),
            verifier,
        }
    }

    /// Domain generated org domains live under: the one the instance was
    /// reached by, falling back to the configured one
    fn iam_domain<'a>(&'a self, ctx: &'a Context) -> &'a str {
        let requested = ctx.instance().requested_domain.as_str();
        if requested.is_empty() {
            &self.iam_domain
        } else {
            requested
        }
    }

    async fn org(&self, ctx: &Context, org_id: &str) -> Result<OrgWriteModel> {
        hydrate(ctx, &self.event_store, OrgWriteModel::new(org_id, ctx.instance_id())).await
    }

    async fn domain(&self, ctx: &Context, org_id: &str, domain: &str) -> Result<OrgDomainWriteModel> {
        let model = hydrate(
            ctx,
            &self.event_store,
            OrgDomainWriteModel::new(org_id, ctx.instance_id(), domain),
        )
        .await?;
        if model.state != OrgDomainState::Active {
            return Err(OrgError::DomainNotFound.into());
        }
        Ok(model)
    }

    /// Pushes `commands` and folds the result into `write_model`
    async fn push_into<W: WriteModel>(&self, ctx: &Context, write_model: &mut W, commands: Vec<Command>) -> Result<()> {
        let events = self.event_store.push(ctx, commands).await?;
        append_and_reduce(write_model, &events)
    }

    // ========================================================================
    // Org Lifecycle
    // ========================================================================

    /// Adds an org with its generated, verified and primary domain and
    /// `owner_user_id` as ORG_OWNER, all in one push. An empty owner adds
    /// the org without members (bootstrapping the first org).
    pub async fn add_org(&self, ctx: &Context, name: &str, owner_user_id: &str) -> Result<Org> {
        let name = normalize_org_name(name)?;
        let domain = iam_domain_name(&name, self.iam_domain(ctx))?;
        let org_id = self.id_generator.next_id()?;
        let aggregate = org_aggregate(&org_id, ctx.instance_id());

        let mut steps: Vec<Box<dyn Validation>> = vec![
            Box::new(AddOrgStep::new(aggregate.clone(), name)),
            Box::new(AddOrgDomainStep::new(aggregate.clone(), domain.clone())),
            Box::new(VerifyOrgDomainStep::new(aggregate.clone(), domain.clone())),
            Box::new(SetPrimaryOrgDomainStep::new(aggregate.clone(), domain)),
        ];
        if !owner_user_id.trim().is_empty() {
            steps.push(Box::new(AddOrgMemberStep::new(
                aggregate,
                owner_user_id,
                vec![ORG_OWNER_ROLE.to_string()],
            )));
        }
        let commands = prepare_commands(ctx, &self.event_store, steps).await?;

        let mut org = OrgWriteModel::new(&org_id, ctx.instance_id());
        self.push_into(ctx, &mut org, commands).await?;

        tracing::info!(
            org_id = %org_id,
            instance_id = %ctx.instance_id(),
            primary_domain = %org.primary_domain,
            "Org added"
        );

        Ok(Org {
            id: org_id,
            name: org.name.clone(),
            state: org.state,
            primary_domain: org.primary_domain.clone(),
            details: ObjectDetails::from_replay(org.replay()),
        })
    }

    /// Renames the org. The generated domain follows the name.
    pub async fn change_org_name(&self, ctx: &Context, org_id: &str, name: &str) -> Result<ObjectDetails> {
        let name = normalize_org_name(name)?;
        let mut org = self.org(ctx, org_id).await?;
        if !org.state.exists() {
            return Err(OrgError::NotFound.into());
        }
        if org.name == name {
            return Err(OrgError::NameUnchanged.into());
        }

        let aggregate = org.aggregate();
        let changed = OrgEvent::Changed(OrgChanged {
            name: name.clone(),
            old_name: org.name.clone(),
        });
        let mut commands = vec![Command::new(ctx, &aggregate, &changed)?.guarded_by(&org)];

        let iam_domain = self.iam_domain(ctx);
        let old_domain = iam_domain_name(&org.name, iam_domain).ok();
        let new_domain = iam_domain_name(&name, iam_domain)?;
        if let Some(old_domain) = old_domain.filter(|old| org.verified_domains.contains(old) && *old != new_domain) {
            // The new generated domain must not already exist on the org
            let mut steps: Vec<Box<dyn Validation>> = vec![
                Box::new(AddOrgDomainStep::new(aggregate.clone(), new_domain.clone())),
                Box::new(VerifyOrgDomainStep::new(aggregate.clone(), new_domain.clone())),
            ];
            if org.primary_domain == old_domain {
                steps.push(Box::new(SetPrimaryOrgDomainStep::new(aggregate.clone(), new_domain.clone())));
            }
            commands.extend(prepare_commands(ctx, &self.event_store, steps).await?);
            let removed = OrgEvent::DomainRemoved(DomainRemoved {
                domain: old_domain,
                was_verified: true,
            });
            commands.push(Command::new(ctx, &aggregate, &removed)?);
        }

        self.push_into(ctx, &mut org, commands).await?;
        tracing::info!(org_id = %org_id, name = %org.name, "Org renamed");
        Ok(ObjectDetails::from_replay(org.replay()))
    }

    pub async fn deactivate_org(&self, ctx: &Context, org_id: &str) -> Result<ObjectDetails> {
        let mut org = self.org(ctx, org_id).await?;
        match org.state {
            OrgState::Active => {}
            OrgState::Inactive => return Err(OrgError::NotActive.into()),
            OrgState::Unspecified | OrgState::Removed => return Err(OrgError::NotFound.into()),
        }
        let command = Command::new(ctx, &org.aggregate(), &OrgEvent::Deactivated)?.guarded_by(&org);
        self.push_into(ctx, &mut org, vec![command]).await?;
        Ok(ObjectDetails::from_replay(org.replay()))
    }

    pub async fn reactivate_org(&self, ctx: &Context, org_id: &str) -> Result<ObjectDetails> {
        let mut org = self.org(ctx, org_id).await?;
        match org.state {
            OrgState::Inactive => {}
            OrgState::Active => return Err(OrgError::NotInactive.into()),
            OrgState::Unspecified | OrgState::Removed => return Err(OrgError::NotFound.into()),
        }
        let command = Command::new(ctx, &org.aggregate(), &OrgEvent::Reactivated)?.guarded_by(&org);
        self.push_into(ctx, &mut org, vec![command]).await?;
        Ok(ObjectDetails::from_replay(org.replay()))
    }

    /// Removes the org for good, releasing its name, verified domains and memberships
    pub async fn remove_org(&self, ctx: &Context, org_id: &str) -> Result<ObjectDetails> {
        let mut org = self.org(ctx, org_id).await?;
        if !org.state.exists() {
            return Err(OrgError::NotFound.into());
        }
        let removed = OrgEvent::Removed(OrgRemoved {
            name: org.name.clone(),
            verified_domains: org.verified_domains.clone(),
            members: org.members.clone(),
        });
        let command = Command::new(ctx, &org.aggregate(), &removed)?.guarded_by(&org);
        self.push_into(ctx, &mut org, vec![command]).await?;
        tracing::info!(org_id = %org_id, "Org removed");
        Ok(ObjectDetails::from_replay(org.replay()))
    }

    // ========================================================================
    // Org Domains
    // ========================================================================

    pub async fn add_org_domain(&self, ctx: &Context, org_id: &str, domain: &str) -> Result<ObjectDetails> {
        let aggregate = org_aggregate(org_id, ctx.instance_id());
        let steps: Vec<Box<dyn Validation>> = vec![Box::new(AddOrgDomainStep::new(aggregate, domain))];
        let commands = prepare_commands(ctx, &self.event_store, steps).await?;
        let events = self.event_store.push(ctx, commands).await?;
        Ok(ObjectDetails::from_events(&events))
    }

    /// Issues the token the org has to publish to prove it owns `domain`
    pub async fn add_org_domain_verification(
        &self,
        ctx: &Context,
        org_id: &str,
        domain: &str,
        validation_type: DomainValidationType,
    ) -> Result<(String, ObjectDetails)> {
        let domain = normalize_domain(domain)?;
        let mut model = self.domain(ctx, org_id, &domain).await?;
        if model.verified {
            return Err(OrgError::DomainAlreadyVerified.into());
        }

        let token = self.id_generator.next_id()?;
        let event = OrgEvent::DomainVerificationAdded(DomainVerificationAdded {
            domain,
            validation_type,
            validation_code: token.clone(),
        });
        let command = Command::new(ctx, &model.aggregate(), &event)?.guarded_by(&model);
        self.push_into(ctx, &mut model, vec![command]).await?;
        Ok((token, ObjectDetails::from_replay(model.replay())))
    }

    /// Checks the published token and marks the domain verified. A failed check
    /// is recorded on the org even though the request fails.
    pub async fn validate_org_domain(&self, ctx: &Context, org_id: &str, domain: &str) -> Result<ObjectDetails> {
        let domain = normalize_domain(domain)?;
        let mut model = self.domain(ctx, org_id, &domain).await?;
        if model.verified {
            return Err(OrgError::DomainAlreadyVerified.into());
        }
        let Some((validation_type, token)) = model.validation.clone() else {
            return Err(OrgError::DomainVerificationMissing.into());
        };

        let aggregate = model.aggregate();
        if let Err(error) = self.verifier.verify(&domain, &token, validation_type).await {
            tracing::warn!(org_id = %org_id, domain = %domain, error = %error, "Domain verification failed");
            let failed = Command::new(ctx, &aggregate, &OrgEvent::domain(OrgEvent::DomainVerificationFailed, &domain))?;
            push_detached(self.event_store.clone(), ctx, vec![failed]);
            return Err(OrgError::DomainVerificationFailed(error.to_string()).into());
        }

        // A removal racing the verifier must not leave the domain claimed
        let verified =
            Command::new(ctx, &aggregate, &OrgEvent::domain(OrgEvent::DomainVerified, &domain))?.guarded_by(&model);
        self.push_into(ctx, &mut model, vec![verified]).await?;
        tracing::info!(org_id = %org_id, domain = %domain, "Domain verified");
        Ok(ObjectDetails::from_replay(model.replay()))
    }

    pub async fn set_primary_org_domain(&self, ctx: &Context, org_id: &str, domain: &str) -> Result<ObjectDetails> {
        let aggregate = org_aggregate(org_id, ctx.instance_id());
        let steps: Vec<Box<dyn Validation>> = vec![Box::new(SetPrimaryOrgDomainStep::new(aggregate, domain))];
        let commands = prepare_commands(ctx, &self.event_store, steps).await?;
        let events = self.event_store.push(ctx, commands).await?;
        Ok(ObjectDetails::from_events(&events))
    }

    pub async fn remove_org_domain(&self, ctx: &Context, org_id: &str, domain: &str) -> Result<ObjectDetails> {
        let domain = normalize_domain(domain)?;
        let mut model = self.domain(ctx, org_id, &domain).await?;
        if model.primary {
            return Err(OrgError::PrimaryDomainNotDeletable.into());
        }
        let removed = OrgEvent::DomainRemoved(DomainRemoved {
            domain,
            was_verified: model.verified,
        });
        let command = Command::new(ctx, &model.aggregate(), &removed)?.guarded_by(&model);
        self.push_into(ctx, &mut model, vec![command]).await?;
        Ok(ObjectDetails::from_replay(model.replay()))
    }

    // ========================================================================
    // Org Members
    // ========================================================================

    pub async fn add_org_member(
        &self,
        ctx: &Context,
        org_id: &str,
        user_id: &str,
        roles: Vec<String>,
    ) -> Result<ObjectDetails> {
        let aggregate = org_aggregate(org_id, ctx.instance_id());
        let steps: Vec<Box<dyn Validation>> = vec![Box::new(AddOrgMemberStep::new(aggregate, user_id, roles))];
        let commands = prepare_commands(ctx, &self.event_store, steps).await?;
        let events = self.event_store.push(ctx, commands).await?;
        Ok(ObjectDetails::from_events(&events))
    }

    pub async fn remove_org_member(&self, ctx: &Context, org_id: &str, user_id: &str) -> Result<ObjectDetails> {
        let mut member = hydrate(
            ctx,
            &self.event_store,
            OrgMemberWriteModel::new(org_id, ctx.instance_id(), user_id),
        )
        .await?;
        if member.state != MemberState::Active {
            return Err(OrgError::MemberNotFound.into());
        }
        let removed = OrgEvent::MemberRemoved(MemberRemoved {
            user_id: user_id.to_string(),
        });
        let command = Command::new(ctx, &member.aggregate(), &removed)?.guarded_by(&member);
        self.push_into(ctx, &mut member, vec![command]).await?;
        Ok(ObjectDetails::from_replay(member.replay()))
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
