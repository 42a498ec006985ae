use crate::error::Result;
use crate::event_sourcing::core::{
    AggregateRef, EventKind, ReplayState, SearchQuery, WriteModel,
};
use super::events::{org_aggregate, OrgEvent, OrgKind, ORG_AGGREGATE_TYPE};
use super::value_objects::{DomainValidationType, MemberState, OrgDomainState, OrgState};

// ============================================================================
// Org Write Models
// ============================================================================
//
// All models replay the org stream only. Each one selects the event types it
// folds; guard checks against the derived state live in the commands.
//
// ============================================================================

fn org_stream_query(replay: &ReplayState, kinds: &[OrgKind]) -> SearchQuery {
    replay
        .scoped_query()
        .aggregate_types([ORG_AGGREGATE_TYPE])
        .aggregate_ids([replay.aggregate_id.clone()])
        .event_types(kinds.iter().map(|kind| kind.event_type()))
        .build()
}

fn org_replay(org_id: &str, instance_id: &str) -> ReplayState {
    ReplayState::new(org_id, org_id).with_instance(instance_id)
}

// ============================================================================
// Org Lifecycle
// ============================================================================

/// Name, state and the constraints the org currently holds
#[derive(Debug, Clone, PartialEq)]
pub struct OrgWriteModel {
    replay: ReplayState,
    pub name: String,
    pub state: OrgState,
    pub primary_domain: String,
    pub verified_domains: Vec<String>,
    pub members: Vec<String>,
}

impl OrgWriteModel {
    pub fn new(org_id: &str, instance_id: &str) -> Self {
        Self {
            replay: org_replay(org_id, instance_id),
            name: String::new(),
            state: OrgState::Unspecified,
            primary_domain: String::new(),
            verified_domains: Vec::new(),
            members: Vec::new(),
        }
    }

    pub fn aggregate(&self) -> AggregateRef {
        org_aggregate(&self.replay.aggregate_id, &self.replay.instance_id)
    }
}

impl WriteModel for OrgWriteModel {
    fn query(&self) -> SearchQuery {
        org_stream_query(
            &self.replay,
            &[
                OrgKind::Added,
                OrgKind::Changed,
                OrgKind::Deactivated,
                OrgKind::Reactivated,
                OrgKind::Removed,
                OrgKind::DomainVerified,
                OrgKind::DomainPrimarySet,
                OrgKind::DomainRemoved,
                OrgKind::MemberAdded,
                OrgKind::MemberRemoved,
            ],
        )
    }

    fn replay(&self) -> &ReplayState {
        &self.replay
    }

    fn replay_mut(&mut self) -> &mut ReplayState {
        &mut self.replay
    }

    fn reduce(&mut self) -> Result<()> {
        let events = self.replay.take_pending();
        for event in &events {
            if self.state == OrgState::Removed {
                break;
            }
            match event.decode::<OrgEvent>()? {
                Some(OrgEvent::Added(e)) => {
                    self.name = e.name;
                    self.state = OrgState::Active;
                }
                Some(OrgEvent::Changed(e)) => self.name = e.name,
                Some(OrgEvent::Deactivated) => self.state = OrgState::Inactive,
                Some(OrgEvent::Reactivated) => self.state = OrgState::Active,
                Some(OrgEvent::Removed(_)) => self.state = OrgState::Removed,
                Some(OrgEvent::DomainVerified(e)) => {
                    if !self.verified_domains.contains(&e.domain) {
                        self.verified_domains.push(e.domain);
                    }
                }
                Some(OrgEvent::DomainPrimarySet(e)) => self.primary_domain = e.domain,
                Some(OrgEvent::DomainRemoved(e)) => self.verified_domains.retain(|domain| domain != &e.domain),
                Some(OrgEvent::MemberAdded(e)) => {
                    if !self.members.contains(&e.user_id) {
                        self.members.push(e.user_id);
                    }
                }
                Some(OrgEvent::MemberRemoved(e)) => self.members.retain(|user_id| user_id != &e.user_id),
                Some(_) | None => {}
            }
        }
        self.replay.reduce(&events);
        Ok(())
    }
}

// ============================================================================
// Single Org Domain
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct OrgDomainWriteModel {
    replay: ReplayState,
    pub domain: String,
    pub state: OrgDomainState,
    pub verified: bool,
    pub primary: bool,
    /// Pending proof of ownership, cleared once the domain is verified
    pub validation: Option<(DomainValidationType, String)>,
}

impl OrgDomainWriteModel {
    pub fn new(org_id: &str, instance_id: &str, domain: &str) -> Self {
        Self {
            replay: org_replay(org_id, instance_id),
            domain: domain.to_string(),
            state: OrgDomainState::Unspecified,
            verified: false,
            primary: false,
            validation: None,
        }
    }

    pub fn aggregate(&self) -> AggregateRef {
        org_aggregate(&self.replay.aggregate_id, &self.replay.instance_id)
    }
}

impl WriteModel for OrgDomainWriteModel {
    fn query(&self) -> SearchQuery {
        org_stream_query(
            &self.replay,
            &[
                OrgKind::Removed,
                OrgKind::DomainAdded,
                OrgKind::DomainVerificationAdded,
                OrgKind::DomainVerified,
                OrgKind::DomainPrimarySet,
                OrgKind::DomainRemoved,
            ],
        )
    }

    fn replay(&self) -> &ReplayState {
        &self.replay
    }

    fn replay_mut(&mut self) -> &mut ReplayState {
        &mut self.replay
    }

    fn reduce(&mut self) -> Result<()> {
        let events = self.replay.take_pending();
        for event in &events {
            match event.decode::<OrgEvent>()? {
                Some(OrgEvent::DomainAdded(e)) if e.domain == self.domain => {
                    self.state = OrgDomainState::Active;
                    self.verified = false;
                    self.primary = false;
                    self.validation = None;
                }
                Some(OrgEvent::DomainVerificationAdded(e)) if e.domain == self.domain => {
                    self.validation = Some((e.validation_type, e.validation_code));
                }
                Some(OrgEvent::DomainVerified(e)) if e.domain == self.domain => {
                    self.verified = true;
                    self.validation = None;
                }
                Some(OrgEvent::DomainPrimarySet(e)) => self.primary = e.domain == self.domain,
                Some(OrgEvent::DomainRemoved(e)) if e.domain == self.domain => {
                    self.state = OrgDomainState::Removed;
                    self.verified = false;
                    self.primary = false;
                    self.validation = None;
                }
                Some(OrgEvent::Removed(_)) => {
                    self.state = OrgDomainState::Removed;
                    self.primary = false;
                }
                Some(_) | None => {}
            }
        }
        self.replay.reduce(&events);
        Ok(())
    }
}

// ============================================================================
// Single Org Member
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct OrgMemberWriteModel {
    replay: ReplayState,
    pub user_id: String,
    pub state: MemberState,
    pub roles: Vec<String>,
}

impl OrgMemberWriteModel {
    pub fn new(org_id: &str, instance_id: &str, user_id: &str) -> Self {
        Self {
            replay: org_replay(org_id, instance_id),
            user_id: user_id.to_string(),
            state: MemberState::Unspecified,
            roles: Vec::new(),
        }
    }

    pub fn aggregate(&self) -> AggregateRef {
        org_aggregate(&self.replay.aggregate_id, &self.replay.instance_id)
    }
}

impl WriteModel for OrgMemberWriteModel {
    fn query(&self) -> SearchQuery {
        org_stream_query(
            &self.replay,
            &[OrgKind::Removed, OrgKind::MemberAdded, OrgKind::MemberRemoved],
        )
    }

    fn replay(&self) -> &ReplayState {
        &self.replay
    }

    fn replay_mut(&mut self) -> &mut ReplayState {
        &mut self.replay
    }

    fn reduce(&mut self) -> Result<()> {
        let events = self.replay.take_pending();
        for event in &events {
            match event.decode::<OrgEvent>()? {
                Some(OrgEvent::MemberAdded(e)) if e.user_id == self.user_id => {
                    self.state = MemberState::Active;
                    self.roles = e.roles;
                }
                Some(OrgEvent::MemberRemoved(e)) if e.user_id == self.user_id => {
                    self.state = MemberState::Removed;
                    self.roles.clear();
                }
                Some(OrgEvent::Removed(_)) => {
                    self.state = MemberState::Removed;
                    self.roles.clear();
                }
                Some(_) | None => {}
            }
        }
        self.replay.reduce(&events);
        Ok(())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
