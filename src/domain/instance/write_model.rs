use crate::error::Result;
use crate::event_sourcing::core::{AggregateRef, DomainEvent, ReplayState, SearchQuery, WriteModel};
use super::events::{instance_aggregate, InstanceEvent, INSTANCE_AGGREGATE_TYPE};

/// Trusted domains of one instance, in the order they were added
#[derive(Debug, Clone, PartialEq)]
pub struct TrustedDomainsWriteModel {
    replay: ReplayState,
    pub domains: Vec<String>,
    pub removed: bool,
}

impl TrustedDomainsWriteModel {
    pub fn new(instance_id: &str) -> Self {
        Self {
            replay: ReplayState::new(instance_id, instance_id).with_instance(instance_id),
            domains: Vec::new(),
            removed: false,
        }
    }

    pub fn aggregate(&self) -> AggregateRef {
        instance_aggregate(&self.replay.instance_id)
    }

    pub fn contains(&self, domain: &str) -> bool {
        self.domains.iter().any(|trusted| trusted == domain)
    }
}

impl WriteModel for TrustedDomainsWriteModel {
    fn query(&self) -> SearchQuery {
        self.replay
            .scoped_query()
            .aggregate_types([INSTANCE_AGGREGATE_TYPE])
            .aggregate_ids([self.replay.aggregate_id.clone()])
            .event_types(InstanceEvent::event_types())
            .build()
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
            match event.decode::<InstanceEvent>()? {
                Some(InstanceEvent::TrustedDomainAdded(e)) => {
                    if !self.contains(&e.domain) {
                        self.domains.push(e.domain);
                    }
                }
                Some(InstanceEvent::TrustedDomainRemoved(e)) => self.domains.retain(|trusted| trusted != &e.domain),
                Some(InstanceEvent::Removed) => {
                    self.removed = true;
                    self.domains.clear();
                }
                None => {}
            }
        }
        self.replay.reduce(&events);
        Ok(())
    }
}
