use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::event_sourcing::core::{Command, Event, SearchQuery};
use crate::metrics::{Metrics, OUTCOME_ALREADY_EXISTS, OUTCOME_CONFLICT, OUTCOME_ERROR, OUTCOME_SUCCESS};
use super::{EventFilter, EventStore};

/// Records Prometheus metrics around any store
pub struct MeteredEventStore<S> {
    inner: S,
    metrics: Arc<Metrics>,
}

impl<S: EventStore> MeteredEventStore<S> {
    pub fn new(inner: S, metrics: Arc<Metrics>) -> Self {
        Self { inner, metrics }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

fn push_outcome(result: &Result<Vec<Event>>) -> &'static str {
    match result {
        Ok(_) => OUTCOME_SUCCESS,
        Err(Error::ConcurrencyConflict { .. }) => OUTCOME_CONFLICT,
        Err(Error::AlreadyExists(_)) => OUTCOME_ALREADY_EXISTS,
        Err(_) => OUTCOME_ERROR,
    }
}

#[async_trait]
impl<S: EventStore> EventFilter for MeteredEventStore<S> {
    async fn filter(&self, ctx: &Context, query: &SearchQuery) -> Result<Vec<Event>> {
        let started = Instant::now();
        let result = self.inner.filter(ctx, query).await;
        self.metrics.record_filter(
            query.awaits_open_transactions(),
            result.as_ref().ok().map(Vec::len),
            started.elapsed().as_secs_f64(),
        );
        result
    }
}

#[async_trait]
impl<S: EventStore> EventStore for MeteredEventStore<S> {
    async fn push(&self, ctx: &Context, commands: Vec<Command>) -> Result<Vec<Event>> {
        if commands.is_empty() {
            return Ok(Vec::new());
        }
        let started = Instant::now();
        let count = commands.len();
        let result = self.inner.push(ctx, commands).await;
        self.metrics.record_push(push_outcome(&result), count, started.elapsed().as_secs_f64());
        result
    }

    async fn latest_sequence(&self, ctx: &Context, query: &SearchQuery) -> Result<u64> {
        self.inner.latest_sequence(ctx, query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_sourcing::core::event::tests::{test_aggregate, Named, TestEvent};
    use crate::event_sourcing::store::InMemoryEventStore;

    fn added(name: &str) -> TestEvent {
        TestEvent::Added(Named { name: name.to_string() })
    }

    #[tokio::test]
    async fn test_push_outcomes_are_counted() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let store = MeteredEventStore::new(InMemoryEventStore::new(), metrics.clone());
        let ctx = Context::background("instance1");

        store
            .push(&ctx, vec![Command::new(&ctx, &test_aggregate("t1"), &added("a")).unwrap()])
            .await
            .unwrap();
        let duplicate = store
            .push(&ctx, vec![Command::new(&ctx, &test_aggregate("t2"), &added("a")).unwrap()])
            .await;
        assert!(duplicate.is_err());

        let gathered = metrics.registry().gather();
        let pushes = gathered.iter().find(|m| m.name() == "eventstore_pushes_total").unwrap();
        assert_eq!(pushes.metric.len(), 2);
        let events = gathered.iter().find(|m| m.name() == "eventstore_events_pushed_total").unwrap();
        assert_eq!(events.metric[0].counter.value, Some(1.0));
    }

    #[tokio::test]
    async fn test_filter_is_counted() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let store = MeteredEventStore::new(InMemoryEventStore::new(), metrics.clone());
        let ctx = Context::background("instance1");

        store.filter(&ctx, &SearchQuery::default()).await.unwrap();

        let gathered = metrics.registry().gather();
        let filters = gathered.iter().find(|m| m.name() == "eventstore_filters_total").unwrap();
        assert_eq!(filters.metric[0].counter.value, Some(1.0));
    }

    #[test]
    fn test_outcome_classification() {
        let conflict: Result<Vec<Event>> = Err(Error::ConcurrencyConflict {
            aggregate: "org/org1".to_string(),
            observed: 1,
        });
        assert_eq!(push_outcome(&conflict), OUTCOME_CONFLICT);
        assert_eq!(push_outcome(&Err(Error::already_exists("taken"))), OUTCOME_ALREADY_EXISTS);
        assert_eq!(push_outcome(&Err(Error::Cancelled)), OUTCOME_ERROR);
        assert_eq!(push_outcome(&Ok(Vec::new())), OUTCOME_SUCCESS);
    }
}
