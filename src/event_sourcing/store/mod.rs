// ============================================================================
// Event Sourcing Store - Filter and Push
// ============================================================================
//
// EventFilter is the read capability handed to command preparation.
// EventStore adds the atomic append (push) on top of it.
//
// Implementations:
// - InMemoryEventStore: reference store for tests and the demo binary
// - PostgresEventStore: sqlx-backed store, owns its schema
// - MeteredEventStore:  Prometheus decorator around any store
//
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::context::Context;
use crate::error::Result;
use super::core::{Command, Event, SearchQuery};

pub mod in_memory;
pub mod metered;
pub mod postgres;

pub use in_memory::InMemoryEventStore;
pub use metered::MeteredEventStore;
pub use postgres::PostgresEventStore;

#[async_trait]
pub trait EventFilter: Send + Sync {
    /// Events matching `query`, ordered by position (ascending unless the
    /// query asks otherwise)
    async fn filter(&self, ctx: &Context, query: &SearchQuery) -> Result<Vec<Event>>;
}

#[async_trait]
pub trait EventStore: EventFilter {
    /// Appends all commands atomically and returns the persisted events in
    /// command order
    async fn push(&self, ctx: &Context, commands: Vec<Command>) -> Result<Vec<Event>>;

    /// Highest sequence among matching events, 0 when there are none
    async fn latest_sequence(&self, ctx: &Context, query: &SearchQuery) -> Result<u64>;
}

#[async_trait]
impl EventFilter for Arc<dyn EventStore> {
    async fn filter(&self, ctx: &Context, query: &SearchQuery) -> Result<Vec<Event>> {
        (**self).filter(ctx, query).await
    }
}

/// Filter backed by a closure, mostly used to stub reads in tests
pub struct FnFilter<F> {
    filter: F,
}

impl<F> FnFilter<F>
where
    F: Fn(&Context, &SearchQuery) -> Result<Vec<Event>> + Send + Sync,
{
    pub fn new(filter: F) -> Self {
        Self { filter }
    }
}

#[async_trait]
impl<F> EventFilter for FnFilter<F>
where
    F: Fn(&Context, &SearchQuery) -> Result<Vec<Event>> + Send + Sync,
{
    async fn filter(&self, ctx: &Context, query: &SearchQuery) -> Result<Vec<Event>> {
        ctx.check()?;
        (self.filter)(ctx, query)
    }
}

/// Best-effort push that outlives the request.
///
/// Runs on a detached context so the caller's cancellation does not abort it.
/// Failures are logged, never returned.
pub fn push_detached(store: Arc<dyn EventStore>, ctx: &Context, commands: Vec<Command>) -> JoinHandle<()> {
    let ctx = ctx.detached();
    tokio::spawn(async move {
        let count = commands.len();
        if let Err(error) = store.push(&ctx, commands).await {
            tracing::error!(
                instance_id = %ctx.instance_id(),
                command_count = count,
                error = %error,
                "Detached push failed"
            );
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_sourcing::core::event::tests::{test_aggregate, Named, TestEvent};

    #[tokio::test]
    async fn test_fn_filter_delegates_to_closure() {
        let filter = FnFilter::new(|_ctx: &Context, query: &SearchQuery| {
            assert!(query.groups().is_empty());
            Ok(Vec::new())
        });
        let ctx = Context::background("instance1");
        let events = filter.filter(&ctx, &SearchQuery::default()).await.unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_detached_push_survives_request_cancellation() {
        let store: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new());
        let ctx = Context::background("instance1");
        let command = Command::new(&ctx, &test_aggregate("t1"), &TestEvent::Added(Named { name: "a".to_string() })).unwrap();
        ctx.cancel();

        push_detached(store.clone(), &ctx, vec![command]).await.unwrap();

        let events = store.filter(&ctx.detached(), &SearchQuery::default()).await.unwrap();
        assert_eq!(events.len(), 1);
    }
}
