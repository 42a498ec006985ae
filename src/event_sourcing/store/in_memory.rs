use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::event_sourcing::core::{
    Command, Event, SearchQuery, StreamKey, UniqueConstraint, UniqueConstraintAction,
};
use super::{EventFilter, EventStore};

// ============================================================================
// In-Memory Event Store
// ============================================================================
//
// Reference implementation of the push contract. One lock guards events,
// stream heads and unique constraints, so a push is validated and applied
// as a single step and readers never observe a partial push.
//
// ============================================================================

/// (instance id, unique type, unique field)
type ConstraintKey = (String, String, String);

#[derive(Debug, Default)]
struct StoreState {
    events: Vec<Event>,
    heads: HashMap<StreamKey, u64>,
    constraints: HashSet<ConstraintKey>,
}

#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    state: Mutex<StoreState>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of persisted events across all streams
    pub async fn len(&self) -> usize {
        self.state.lock().await.events.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl EventFilter for InMemoryEventStore {
    async fn filter(&self, ctx: &Context, query: &SearchQuery) -> Result<Vec<Event>> {
        let state = ctx.run(async { Ok(self.state.lock().await) }).await?;
        let events = query.select(&state.events);
        tracing::debug!(
            instance_id = %ctx.instance_id(),
            event_count = events.len(),
            "Filtered events"
        );
        Ok(events)
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn push(&self, ctx: &Context, commands: Vec<Command>) -> Result<Vec<Event>> {
        if commands.is_empty() {
            return Ok(Vec::new());
        }

        let mut state = ctx.run(async { Ok(self.state.lock().await) }).await?;

        // Everything below is validated against the pre-push state and
        // applied without further await points.
        check_preconditions(&state, &commands)?;

        let mut constraints = state.constraints.clone();
        for command in &commands {
            for constraint in command.unique_constraints() {
                apply_constraint(&mut constraints, &command.aggregate().instance_id, constraint)?;
            }
        }

        let created_at = Utc::now();
        let mut heads: HashMap<StreamKey, u64> = HashMap::new();
        let mut position = state.events.len() as u64;
        let mut pushed = Vec::with_capacity(commands.len());
        for command in &commands {
            let key = command.aggregate().stream_key();
            let current = state.heads.get(&key).copied().unwrap_or(0);
            let sequence = heads.entry(key).or_insert(current);
            *sequence += 1;
            position += 1;
            pushed.push(Event::from_command(command, *sequence, position, created_at));
        }

        state.constraints = constraints;
        state.heads.extend(heads);
        state.events.extend(pushed.iter().cloned());

        tracing::info!(
            instance_id = %ctx.instance_id(),
            event_count = pushed.len(),
            last_position = position,
            "Pushed events"
        );

        Ok(pushed)
    }

    async fn latest_sequence(&self, ctx: &Context, query: &SearchQuery) -> Result<u64> {
        let state = ctx.run(async { Ok(self.state.lock().await) }).await?;
        Ok(state
            .events
            .iter()
            .filter(|event| query.matches(event))
            .map(Event::sequence)
            .max()
            .unwrap_or(0))
    }
}

fn check_preconditions(state: &StoreState, commands: &[Command]) -> Result<()> {
    for command in commands {
        let Some(precondition) = command.precondition() else {
            continue;
        };
        let key = command.aggregate().stream_key();
        let advanced = state.events.iter().any(|event| {
            event.sequence() > precondition.observed_sequence
                && event.aggregate().stream_key() == key
                && precondition.query.matches(event)
        });
        if advanced {
            tracing::warn!(
                aggregate = %command.aggregate(),
                observed_sequence = precondition.observed_sequence,
                "Push rejected, stream advanced concurrently"
            );
            return Err(Error::ConcurrencyConflict {
                aggregate: command.aggregate().to_string(),
                observed: precondition.observed_sequence,
            });
        }
    }
    Ok(())
}

fn apply_constraint(
    constraints: &mut HashSet<ConstraintKey>,
    instance_id: &str,
    constraint: &UniqueConstraint,
) -> Result<()> {
    let key = (
        instance_id.to_string(),
        constraint.unique_type.clone(),
        constraint.unique_field.clone(),
    );
    match constraint.action {
        UniqueConstraintAction::Add => {
            if !constraints.insert(key) {
                tracing::warn!(
                    unique_type = %constraint.unique_type,
                    unique_field = %constraint.unique_field,
                    "Unique constraint violated"
                );
                return Err(Error::already_exists(constraint.error_message.clone()));
            }
        }
        UniqueConstraintAction::Remove => {
            constraints.remove(&key);
        }
        UniqueConstraintAction::InstanceRemove => {
            constraints.retain(|(instance, _, _)| instance != instance_id);
        }
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::ErrorKind;
    use crate::event_sourcing::core::event::tests::{test_aggregate, Named, StreamModel, TestEvent};
    use crate::event_sourcing::core::{filter_to_query_reducer, WriteModel};

    fn added(name: &str) -> TestEvent {
        TestEvent::Added(Named { name: name.to_string() })
    }

    fn renamed(name: &str) -> TestEvent {
        TestEvent::Renamed(Named { name: name.to_string() })
    }

    #[tokio::test]
    async fn test_push_assigns_sequences_per_stream() {
        let store = InMemoryEventStore::new();
        let ctx = Context::background("instance1");
        let commands = vec![
            Command::new(&ctx, &test_aggregate("t1"), &added("a")).unwrap(),
            Command::new(&ctx, &test_aggregate("t2"), &added("b")).unwrap(),
            Command::new(&ctx, &test_aggregate("t1"), &renamed("c")).unwrap(),
        ];

        let events = store.push(&ctx, commands).await.unwrap();

        let sequences: Vec<_> = events.iter().map(|e| (e.aggregate().id.as_str(), e.sequence())).collect();
        assert_eq!(sequences, vec![("t1", 1), ("t2", 1), ("t1", 2)]);
        let positions: Vec<_> = events.iter().map(Event::position).collect();
        assert_eq!(positions, vec![1, 2, 3]);
        assert_eq!(events[0].creator(), "SYSTEM");
    }

    #[tokio::test]
    async fn test_empty_push_is_a_noop() {
        let store = InMemoryEventStore::new();
        let ctx = Context::background("instance1");
        assert!(store.push(&ctx, Vec::new()).await.unwrap().is_empty());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_raced_pushes_on_same_observation_exactly_one_wins() {
        let store = Arc::new(InMemoryEventStore::new());
        let ctx = Context::background("instance1");
        store
            .push(&ctx, vec![Command::new(&ctx, &test_aggregate("t1"), &added("a")).unwrap()])
            .await
            .unwrap();

        let mut model = StreamModel::new("t1");
        filter_to_query_reducer(&ctx, &*store, &mut model).await.unwrap();
        assert_eq!(model.replay.processed_sequence, 1);

        let first = Command::new(&ctx, &test_aggregate("t1"), &renamed("b")).unwrap().guarded_by(&model);
        let second = Command::new(&ctx, &test_aggregate("t1"), &renamed("c")).unwrap().guarded_by(&model);

        let (store_a, store_b) = (store.clone(), store.clone());
        let (ctx_a, ctx_b) = (ctx.clone(), ctx.clone());
        let task_a = tokio::spawn(async move { store_a.push(&ctx_a, vec![first]).await });
        let task_b = tokio::spawn(async move { store_b.push(&ctx_b, vec![second]).await });
        let results = [task_a.await.unwrap(), task_b.await.unwrap()];

        let successes = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(e) if e.is_concurrency_conflict()))
            .count();
        assert_eq!(successes, 1);
        assert_eq!(conflicts, 1);

        let events = store.filter(&ctx, &model.query()).await.unwrap();
        let sequences: Vec<_> = events.iter().map(Event::sequence).collect();
        assert_eq!(sequences, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_commands_of_one_push_do_not_conflict_with_each_other() {
        let store = InMemoryEventStore::new();
        let ctx = Context::background("instance1");
        let model = StreamModel::new("t1");

        let commands = vec![
            Command::new(&ctx, &test_aggregate("t1"), &added("a")).unwrap().guarded_by(&model),
            Command::new(&ctx, &test_aggregate("t1"), &renamed("b")).unwrap().guarded_by(&model),
        ];
        let events = store.push(&ctx, commands).await.unwrap();
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn test_unique_constraint_collision_rejects_whole_push() {
        let store = InMemoryEventStore::new();
        let ctx = Context::background("instance1");
        store
            .push(&ctx, vec![Command::new(&ctx, &test_aggregate("t1"), &added("taken")).unwrap()])
            .await
            .unwrap();

        let result = store
            .push(
                &ctx,
                vec![
                    Command::new(&ctx, &test_aggregate("t2"), &renamed("x")).unwrap(),
                    Command::new(&ctx, &test_aggregate("t3"), &added("taken")).unwrap(),
                ],
            )
            .await;

        let error = result.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::AlreadyExists);
        assert_eq!(error.to_string(), "already exists: name taken");
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_unique_constraints_are_scoped_by_instance() {
        let store = InMemoryEventStore::new();
        let ctx = Context::background("instance1");
        let mut other = test_aggregate("t1");
        other.instance_id = "instance2".to_string();

        store
            .push(
                &ctx,
                vec![
                    Command::new(&ctx, &test_aggregate("t1"), &added("same")).unwrap(),
                    Command::new(&ctx, &other, &added("same")).unwrap(),
                ],
            )
            .await
            .unwrap();
        assert_eq!(store.len().await, 2);
    }

    #[test]
    fn test_constraint_actions_apply_in_order() {
        let mut constraints = HashSet::new();
        apply_constraint(&mut constraints, "i1", &UniqueConstraint::add("t", "f", "taken")).unwrap();
        apply_constraint(&mut constraints, "i1", &UniqueConstraint::remove("t", "f")).unwrap();
        apply_constraint(&mut constraints, "i1", &UniqueConstraint::add("t", "f", "taken")).unwrap();
        assert!(apply_constraint(&mut constraints, "i1", &UniqueConstraint::add("t", "f", "taken")).is_err());

        apply_constraint(&mut constraints, "i1", &UniqueConstraint::remove("t", "missing")).unwrap();

        apply_constraint(&mut constraints, "i2", &UniqueConstraint::add("t", "f", "taken")).unwrap();
        apply_constraint(&mut constraints, "i1", &UniqueConstraint::remove_instance()).unwrap();
        assert_eq!(constraints.len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_push_applies_nothing() {
        let store = InMemoryEventStore::new();
        let ctx = Context::background("instance1");
        let command = Command::new(&ctx, &test_aggregate("t1"), &added("a")).unwrap();
        ctx.cancel();

        let result = store.push(&ctx, vec![command]).await;
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_latest_sequence() {
        let store = InMemoryEventStore::new();
        let ctx = Context::background("instance1");
        let query = StreamModel::new("t1").query();
        assert_eq!(store.latest_sequence(&ctx, &query).await.unwrap(), 0);

        store
            .push(
                &ctx,
                vec![
                    Command::new(&ctx, &test_aggregate("t1"), &added("a")).unwrap(),
                    Command::new(&ctx, &test_aggregate("t1"), &renamed("b")).unwrap(),
                    Command::new(&ctx, &test_aggregate("t2"), &added("c")).unwrap(),
                ],
            )
            .await
            .unwrap();
        assert_eq!(store.latest_sequence(&ctx, &query).await.unwrap(), 2);
    }
}
