use chrono::{DateTime, Utc};

use crate::context::Context;
use crate::error::Result;
use crate::event_sourcing::store::EventFilter;
use super::event::Event;
use super::query::{SearchQuery, SearchQueryBuilder};

// ============================================================================
// Write Model - Request-Scoped Replay Target
// ============================================================================
//
// Key Principles:
// 1. State is derived from events, never stored
// 2. A write model declares the history it needs via query()
// 3. reduce() mirrors history, it never rejects events
// 4. Guard checks ("not found", "already exists") belong to command logic
//
// Every domain write model holds a ReplayState and delegates the base
// bookkeeping to it.
//
// ============================================================================

/// Base bookkeeping shared by all write models
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplayState {
    pub aggregate_id: String,
    pub resource_owner: String,
    pub instance_id: String,
    pub processed_sequence: u64,
    pub change_date: Option<DateTime<Utc>>,
    pending: Vec<Event>,
}

impl ReplayState {
    pub fn new(aggregate_id: impl Into<String>, resource_owner: impl Into<String>) -> Self {
        Self {
            aggregate_id: aggregate_id.into(),
            resource_owner: resource_owner.into(),
            ..Self::default()
        }
    }

    pub fn with_instance(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = instance_id.into();
        self
    }

    /// Query builder pre-scoped to the model's instance and resource owner, when known
    pub fn scoped_query(&self) -> SearchQueryBuilder {
        let mut builder = SearchQueryBuilder::new();
        if !self.instance_id.is_empty() {
            builder = builder.instance_id(self.instance_id.clone());
        }
        if !self.resource_owner.is_empty() {
            builder = builder.resource_owner(self.resource_owner.clone());
        }
        builder
    }

    pub fn append_events(&mut self, events: Vec<Event>) {
        self.pending.extend(events);
    }

    pub fn pending(&self) -> &[Event] {
        &self.pending
    }

    /// Hands the buffered events to the domain reducer, leaving the buffer empty
    pub fn take_pending(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.pending)
    }

    /// Base reducer: clears the buffer and advances sequence and change date
    /// to the last stored of `events`. The sequence never moves backwards.
    pub fn reduce(&mut self, events: &[Event]) {
        self.pending.clear();
        let Some(first) = events.first() else {
            return;
        };
        if self.aggregate_id.is_empty() {
            self.aggregate_id = first.aggregate().id.clone();
        }
        if self.resource_owner.is_empty() {
            self.resource_owner = first.aggregate().resource_owner.clone();
        }
        if self.instance_id.is_empty() {
            self.instance_id = first.aggregate().instance_id.clone();
        }
        // Provisional events of the running preparation (position 0) are not
        // stored yet and must not count as observed.
        if let Some(last) = events.iter().rev().find(|event| event.position() > 0) {
            if last.sequence() >= self.processed_sequence {
                self.processed_sequence = last.sequence();
                self.change_date = Some(last.created_at());
            }
        }
    }
}

pub trait WriteModel: Send {
    /// Minimal event set needed to reconstruct this model
    fn query(&self) -> SearchQuery;

    fn replay(&self) -> &ReplayState;

    fn replay_mut(&mut self) -> &mut ReplayState;

    /// Buffers events for reduction, preserving order
    fn append_events(&mut self, events: Vec<Event>) {
        self.replay_mut().append_events(events);
    }

    /// Folds buffered events into derived state, then runs the base reducer
    fn reduce(&mut self) -> Result<()>;
}

/// Hydrates `write_model` from the events its query selects
pub async fn filter_to_query_reducer<W>(ctx: &Context, filter: &dyn EventFilter, write_model: &mut W) -> Result<()>
where
    W: WriteModel + ?Sized,
{
    let query = write_model.query();
    let events = filter.filter(ctx, &query).await?;
    tracing::debug!(
        aggregate_id = %write_model.replay().aggregate_id,
        event_count = events.len(),
        "Hydrating write model"
    );
    write_model.append_events(events);
    write_model.reduce()
}

/// Consuming variant of filter_to_query_reducer for freshly constructed models
pub async fn hydrate<W: WriteModel>(ctx: &Context, filter: &dyn EventFilter, mut write_model: W) -> Result<W> {
    filter_to_query_reducer(ctx, filter, &mut write_model).await?;
    Ok(write_model)
}

/// Folds freshly pushed events into an already hydrated model.
///
/// Only events selected by the model's own query are applied, so the outcome
/// equals discarding the model and hydrating it again.
pub fn append_and_reduce<W>(write_model: &mut W, pushed: &[Event]) -> Result<()>
where
    W: WriteModel + ?Sized,
{
    let query = write_model.query();
    let relevant: Vec<Event> = pushed.iter().filter(|event| query.matches(event)).cloned().collect();
    write_model.append_events(relevant);
    write_model.reduce()
}

// ============================================================================
// Object Details - What a Command Reports Back
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectDetails {
    pub sequence: u64,
    pub event_date: Option<DateTime<Utc>>,
    pub resource_owner: String,
}

impl ObjectDetails {
    pub fn from_replay(replay: &ReplayState) -> Self {
        Self {
            sequence: replay.processed_sequence,
            event_date: replay.change_date,
            resource_owner: replay.resource_owner.clone(),
        }
    }

    /// Details of the last pushed event
    pub fn from_events(events: &[Event]) -> Self {
        match events.last() {
            Some(last) => Self {
                sequence: last.sequence(),
                event_date: Some(last.created_at()),
                resource_owner: last.aggregate().resource_owner.clone(),
            },
            None => Self {
                sequence: 0,
                event_date: None,
                resource_owner: String::new(),
            },
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_sourcing::core::event::tests::{test_aggregate, test_event, Named, TestEvent};
    use crate::event_sourcing::core::event::{Command, DomainEvent};
    use crate::event_sourcing::store::{EventStore, InMemoryEventStore};

    #[derive(Debug, Clone, Copy, PartialEq, Default)]
    enum TestState {
        #[default]
        Unspecified,
        Active,
        Removed,
    }

    #[derive(Debug, Clone, PartialEq)]
    struct TestWriteModel {
        replay: ReplayState,
        name: String,
        state: TestState,
        renames: u32,
    }

    impl TestWriteModel {
        fn new(id: &str) -> Self {
            Self {
                replay: ReplayState::new(id, ""),
                name: String::new(),
                state: TestState::Unspecified,
                renames: 0,
            }
        }
    }

    impl WriteModel for TestWriteModel {
        fn query(&self) -> SearchQuery {
            SearchQueryBuilder::new()
                .aggregate_types(["test"])
                .aggregate_ids([self.replay.aggregate_id.clone()])
                .event_types(TestEvent::event_types())
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
                if self.state == TestState::Removed {
                    break;
                }
                match event.decode::<TestEvent>()? {
                    Some(TestEvent::Added(e)) => {
                        self.name = e.name;
                        self.state = TestState::Active;
                    }
                    Some(TestEvent::Renamed(e)) => {
                        self.name = e.name;
                        self.renames += 1;
                    }
                    Some(TestEvent::Removed) => self.state = TestState::Removed,
                    None => {}
                }
            }
            self.replay.reduce(&events);
            Ok(())
        }
    }

    fn history() -> Vec<Event> {
        vec![
            test_event("t1", 1, &TestEvent::Added(Named { name: "a".to_string() })),
            test_event("t1", 2, &TestEvent::Renamed(Named { name: "b".to_string() })),
            test_event("t1", 3, &TestEvent::Renamed(Named { name: "c".to_string() })),
        ]
    }

    #[test]
    fn test_reduce_is_idempotent() {
        let mut model = TestWriteModel::new("t1");
        model.append_events(history());
        model.reduce().unwrap();
        let snapshot = model.clone();

        model.reduce().unwrap();

        assert_eq!(model, snapshot);
        assert_eq!(model.replay.processed_sequence, 3);
        assert_eq!(model.name, "c");
        assert!(model.replay.pending().is_empty());
    }

    #[test]
    fn test_base_reducer_fills_identity_and_change_date() {
        let mut model = TestWriteModel::new("");
        let events = history();
        model.append_events(events.clone());
        model.reduce().unwrap();

        assert_eq!(model.replay.aggregate_id, "t1");
        assert_eq!(model.replay.resource_owner, "owner1");
        assert_eq!(model.replay.instance_id, "instance1");
        assert_eq!(model.replay.change_date, Some(events[2].created_at()));
    }

    #[test]
    fn test_processed_sequence_never_moves_backwards() {
        let mut replay = ReplayState::new("t1", "owner1");
        let events = history();
        replay.reduce(&events[2..]);
        replay.reduce(&events[..1]);
        assert_eq!(replay.processed_sequence, 3);
    }

    #[test]
    fn test_provisional_events_are_not_observed() {
        let ctx = Context::background("instance1");
        let command = Command::new(&ctx, &test_aggregate("t1"), &TestEvent::Removed).unwrap();
        let mut replay = ReplayState::new("t1", "owner1");

        replay.reduce(&[Event::from_command(&command, 1, 0, Utc::now())]);

        assert_eq!(replay.processed_sequence, 0);
        assert_eq!(replay.change_date, None);
    }

    #[test]
    fn test_removed_state_is_sticky() {
        let mut model = TestWriteModel::new("t1");
        model.append_events(vec![
            test_event("t1", 1, &TestEvent::Added(Named { name: "a".to_string() })),
            test_event("t1", 2, &TestEvent::Removed),
            test_event("t1", 3, &TestEvent::Added(Named { name: "zombie".to_string() })),
        ]);
        model.reduce().unwrap();
        assert_eq!(model.state, TestState::Removed);
        assert_eq!(model.name, "a");
        assert_eq!(model.replay.processed_sequence, 3);
    }

    #[tokio::test]
    async fn test_append_and_reduce_matches_fresh_hydration() {
        let store = InMemoryEventStore::new();
        let ctx = Context::background("instance1");
        let aggregate = test_aggregate("t1");
        let other = test_aggregate("t2");

        let first_batch = vec![
            Command::new(&ctx, &aggregate, &TestEvent::Added(Named { name: "a".to_string() })).unwrap(),
            Command::new(&ctx, &aggregate, &TestEvent::Renamed(Named { name: "b".to_string() })).unwrap(),
        ];
        store.push(&ctx, first_batch).await.unwrap();

        let mut incremental = TestWriteModel::new("t1");
        filter_to_query_reducer(&ctx, &store, &mut incremental).await.unwrap();

        let second_batch = vec![
            Command::new(&ctx, &aggregate, &TestEvent::Renamed(Named { name: "c".to_string() })).unwrap(),
            Command::new(&ctx, &other, &TestEvent::Added(Named { name: "noise".to_string() })).unwrap(),
            Command::new(&ctx, &aggregate, &TestEvent::Removed).unwrap(),
        ];
        let pushed = store.push(&ctx, second_batch).await.unwrap();
        append_and_reduce(&mut incremental, &pushed).unwrap();

        let mut fresh = TestWriteModel::new("t1");
        filter_to_query_reducer(&ctx, &store, &mut fresh).await.unwrap();

        assert_eq!(incremental, fresh);
        assert_eq!(fresh.replay.processed_sequence, 4);
        assert_eq!(fresh.state, TestState::Removed);
    }

    #[test]
    fn test_object_details_from_pushed_events() {
        let events = history();
        let details = ObjectDetails::from_events(&events);
        assert_eq!(details.sequence, 3);
        assert_eq!(details.resource_owner, "owner1");
        assert_eq!(ObjectDetails::from_events(&[]).sequence, 0);
    }
}
