use chrono::{DateTime, Utc};

use super::aggregate::{AggregateRef, AggregateType};
use super::event::{Command, Event, EventType};

// ============================================================================
// Search Query - Which History Does a Write Model Need?
// ============================================================================
//
// A query is a list of OR'd groups. Each group is an AND of predicates;
// an empty predicate list on a dimension leaves that dimension open.
// Resource owner and instance scope are query-wide and AND into every group.
//
// Built with SearchQueryBuilder:
//
//   SearchQueryBuilder::new()
//       .aggregate_types(["org"]).event_types(["org.added"])
//       .or()
//       .aggregate_types(["user"])
//       .build()
//
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryGroup {
    pub aggregate_types: Vec<AggregateType>,
    pub aggregate_ids: Vec<String>,
    pub event_types: Vec<EventType>,
    pub creation_date_after: Option<DateTime<Utc>>,
    pub creation_date_before: Option<DateTime<Utc>>,
    pub sequence_greater: Option<u64>,
    pub sequence_less: Option<u64>,
}

impl QueryGroup {
    fn is_empty(&self) -> bool {
        self == &QueryGroup::default()
    }

    /// `sequence` and `created_at` are `None` for commands that are not persisted yet;
    /// the corresponding bounds are then not applied.
    fn matches(
        &self,
        aggregate: &AggregateRef,
        event_type: &EventType,
        sequence: Option<u64>,
        created_at: Option<DateTime<Utc>>,
    ) -> bool {
        if !self.aggregate_types.is_empty() && !self.aggregate_types.contains(&aggregate.aggregate_type) {
            return false;
        }
        if !self.aggregate_ids.is_empty() && !self.aggregate_ids.contains(&aggregate.id) {
            return false;
        }
        if !self.event_types.is_empty() && !self.event_types.contains(event_type) {
            return false;
        }
        if let Some(sequence) = sequence {
            if self.sequence_greater.is_some_and(|bound| sequence <= bound) {
                return false;
            }
            if self.sequence_less.is_some_and(|bound| sequence >= bound) {
                return false;
            }
        }
        if let Some(created_at) = created_at {
            if self.creation_date_after.is_some_and(|bound| created_at <= bound) {
                return false;
            }
            if self.creation_date_before.is_some_and(|bound| created_at >= bound) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchQuery {
    groups: Vec<QueryGroup>,
    resource_owner: Option<String>,
    instance_id: Option<String>,
    await_open_transactions: bool,
    limit: Option<usize>,
    descending: bool,
}

impl SearchQuery {
    pub fn builder() -> SearchQueryBuilder {
        SearchQueryBuilder::new()
    }

    pub fn groups(&self) -> &[QueryGroup] {
        &self.groups
    }

    pub fn resource_owner(&self) -> Option<&str> {
        self.resource_owner.as_deref()
    }

    pub fn instance_id(&self) -> Option<&str> {
        self.instance_id.as_deref()
    }

    pub fn awaits_open_transactions(&self) -> bool {
        self.await_open_transactions
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn is_descending(&self) -> bool {
        self.descending
    }

    pub fn matches(&self, event: &Event) -> bool {
        self.matches_parts(
            event.aggregate(),
            event.event_type(),
            Some(event.sequence()),
            Some(event.created_at()),
        )
    }

    /// Whether the event a command will become is selected by this query
    pub fn matches_command(&self, command: &Command) -> bool {
        self.matches_parts(command.aggregate(), command.event_type(), None, None)
    }

    fn matches_parts(
        &self,
        aggregate: &AggregateRef,
        event_type: &EventType,
        sequence: Option<u64>,
        created_at: Option<DateTime<Utc>>,
    ) -> bool {
        if self.resource_owner.as_deref().is_some_and(|owner| owner != aggregate.resource_owner) {
            return false;
        }
        if self.instance_id.as_deref().is_some_and(|instance| instance != aggregate.instance_id) {
            return false;
        }
        self.groups.is_empty()
            || self
                .groups
                .iter()
                .any(|group| group.matches(aggregate, event_type, sequence, created_at))
    }

    /// Selects matching events, ordered by position and limited as requested
    pub fn select<'a, I>(&self, events: I) -> Vec<Event>
    where
        I: IntoIterator<Item = &'a Event>,
    {
        let mut selected: Vec<Event> = events.into_iter().filter(|e| self.matches(e)).cloned().collect();
        selected.sort_by_key(Event::position);
        if self.descending {
            selected.reverse();
        }
        if let Some(limit) = self.limit {
            selected.truncate(limit);
        }
        selected
    }
}

// ============================================================================
// Builder
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct SearchQueryBuilder {
    query: SearchQuery,
    current: QueryGroup,
}

impl SearchQueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn aggregate_types<I, T>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<AggregateType>,
    {
        self.current.aggregate_types.extend(types.into_iter().map(Into::into));
        self
    }

    pub fn aggregate_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.current.aggregate_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn event_types<I, T>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<EventType>,
    {
        self.current.event_types.extend(types.into_iter().map(Into::into));
        self
    }

    pub fn creation_date_after(mut self, date: DateTime<Utc>) -> Self {
        self.current.creation_date_after = Some(date);
        self
    }

    pub fn creation_date_before(mut self, date: DateTime<Utc>) -> Self {
        self.current.creation_date_before = Some(date);
        self
    }

    pub fn sequence_greater(mut self, sequence: u64) -> Self {
        self.current.sequence_greater = Some(sequence);
        self
    }

    pub fn sequence_less(mut self, sequence: u64) -> Self {
        self.current.sequence_less = Some(sequence);
        self
    }

    pub fn resource_owner(mut self, owner: impl Into<String>) -> Self {
        self.query.resource_owner = Some(owner.into());
        self
    }

    pub fn instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.query.instance_id = Some(instance_id.into());
        self
    }

    /// Wait for in-flight pushes of the instance to settle before reading
    pub fn await_open_transactions(mut self) -> Self {
        self.query.await_open_transactions = true;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.query.limit = Some(limit);
        self
    }

    pub fn order_desc(mut self) -> Self {
        self.query.descending = true;
        self
    }

    /// Closes the current AND-group and starts a new one, OR'd with the previous
    pub fn or(mut self) -> Self {
        let group = std::mem::take(&mut self.current);
        if !group.is_empty() {
            self.query.groups.push(group);
        }
        self
    }

    pub fn build(&self) -> SearchQuery {
        let mut query = self.query.clone();
        if !self.current.is_empty() {
            query.groups.push(self.current.clone());
        }
        query
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_sourcing::core::aggregate::Version;
    use chrono::Duration;

    fn event(aggregate_type: &str, event_type: &str, sequence: u64, position: u64) -> Event {
        Event::from_storage(
            AggregateRef::new(aggregate_type.into(), "id1", "owner1", "instance1", Version::new("v1")),
            EventType::new(event_type),
            sequence,
            position,
            Utc::now(),
            "user1".to_string(),
            None,
        )
    }

    #[test]
    fn test_or_groups_compose_with_and_inside() {
        let query = SearchQueryBuilder::new()
            .aggregate_types(["A"])
            .event_types(["x", "y"])
            .or()
            .aggregate_types(["B"])
            .event_types(["z"])
            .build();

        let fixtures = [
            (event("A", "x", 1, 1), true),
            (event("A", "y", 2, 2), true),
            (event("A", "z", 3, 3), false),
            (event("B", "z", 1, 4), true),
            (event("B", "x", 2, 5), false),
            (event("C", "x", 1, 6), false),
            (event("C", "z", 1, 7), false),
        ];

        for (event, expected) in &fixtures {
            assert_eq!(
                query.matches(event),
                *expected,
                "{} {}",
                event.aggregate().aggregate_type,
                event.event_type()
            );
        }
    }

    #[test]
    fn test_build_is_deterministic_and_pure() {
        let builder = SearchQueryBuilder::new().aggregate_types(["org"]).aggregate_ids(["org1"]);
        let first = builder.build();
        let second = builder.build();
        assert_eq!(first, second);
        assert_eq!(first.groups().len(), 1);
    }

    #[test]
    fn test_empty_groups_are_dropped() {
        let query = SearchQueryBuilder::new().or().aggregate_types(["org"]).or().build();
        assert_eq!(query.groups().len(), 1);
    }

    #[test]
    fn test_scope_applies_to_every_group() {
        let query = SearchQueryBuilder::new()
            .resource_owner("owner2")
            .aggregate_types(["A"])
            .or()
            .aggregate_types(["B"])
            .build();
        assert!(!query.matches(&event("A", "x", 1, 1)));
        assert!(!query.matches(&event("B", "x", 1, 1)));

        let scoped = SearchQueryBuilder::new().instance_id("instance1").build();
        assert!(scoped.matches(&event("A", "x", 1, 1)));
        let other = SearchQueryBuilder::new().instance_id("instance2").build();
        assert!(!other.matches(&event("A", "x", 1, 1)));
    }

    #[test]
    fn test_sequence_and_date_bounds() {
        let query = SearchQueryBuilder::new().sequence_greater(1).sequence_less(3).build();
        assert!(!query.matches(&event("A", "x", 1, 1)));
        assert!(query.matches(&event("A", "x", 2, 2)));
        assert!(!query.matches(&event("A", "x", 3, 3)));

        let past = Utc::now() - Duration::hours(1);
        let after = SearchQueryBuilder::new().creation_date_after(past).build();
        assert!(after.matches(&event("A", "x", 1, 1)));
        let before = SearchQueryBuilder::new().creation_date_before(past).build();
        assert!(!before.matches(&event("A", "x", 1, 1)));
    }

    #[test]
    fn test_select_orders_and_limits() {
        let events = vec![event("A", "x", 2, 5), event("A", "x", 1, 2), event("B", "x", 1, 3)];
        let query = SearchQueryBuilder::new().aggregate_types(["A"]).build();
        let selected = query.select(&events);
        assert_eq!(selected.iter().map(Event::position).collect::<Vec<_>>(), vec![2, 5]);

        let latest = SearchQueryBuilder::new().order_desc().limit(1).build();
        let selected = latest.select(&events);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].position(), 5);
    }
}
