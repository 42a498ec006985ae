use crate::error::Result;
use crate::event_sourcing::core::{AggregateRef, DomainEvent, ReplayState, SearchQuery, WriteModel};
use super::events::{user_aggregate, ProfileChanged, UserEvent, USER_AGGREGATE_TYPE};
use super::value_objects::{ProfileChanges, UserState};

// ============================================================================
// Human User Write Model
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct HumanUserWriteModel {
    replay: ReplayState,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub display_name: String,
    pub email: String,
    pub preferred_language: String,
    pub state: UserState,
}

impl HumanUserWriteModel {
    /// An empty `org_id` looks the user up across all orgs of the instance
    pub fn new(user_id: &str, org_id: &str, instance_id: &str) -> Self {
        Self {
            replay: ReplayState::new(user_id, org_id).with_instance(instance_id),
            username: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            display_name: String::new(),
            email: String::new(),
            preferred_language: String::new(),
            state: UserState::Unspecified,
        }
    }

    pub fn aggregate(&self) -> AggregateRef {
        user_aggregate(
            &self.replay.aggregate_id,
            &self.replay.resource_owner,
            &self.replay.instance_id,
        )
    }

    /// The event carrying only the fields that differ, `None` if nothing would change
    pub fn profile_changed(&self, changes: &ProfileChanges) -> Option<ProfileChanged> {
        fn changed(current: &str, requested: &Option<String>) -> Option<String> {
            requested
                .as_deref()
                .map(str::trim)
                .filter(|value| *value != current)
                .map(str::to_string)
        }

        let event = ProfileChanged {
            first_name: changed(&self.first_name, &changes.first_name),
            last_name: changed(&self.last_name, &changes.last_name),
            display_name: changed(&self.display_name, &changes.display_name),
            preferred_language: changed(&self.preferred_language, &changes.preferred_language),
        };
        (!event.is_empty()).then_some(event)
    }
}

impl WriteModel for HumanUserWriteModel {
    fn query(&self) -> SearchQuery {
        self.replay
            .scoped_query()
            .aggregate_types([USER_AGGREGATE_TYPE])
            .aggregate_ids([self.replay.aggregate_id.clone()])
            .event_types(UserEvent::event_types())
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
            if self.state == UserState::Removed {
                break;
            }
            match event.decode::<UserEvent>()? {
                Some(UserEvent::HumanAdded(e)) => {
                    self.username = e.username;
                    self.first_name = e.first_name;
                    self.last_name = e.last_name;
                    self.display_name = e.display_name;
                    self.email = e.email;
                    self.preferred_language = e.preferred_language;
                    self.state = UserState::Active;
                }
                Some(UserEvent::HumanProfileChanged(e)) => {
                    if let Some(first_name) = e.first_name {
                        self.first_name = first_name;
                    }
                    if let Some(last_name) = e.last_name {
                        self.last_name = last_name;
                    }
                    if let Some(display_name) = e.display_name {
                        self.display_name = display_name;
                    }
                    if let Some(preferred_language) = e.preferred_language {
                        self.preferred_language = preferred_language;
                    }
                }
                Some(UserEvent::Deactivated) => self.state = UserState::Inactive,
                Some(UserEvent::Reactivated) => self.state = UserState::Active,
                Some(UserEvent::Removed(_)) => self.state = UserState::Removed,
                None => {}
            }
        }
        self.replay.reduce(&events);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jane() -> HumanUserWriteModel {
        let mut model = HumanUserWriteModel::new("user1", "org1", "instance1");
        model.first_name = "Jane".to_string();
        model.last_name = "Doe".to_string();
        model.display_name = "Jane Doe".to_string();
        model
    }

    #[test]
    fn test_profile_changed_keeps_only_differences() {
        let changes = ProfileChanges {
            first_name: Some("Jane".to_string()),
            last_name: Some(" Smith ".to_string()),
            ..ProfileChanges::default()
        };
        let event = jane().profile_changed(&changes).unwrap();
        assert_eq!(event.first_name, None);
        assert_eq!(event.last_name.as_deref(), Some("Smith"));
    }

    #[test]
    fn test_identical_profile_is_no_change() {
        let changes = ProfileChanges {
            display_name: Some("Jane Doe".to_string()),
            ..ProfileChanges::default()
        };
        assert_eq!(jane().profile_changed(&changes), None);
        assert_eq!(jane().profile_changed(&ProfileChanges::default()), None);
    }
}
