use std::sync::Arc;

use crate::context::Context;
use crate::error::Result;
use crate::event_sourcing::core::{append_and_reduce, hydrate, Command, ObjectDetails, WriteModel};
use crate::event_sourcing::{prepare_commands, EventStore, Validation};
use crate::id::IdGenerator;
use super::commands::AddHumanUserStep;
use super::errors::UserError;
use super::events::{user_aggregate, UserEvent, UserRemoved};
use super::value_objects::{AddHuman, HumanUser, ProfileChanges, UserState};
use super::write_model::HumanUserWriteModel;

// ============================================================================
// User Command Handler
// ============================================================================

pub struct UserCommandHandler {
    event_store: Arc<dyn EventStore>,
    id_generator: Arc<dyn IdGenerator>,
}

impl UserCommandHandler {
    pub fn new(event_store: Arc<dyn EventStore>, id_generator: Arc<dyn IdGenerator>) -> Self {
        Self {
            event_store,
            id_generator,
        }
    }

    async fn existing_user(&self, ctx: &Context, user_id: &str) -> Result<HumanUserWriteModel> {
        let user = hydrate(ctx, &self.event_store, HumanUserWriteModel::new(user_id, "", ctx.instance_id())).await?;
        if !user.state.exists() {
            return Err(UserError::NotFound.into());
        }
        Ok(user)
    }

    async fn push_user_event(
        &self,
        ctx: &Context,
        mut user: HumanUserWriteModel,
        event: UserEvent,
    ) -> Result<ObjectDetails> {
        let command = Command::new(ctx, &user.aggregate(), &event)?.guarded_by(&user);
        let events = self.event_store.push(ctx, vec![command]).await?;
        append_and_reduce(&mut user, &events)?;
        Ok(ObjectDetails::from_replay(user.replay()))
    }

    pub async fn add_human_user(&self, ctx: &Context, org_id: &str, human: AddHuman) -> Result<HumanUser> {
        let user_id = self.id_generator.next_id()?;
        let aggregate = user_aggregate(&user_id, org_id, ctx.instance_id());
        let steps: Vec<Box<dyn Validation>> = vec![Box::new(AddHumanUserStep::new(aggregate, human))];
        let commands = prepare_commands(ctx, &self.event_store, steps).await?;

        let events = self.event_store.push(ctx, commands).await?;
        let mut user = HumanUserWriteModel::new(&user_id, org_id, ctx.instance_id());
        append_and_reduce(&mut user, &events)?;

        tracing::info!(user_id = %user_id, org_id = %org_id, username = %user.username, "Human user added");
        Ok(HumanUser {
            id: user_id,
            username: user.username.clone(),
            state: user.state,
            details: ObjectDetails::from_replay(user.replay()),
        })
    }

    pub async fn change_user_profile(
        &self,
        ctx: &Context,
        user_id: &str,
        changes: ProfileChanges,
    ) -> Result<ObjectDetails> {
        changes.validate()?;
        let user = self.existing_user(ctx, user_id).await?;
        let Some(changed) = user.profile_changed(&changes) else {
            return Err(UserError::NoChanges.into());
        };
        self.push_user_event(ctx, user, UserEvent::HumanProfileChanged(changed)).await
    }

    pub async fn deactivate_user(&self, ctx: &Context, user_id: &str) -> Result<ObjectDetails> {
        let user = self.existing_user(ctx, user_id).await?;
        if user.state != UserState::Active {
            return Err(UserError::NotActive.into());
        }
        self.push_user_event(ctx, user, UserEvent::Deactivated).await
    }

    pub async fn reactivate_user(&self, ctx: &Context, user_id: &str) -> Result<ObjectDetails> {
        let user = self.existing_user(ctx, user_id).await?;
        if user.state != UserState::Inactive {
            return Err(UserError::NotInactive.into());
        }
        self.push_user_event(ctx, user, UserEvent::Reactivated).await
    }

    /// Removes the user and releases its username
    pub async fn remove_user(&self, ctx: &Context, user_id: &str) -> Result<ObjectDetails> {
        let user = self.existing_user(ctx, user_id).await?;
        let event = UserEvent::Removed(UserRemoved {
            username: user.username.clone(),
        });
        let details = self.push_user_event(ctx, user, event).await?;
        tracing::info!(user_id = %user_id, "User removed");
        Ok(details)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::org::{org_aggregate, OrgAdded, OrgEvent};
    use crate::error::ErrorKind;
    use crate::event_sourcing::InMemoryEventStore;
    use crate::id::PresetIdGenerator;

    async fn store_with_org(ctx: &Context) -> Arc<dyn EventStore> {
        let store: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new());
        let added = OrgEvent::Added(OrgAdded { name: "Org".to_string() });
        let command = Command::new(ctx, &org_aggregate("org1", ctx.instance_id()), &added).unwrap();
        store.push(ctx, vec![command]).await.unwrap();
        store
    }

    fn jane() -> AddHuman {
        AddHuman {
            username: " jane ".to_string(),
            first_name: "Jane".to_string(),
            last_name: "Doe".to_string(),
            email: "jane@example.com".to_string(),
            ..AddHuman::default()
        }
    }

    #[tokio::test]
    async fn test_add_human_user() {
        let ctx = Context::background("instance1");
        let store = store_with_org(&ctx).await;
        let handler = UserCommandHandler::new(store, Arc::new(PresetIdGenerator::new(["user1", "user2"])));

        let user = handler.add_human_user(&ctx, "org1", jane()).await.unwrap();
        assert_eq!(user.id, "user1");
        assert_eq!(user.username, "jane");
        assert_eq!(user.state, UserState::Active);
        assert_eq!(user.details.resource_owner, "org1");
        assert_eq!(user.details.sequence, 1);

        let taken = handler.add_human_user(&ctx, "org1", jane()).await.unwrap_err();
        assert_eq!(taken.kind(), ErrorKind::AlreadyExists);
    }

    #[tokio::test]
    async fn test_user_needs_existing_org() {
        let ctx = Context::background("instance1");
        let store = store_with_org(&ctx).await;
        let handler = UserCommandHandler::new(store, Arc::new(PresetIdGenerator::new(["user1", "user2"])));

        let error = handler.add_human_user(&ctx, "org9", jane()).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::PreconditionFailed);

        let invalid = AddHuman {
            email: "jane".to_string(),
            ..jane()
        };
        let error = handler.add_human_user(&ctx, "org1", invalid).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_profile_changes() {
        let ctx = Context::background("instance1");
        let store = store_with_org(&ctx).await;
        let handler = UserCommandHandler::new(store, Arc::new(PresetIdGenerator::new(["user1"])));
        handler.add_human_user(&ctx, "org1", jane()).await.unwrap();

        let changes = ProfileChanges {
            last_name: Some("Smith".to_string()),
            ..ProfileChanges::default()
        };
        let details = handler.change_user_profile(&ctx, "user1", changes.clone()).await.unwrap();
        assert_eq!(details.sequence, 2);

        let again = handler.change_user_profile(&ctx, "user1", changes).await.unwrap_err();
        assert_eq!(again.kind(), ErrorKind::PreconditionFailed);

        let missing = handler
            .change_user_profile(&ctx, "user9", ProfileChanges::default())
            .await
            .unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_user_lifecycle_and_username_release() {
        let ctx = Context::background("instance1");
        let store = store_with_org(&ctx).await;
        let handler = UserCommandHandler::new(store, Arc::new(PresetIdGenerator::new(["user1", "user2"])));
        handler.add_human_user(&ctx, "org1", jane()).await.unwrap();

        assert_eq!(handler.reactivate_user(&ctx, "user1").await.unwrap_err().kind(), ErrorKind::PreconditionFailed);
        handler.deactivate_user(&ctx, "user1").await.unwrap();
        handler.reactivate_user(&ctx, "user1").await.unwrap();
        handler.remove_user(&ctx, "user1").await.unwrap();
        assert_eq!(handler.deactivate_user(&ctx, "user1").await.unwrap_err().kind(), ErrorKind::NotFound);

        let user = handler.add_human_user(&ctx, "org1", jane()).await.unwrap();
        assert_eq!(user.id, "user2");
    }
}
