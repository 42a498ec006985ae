use async_trait::async_trait;

use crate::context::Context;
use crate::domain::org::OrgWriteModel;
use crate::error::Result;
use crate::event_sourcing::core::{hydrate, AggregateRef, Command};
use crate::event_sourcing::{BuildCommands, EventFilter, Validation};
use super::errors::UserError;
use super::events::{HumanAdded, UserEvent};
use super::value_objects::{AddHuman, Email};

/// Adds a human user to an existing org
pub struct AddHumanUserStep {
    aggregate: AggregateRef,
    human: AddHuman,
}

impl AddHumanUserStep {
    pub fn new(aggregate: AggregateRef, human: AddHuman) -> Self {
        Self { aggregate, human }
    }
}

impl Validation for AddHumanUserStep {
    fn validate(mut self: Box<Self>) -> Result<Box<dyn BuildCommands>> {
        let human = &mut self.human;
        human.username = human.username.trim().to_string();
        human.first_name = human.first_name.trim().to_string();
        human.last_name = human.last_name.trim().to_string();
        if human.username.is_empty() {
            return Err(UserError::EmptyUsername.into());
        }
        if human.first_name.is_empty() {
            return Err(UserError::EmptyFirstName.into());
        }
        if human.last_name.is_empty() {
            return Err(UserError::EmptyLastName.into());
        }
        human.email = Email::parse(&human.email)?.as_str().to_string();
        Ok(self)
    }
}

#[async_trait]
impl BuildCommands for AddHumanUserStep {
    async fn build_commands(&self, ctx: &Context, filter: &dyn EventFilter) -> Result<Vec<Command>> {
        let org_id = &self.aggregate.resource_owner;
        let org = hydrate(ctx, filter, OrgWriteModel::new(org_id, &self.aggregate.instance_id)).await?;
        if !org.state.exists() {
            return Err(UserError::OrgNotFound(org_id.clone()).into());
        }

        let human = &self.human;
        let display_name = human
            .display_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{} {}", human.first_name, human.last_name));
        let event = UserEvent::HumanAdded(HumanAdded {
            username: human.username.clone(),
            first_name: human.first_name.clone(),
            last_name: human.last_name.clone(),
            display_name,
            email: human.email.clone(),
            preferred_language: human.preferred_language.clone().unwrap_or_default(),
        });
        Ok(vec![Command::new(ctx, &self.aggregate, &event)?])
    }
}
