use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;

use crate::context::Context;
use crate::error::Result;
use super::core::{Command, Event, SearchQuery, StreamKey};
use super::store::EventFilter;

// ============================================================================
// Command Preparation - Validate, Then Build
// ============================================================================
//
// Phase 1 (Validation::validate) is pure: input checks only, no reads.
// Phase 2 (BuildCommands::build_commands) may read through the filter it is
// handed, and nothing else.
//
// prepare_commands runs phase 1 of every step before phase 2 of any step,
// so malformed input never causes I/O. Phase 2 steps run in order and each
// one sees the commands of earlier steps as provisional events.
//
// ============================================================================

/// Phase 1 of a preparation step
pub trait Validation: Send {
    fn validate(self: Box<Self>) -> Result<Box<dyn BuildCommands>>;
}

/// Phase 2 of a preparation step
#[async_trait]
pub trait BuildCommands: Send + Sync {
    async fn build_commands(&self, ctx: &Context, filter: &dyn EventFilter) -> Result<Vec<Command>>;
}

pub async fn prepare_commands(
    ctx: &Context,
    filter: &dyn EventFilter,
    validations: Vec<Box<dyn Validation>>,
) -> Result<Vec<Command>> {
    let builders = validations
        .into_iter()
        .map(|validation| validation.validate())
        .collect::<Result<Vec<_>>>()?;

    let mut commands = Vec::new();
    for builder in &builders {
        let transaction = TransactionFilter {
            inner: filter,
            pending: &commands,
        };
        let step = builder.build_commands(ctx, &transaction).await?;
        commands.extend(step);
    }

    tracing::debug!(
        instance_id = %ctx.instance_id(),
        step_count = builders.len(),
        command_count = commands.len(),
        "Prepared commands"
    );
    Ok(commands)
}

/// Overlays not yet pushed commands of earlier steps on top of stored events
struct TransactionFilter<'a> {
    inner: &'a dyn EventFilter,
    pending: &'a [Command],
}

#[async_trait]
impl EventFilter for TransactionFilter<'_> {
    async fn filter(&self, ctx: &Context, query: &SearchQuery) -> Result<Vec<Event>> {
        let mut events = self.inner.filter(ctx, query).await?;
        if self.pending.is_empty() {
            return Ok(events);
        }

        let mut heads: HashMap<StreamKey, u64> = HashMap::new();
        for event in &events {
            let head = heads.entry(event.aggregate().stream_key()).or_insert(0);
            *head = (*head).max(event.sequence());
        }

        let created_at = Utc::now();
        let mut provisional = Vec::new();
        for command in self.pending.iter().filter(|command| query.matches_command(command)) {
            let head = heads.entry(command.aggregate().stream_key()).or_insert(0);
            *head += 1;
            provisional.push(Event::from_command(command, *head, 0, created_at));
        }

        if query.is_descending() {
            provisional.reverse();
            provisional.append(&mut events);
            events = provisional;
        } else {
            events.append(&mut provisional);
        }
        if let Some(limit) = query.limit() {
            events.truncate(limit);
        }
        Ok(events)
    }
}

// ============================================================================
// Tests
// ============================================================================
