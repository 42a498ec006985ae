use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::{Stream, TryStreamExt};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, QueryBuilder, Row, Transaction};

use crate::context::Context;
use crate::error::{Error, Result};
use crate::event_sourcing::core::{
    AggregateRef, AggregateType, Command, Event, EventType, Precondition, SearchQuery, StreamKey,
    UniqueConstraint, UniqueConstraintAction, Version,
};
use super::{EventFilter, EventStore};

// ============================================================================
// PostgreSQL Event Store
// ============================================================================
//
// Schema (owned by this adapter, created by migrate()):
//
//   eventstore_events
//     PK (instance_id, aggregate_type, aggregate_id, sequence)
//     position BIGSERIAL for cross-aggregate ordering
//
//   eventstore_unique_constraints
//     PK (instance_id, unique_type, unique_field)
//
// Push runs in one transaction holding a shared advisory lock per instance.
// Filters that await open transactions take the exclusive lock, which waits
// for every in-flight push of the instance to finish.
//
// Stream heads are read before preconditions are checked. Two pushes racing
// on one stream then both try to insert the same sequence; the loser hits the
// primary key and reports a concurrency conflict.
//
// ============================================================================

const UNIQUE_VIOLATION: &str = "23505";
const EVENTS_PKEY: &str = "eventstore_events_pkey";
const UNIQUE_CONSTRAINTS_PKEY: &str = "eventstore_unique_constraints_pkey";

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS eventstore_events (
        instance_id       TEXT        NOT NULL,
        aggregate_type    TEXT        NOT NULL,
        aggregate_id      TEXT        NOT NULL,
        sequence          BIGINT      NOT NULL,
        position          BIGSERIAL   NOT NULL,
        aggregate_version TEXT        NOT NULL,
        resource_owner    TEXT        NOT NULL,
        event_type        TEXT        NOT NULL,
        creator           TEXT        NOT NULL,
        created_at        TIMESTAMPTZ NOT NULL DEFAULT now(),
        payload           JSONB,
        CONSTRAINT eventstore_events_pkey PRIMARY KEY (instance_id, aggregate_type, aggregate_id, sequence)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS eventstore_events_position_idx ON eventstore_events (instance_id, position)",
    "CREATE INDEX IF NOT EXISTS eventstore_events_type_idx ON eventstore_events (instance_id, aggregate_type, event_type)",
    r#"
    CREATE TABLE IF NOT EXISTS eventstore_unique_constraints (
        instance_id  TEXT NOT NULL,
        unique_type  TEXT NOT NULL,
        unique_field TEXT NOT NULL,
        CONSTRAINT eventstore_unique_constraints_pkey PRIMARY KEY (instance_id, unique_type, unique_field)
    )
    "#,
];

const SELECT_EVENTS: &str = "SELECT instance_id, aggregate_type, aggregate_id, aggregate_version, \
     resource_owner, event_type, sequence, position, created_at, creator, payload \
     FROM eventstore_events WHERE ";

const INSERT_EVENT: &str = r#"
    INSERT INTO eventstore_events
        (instance_id, aggregate_type, aggregate_id, sequence, aggregate_version,
         resource_owner, event_type, creator, payload)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
    RETURNING position, created_at
"#;

pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        tracing::info!(max_connections, "Connected to PostgreSQL event store");
        Ok(Self::new(pool))
    }

    /// Creates the tables and indexes if they do not exist yet
    pub async fn migrate(&self) -> anyhow::Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::info!("Event store schema is up to date");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn select(&self, ctx: &Context, query: &SearchQuery) -> Result<Vec<Event>> {
        let mut builder = select_events_query(query);
        if !query.awaits_open_transactions() {
            return decode_rows(builder.build().fetch(&self.pool)).await;
        }

        let instance_id = query.instance_id().unwrap_or(ctx.instance_id());
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(instance_id)
            .execute(&mut *tx)
            .await?;
        let events = decode_rows(builder.build().fetch(&mut *tx)).await?;
        tx.commit().await?;
        Ok(events)
    }

    async fn push_in_transaction(&self, commands: &[Command]) -> Result<Vec<Event>> {
        let mut tx = self.pool.begin().await?;

        let instances: BTreeSet<&str> = commands
            .iter()
            .map(|command| command.aggregate().instance_id.as_str())
            .collect();
        for instance_id in instances {
            sqlx::query("SELECT pg_advisory_xact_lock_shared(hashtext($1))")
                .bind(instance_id)
                .execute(&mut *tx)
                .await?;
        }

        // Heads are read before the preconditions: a push committed after this
        // point either fails a precondition or makes our insert hit the primary key
        let mut heads: HashMap<StreamKey, u64> = HashMap::new();
        for command in commands {
            let aggregate = command.aggregate();
            let key = aggregate.stream_key();
            if !heads.contains_key(&key) {
                let head = current_sequence(&mut tx, aggregate).await?;
                heads.insert(key, head);
            }
        }

        for command in commands {
            if let Some(precondition) = command.precondition() {
                check_precondition(&mut tx, command, precondition).await?;
            }
        }

        let mut pushed = Vec::with_capacity(commands.len());
        for command in commands {
            let aggregate = command.aggregate();
            let head = heads.entry(aggregate.stream_key()).or_default();
            *head += 1;
            let sequence = *head;

            let row = sqlx::query(INSERT_EVENT)
                .bind(&aggregate.instance_id)
                .bind(aggregate.aggregate_type.as_str())
                .bind(&aggregate.id)
                .bind(to_db(sequence))
                .bind(aggregate.version.as_str())
                .bind(&aggregate.resource_owner)
                .bind(command.event_type().as_str())
                .bind(command.creator())
                .bind(command.payload())
                .fetch_one(&mut *tx)
                .await
                .map_err(|error| classify_insert_error(error, command))?;
            let position: i64 = row.try_get("position")?;
            let created_at: DateTime<Utc> = row.try_get("created_at")?;
            pushed.push(Event::from_command(command, sequence, from_db(position), created_at));

            for constraint in command.unique_constraints() {
                apply_constraint(&mut tx, &aggregate.instance_id, constraint).await?;
            }
        }

        tx.commit().await?;
        Ok(pushed)
    }
}

#[async_trait]
impl EventFilter for PostgresEventStore {
    async fn filter(&self, ctx: &Context, query: &SearchQuery) -> Result<Vec<Event>> {
        let events = ctx.run(self.select(ctx, query)).await?;
        tracing::debug!(
            instance_id = %ctx.instance_id(),
            event_count = events.len(),
            "Filtered events"
        );
        Ok(events)
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    async fn push(&self, ctx: &Context, commands: Vec<Command>) -> Result<Vec<Event>> {
        if commands.is_empty() {
            return Ok(Vec::new());
        }

        // Dropping the transaction on cancellation rolls it back
        let pushed = ctx.run(self.push_in_transaction(&commands)).await?;

        tracing::info!(
            instance_id = %ctx.instance_id(),
            event_count = pushed.len(),
            last_position = pushed.last().map(Event::position).unwrap_or_default(),
            "Pushed events"
        );
        Ok(pushed)
    }

    async fn latest_sequence(&self, ctx: &Context, query: &SearchQuery) -> Result<u64> {
        let mut builder = QueryBuilder::<Postgres>::new(
            "SELECT COALESCE(MAX(sequence), 0) FROM eventstore_events WHERE ",
        );
        push_predicate(&mut builder, query);
        let latest: i64 = ctx
            .run(async { Ok(builder.build_query_scalar::<i64>().fetch_one(&self.pool).await?) })
            .await?;
        Ok(from_db(latest))
    }
}

// ============================================================================
// Push Helpers
// ============================================================================

async fn check_precondition(
    tx: &mut Transaction<'_, Postgres>,
    command: &Command,
    precondition: &Precondition,
) -> Result<()> {
    let mut builder = precondition_query(command.aggregate(), precondition);
    let latest: i64 = builder.build_query_scalar::<i64>().fetch_one(&mut **tx).await?;
    if from_db(latest) > precondition.observed_sequence {
        tracing::warn!(
            aggregate = %command.aggregate(),
            observed_sequence = precondition.observed_sequence,
            latest_sequence = latest,
            "Push rejected, stream advanced concurrently"
        );
        return Err(conflict(command));
    }
    Ok(())
}

async fn current_sequence(tx: &mut Transaction<'_, Postgres>, aggregate: &AggregateRef) -> Result<u64> {
    let head: i64 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(sequence), 0) FROM eventstore_events \
         WHERE instance_id = $1 AND aggregate_type = $2 AND aggregate_id = $3",
    )
    .bind(&aggregate.instance_id)
    .bind(aggregate.aggregate_type.as_str())
    .bind(&aggregate.id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(from_db(head))
}

async fn apply_constraint(
    tx: &mut Transaction<'_, Postgres>,
    instance_id: &str,
    constraint: &UniqueConstraint,
) -> Result<()> {
    match constraint.action {
        UniqueConstraintAction::Add => {
            sqlx::query(
                "INSERT INTO eventstore_unique_constraints (instance_id, unique_type, unique_field) \
                 VALUES ($1, $2, $3)",
            )
            .bind(instance_id)
            .bind(&constraint.unique_type)
            .bind(&constraint.unique_field)
            .execute(&mut **tx)
            .await
            .map_err(|error| {
                if violates(&error, UNIQUE_CONSTRAINTS_PKEY) {
                    tracing::warn!(
                        unique_type = %constraint.unique_type,
                        unique_field = %constraint.unique_field,
                        "Unique constraint violated"
                    );
                    Error::already_exists(constraint.error_message.clone())
                } else {
                    Error::Storage(error)
                }
            })?;
        }
        UniqueConstraintAction::Remove => {
            sqlx::query(
                "DELETE FROM eventstore_unique_constraints \
                 WHERE instance_id = $1 AND unique_type = $2 AND unique_field = $3",
            )
            .bind(instance_id)
            .bind(&constraint.unique_type)
            .bind(&constraint.unique_field)
            .execute(&mut **tx)
            .await?;
        }
        UniqueConstraintAction::InstanceRemove => {
            sqlx::query("DELETE FROM eventstore_unique_constraints WHERE instance_id = $1")
                .bind(instance_id)
                .execute(&mut **tx)
                .await?;
        }
    }
    Ok(())
}

fn violates(error: &sqlx::Error, constraint: &str) -> bool {
    match error {
        sqlx::Error::Database(db) => {
            db.code().as_deref() == Some(UNIQUE_VIOLATION) && db.constraint() == Some(constraint)
        }
        _ => false,
    }
}

fn classify_insert_error(error: sqlx::Error, command: &Command) -> Error {
    if violates(&error, EVENTS_PKEY) {
        tracing::warn!(aggregate = %command.aggregate(), "Sequence already taken by a concurrent push");
        return conflict(command);
    }
    Error::Storage(error)
}

fn conflict(command: &Command) -> Error {
    Error::ConcurrencyConflict {
        aggregate: command.aggregate().to_string(),
        observed: command.precondition().map(|p| p.observed_sequence).unwrap_or(0),
    }
}

// ============================================================================
// SQL Generation
// ============================================================================

fn select_events_query(query: &SearchQuery) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(SELECT_EVENTS);
    push_predicate(&mut builder, query);
    builder.push(if query.is_descending() {
        " ORDER BY position DESC"
    } else {
        " ORDER BY position ASC"
    });
    if let Some(limit) = query.limit() {
        builder.push(" LIMIT ").push_bind(to_db(limit as u64));
    }
    builder
}

fn precondition_query(aggregate: &AggregateRef, precondition: &Precondition) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new("SELECT COALESCE(MAX(sequence), 0) FROM eventstore_events WHERE instance_id = ");
    builder.push_bind(aggregate.instance_id.clone());
    builder.push(" AND aggregate_type = ").push_bind(aggregate.aggregate_type.as_str().to_string());
    builder.push(" AND aggregate_id = ").push_bind(aggregate.id.clone());
    builder.push(" AND ");
    push_predicate(&mut builder, &precondition.query);
    builder
}

/// Appends the WHERE predicate of `query`. Groups are OR'd, the
/// instance and owner scope AND into all of them.
fn push_predicate(builder: &mut QueryBuilder<'_, Postgres>, query: &SearchQuery) {
    builder.push("TRUE");
    if let Some(instance_id) = query.instance_id() {
        builder.push(" AND instance_id = ").push_bind(instance_id.to_string());
    }
    if let Some(owner) = query.resource_owner() {
        builder.push(" AND resource_owner = ").push_bind(owner.to_string());
    }
    if query.groups().is_empty() {
        return;
    }

    builder.push(" AND (");
    for (index, group) in query.groups().iter().enumerate() {
        if index > 0 {
            builder.push(" OR ");
        }
        builder.push("(TRUE");
        if !group.aggregate_types.is_empty() {
            let types: Vec<String> = group.aggregate_types.iter().map(|t| t.as_str().to_string()).collect();
            builder.push(" AND aggregate_type = ANY(").push_bind(types).push(")");
        }
        if !group.aggregate_ids.is_empty() {
            builder.push(" AND aggregate_id = ANY(").push_bind(group.aggregate_ids.clone()).push(")");
        }
        if !group.event_types.is_empty() {
            let types: Vec<String> = group.event_types.iter().map(|t| t.as_str().to_string()).collect();
            builder.push(" AND event_type = ANY(").push_bind(types).push(")");
        }
        if let Some(after) = group.creation_date_after {
            builder.push(" AND created_at > ").push_bind(after);
        }
        if let Some(before) = group.creation_date_before {
            builder.push(" AND created_at < ").push_bind(before);
        }
        if let Some(sequence) = group.sequence_greater {
            builder.push(" AND sequence > ").push_bind(to_db(sequence));
        }
        if let Some(sequence) = group.sequence_less {
            builder.push(" AND sequence < ").push_bind(to_db(sequence));
        }
        builder.push(")");
    }
    builder.push(")");
}

/// Decodes rows as they arrive, stopping at the first bad row
async fn decode_rows<S>(rows: S) -> Result<Vec<Event>>
where
    S: Stream<Item = std::result::Result<PgRow, sqlx::Error>>,
{
    rows.map_err(Error::from)
        .and_then(|row| async move { event_from_row(&row) })
        .try_collect()
        .await
}

fn event_from_row(row: &PgRow) -> Result<Event> {
    let aggregate = AggregateRef::new(
        AggregateType::new(row.try_get::<String, _>("aggregate_type")?),
        row.try_get::<String, _>("aggregate_id")?,
        row.try_get::<String, _>("resource_owner")?,
        row.try_get::<String, _>("instance_id")?,
        Version::new(row.try_get::<String, _>("aggregate_version")?),
    );
    Ok(Event::from_storage(
        aggregate,
        EventType::new(row.try_get::<String, _>("event_type")?),
        from_db(row.try_get("sequence")?),
        from_db(row.try_get("position")?),
        row.try_get("created_at")?,
        row.try_get("creator")?,
        row.try_get::<Option<serde_json::Value>, _>("payload")?,
    ))
}

fn to_db(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_db(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

// ============================================================================
// Tests
// ============================================================================
