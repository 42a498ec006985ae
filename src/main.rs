use std::sync::Arc;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use iam_command_engine::config::EngineConfig;
use iam_command_engine::domain::instance::InstanceCommandHandler;
use iam_command_engine::domain::org::{DomainValidationType, OrgCommandHandler, StaticDomainVerifier};
use iam_command_engine::domain::user::{AddHuman, ProfileChanges, UserCommandHandler};
use iam_command_engine::event_sourcing::{EventStore, InMemoryEventStore, MeteredEventStore, PostgresEventStore};
use iam_command_engine::id::UuidV7Generator;
use iam_command_engine::metrics::Metrics;
use iam_command_engine::utils::retry_on_conflict;
use iam_command_engine::{Caller, Context, ErrorKind, InstanceInfo};

/// Context of one demo request, bounded by the configured push timeout
fn request(config: &EngineConfig, user_id: &str) -> Context {
    Context::new(
        InstanceInfo {
            instance_id: config.instance_id.clone(),
            requested_domain: String::new(),
        },
        Caller {
            user_id: user_id.to_string(),
            org_id: String::new(),
        },
    )
    .with_timeout(config.push_timeout)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default to INFO level, can be overridden with RUST_LOG env var
    // Example: RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,iam_command_engine=debug")))
        .init();

    let config = EngineConfig::from_env()?;
    tracing::info!(
        instance_id = %config.instance_id,
        iam_domain = %config.iam_domain,
        postgres = config.database_url.is_some(),
        "Starting IAM command engine demo"
    );

    // === 1. Event store, metered ===
    let metrics = Arc::new(Metrics::new()?);
    let store: Arc<dyn EventStore> = match &config.database_url {
        Some(url) => {
            let postgres = PostgresEventStore::connect(url, config.max_connections).await?;
            postgres.migrate().await?;
            Arc::new(MeteredEventStore::new(postgres, metrics.clone()))
        }
        None => {
            tracing::info!("DATABASE_URL not set, using the in-memory event store");
            Arc::new(MeteredEventStore::new(InMemoryEventStore::new(), metrics.clone()))
        }
    };

    // === 2. Command handlers ===
    let ids = Arc::new(UuidV7Generator);
    let instances = InstanceCommandHandler::new(store.clone());
    let users = UserCommandHandler::new(store.clone(), ids.clone());
    let orgs = OrgCommandHandler::new(
        store.clone(),
        ids,
        config.iam_domain.clone(),
        Arc::new(StaticDomainVerifier::accepting()),
    );

    // === 3. Instance setup ===
    let ctx = request(&config, "SYSTEM");
    match instances.add_trusted_domain(&ctx, &config.iam_domain).await {
        Ok(details) => tracing::info!(sequence = details.sequence, "Trusted domain added"),
        Err(error) if error.kind() == ErrorKind::AlreadyExists => {
            tracing::info!("Trusted domain already present")
        }
        Err(error) => return Err(error.into()),
    }

    // === 4. Bootstrap org and its first user ===
    let default_org = orgs.add_org(&ctx, "Default", "").await?;
    let admin = users
        .add_human_user(
            &ctx,
            &default_org.id,
            AddHuman {
                username: "admin".to_string(),
                first_name: "Ada".to_string(),
                last_name: "Admin".to_string(),
                email: format!("admin@{}", default_org.primary_domain),
                ..AddHuman::default()
            },
        )
        .await?;
    orgs.add_org_member(&request(&config, &admin.id), &default_org.id, &admin.id, vec!["ORG_OWNER".to_string()])
        .await?;

    // === 5. Org owned by the admin, with a custom domain ===
    let ctx = request(&config, &admin.id);
    let acme = orgs.add_org(&ctx, "ACME Corp", &admin.id).await?;
    tracing::info!(org_id = %acme.id, primary_domain = %acme.primary_domain, "Org ready");

    orgs.add_org_domain(&ctx, &acme.id, "acme.example").await?;
    let (token, _) = orgs
        .add_org_domain_verification(&ctx, &acme.id, "acme.example", DomainValidationType::Dns)
        .await?;
    tracing::info!(token = %token, "Publish the token as TXT record of _iam-challenge.acme.example");
    orgs.validate_org_domain(&ctx, &acme.id, "acme.example").await?;
    orgs.set_primary_org_domain(&ctx, &acme.id, "acme.example").await?;

    // Whole command re-run on a lost race
    let renamed = retry_on_conflict(&config.retry, |_attempt| orgs.change_org_name(&ctx, &acme.id, "ACME Inc")).await?;
    tracing::info!(sequence = renamed.sequence, "Org renamed");

    users
        .change_user_profile(
            &ctx,
            &admin.id,
            ProfileChanges {
                display_name: Some("Ada (ACME)".to_string()),
                ..ProfileChanges::default()
            },
        )
        .await?;

    let removed = instances.remove_trusted_domain(&ctx, "unknown.example", false).await?;
    tracing::info!(removed = removed.is_some(), "Unknown trusted domain removal is a no-op");

    // === 6. Metrics ===
    tracing::info!("Metrics:\n{}", metrics.render()?);
    tracing::info!("Demo complete");

    Ok(())
}
