use crate::{
    api::{self, identity::TrustedHeaderIdentity, AppState},
    cli::{globals::GlobalArgs, telemetry},
    credential::{CredentialService, CredentialStore, MemoryCredentialStore, PgCredentialStore},
    pipeline::{HttpImageGenerator, Pipeline, PipelineConfig},
};
use anyhow::{Context, Result};
use axum::http::HeaderName;
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<String>,
    pub subject_header: String,
    pub globals: GlobalArgs,
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub max_attempts: u32,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable, the image client cannot be
/// built, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    debug!("Global args: {:?}", args.globals);

    let store = connect_store(args.dsn.as_deref()).await?;

    let generator = HttpImageGenerator::new(&args.globals)
        .context("Failed to build image service client")?;

    let pipeline = Pipeline::new(
        Arc::new(generator),
        PipelineConfig::new()
            .with_batch_size(args.batch_size)
            .with_batch_delay(args.batch_delay)
            .with_max_attempts(args.max_attempts),
    );

    let subject_header = HeaderName::from_bytes(args.subject_header.as_bytes())
        .with_context(|| format!("Invalid subject header: {}", args.subject_header))?;

    let state = Arc::new(AppState::new(
        pipeline,
        CredentialService::new(store),
        Arc::new(TrustedHeaderIdentity::new(subject_header)),
    ));

    let result = api::new(args.port, state).await;

    telemetry::shutdown_tracer();

    result
}

async fn connect_store(dsn: Option<&str>) -> Result<Arc<dyn CredentialStore>> {
    let Some(dsn) = dsn else {
        warn!("No database configured, credentials are kept in memory");
        return Ok(Arc::new(MemoryCredentialStore::new()));
    };

    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(dsn)
        .await
        .context("Failed to connect to database")?;

    info!("Connected to credential database");

    Ok(Arc::new(PgCredentialStore::new(pool)))
}
