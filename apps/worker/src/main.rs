//! Scrubline anonymization worker runtime.

#![forbid(unsafe_code)]

mod worker_config;

use std::env;
use std::sync::Arc;

use scrubline_application::{AnonymizationService, RuntimeRecordStore};
use scrubline_core::{AppError, AppResult};
use scrubline_infrastructure::{
    InMemoryRuntimeRecordStore, PostgresRuntimeRecordStore, RedisAnonymizationRunLock,
    StaticAnonymizationRegistry, run_migrations,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::worker_config::{WorkerConfig, WorkerMode};

const RUN_LOCK_KEY_PREFIX: &str = "scrubline:anonymization";

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let mode = WorkerMode::from_args(env::args().skip(1))?;
    let config = WorkerConfig::load()?;

    let pool = match config.database_url.as_deref() {
        Some(database_url) => Some(connect_pool(database_url).await?),
        None => None,
    };

    if mode == WorkerMode::Migrate {
        let Some(pool) = pool else {
            return Err(AppError::Configuration(
                "DATABASE_URL is required to run migrations".to_owned(),
            ));
        };

        run_migrations(&pool).await?;
        info!("database migrations applied successfully");
        return Ok(());
    }

    let service = build_anonymization_service(&config, pool).await?;

    if mode == WorkerMode::List {
        for entity_logical_name in service.list_anonymizable_types().await? {
            println!("{entity_logical_name}");
        }
        return Ok(());
    }

    info!(
        batch_limit = config.batch_limit,
        interval_seconds = config.interval.map(|interval| interval.as_secs()).unwrap_or(0),
        run_lock = config.run_lock.is_some(),
        "scrubline-worker started"
    );

    loop {
        run_pass(&service, config.batch_limit).await;

        let Some(interval) = config.interval else {
            break;
        };
        tokio::time::sleep(interval).await;
    }

    Ok(())
}

async fn connect_pool(database_url: &str) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))
}

async fn build_anonymization_service(
    config: &WorkerConfig,
    pool: Option<PgPool>,
) -> AppResult<AnonymizationService> {
    let (registry, defaults) =
        StaticAnonymizationRegistry::from_manifest_path(config.manifest_path()?).await?;

    let record_store: Arc<dyn RuntimeRecordStore> = match pool {
        Some(pool) => Arc::new(PostgresRuntimeRecordStore::new(pool)),
        None => {
            warn!("DATABASE_URL is not set, anonymizing an empty in-memory record store");
            Arc::new(InMemoryRuntimeRecordStore::new())
        }
    };

    let service = AnonymizationService::new(Arc::new(registry), record_store, defaults);

    let Some(run_lock) = config.run_lock.as_ref() else {
        return Ok(service);
    };

    let client = redis::Client::open(run_lock.redis_url.as_str()).map_err(|error| {
        AppError::Configuration(format!("invalid REDIS_URL: {error}"))
    })?;

    Ok(service.with_run_lock(
        Arc::new(RedisAnonymizationRunLock::new(client, RUN_LOCK_KEY_PREFIX)),
        run_lock.worker_id.as_str(),
        run_lock.lease_seconds,
    ))
}

async fn run_pass(service: &AnonymizationService, batch_limit: usize) {
    let entity_types = match service.list_anonymizable_types().await {
        Ok(entity_types) => entity_types,
        Err(error) => {
            warn!(error = %error, "failed to list anonymizable entity types");
            return;
        }
    };

    for entity_logical_name in entity_types {
        info!(entity = %entity_logical_name, "Processing entities of type");

        match service
            .anonymize(entity_logical_name.as_str(), batch_limit)
            .await
        {
            Ok(run) => info!(
                entity = %entity_logical_name,
                processed = run.processed_count,
                total = run.total_eligible,
                failed = run.failed_count,
                status = %run.status.as_str(),
                "Anonymized {} / {} expired entities",
                run.processed_count,
                run.total_eligible
            ),
            Err(AppError::Conflict(message)) => warn!(
                entity = %entity_logical_name,
                reason = %message,
                "skipping entity type locked by another worker"
            ),
            Err(error) => warn!(
                entity = %entity_logical_name,
                error = %error,
                "anonymization run failed"
            ),
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
