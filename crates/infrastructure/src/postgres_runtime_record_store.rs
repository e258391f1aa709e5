use async_trait::async_trait;
use scrubline_application::{RuntimeRecordCondition, RuntimeRecordOrder, RuntimeRecordStore};
use scrubline_core::{AppError, AppResult};
use scrubline_domain::RuntimeRecord;
use serde_json::Value;
use sqlx::migrate::Migrator;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

mod query;


/// Embedded schema migrations for the runtime record table.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Applies pending schema migrations.
pub async fn run_migrations(pool: &PgPool) -> AppResult<()> {
    MIGRATOR
        .run(pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))
}

/// PostgreSQL-backed runtime record store.
#[derive(Clone)]
pub struct PostgresRuntimeRecordStore {
    pool: PgPool,
}

impl PostgresRuntimeRecordStore {
    /// Creates a store with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts one record and returns it with its generated identifier.
    pub async fn create_runtime_record(
        &self,
        entity_logical_name: &str,
        data: Value,
    ) -> AppResult<RuntimeRecord> {
        let created = sqlx::query_as::<_, RuntimeRecordRow>(
            r#"
            INSERT INTO runtime_records (entity_logical_name, data)
            VALUES ($1, $2)
            RETURNING id, entity_logical_name, data
            "#,
        )
        .bind(entity_logical_name)
        .bind(&data)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| {
            AppError::Store(format!(
                "failed to create runtime record for entity '{entity_logical_name}': {error}"
            ))
        })?;

        runtime_record_from_row(created)
    }
}

#[derive(Debug, FromRow)]
struct RuntimeRecordRow {
    id: Uuid,
    entity_logical_name: String,
    data: Value,
}

fn runtime_record_from_row(row: RuntimeRecordRow) -> AppResult<RuntimeRecord> {
    RuntimeRecord::new(row.id.to_string(), row.entity_logical_name, row.data).map_err(|error| {
        AppError::Internal(format!(
            "persisted runtime record '{}' is invalid: {error}",
            row.id
        ))
    })
}

#[async_trait]
impl RuntimeRecordStore for PostgresRuntimeRecordStore {
    async fn count_runtime_records(
        &self,
        entity_logical_name: &str,
        condition: &RuntimeRecordCondition,
    ) -> AppResult<u64> {
        self.count_runtime_records_impl(entity_logical_name, condition)
            .await
    }

    async fn find_runtime_records(
        &self,
        entity_logical_name: &str,
        condition: &RuntimeRecordCondition,
        order: &[RuntimeRecordOrder],
        limit: usize,
    ) -> AppResult<Vec<RuntimeRecord>> {
        self.find_runtime_records_impl(entity_logical_name, condition, order, limit)
            .await
    }

    async fn update_runtime_record(&self, record: &RuntimeRecord) -> AppResult<()> {
        let entity_logical_name = record.entity_logical_name().as_str();
        let record_id = Uuid::parse_str(record.record_id().as_str()).map_err(|error| {
            AppError::Store(format!(
                "invalid runtime record id '{}' for entity '{entity_logical_name}': {error}",
                record.record_id()
            ))
        })?;

        let result = sqlx::query(
            r#"
            UPDATE runtime_records
            SET data = $3,
                updated_at = now()
            WHERE entity_logical_name = $1 AND id = $2
            "#,
        )
        .bind(entity_logical_name)
        .bind(record_id)
        .bind(record.data())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Store(format!(
                "failed to update runtime record '{record_id}' for entity '{entity_logical_name}': {error}"
            ))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "runtime record '{record_id}' does not exist for entity '{entity_logical_name}'"
            )));
        }

        Ok(())
    }
}
