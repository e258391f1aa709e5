use chrono::{DateTime, Utc};
use scrubline_application::{
    RuntimeRecordCondition, RuntimeRecordFilter, RuntimeRecordOperator, RuntimeRecordOrder,
};
use scrubline_core::{AppError, AppResult};
use scrubline_domain::{FieldType, RuntimeRecord, parse_temporal_value};
use sqlx::{Postgres, QueryBuilder, Transaction};

use super::{PostgresRuntimeRecordStore, RuntimeRecordRow, runtime_record_from_row};

impl PostgresRuntimeRecordStore {
    // Reference values without an offset are read as UTC, whatever the session time zone.
    async fn begin_utc_selection(
        &self,
        entity_logical_name: &str,
    ) -> AppResult<Transaction<'_, Postgres>> {
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Query(format!(
                "failed to start runtime record selection for entity '{entity_logical_name}': {error}"
            ))
        })?;

        sqlx::query("SET LOCAL TIME ZONE 'UTC'")
            .execute(&mut *transaction)
            .await
            .map_err(|error| {
                AppError::Query(format!(
                    "failed to pin selection time zone for entity '{entity_logical_name}': {error}"
                ))
            })?;

        Ok(transaction)
    }

    async fn finish_selection(
        transaction: Transaction<'_, Postgres>,
        entity_logical_name: &str,
    ) -> AppResult<()> {
        transaction.commit().await.map_err(|error| {
            AppError::Query(format!(
                "failed to finish runtime record selection for entity '{entity_logical_name}': {error}"
            ))
        })
    }

    pub(super) async fn count_runtime_records_impl(
        &self,
        entity_logical_name: &str,
        condition: &RuntimeRecordCondition,
    ) -> AppResult<u64> {
        let mut builder: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM runtime_records WHERE entity_logical_name = ");
        builder.push_bind(entity_logical_name.to_owned());
        builder.push(" AND ");
        push_condition(&mut builder, condition)?;

        let mut transaction = self.begin_utc_selection(entity_logical_name).await?;
        let count = builder
            .build_query_scalar::<i64>()
            .fetch_one(&mut *transaction)
            .await
            .map_err(|error| {
                AppError::Query(format!(
                    "failed to count runtime records for entity '{entity_logical_name}': {error}"
                ))
            })?;
        Self::finish_selection(transaction, entity_logical_name).await?;

        u64::try_from(count).map_err(|error| {
            AppError::Internal(format!(
                "invalid runtime record count for entity '{entity_logical_name}': {error}"
            ))
        })
    }

    pub(super) async fn find_runtime_records_impl(
        &self,
        entity_logical_name: &str,
        condition: &RuntimeRecordCondition,
        order: &[RuntimeRecordOrder],
        limit: usize,
    ) -> AppResult<Vec<RuntimeRecord>> {
        let limit = i64::try_from(limit).map_err(|error| {
            AppError::Validation(format!("invalid runtime record query limit: {error}"))
        })?;

        let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(
            "SELECT id, entity_logical_name, data FROM runtime_records WHERE entity_logical_name = ",
        );
        builder.push_bind(entity_logical_name.to_owned());
        builder.push(" AND ");
        push_condition(&mut builder, condition)?;

        builder.push(" ORDER BY ");
        for sort in order {
            push_sort_expression(&mut builder, sort)?;
            builder.push(" ASC NULLS LAST, ");
        }
        builder.push("id::text ASC");

        builder.push(" LIMIT ");
        builder.push_bind(limit);

        let mut transaction = self.begin_utc_selection(entity_logical_name).await?;
        let rows = builder
            .build_query_as::<RuntimeRecordRow>()
            .fetch_all(&mut *transaction)
            .await
            .map_err(|error| {
                AppError::Query(format!(
                    "failed to query runtime records for entity '{entity_logical_name}': {error}"
                ))
            })?;
        Self::finish_selection(transaction, entity_logical_name).await?;

        rows.into_iter().map(runtime_record_from_row).collect()
    }
}

fn push_condition(
    builder: &mut QueryBuilder<'_, Postgres>,
    condition: &RuntimeRecordCondition,
) -> AppResult<()> {
    match condition {
        RuntimeRecordCondition::Filter(filter) => push_filter_condition(builder, filter)?,
        RuntimeRecordCondition::All(conditions) if conditions.is_empty() => {
            builder.push("TRUE");
        }
        RuntimeRecordCondition::All(conditions) => {
            builder.push('(');
            for (index, nested) in conditions.iter().enumerate() {
                if index > 0 {
                    builder.push(" AND ");
                }
                push_condition(builder, nested)?;
            }
            builder.push(')');
        }
        RuntimeRecordCondition::Not(nested) => {
            builder.push("NOT (");
            push_condition(builder, nested)?;
            builder.push(')');
        }
    }

    Ok(())
}

// Absent keys read as SQL NULL, so equality must be null-safe for the
// anonymized guard to keep partially anonymized rows eligible.
fn push_filter_condition(
    builder: &mut QueryBuilder<'_, Postgres>,
    filter: &RuntimeRecordFilter,
) -> AppResult<()> {
    match filter.operator {
        RuntimeRecordOperator::Eq => {
            builder.push("(data -> ");
            builder.push_bind(filter.field_logical_name.clone());
            builder.push(") IS NOT DISTINCT FROM ");
            builder.push_bind(filter.field_value.clone());
        }
        RuntimeRecordOperator::Neq => {
            builder.push("(data -> ");
            builder.push_bind(filter.field_logical_name.clone());
            builder.push(") IS DISTINCT FROM ");
            builder.push_bind(filter.field_value.clone());
        }
        RuntimeRecordOperator::Lt => push_less_than_condition(builder, filter)?,
    }

    Ok(())
}

fn push_less_than_condition(
    builder: &mut QueryBuilder<'_, Postgres>,
    filter: &RuntimeRecordFilter,
) -> AppResult<()> {
    let field_type = filter.field_type.unwrap_or(FieldType::Text);

    match field_type {
        FieldType::Date | FieldType::DateTime => {
            let bound: DateTime<Utc> = parse_temporal_value(&filter.field_value).ok_or_else(|| {
                AppError::Query(format!(
                    "comparison value for field '{}' is not a valid date",
                    filter.field_logical_name
                ))
            })?;

            builder.push("(data ->> ");
            builder.push_bind(filter.field_logical_name.clone());
            builder.push(")::timestamptz < ");
            builder.push_bind(bound);
        }
        FieldType::Number => {
            let bound = filter.field_value.as_f64().ok_or_else(|| {
                AppError::Query(format!(
                    "comparison value for field '{}' is not a number",
                    filter.field_logical_name
                ))
            })?;

            builder.push("(data ->> ");
            builder.push_bind(filter.field_logical_name.clone());
            builder.push(")::double precision < ");
            builder.push_bind(bound);
        }
        FieldType::Text | FieldType::Relation => {
            let bound = filter.field_value.as_str().ok_or_else(|| {
                AppError::Query(format!(
                    "comparison value for field '{}' is not a string",
                    filter.field_logical_name
                ))
            })?;

            builder.push("data ->> ");
            builder.push_bind(filter.field_logical_name.clone());
            builder.push(" < ");
            builder.push_bind(bound.to_owned());
        }
        FieldType::Boolean | FieldType::Json => {
            return Err(AppError::Query(format!(
                "field '{}' of type '{}' does not support ordered comparison",
                filter.field_logical_name,
                field_type.as_str()
            )));
        }
    }

    Ok(())
}

fn push_sort_expression(
    builder: &mut QueryBuilder<'_, Postgres>,
    sort: &RuntimeRecordOrder,
) -> AppResult<()> {
    match sort.field_type {
        FieldType::Date | FieldType::DateTime => {
            builder.push("(data ->> ");
            builder.push_bind(sort.field_logical_name.clone());
            builder.push(")::timestamptz");
        }
        FieldType::Number => {
            builder.push("(data ->> ");
            builder.push_bind(sort.field_logical_name.clone());
            builder.push(")::double precision");
        }
        FieldType::Text | FieldType::Relation => {
            builder.push("data ->> ");
            builder.push_bind(sort.field_logical_name.clone());
        }
        FieldType::Boolean | FieldType::Json => {
            return Err(AppError::Query(format!(
                "field '{}' of type '{}' cannot order runtime records",
                sort.field_logical_name,
                sort.field_type.as_str()
            )));
        }
    }

    Ok(())
}
