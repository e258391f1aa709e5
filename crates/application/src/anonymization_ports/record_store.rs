use async_trait::async_trait;
use scrubline_core::AppResult;
use scrubline_domain::RuntimeRecord;

use super::{RuntimeRecordCondition, RuntimeRecordOrder};

/// Record store port used for selection and persistence of runtime records.
///
/// Selection failures surface as `AppError::Query`; persistence failures as
/// `AppError::Store`.
#[async_trait]
pub trait RuntimeRecordStore: Send + Sync {
    /// Counts the records of an entity type matching a condition.
    async fn count_runtime_records(
        &self,
        entity_logical_name: &str,
        condition: &RuntimeRecordCondition,
    ) -> AppResult<u64>;

    /// Returns at most `limit` matching records sorted by `order`, ties broken by record id.
    async fn find_runtime_records(
        &self,
        entity_logical_name: &str,
        condition: &RuntimeRecordCondition,
        order: &[RuntimeRecordOrder],
        limit: usize,
    ) -> AppResult<Vec<RuntimeRecord>>;

    /// Persists the current field values of one record.
    async fn update_runtime_record(&self, record: &RuntimeRecord) -> AppResult<()>;
}
