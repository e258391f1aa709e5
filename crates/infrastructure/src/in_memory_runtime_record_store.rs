use std::collections::HashMap;

use async_trait::async_trait;
use scrubline_application::{
    RuntimeRecordCondition, RuntimeRecordOrder, RuntimeRecordStore, compare_runtime_records,
};
use scrubline_core::{AppError, AppResult};
use scrubline_domain::RuntimeRecord;
use tokio::sync::RwLock;


/// In-memory runtime record store implementation.
#[derive(Debug, Default)]
pub struct InMemoryRuntimeRecordStore {
    records: RwLock<HashMap<(String, String), RuntimeRecord>>,
}

impl InMemoryRuntimeRecordStore {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Inserts or replaces one record.
    pub async fn insert_record(&self, record: RuntimeRecord) {
        let key = record_key(&record);
        self.records.write().await.insert(key, record);
    }

    /// Returns one stored record.
    pub async fn find_record(
        &self,
        entity_logical_name: &str,
        record_id: &str,
    ) -> Option<RuntimeRecord> {
        self.records
            .read()
            .await
            .get(&(entity_logical_name.to_owned(), record_id.to_owned()))
            .cloned()
    }

    async fn matching_records(
        &self,
        entity_logical_name: &str,
        condition: &RuntimeRecordCondition,
    ) -> AppResult<Vec<RuntimeRecord>> {
        let records = self.records.read().await;

        let mut matching = Vec::new();
        for ((stored_entity, _), record) in records.iter() {
            if stored_entity == entity_logical_name && condition.evaluate(record)? {
                matching.push(record.clone());
            }
        }

        Ok(matching)
    }
}

fn record_key(record: &RuntimeRecord) -> (String, String) {
    (
        record.entity_logical_name().as_str().to_owned(),
        record.record_id().as_str().to_owned(),
    )
}

#[async_trait]
impl RuntimeRecordStore for InMemoryRuntimeRecordStore {
    async fn count_runtime_records(
        &self,
        entity_logical_name: &str,
        condition: &RuntimeRecordCondition,
    ) -> AppResult<u64> {
        let matching = self
            .matching_records(entity_logical_name, condition)
            .await?;

        u64::try_from(matching.len()).map_err(|error| {
            AppError::Internal(format!(
                "runtime record count overflow for entity '{entity_logical_name}': {error}"
            ))
        })
    }

    async fn find_runtime_records(
        &self,
        entity_logical_name: &str,
        condition: &RuntimeRecordCondition,
        order: &[RuntimeRecordOrder],
        limit: usize,
    ) -> AppResult<Vec<RuntimeRecord>> {
        let mut matching = self
            .matching_records(entity_logical_name, condition)
            .await?;

        let mut sort_error = None;
        matching.sort_by(|left, right| {
            compare_runtime_records(left, right, order).unwrap_or_else(|error| {
                sort_error.get_or_insert(error);
                std::cmp::Ordering::Equal
            })
        });

        if let Some(error) = sort_error {
            return Err(error);
        }

        matching.truncate(limit);
        Ok(matching)
    }

    async fn update_runtime_record(&self, record: &RuntimeRecord) -> AppResult<()> {
        let key = record_key(record);
        let mut records = self.records.write().await;

        let Some(stored) = records.get_mut(&key) else {
            return Err(AppError::NotFound(format!(
                "runtime record '{}' does not exist for entity '{}'",
                key.1, key.0
            )));
        };

        *stored = record.clone();
        Ok(())
    }
}
