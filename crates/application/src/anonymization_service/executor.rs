use std::sync::Arc;

use scrubline_core::AppResult;
use scrubline_domain::{FieldMutation, apply_mutations};
use tracing::warn;

use super::planner::SelectionPlan;
use crate::anonymization_ports::RuntimeRecordStore;

/// Outcome counters of one executed selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunResult {
    /// Records mutated and persisted.
    pub processed: usize,
    /// Records eligible before the batch limit was applied.
    pub total: u64,
    /// Records whose persistence failed; they stay eligible for the next run.
    pub failed: usize,
}

/// Applies placeholder values to a planned batch, one record at a time.
#[derive(Clone)]
pub struct MutationExecutor {
    record_store: Arc<dyn RuntimeRecordStore>,
}

impl MutationExecutor {
    /// Creates an executor over a record store.
    #[must_use]
    pub fn new(record_store: Arc<dyn RuntimeRecordStore>) -> Self {
        Self { record_store }
    }

    /// Mutates and persists up to `plan.limit()` eligible records, oldest first.
    ///
    /// A failed update is logged and counted; the remaining records are still attempted.
    pub async fn execute(
        &self,
        plan: &SelectionPlan,
        mutations: &[FieldMutation],
    ) -> AppResult<RunResult> {
        let total = plan.total_eligible();
        if total == 0 {
            return Ok(RunResult::default());
        }

        let records = self
            .record_store
            .find_runtime_records(
                plan.entity_logical_name(),
                plan.condition(),
                plan.order(),
                plan.limit(),
            )
            .await?;

        let mut result = RunResult {
            total,
            ..RunResult::default()
        };

        for mut record in records.into_iter().take(plan.limit()) {
            apply_mutations(&mut record, mutations);

            match self.record_store.update_runtime_record(&record).await {
                Ok(()) => result.processed += 1,
                Err(error) => {
                    result.failed += 1;
                    warn!(
                        entity = %plan.entity_logical_name(),
                        record_id = %record.record_id(),
                        error = %error,
                        "failed to persist anonymized record"
                    );
                }
            }
        }

        Ok(result)
    }
}
