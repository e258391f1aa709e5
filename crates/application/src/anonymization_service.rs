//! Anonymization rule registry, eligibility planning and batched mutation.
//!
//! One `anonymize` call walks `resolve policy -> plan selection -> execute batch`
//! for a single entity type. Nothing is persisted between steps, so an
//! interrupted run leaves already-updated records anonymized and the rest
//! eligible for the next run.

mod config;
mod executor;
mod planner;
mod registry;
mod run;


use std::sync::Arc;

use chrono::{DateTime, Utc};
use scrubline_core::{AppError, AppResult};
use scrubline_domain::RuntimeRecord;
use tracing::{debug, info, warn};

use crate::anonymization_ports::{
    AnonymizationMetadataProvider, AnonymizationRunLock, RuntimeRecordStore,
};

pub use config::{AnonymizationDefaults, DEFAULT_BATCH_LIMIT};
pub use executor::{MutationExecutor, RunResult};
pub use planner::{EligibilityPlanner, SelectionPlan, eligibility_condition};
pub use registry::PolicyRegistry;
pub use run::{AnonymizationRun, AnonymizationRunStatus};

#[derive(Clone)]
struct RunLockBinding {
    lock: Arc<dyn AnonymizationRunLock>,
    holder_id: String,
    lease_seconds: u32,
}

/// Application service exposing anonymization to schedulers and tools.
#[derive(Clone)]
pub struct AnonymizationService {
    registry: PolicyRegistry,
    planner: EligibilityPlanner,
    executor: MutationExecutor,
    record_store: Arc<dyn RuntimeRecordStore>,
    run_lock: Option<RunLockBinding>,
}

impl AnonymizationService {
    /// Creates a new anonymization service from its ports.
    #[must_use]
    pub fn new(
        metadata_provider: Arc<dyn AnonymizationMetadataProvider>,
        record_store: Arc<dyn RuntimeRecordStore>,
        defaults: AnonymizationDefaults,
    ) -> Self {
        Self {
            registry: PolicyRegistry::new(metadata_provider, defaults),
            planner: EligibilityPlanner::new(record_store.clone()),
            executor: MutationExecutor::new(record_store.clone()),
            record_store,
            run_lock: None,
        }
    }

    /// Serializes runs per entity type through a distributed lock.
    #[must_use]
    pub fn with_run_lock(
        mut self,
        lock: Arc<dyn AnonymizationRunLock>,
        holder_id: impl Into<String>,
        lease_seconds: u32,
    ) -> Self {
        self.run_lock = Some(RunLockBinding {
            lock,
            holder_id: holder_id.into(),
            lease_seconds,
        });
        self
    }

    /// Returns the policy registry.
    #[must_use]
    pub fn registry(&self) -> &PolicyRegistry {
        &self.registry
    }

    /// Lists entity types with at least one anonymizable field.
    pub async fn list_anonymizable_types(&self) -> AppResult<Vec<String>> {
        self.registry.list_anonymizable_types().await
    }

    /// Anonymizes up to `limit` expired records of one entity type.
    pub async fn anonymize(
        &self,
        entity_logical_name: &str,
        limit: usize,
    ) -> AppResult<AnonymizationRun> {
        self.anonymize_at(entity_logical_name, limit, Utc::now())
            .await
    }

    /// Anonymizes up to `limit` records that expired before `now` minus the retention period.
    pub async fn anonymize_at(
        &self,
        entity_logical_name: &str,
        limit: usize,
        now: DateTime<Utc>,
    ) -> AppResult<AnonymizationRun> {
        planner::validate_batch_limit(limit)?;

        let Some(binding) = &self.run_lock else {
            return self.run(entity_logical_name, limit, now).await;
        };

        let scope_key = format!("anonymize:{entity_logical_name}");
        let lease = binding
            .lock
            .try_acquire(
                scope_key.as_str(),
                binding.holder_id.as_str(),
                binding.lease_seconds,
            )
            .await?
            .ok_or_else(|| {
                AppError::Conflict(format!(
                    "an anonymization run for entity '{entity_logical_name}' is already in progress"
                ))
            })?;

        let result = self.run(entity_logical_name, limit, now).await;

        if let Err(error) = binding.lock.release(&lease).await {
            warn!(
                entity = %entity_logical_name,
                scope_key = %lease.scope_key,
                error = %error,
                "failed to release anonymization run lock"
            );
        }

        result
    }

    /// Anonymizes a single record regardless of its age.
    ///
    /// When `persist` is false the mutated record is only returned.
    pub async fn anonymize_record(
        &self,
        mut record: RuntimeRecord,
        persist: bool,
    ) -> AppResult<RuntimeRecord> {
        let entity_logical_name = record.entity_logical_name().as_str().to_owned();
        let policy = self
            .registry
            .resolve_policy(entity_logical_name.as_str())
            .await?;

        if !policy.has_mutations() {
            return Err(AppError::Policy(format!(
                "entity '{entity_logical_name}' does not declare any anonymizable fields"
            )));
        }

        policy.apply_to(&mut record)?;

        if persist {
            self.record_store.update_runtime_record(&record).await?;
        }

        Ok(record)
    }

    async fn run(
        &self,
        entity_logical_name: &str,
        limit: usize,
        now: DateTime<Utc>,
    ) -> AppResult<AnonymizationRun> {
        debug!(entity = %entity_logical_name, limit, "anonymizing records");

        let policy = self.registry.resolve_policy(entity_logical_name).await?;
        if !policy.has_mutations() {
            debug!(entity = %entity_logical_name, "entity declares no anonymizable fields");
            return Ok(AnonymizationRun::empty(
                entity_logical_name,
                limit,
                AnonymizationRunStatus::NoAnonymizableFields,
            ));
        }

        let plan = self.planner.plan_selection(&policy, limit, now).await?;
        if plan.total_eligible() == 0 {
            info!(entity = %entity_logical_name, "no records to anonymize");
            return Ok(AnonymizationRun::empty(
                entity_logical_name,
                limit,
                AnonymizationRunStatus::NoEligibleRecords,
            ));
        }

        info!(
            entity = %entity_logical_name,
            total = plan.total_eligible(),
            cutoff = %plan.cutoff(),
            "records to anonymize"
        );

        let result = self.executor.execute(&plan, policy.mutations()).await?;

        info!(
            entity = %entity_logical_name,
            processed = result.processed,
            total = result.total,
            failed = result.failed,
            "{} of {} records anonymized in this run",
            result.processed,
            result.total
        );

        Ok(AnonymizationRun {
            entity_logical_name: entity_logical_name.to_owned(),
            total_eligible: result.total,
            batch_limit: limit,
            processed_count: result.processed,
            failed_count: result.failed,
            status: AnonymizationRunStatus::RecordsMutated,
        })
    }
}
