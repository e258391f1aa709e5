//! Application services and ports.

#![forbid(unsafe_code)]

mod anonymization_ports;
mod anonymization_service;

pub use anonymization_ports::{
    AnonymizationMetadataProvider, AnonymizationRunLease, AnonymizationRunLock,
    RuntimeRecordCondition, RuntimeRecordFilter, RuntimeRecordOperator, RuntimeRecordOrder,
    RuntimeRecordStore, compare_runtime_records,
};
pub use anonymization_service::{
    AnonymizationDefaults, AnonymizationRun, AnonymizationRunStatus, AnonymizationService,
    DEFAULT_BATCH_LIMIT, EligibilityPlanner, MutationExecutor, PolicyRegistry, RunResult,
    SelectionPlan, eligibility_condition,
};
