mod metadata_provider;
mod record_condition;
mod record_store;
mod run_lock;

pub use metadata_provider::AnonymizationMetadataProvider;
pub use record_condition::{
    RuntimeRecordCondition, RuntimeRecordFilter, RuntimeRecordOperator, RuntimeRecordOrder,
    compare_runtime_records,
};
pub use record_store::RuntimeRecordStore;
pub use run_lock::{AnonymizationRunLease, AnonymizationRunLock};
