//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod in_memory_runtime_record_store;
mod postgres_runtime_record_store;
mod redis_anonymization_run_lock;
mod static_anonymization_registry;

pub use in_memory_runtime_record_store::InMemoryRuntimeRecordStore;
pub use postgres_runtime_record_store::{MIGRATOR, PostgresRuntimeRecordStore, run_migrations};
pub use redis_anonymization_run_lock::RedisAnonymizationRunLock;
pub use static_anonymization_registry::StaticAnonymizationRegistry;
