//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod anonymization;
mod metadata;
mod retention;

pub use anonymization::{
    AnonymizableEntityDeclaration, AnonymizableFieldDeclaration, AnonymizationPolicy,
    AnonymizationPolicyInput, FieldMutation, apply_mutations,
};
pub use metadata::{FieldType, RuntimeRecord, parse_temporal_value};
pub use retention::{RetentionComponent, RetentionPeriod, RetentionUnit};
