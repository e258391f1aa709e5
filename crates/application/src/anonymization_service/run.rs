/// Terminal state of one anonymization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnonymizationRunStatus {
    /// The entity type resolved to a policy without mutated fields.
    NoAnonymizableFields,
    /// No record was past retention and not yet anonymized.
    NoEligibleRecords,
    /// A batch of eligible records was fetched and mutated.
    RecordsMutated,
}

impl AnonymizationRunStatus {
    /// Returns the stable status value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoAnonymizableFields => "no_anonymizable_fields",
            Self::NoEligibleRecords => "no_eligible_records",
            Self::RecordsMutated => "records_mutated",
        }
    }
}

/// Report of one `anonymize` invocation for one entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnonymizationRun {
    /// Entity logical name.
    pub entity_logical_name: String,
    /// Eligible records before the batch limit.
    pub total_eligible: u64,
    /// Batch limit in effect.
    pub batch_limit: usize,
    /// Records mutated and persisted in this run.
    pub processed_count: usize,
    /// Records whose persistence failed in this run.
    pub failed_count: usize,
    /// Terminal state reached.
    pub status: AnonymizationRunStatus,
}

impl AnonymizationRun {
    pub(super) fn empty(
        entity_logical_name: &str,
        batch_limit: usize,
        status: AnonymizationRunStatus,
    ) -> Self {
        Self {
            entity_logical_name: entity_logical_name.to_owned(),
            total_eligible: 0,
            batch_limit,
            processed_count: 0,
            failed_count: 0,
            status,
        }
    }
}
