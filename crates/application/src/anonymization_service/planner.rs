use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use scrubline_core::{AppError, AppResult};
use scrubline_domain::{AnonymizationPolicy, FieldMutation};
use serde_json::Value;

use crate::anonymization_ports::{
    RuntimeRecordCondition, RuntimeRecordFilter, RuntimeRecordOperator, RuntimeRecordOrder,
    RuntimeRecordStore,
};

/// Selection of eligible records for one entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionPlan {
    entity_logical_name: String,
    cutoff: DateTime<Utc>,
    condition: RuntimeRecordCondition,
    order: Vec<RuntimeRecordOrder>,
    limit: usize,
    total_eligible: u64,
}

impl SelectionPlan {
    /// Returns the entity logical name.
    #[must_use]
    pub fn entity_logical_name(&self) -> &str {
        self.entity_logical_name.as_str()
    }

    /// Returns the instant eligible records must predate.
    #[must_use]
    pub fn cutoff(&self) -> DateTime<Utc> {
        self.cutoff
    }

    /// Returns the eligibility predicate.
    #[must_use]
    pub fn condition(&self) -> &RuntimeRecordCondition {
        &self.condition
    }

    /// Returns the ordering, oldest reference value first.
    #[must_use]
    pub fn order(&self) -> &[RuntimeRecordOrder] {
        &self.order
    }

    /// Returns the batch limit.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Returns the number of eligible records, ignoring the batch limit.
    #[must_use]
    pub fn total_eligible(&self) -> u64 {
        self.total_eligible
    }
}

/// Builds and counts eligibility selections against the record store.
#[derive(Clone)]
pub struct EligibilityPlanner {
    record_store: Arc<dyn RuntimeRecordStore>,
}

impl EligibilityPlanner {
    /// Creates a planner over a record store.
    #[must_use]
    pub fn new(record_store: Arc<dyn RuntimeRecordStore>) -> Self {
        Self { record_store }
    }

    /// Plans the selection of records past retention and not yet anonymized.
    pub async fn plan_selection(
        &self,
        policy: &AnonymizationPolicy,
        limit: usize,
        now: DateTime<Utc>,
    ) -> AppResult<SelectionPlan> {
        validate_batch_limit(limit)?;

        let cutoff = policy.cutoff(now)?;
        let condition = eligibility_condition(policy, cutoff);
        let order = vec![RuntimeRecordOrder {
            field_logical_name: policy.reference_field().as_str().to_owned(),
            field_type: policy.reference_field_type(),
        }];

        let total_eligible = self
            .record_store
            .count_runtime_records(policy.entity_logical_name().as_str(), &condition)
            .await?;

        Ok(SelectionPlan {
            entity_logical_name: policy.entity_logical_name().as_str().to_owned(),
            cutoff,
            condition,
            order,
            limit,
            total_eligible,
        })
    }
}

pub(super) fn validate_batch_limit(limit: usize) -> AppResult<()> {
    if limit == 0 {
        return Err(AppError::Validation(
            "anonymization batch limit must be greater than zero".to_owned(),
        ));
    }

    Ok(())
}

/// Builds `reference < cutoff AND NOT (every mutated field equals its placeholder)`.
#[must_use]
pub fn eligibility_condition(
    policy: &AnonymizationPolicy,
    cutoff: DateTime<Utc>,
) -> RuntimeRecordCondition {
    let past_retention = RuntimeRecordCondition::Filter(RuntimeRecordFilter {
        field_logical_name: policy.reference_field().as_str().to_owned(),
        operator: RuntimeRecordOperator::Lt,
        field_type: Some(policy.reference_field_type()),
        field_value: Value::String(cutoff.to_rfc3339_opts(SecondsFormat::Micros, true)),
    });

    let mutations = policy.mutations();
    let not_anonymized = match mutations {
        [] => RuntimeRecordCondition::All(Vec::new()),
        [single] => placeholder_filter(single, RuntimeRecordOperator::Neq),
        _ => RuntimeRecordCondition::Not(Box::new(RuntimeRecordCondition::All(
            mutations
                .iter()
                .map(|mutation| placeholder_filter(mutation, RuntimeRecordOperator::Eq))
                .collect(),
        ))),
    };

    RuntimeRecordCondition::All(vec![past_retention, not_anonymized])
}

fn placeholder_filter(
    mutation: &FieldMutation,
    operator: RuntimeRecordOperator,
) -> RuntimeRecordCondition {
    RuntimeRecordCondition::Filter(RuntimeRecordFilter {
        field_logical_name: mutation.field_logical_name().as_str().to_owned(),
        operator,
        field_type: None,
        field_value: mutation.placeholder().clone(),
    })
}
