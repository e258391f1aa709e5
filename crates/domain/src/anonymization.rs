use std::collections::HashSet;

use chrono::{DateTime, Utc};
use scrubline_core::{AppError, AppResult, NonEmptyString};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{FieldType, RetentionPeriod, RuntimeRecord};

/// Entity-level anonymization declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnonymizableEntityDeclaration {
    logical_name: NonEmptyString,
    reference_field: NonEmptyString,
    anonymize_after: Option<RetentionPeriod>,
}

impl AnonymizableEntityDeclaration {
    /// Creates a validated entity declaration.
    pub fn new(
        logical_name: impl Into<String>,
        reference_field: impl Into<String>,
        anonymize_after: Option<RetentionPeriod>,
    ) -> AppResult<Self> {
        let logical_name = NonEmptyString::new(logical_name)?;
        let reference_field = NonEmptyString::new(reference_field).map_err(|_| {
            AppError::Validation(format!(
                "anonymizable entity '{logical_name}' must specify a reference date field"
            ))
        })?;

        Ok(Self {
            logical_name,
            reference_field,
            anonymize_after,
        })
    }

    /// Returns the entity logical name.
    #[must_use]
    pub fn logical_name(&self) -> &NonEmptyString {
        &self.logical_name
    }

    /// Returns the field whose value determines record age.
    #[must_use]
    pub fn reference_field(&self) -> &NonEmptyString {
        &self.reference_field
    }

    /// Returns the type-level retention override.
    #[must_use]
    pub fn anonymize_after(&self) -> Option<&RetentionPeriod> {
        self.anonymize_after.as_ref()
    }
}

/// Field-level anonymization declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnonymizableFieldDeclaration {
    entity_logical_name: NonEmptyString,
    logical_name: NonEmptyString,
    field_type: Option<FieldType>,
    anonymized_value: Option<Value>,
}

impl AnonymizableFieldDeclaration {
    /// Creates a validated field declaration.
    ///
    /// A JSON `null` override counts as no override.
    pub fn new(
        entity_logical_name: impl Into<String>,
        logical_name: impl Into<String>,
        field_type: Option<FieldType>,
        anonymized_value: Option<Value>,
    ) -> AppResult<Self> {
        let anonymized_value = anonymized_value.filter(|value| !value.is_null());
        if let (Some(field_type), Some(value)) = (field_type, anonymized_value.as_ref()) {
            field_type.validate_value(value)?;
        }

        Ok(Self {
            entity_logical_name: NonEmptyString::new(entity_logical_name)?,
            logical_name: NonEmptyString::new(logical_name)?,
            field_type,
            anonymized_value,
        })
    }

    /// Returns the parent entity logical name.
    #[must_use]
    pub fn entity_logical_name(&self) -> &NonEmptyString {
        &self.entity_logical_name
    }

    /// Returns the field logical name.
    #[must_use]
    pub fn logical_name(&self) -> &NonEmptyString {
        &self.logical_name
    }

    /// Returns the declared semantic type.
    #[must_use]
    pub fn field_type(&self) -> Option<FieldType> {
        self.field_type
    }

    /// Returns the explicit placeholder override.
    #[must_use]
    pub fn anonymized_value(&self) -> Option<&Value> {
        self.anonymized_value.as_ref()
    }
}

/// One field overwrite applied during anonymization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMutation {
    field_logical_name: NonEmptyString,
    placeholder: Value,
}

impl FieldMutation {
    /// Creates a field mutation.
    pub fn new(field_logical_name: impl Into<String>, placeholder: Value) -> AppResult<Self> {
        Ok(Self {
            field_logical_name: NonEmptyString::new(field_logical_name)?,
            placeholder,
        })
    }

    /// Returns the target field logical name.
    #[must_use]
    pub fn field_logical_name(&self) -> &NonEmptyString {
        &self.field_logical_name
    }

    /// Returns the placeholder value written to the field.
    #[must_use]
    pub fn placeholder(&self) -> &Value {
        &self.placeholder
    }
}

/// Input payload for resolved anonymization policies.
#[derive(Debug, Clone, PartialEq)]
pub struct AnonymizationPolicyInput {
    /// Entity logical name.
    pub entity_logical_name: String,
    /// Field holding the age reference value.
    pub reference_field: String,
    /// Semantic type of the reference field.
    pub reference_field_type: FieldType,
    /// Resolved retention window.
    pub retention_period: RetentionPeriod,
    /// Ordered field mutations.
    pub mutations: Vec<FieldMutation>,
}

/// Resolved anonymization policy for one entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct AnonymizationPolicy {
    entity_logical_name: NonEmptyString,
    reference_field: NonEmptyString,
    reference_field_type: FieldType,
    retention_period: RetentionPeriod,
    mutations: Vec<FieldMutation>,
}

impl AnonymizationPolicy {
    /// Creates a policy, rejecting duplicate mutation fields.
    pub fn new(input: AnonymizationPolicyInput) -> AppResult<Self> {
        let mut seen = HashSet::new();
        for mutation in &input.mutations {
            if !seen.insert(mutation.field_logical_name().as_str()) {
                return Err(AppError::Validation(format!(
                    "duplicate anonymized field '{}' for entity '{}'",
                    mutation.field_logical_name(),
                    input.entity_logical_name
                )));
            }
        }

        Ok(Self {
            entity_logical_name: NonEmptyString::new(input.entity_logical_name)?,
            reference_field: NonEmptyString::new(input.reference_field)?,
            reference_field_type: input.reference_field_type,
            retention_period: input.retention_period,
            mutations: input.mutations,
        })
    }

    /// Returns the entity logical name.
    #[must_use]
    pub fn entity_logical_name(&self) -> &NonEmptyString {
        &self.entity_logical_name
    }

    /// Returns the age reference field.
    #[must_use]
    pub fn reference_field(&self) -> &NonEmptyString {
        &self.reference_field
    }

    /// Returns the semantic type of the reference field.
    #[must_use]
    pub fn reference_field_type(&self) -> FieldType {
        self.reference_field_type
    }

    /// Returns the retention window.
    #[must_use]
    pub fn retention_period(&self) -> &RetentionPeriod {
        &self.retention_period
    }

    /// Returns the mutations in declaration order.
    #[must_use]
    pub fn mutations(&self) -> &[FieldMutation] {
        &self.mutations
    }

    /// Returns whether the policy overwrites at least one field.
    #[must_use]
    pub fn has_mutations(&self) -> bool {
        !self.mutations.is_empty()
    }

    /// Returns the instant records must predate to be eligible at `now`.
    pub fn cutoff(&self, now: DateTime<Utc>) -> AppResult<DateTime<Utc>> {
        self.retention_period.cutoff(now)
    }

    /// Returns whether every mutated field already holds its placeholder.
    #[must_use]
    pub fn is_already_anonymized(&self, record: &RuntimeRecord) -> bool {
        self.has_mutations()
            && self.mutations.iter().all(|mutation| {
                record.field(mutation.field_logical_name().as_str()) == Some(mutation.placeholder())
            })
    }

    /// Overwrites every mutated field of a record belonging to this entity type.
    pub fn apply_to(&self, record: &mut RuntimeRecord) -> AppResult<()> {
        if record.entity_logical_name() != &self.entity_logical_name {
            return Err(AppError::Validation(format!(
                "record '{}' belongs to entity '{}', not '{}'",
                record.record_id(),
                record.entity_logical_name(),
                self.entity_logical_name
            )));
        }

        apply_mutations(record, &self.mutations);
        Ok(())
    }
}

/// Writes each placeholder into the record in mutation order.
pub fn apply_mutations(record: &mut RuntimeRecord, mutations: &[FieldMutation]) {
    for mutation in mutations {
        record.set_field(
            mutation.field_logical_name().as_str(),
            mutation.placeholder().clone(),
        );
    }
}
