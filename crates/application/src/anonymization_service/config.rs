use std::collections::BTreeMap;

use scrubline_domain::{FieldType, RetentionPeriod};
use serde_json::Value;

/// Batch limit applied when the caller does not choose one.
pub const DEFAULT_BATCH_LIMIT: usize = 100;

/// Deployment-wide defaults used when declarations leave a value open.
///
/// JSON `null` is never stored as a placeholder; it counts as "no default".
#[derive(Debug, Clone, PartialEq)]
pub struct AnonymizationDefaults {
    retention_period: RetentionPeriod,
    values_by_type: BTreeMap<FieldType, Value>,
    fallback_value: Option<Value>,
}

impl AnonymizationDefaults {
    /// Creates defaults with a global retention period and no placeholders.
    #[must_use]
    pub fn new(retention_period: RetentionPeriod) -> Self {
        Self {
            retention_period,
            values_by_type: BTreeMap::new(),
            fallback_value: None,
        }
    }

    /// Sets the placeholder used for fields of one semantic type.
    #[must_use]
    pub fn with_type_value(mut self, field_type: FieldType, value: Value) -> Self {
        if value.is_null() {
            self.values_by_type.remove(&field_type);
        } else {
            self.values_by_type.insert(field_type, value);
        }
        self
    }

    /// Sets the placeholder used when no type-specific value exists.
    #[must_use]
    pub fn with_fallback_value(mut self, value: Value) -> Self {
        self.fallback_value = Some(value).filter(|value| !value.is_null());
        self
    }

    /// Returns the global retention period.
    #[must_use]
    pub fn retention_period(&self) -> &RetentionPeriod {
        &self.retention_period
    }

    /// Returns the type-specific placeholder.
    #[must_use]
    pub fn value_for_type(&self, field_type: FieldType) -> Option<&Value> {
        self.values_by_type.get(&field_type)
    }

    /// Returns the global fallback placeholder.
    #[must_use]
    pub fn fallback_value(&self) -> Option<&Value> {
        self.fallback_value.as_ref()
    }

    /// Resolves the placeholder for a field without an explicit override.
    #[must_use]
    pub fn placeholder_for(&self, field_type: Option<FieldType>) -> Option<&Value> {
        field_type
            .and_then(|field_type| self.value_for_type(field_type))
            .or(self.fallback_value.as_ref())
    }
}
