use std::cmp::Ordering;

use scrubline_core::{AppError, AppResult};
use scrubline_domain::{FieldType, RuntimeRecord, parse_temporal_value};
use serde_json::Value;

/// Runtime condition comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeRecordOperator {
    /// JSON equality; an absent field never matches.
    Eq,
    /// JSON inequality; an absent field always matches.
    Neq,
    /// Ordered less-than; an absent or null field never matches.
    Lt,
}

impl RuntimeRecordOperator {
    /// Returns the stable operator value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Neq => "neq",
            Self::Lt => "lt",
        }
    }
}

/// Typed comparison of one record field.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeRecordFilter {
    /// Field logical name to compare.
    pub field_logical_name: String,
    /// Comparison operator.
    pub operator: RuntimeRecordOperator,
    /// Declared semantic type, used by ordered comparisons.
    pub field_type: Option<FieldType>,
    /// Expected field value.
    pub field_value: Value,
}

/// Recursive record selection condition.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeRecordCondition {
    /// One typed comparison.
    Filter(RuntimeRecordFilter),
    /// Every child must match; an empty list matches everything.
    All(Vec<RuntimeRecordCondition>),
    /// Negation of the child.
    Not(Box<RuntimeRecordCondition>),
}

/// Ascending sort on one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeRecordOrder {
    /// Field logical name to sort by.
    pub field_logical_name: String,
    /// Declared semantic type of the field.
    pub field_type: FieldType,
}

impl RuntimeRecordCondition {
    /// Evaluates the condition against one record.
    ///
    /// Fails with `AppError::Query` when an ordered comparison targets a field
    /// whose type or stored value is not orderable.
    pub fn evaluate(&self, record: &RuntimeRecord) -> AppResult<bool> {
        match self {
            Self::Filter(filter) => filter_matches(record, filter),
            Self::All(conditions) => {
                for condition in conditions {
                    if !condition.evaluate(record)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Self::Not(condition) => Ok(!condition.evaluate(record)?),
        }
    }
}

fn filter_matches(record: &RuntimeRecord, filter: &RuntimeRecordFilter) -> AppResult<bool> {
    let value = record.field(filter.field_logical_name.as_str());

    match filter.operator {
        RuntimeRecordOperator::Eq => Ok(value == Some(&filter.field_value)),
        RuntimeRecordOperator::Neq => Ok(value != Some(&filter.field_value)),
        RuntimeRecordOperator::Lt => {
            let Some(value) = value.filter(|value| !value.is_null()) else {
                return Ok(false);
            };
            let field_type = filter.field_type.unwrap_or(FieldType::Text);
            let ordering = compare_field_values(
                record,
                filter.field_logical_name.as_str(),
                field_type,
                value,
                &filter.field_value,
            )?;
            Ok(ordering.is_lt())
        }
    }
}

fn compare_field_values(
    record: &RuntimeRecord,
    field_logical_name: &str,
    field_type: FieldType,
    stored: &Value,
    expected: &Value,
) -> AppResult<Ordering> {
    let not_comparable = || {
        AppError::Query(format!(
            "field '{}' of record '{}' in entity '{}' holds a value that is not comparable as '{}'",
            field_logical_name,
            record.record_id(),
            record.entity_logical_name(),
            field_type.as_str()
        ))
    };

    if !field_type.is_orderable() {
        return Err(AppError::Query(format!(
            "field '{}' of entity '{}' has type '{}' which is not orderable",
            field_logical_name,
            record.entity_logical_name(),
            field_type.as_str()
        )));
    }

    match field_type {
        FieldType::Date | FieldType::DateTime => {
            let left = parse_temporal_value(stored).ok_or_else(not_comparable)?;
            let right = parse_temporal_value(expected).ok_or_else(not_comparable)?;
            Ok(left.cmp(&right))
        }
        FieldType::Number => stored
            .as_f64()
            .zip(expected.as_f64())
            .and_then(|(left, right)| left.partial_cmp(&right))
            .ok_or_else(not_comparable),
        _ => stored
            .as_str()
            .zip(expected.as_str())
            .map(|(left, right)| left.cmp(right))
            .ok_or_else(not_comparable),
    }
}

/// Compares two records by the given ascending orders, then by record id.
///
/// Absent or null sort values order after present ones.
pub fn compare_runtime_records(
    left: &RuntimeRecord,
    right: &RuntimeRecord,
    order: &[RuntimeRecordOrder],
) -> AppResult<Ordering> {
    for sort in order {
        let left_value = left
            .field(sort.field_logical_name.as_str())
            .filter(|value| !value.is_null());
        let right_value = right
            .field(sort.field_logical_name.as_str())
            .filter(|value| !value.is_null());

        let ordering = match (left_value, right_value) {
            (Some(left_value), Some(right_value)) => compare_field_values(
                left,
                sort.field_logical_name.as_str(),
                sort.field_type,
                left_value,
                right_value,
            )?,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };

        if ordering != Ordering::Equal {
            return Ok(ordering);
        }
    }

    Ok(left.record_id().as_str().cmp(right.record_id().as_str()))
}

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;

    use scrubline_core::AppError;
    use scrubline_domain::{FieldType, RuntimeRecord};
    use serde_json::{Value, json};

    use super::{
        RuntimeRecordCondition, RuntimeRecordFilter, RuntimeRecordOperator, RuntimeRecordOrder,
        compare_runtime_records,
    };

    fn record(id: &str, data: Value) -> RuntimeRecord {
        RuntimeRecord::new(id, "customer", data).unwrap_or_else(|_| unreachable!())
    }

    fn filter(
        field: &str,
        operator: RuntimeRecordOperator,
        field_type: Option<FieldType>,
        value: Value,
    ) -> RuntimeRecordCondition {
        RuntimeRecordCondition::Filter(RuntimeRecordFilter {
            field_logical_name: field.to_owned(),
            operator,
            field_type,
            field_value: value,
        })
    }

    #[test]
    fn absent_fields_never_equal_and_always_differ() {
        let subject = record("1", json!({}));
        let equals = filter("email", RuntimeRecordOperator::Eq, None, json!("x"));
        let differs = filter("email", RuntimeRecordOperator::Neq, None, json!("x"));

        assert!(matches!(equals.evaluate(&subject), Ok(false)));
        assert!(matches!(differs.evaluate(&subject), Ok(true)));
    }

    #[test]
    fn not_all_excludes_only_fully_matching_records() {
        let guard = RuntimeRecordCondition::Not(Box::new(RuntimeRecordCondition::All(vec![
            filter("email", RuntimeRecordOperator::Eq, None, json!("anon")),
            filter("phone", RuntimeRecordOperator::Eq, None, json!("-")),
        ])));

        let done = record("1", json!({"email": "anon", "phone": "-"}));
        let partial = record("2", json!({"email": "anon", "phone": "555"}));
        let missing = record("3", json!({"email": "anon"}));

        assert!(matches!(guard.evaluate(&done), Ok(false)));
        assert!(matches!(guard.evaluate(&partial), Ok(true)));
        assert!(matches!(guard.evaluate(&missing), Ok(true)));
    }

    #[test]
    fn temporal_less_than_skips_null_references() {
        let before = filter(
            "last_activity_date",
            RuntimeRecordOperator::Lt,
            Some(FieldType::DateTime),
            json!("2024-01-01T00:00:00Z"),
        );

        let old = record("1", json!({"last_activity_date": "2023-06-01"}));
        let new = record("2", json!({"last_activity_date": "2024-06-01T10:00:00+02:00"}));
        let unset = record("3", json!({"last_activity_date": null}));

        assert!(matches!(before.evaluate(&old), Ok(true)));
        assert!(matches!(before.evaluate(&new), Ok(false)));
        assert!(matches!(before.evaluate(&unset), Ok(false)));
    }

    #[test]
    fn unparseable_reference_value_is_a_query_error() {
        let before = filter(
            "last_activity_date",
            RuntimeRecordOperator::Lt,
            Some(FieldType::Date),
            json!("2024-01-01"),
        );
        let broken = record("1", json!({"last_activity_date": "last tuesday"}));

        assert!(matches!(before.evaluate(&broken), Err(AppError::Query(_))));
    }

    #[test]
    fn json_fields_reject_ordered_comparison() {
        let before = filter(
            "profile",
            RuntimeRecordOperator::Lt,
            Some(FieldType::Json),
            json!("2024-01-01"),
        );
        let subject = record("1", json!({"profile": {"a": 1}}));

        assert!(matches!(before.evaluate(&subject), Err(AppError::Query(_))));
    }

    #[test]
    fn empty_all_matches_everything() {
        let subject = record("1", json!({}));
        assert!(matches!(
            RuntimeRecordCondition::All(Vec::new()).evaluate(&subject),
            Ok(true)
        ));
    }

    #[test]
    fn ordering_uses_dates_then_record_id() {
        let order = [RuntimeRecordOrder {
            field_logical_name: "last_activity_date".to_owned(),
            field_type: FieldType::DateTime,
        }];
        let older = record("b", json!({"last_activity_date": "2020-01-01T00:00:00Z"}));
        let newer = record("a", json!({"last_activity_date": "2021-01-01T00:00:00Z"}));
        let twin = record("c", json!({"last_activity_date": "2020-01-01T00:00:00Z"}));

        assert!(matches!(
            compare_runtime_records(&older, &newer, &order),
            Ok(Ordering::Less)
        ));
        assert!(matches!(
            compare_runtime_records(&older, &twin, &order),
            Ok(Ordering::Less)
        ));
    }
}
