use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use scrubline_core::{AppError, AppResult, NonEmptyString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Semantic field types used to key placeholder fallbacks and comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// UTF-8 string field.
    Text,
    /// Numeric field.
    Number,
    /// Boolean field.
    Boolean,
    /// Date-only string field.
    Date,
    /// Date-time string field.
    DateTime,
    /// Arbitrary JSON field.
    Json,
    /// Many-to-one relation field.
    Relation,
}

impl FieldType {
    /// Returns a stable storage value for the field type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Json => "json",
            Self::Relation => "relation",
        }
    }

    /// Returns whether values of this type hold a point in time.
    #[must_use]
    pub fn is_temporal(&self) -> bool {
        matches!(self, Self::Date | Self::DateTime)
    }

    /// Returns whether values of this type support ordering comparisons.
    #[must_use]
    pub fn is_orderable(&self) -> bool {
        matches!(
            self,
            Self::Text | Self::Number | Self::Date | Self::DateTime | Self::Relation
        )
    }

    /// Validates a JSON value against this field type.
    pub fn validate_value(self, value: &Value) -> AppResult<()> {
        let is_valid = match self {
            Self::Text => value.is_string(),
            Self::Date | Self::DateTime => parse_temporal_value(value).is_some(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Json => true,
            Self::Relation => value
                .as_str()
                .map(|text| !text.trim().is_empty())
                .unwrap_or(false),
        };

        if !is_valid {
            return Err(AppError::Validation(format!(
                "value does not match field type '{}'",
                self.as_str()
            )));
        }

        Ok(())
    }
}

impl FromStr for FieldType {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "text" | "string" => Ok(Self::Text),
            "number" => Ok(Self::Number),
            "boolean" => Ok(Self::Boolean),
            "date" => Ok(Self::Date),
            "datetime" => Ok(Self::DateTime),
            "json" => Ok(Self::Json),
            "relation" => Ok(Self::Relation),
            _ => Err(AppError::Validation(format!(
                "unknown field type '{value}'"
            ))),
        }
    }
}

/// Parses a stored JSON value as a UTC instant.
///
/// Accepts RFC 3339 date-times, naive `YYYY-MM-DD HH:MM:SS` date-times (read as UTC)
/// and `YYYY-MM-DD` dates (read as UTC midnight).
#[must_use]
pub fn parse_temporal_value(value: &Value) -> Option<DateTime<Utc>> {
    let text = value.as_str()?.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }

    if let Ok(parsed) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Some(parsed.and_utc());
    }

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
}

/// Runtime record payload persisted for an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeRecord {
    record_id: NonEmptyString,
    entity_logical_name: NonEmptyString,
    data: Value,
}

impl RuntimeRecord {
    /// Creates a validated runtime record projection.
    pub fn new(
        record_id: impl Into<String>,
        entity_logical_name: impl Into<String>,
        data: Value,
    ) -> AppResult<Self> {
        if !data.is_object() {
            return Err(AppError::Validation(
                "runtime record data must be a JSON object".to_owned(),
            ));
        }

        Ok(Self {
            record_id: NonEmptyString::new(record_id)?,
            entity_logical_name: NonEmptyString::new(entity_logical_name)?,
            data,
        })
    }

    /// Returns the stable runtime record identifier.
    #[must_use]
    pub fn record_id(&self) -> &NonEmptyString {
        &self.record_id
    }

    /// Returns the parent entity logical name.
    #[must_use]
    pub fn entity_logical_name(&self) -> &NonEmptyString {
        &self.entity_logical_name
    }

    /// Returns the record JSON object.
    #[must_use]
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Returns the current value of one field, if present.
    #[must_use]
    pub fn field(&self, field_logical_name: &str) -> Option<&Value> {
        self.data
            .as_object()
            .and_then(|data| data.get(field_logical_name))
    }

    /// Overwrites one field value, inserting the field when it is absent.
    pub fn set_field(&mut self, field_logical_name: impl Into<String>, value: Value) {
        if !self.data.is_object() {
            self.data = Value::Object(Map::new());
        }

        if let Value::Object(data) = &mut self.data {
            data.insert(field_logical_name.into(), value);
        }
    }
}
