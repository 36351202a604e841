use crate::error::{FieldViolation, Rule};
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Boolean,
    Integer,
    Number,
    /// RFC3339 timestamp string.
    Date,
    /// Document id of another document.
    Id,
    Object,
    Array,
}

impl FieldType {
    pub fn accepts(&self, v: &JsonValue) -> bool {
        match self {
            FieldType::String => v.is_string(),
            FieldType::Boolean => v.is_boolean(),
            FieldType::Integer => v.is_i64() || v.is_u64(),
            FieldType::Number => v.is_number(),
            FieldType::Date => v
                .as_str()
                .map(|s| DateTime::parse_from_rfc3339(s).is_ok())
                .unwrap_or(false),
            FieldType::Id => v
                .as_str()
                .map(crate::domain::document::DocumentId::is_valid)
                .unwrap_or(false),
            FieldType::Object => v.is_object(),
            FieldType::Array => v.is_array(),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FieldType::String => "string",
            FieldType::Boolean => "boolean",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Date => "date",
            FieldType::Id => "id",
            FieldType::Object => "object",
            FieldType::Array => "array",
        };
        f.write_str(s)
    }
}

/// Declaration of one schema field.
///
/// `min`/`max` bound string length, numeric value or array length depending on the type.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct FieldSpec {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<JsonValue>>,
}

impl FieldSpec {
    pub fn required(field_type: FieldType) -> Self {
        Self {
            field_type,
            optional: false,
            min: None,
            max: None,
            allowed_values: None,
        }
    }

    pub fn optional(field_type: FieldType) -> Self {
        Self {
            optional: true,
            ..Self::required(field_type)
        }
    }

    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn allowed_values(mut self, values: Vec<JsonValue>) -> Self {
        self.allowed_values = Some(values);
        self
    }

    /// Checks one present value. `null` counts as absent.
    pub fn check(&self, field: &str, value: &JsonValue) -> Option<FieldViolation> {
        if value.is_null() {
            if self.optional {
                return None;
            }
            return Some(FieldViolation::new(field, Rule::Required, "field is required"));
        }
        if !self.field_type.accepts(value) {
            return Some(FieldViolation::new(
                field,
                Rule::Type,
                format!("expected {}, got {}", self.field_type, json_kind(value)),
            ));
        }
        if let Some(measure) = self.measure(value) {
            if let Some(min) = self.min {
                if measure < min {
                    return Some(FieldViolation::new(
                        field,
                        Rule::Min,
                        format!("must be at least {}", min),
                    ));
                }
            }
            if let Some(max) = self.max {
                if measure > max {
                    return Some(FieldViolation::new(
                        field,
                        Rule::Max,
                        format!("must be at most {}", max),
                    ));
                }
            }
        }
        if let Some(allowed) = &self.allowed_values {
            if !allowed.contains(value) {
                return Some(FieldViolation::new(
                    field,
                    Rule::AllowedValues,
                    format!("{} is not an allowed value", value),
                ));
            }
        }
        None
    }

    fn measure(&self, value: &JsonValue) -> Option<f64> {
        match self.field_type {
            FieldType::String => value.as_str().map(|s| s.chars().count() as f64),
            FieldType::Integer | FieldType::Number => value.as_f64(),
            FieldType::Array => value.as_array().map(|a| a.len() as f64),
            _ => None,
        }
    }
}

pub(crate) fn json_kind(v: &JsonValue) -> &'static str {
    match v {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
