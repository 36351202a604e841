//! Field-level update modifiers (`$set` / `$unset`).

use crate::domain::document::{Fields, ID_FIELD};
use crate::error::{FieldViolation, Rule, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Modifier {
    #[serde(rename = "$set", default, skip_serializing_if = "Map::is_empty")]
    pub set: Fields,
    #[serde(rename = "$unset", default, skip_serializing_if = "BTreeSet::is_empty")]
    pub unset: BTreeSet<String>,
}

impl Modifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: JsonValue) -> Self {
        self.set.insert(field.into(), value);
        self
    }

    pub fn unset(mut self, field: impl Into<String>) -> Self {
        self.unset.insert(field.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty()
    }

    /// Parses the wire shape `{"$set": {..}, "$unset": {field: ""}}`.
    ///
    /// `$unset` accepts either an object (values ignored) or an array of names.
    pub fn from_value(value: &JsonValue) -> Result<Self, ValidationError> {
        let fail = |msg: String| {
            ValidationError::single("modifier", FieldViolation::new("modifier", Rule::Modifier, msg))
        };
        let obj = value
            .as_object()
            .ok_or_else(|| fail(format!("expected an object, got {}", value)))?;

        let mut modifier = Modifier::new();
        for (op, arg) in obj {
            match op.as_str() {
                "$set" => {
                    let fields = arg
                        .as_object()
                        .ok_or_else(|| fail("$set expects an object".to_string()))?;
                    modifier.set.extend(fields.clone());
                }
                "$unset" => match arg {
                    JsonValue::Object(fields) => modifier.unset.extend(fields.keys().cloned()),
                    JsonValue::Array(names) => {
                        for n in names {
                            let name = n
                                .as_str()
                                .ok_or_else(|| fail("$unset names must be strings".to_string()))?;
                            modifier.unset.insert(name.to_string());
                        }
                    }
                    _ => return Err(fail("$unset expects an object or array".to_string())),
                },
                other => return Err(fail(format!("unsupported operator '{}'", other))),
            }
        }

        if modifier.is_empty() {
            return Err(fail("modifier has no changes".to_string()));
        }
        if modifier.touches(ID_FIELD) {
            return Err(ValidationError::single(
                "modifier",
                FieldViolation::new(ID_FIELD, Rule::NotAllowed, "document id is immutable"),
            ));
        }
        Ok(modifier)
    }

    pub fn touched_fields(&self) -> impl Iterator<Item = &str> {
        self.set
            .keys()
            .map(String::as_str)
            .chain(self.unset.iter().map(String::as_str))
    }

    pub fn touches(&self, field: &str) -> bool {
        self.set.contains_key(field) || self.unset.contains(field)
    }

    /// Applies the changes to a field map in place. Returns whether anything changed.
    pub fn apply(&self, fields: &mut Fields) -> bool {
        let mut changed = false;
        for (k, v) in &self.set {
            if k == ID_FIELD {
                continue;
            }
            if fields.get(k) != Some(v) {
                fields.insert(k.clone(), v.clone());
                changed = true;
            }
        }
        for k in &self.unset {
            changed |= fields.remove(k).is_some();
        }
        changed
    }
}
