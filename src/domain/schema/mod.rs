//! Collection schemas and the mutation-safe projection derived from them.
//!
//! A [`Schema`] is an immutable value. The collection owns it through a
//! [`SchemaCell`], which swaps in a new version on every `extend`; readers keep
//! whatever `Arc<Schema>` they already hold, so no half-merged state is observable.

use crate::domain::document::{Fields, ID_FIELD};
use crate::domain::modifier::Modifier;
use crate::error::{FieldViolation, GuardError, GuardResult, Rule, ValidationError};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

pub mod field;
pub mod projection;

pub use field::{FieldSpec, FieldType};
pub use projection::SchemaProjection;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Schema {
    fields: BTreeMap<String, FieldSpec>,
    #[serde(skip)]
    version: u64,
}

impl Schema {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, FieldSpec)>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            version: 1,
        }
    }

    /// Reads `{ "field": { "type": "string", "optional": true, ... }, ... }`.
    pub fn from_value(value: &JsonValue) -> GuardResult<Self> {
        let fields: BTreeMap<String, FieldSpec> = serde_json::from_value(value.clone())
            .map_err(|e| GuardError::configuration(format!("invalid schema: {}", e)))?;
        if fields.contains_key(ID_FIELD) {
            return Err(GuardError::configuration(
                "schema must not declare the '_id' field",
            ));
        }
        Ok(Self { fields, version: 1 })
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Sub-schema restricted to `names`. Every name must be declared.
    pub fn pick(self: &Arc<Self>, names: &[String]) -> GuardResult<SchemaProjection> {
        let unknown: Vec<&str> = names
            .iter()
            .map(String::as_str)
            .filter(|n| !self.contains(n))
            .collect();
        if !unknown.is_empty() {
            return Err(GuardError::configuration(format!(
                "mutation fields not declared in schema: {}",
                unknown.join(", ")
            )));
        }
        Ok(SchemaProjection::new(self.clone(), names.to_vec()))
    }

    /// Full-document validation against every declared field.
    pub fn validate_document(&self, doc: &Fields) -> Result<(), ValidationError> {
        let view: BTreeMap<&str, &FieldSpec> = self.fields().collect();
        into_result("document", check_document(&view, doc))
    }

    /// Partial validation: only touched fields are checked.
    pub fn validate_modifier(&self, modifier: &Modifier) -> Result<(), ValidationError> {
        let view: BTreeMap<&str, &FieldSpec> = self.fields().collect();
        into_result("modifier", check_modifier(&view, modifier))
    }

    fn extended(&self, additions: BTreeMap<String, FieldSpec>) -> GuardResult<Schema> {
        let mut fields = self.fields.clone();
        for (name, spec) in additions {
            if name == ID_FIELD {
                return Err(GuardError::configuration(
                    "schema must not declare the '_id' field",
                ));
            }
            match fields.get(&name) {
                Some(existing) if *existing != spec => {
                    return Err(GuardError::configuration(format!(
                        "field '{}' is already declared as {} and cannot be redefined",
                        name, existing.field_type
                    )));
                }
                Some(_) => {}
                None => {
                    fields.insert(name, spec);
                }
            }
        }
        Ok(Schema {
            fields,
            version: self.version + 1,
        })
    }
}

/// Owned, versioned slot holding the collection's current schema.
#[derive(Debug)]
pub struct SchemaCell {
    current: RwLock<Arc<Schema>>,
}

impl SchemaCell {
    pub fn new(schema: Schema) -> Self {
        Self {
            current: RwLock::new(Arc::new(schema)),
        }
    }

    pub fn current(&self) -> Arc<Schema> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn version(&self) -> u64 {
        self.current().version()
    }

    /// Adds field declarations and replaces the schema in one step.
    ///
    /// Redefining an existing field with a different declaration is refused.
    pub fn extend<I, S>(&self, additions: I) -> GuardResult<Arc<Schema>>
    where
        I: IntoIterator<Item = (S, FieldSpec)>,
        S: Into<String>,
    {
        let additions: BTreeMap<String, FieldSpec> =
            additions.into_iter().map(|(k, v)| (k.into(), v)).collect();
        let mut slot = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if additions.is_empty() {
            return Ok(slot.clone());
        }
        let next = Arc::new(slot.extended(additions)?);
        *slot = next.clone();
        Ok(next)
    }
}

pub(crate) fn check_document(
    view: &BTreeMap<&str, &FieldSpec>,
    doc: &Fields,
) -> Vec<FieldViolation> {
    let mut violations = Vec::new();
    for (name, value) in doc {
        match view.get(name.as_str()) {
            Some(spec) => violations.extend(spec.check(name, value)),
            None => violations.push(FieldViolation::new(
                name.clone(),
                Rule::NotAllowed,
                "field is not allowed here",
            )),
        }
    }
    // present-but-null values were already reported by `check`
    for (name, spec) in view {
        if !spec.optional && !doc.contains_key(*name) {
            violations.push(FieldViolation::new(*name, Rule::Required, "field is required"));
        }
    }
    violations
}

pub(crate) fn check_modifier(
    view: &BTreeMap<&str, &FieldSpec>,
    modifier: &Modifier,
) -> Vec<FieldViolation> {
    let mut violations = Vec::new();
    for (name, value) in &modifier.set {
        match view.get(name.as_str()) {
            Some(spec) => violations.extend(spec.check(name, value)),
            None => violations.push(FieldViolation::new(
                name.clone(),
                Rule::NotAllowed,
                "field is not allowed here",
            )),
        }
    }
    for name in &modifier.unset {
        match view.get(name.as_str()) {
            Some(spec) if !spec.optional => violations.push(FieldViolation::new(
                name.clone(),
                Rule::Required,
                "required field cannot be unset",
            )),
            Some(_) => {}
            None => violations.push(FieldViolation::new(
                name.clone(),
                Rule::NotAllowed,
                "field is not allowed here",
            )),
        }
    }
    violations
}

fn into_result(context: &str, violations: Vec<FieldViolation>) -> Result<(), ValidationError> {
    if violations.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::new(context, violations))
    }
}
