use super::{check_document, check_modifier, into_result, FieldSpec, Schema};
use crate::domain::document::Fields;
use crate::domain::modifier::Modifier;
use crate::error::ValidationError;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::sync::Arc;

/// The part of a schema clients may write through the generated procedures.
///
/// Built from a snapshot of the live schema each time it is requested, never cached.
#[derive(Debug, Clone)]
pub struct SchemaProjection {
    schema: Arc<Schema>,
    fields: Vec<String>,
}

impl SchemaProjection {
    pub(crate) fn new(schema: Arc<Schema>, fields: Vec<String>) -> Self {
        Self { schema, fields }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn schema_version(&self) -> u64 {
        self.schema.version()
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        if self.fields.iter().any(|f| f == name) {
            self.schema.field(name)
        } else {
            None
        }
    }

    fn view(&self) -> BTreeMap<&str, &FieldSpec> {
        self.fields
            .iter()
            .filter_map(|f| self.schema.field(f).map(|spec| (f.as_str(), spec)))
            .collect()
    }

    /// Accepts exactly the projected fields, each satisfying its declaration.
    pub fn validate_document(&self, doc: &Fields) -> Result<(), ValidationError> {
        into_result("document", check_document(&self.view(), doc))
    }

    /// "Partial update" mode: untouched fields are not required.
    pub fn validate_modifier(&self, modifier: &Modifier) -> Result<(), ValidationError> {
        into_result("modifier", check_modifier(&self.view(), modifier))
    }
}

// Serialized in projection order, for form renderers.
impl Serialize for SchemaProjection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let view: Vec<(&str, &FieldSpec)> = self
            .fields
            .iter()
            .filter_map(|f| self.schema.field(f).map(|spec| (f.as_str(), spec)))
            .collect();
        let mut map = serializer.serialize_map(Some(view.len()))?;
        for (name, spec) in view {
            map.serialize_entry(name, spec)?;
        }
        map.end()
    }
}
