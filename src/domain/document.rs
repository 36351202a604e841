//! Documents and their identifiers.

use crate::error::{FieldViolation, Rule, ValidationError};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;

/// Field map of a document, without its identifier.
pub type Fields = Map<String, JsonValue>;

/// Name of the identifier field in serialized documents and selectors.
pub const ID_FIELD: &str = "_id";

const ID_ALPHABET: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTWXYZabcdefghijkmnopqrstuvwxyz";
const ID_LEN: usize = 17;

/// Store-assigned document identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Random 17-character id drawn from the unambiguous alphabet.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let id: String = (0..ID_LEN)
            .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
            .collect();
        DocumentId(id)
    }

    /// Parses untrusted input. Only ids in the generated format are accepted.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        if Self::is_valid(raw) {
            Ok(DocumentId(raw.to_string()))
        } else {
            Err(ValidationError::single(
                "id",
                FieldViolation::new(
                    ID_FIELD,
                    Rule::IdFormat,
                    format!(
                        "expected {} characters from the id alphabet, got {:?}",
                        ID_LEN, raw
                    ),
                ),
            ))
        }
    }

    pub fn is_valid(raw: &str) -> bool {
        raw.len() == ID_LEN && raw.bytes().all(|b| ID_ALPHABET.contains(&b))
    }

    /// Wraps a trusted, server-chosen id without format checks (e.g. upsert selectors).
    pub fn from_raw(raw: impl Into<String>) -> Self {
        DocumentId(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A stored document. Serializes flat, with the id under `_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "_id")]
    id: DocumentId,
    #[serde(flatten)]
    fields: Fields,
}

impl Document {
    pub fn new(id: DocumentId, mut fields: Fields) -> Self {
        fields.remove(ID_FIELD);
        Self { id, fields }
    }

    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut Fields {
        &mut self.fields
    }

    /// Field lookup; `_id` resolves to the identifier.
    pub fn get(&self, field: &str) -> Option<JsonValue> {
        if field == ID_FIELD {
            return Some(JsonValue::String(self.id.0.clone()));
        }
        self.fields.get(field).cloned()
    }

    pub fn into_value(self) -> JsonValue {
        let mut map = self.fields;
        map.insert(ID_FIELD.to_string(), JsonValue::String(self.id.0));
        JsonValue::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn generated_ids_are_valid() {
        for _ in 0..100 {
            let id = DocumentId::generate();
            assert!(DocumentId::is_valid(id.as_str()), "{id}");
        }
        assert_ne!(DocumentId::generate(), DocumentId::generate());
    }

    #[test]
    fn parse_rejects_malformed_ids() {
        assert!(DocumentId::parse("").is_err());
        assert!(DocumentId::parse("short").is_err());
        // 'l', '0', '1' and 'O' are not in the alphabet
        assert!(DocumentId::parse("l0O1aaaaaaaaaaaaa").is_err());
        let err = DocumentId::parse("document_id").unwrap_err();
        assert!(err.has(ID_FIELD, Rule::IdFormat));
        assert!(DocumentId::parse("aaaaaaaaaaaaaaaaa").is_ok());
    }

    #[test]
    fn document_serializes_flat() {
        let mut fields = Fields::new();
        fields.insert("title".into(), json!("Hello"));
        fields.insert("_id".into(), json!("ignored"));
        let doc = Document::new(DocumentId::from_raw("abc"), fields);
        assert_eq!(
            serde_json::to_value(&doc).unwrap(),
            json!({"_id": "abc", "title": "Hello"})
        );
        assert_eq!(doc.get("_id"), Some(json!("abc")));
        let back: Document = serde_json::from_value(json!({"_id": "abc", "title": "Hello"})).unwrap();
        assert_eq!(back, doc);
    }
}
