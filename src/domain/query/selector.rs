use crate::domain::document::{Document, DocumentId, Fields, ID_FIELD};
use crate::domain::modifier::Modifier;
use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::cmp::Ordering;

/// Document filter in the store's read path.
///
/// Each entry is either `field: value` (equality) or `field: { "$op": arg, ... }`.
/// Supported operators: `$eq $ne $in $nin $gt $gte $lt $lte $exists`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Selector(Map<String, JsonValue>);

impl Selector {
    /// Matches every document.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_id(id: &DocumentId) -> Self {
        Self::all().and_eq(ID_FIELD, JsonValue::String(id.as_str().to_string()))
    }

    pub fn eq(field: impl Into<String>, value: JsonValue) -> Self {
        Self::all().and_eq(field, value)
    }

    pub fn and_eq(mut self, field: impl Into<String>, value: JsonValue) -> Self {
        self.0.insert(field.into(), value);
        self
    }

    pub fn and(mut self, field: impl Into<String>, condition: JsonValue) -> Self {
        self.0.insert(field.into(), condition);
        self
    }

    pub fn from_map(map: Map<String, JsonValue>) -> Self {
        Self(map)
    }

    pub fn as_map(&self) -> &Map<String, JsonValue> {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The id this selector pins, if it is a plain `_id` equality. A pinned id
    /// must be well formed.
    pub fn target_id(&self) -> Result<Option<DocumentId>, ValidationError> {
        match self.0.get(ID_FIELD).and_then(JsonValue::as_str) {
            Some(raw) => DocumentId::parse(raw).map(Some),
            None => Ok(None),
        }
    }

    /// The document an upsert creates when nothing matches: the equality fields
    /// with `modifier` applied, under the pinned id or a fresh one.
    pub fn upsert_seed(&self, modifier: &Modifier) -> Result<(DocumentId, Fields), ValidationError> {
        let id = self.target_id()?.unwrap_or_else(DocumentId::generate);
        let mut fields: Fields = self
            .equality_fields()
            .filter(|(k, _)| k.as_str() != ID_FIELD)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        modifier.apply(&mut fields);
        Ok((id, fields))
    }

    /// Plain equality entries, used to seed upserted documents.
    pub fn equality_fields(&self) -> impl Iterator<Item = (&String, &JsonValue)> {
        self.0.iter().filter(|(_, v)| !is_operator_object(v))
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.0.iter().all(|(field, cond)| {
            let value = doc.get(field);
            match cond {
                JsonValue::Object(ops) if is_operator_object(cond) => ops
                    .iter()
                    .all(|(op, arg)| apply_operator(op, arg, value.as_ref())),
                _ => value.as_ref() == Some(cond),
            }
        })
    }
}

fn is_operator_object(v: &JsonValue) -> bool {
    v.as_object()
        .map(|o| !o.is_empty() && o.keys().all(|k| k.starts_with('$')))
        .unwrap_or(false)
}

fn apply_operator(op: &str, arg: &JsonValue, value: Option<&JsonValue>) -> bool {
    match op {
        "$eq" => value == Some(arg),
        "$ne" => value != Some(arg),
        "$in" => arg
            .as_array()
            .map(|items| value.map(|v| items.contains(v)).unwrap_or(false))
            .unwrap_or(false),
        "$nin" => arg
            .as_array()
            .map(|items| value.map(|v| !items.contains(v)).unwrap_or(true))
            .unwrap_or(false),
        "$gt" => compare(value, arg) == Some(Ordering::Greater),
        "$gte" => matches!(compare(value, arg), Some(Ordering::Greater | Ordering::Equal)),
        "$lt" => compare(value, arg) == Some(Ordering::Less),
        "$lte" => matches!(compare(value, arg), Some(Ordering::Less | Ordering::Equal)),
        "$exists" => {
            let wanted = arg.as_bool().unwrap_or(true);
            value.map(|v| !v.is_null()).unwrap_or(false) == wanted
        }
        // unknown operators never match
        _ => false,
    }
}

/// Ordering between two scalar JSON values of the same kind.
pub(crate) fn compare(a: Option<&JsonValue>, b: &JsonValue) -> Option<Ordering> {
    match (a?, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (JsonValue::String(x), JsonValue::String(y)) => Some(x.cmp(y)),
        (JsonValue::Bool(x), JsonValue::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, v: JsonValue) -> Document {
        Document::new(DocumentId::from_raw(id), v.as_object().cloned().unwrap_or_default())
    }

    #[test]
    fn equality_and_id() {
        let d = doc("abc", json!({"postId": "p1", "n": 3}));
        assert!(Selector::all().matches(&d));
        assert!(Selector::eq("postId", json!("p1")).matches(&d));
        assert!(!Selector::eq("postId", json!("p2")).matches(&d));
        assert!(Selector::by_id(&DocumentId::from_raw("abc")).matches(&d));
        assert!(!Selector::by_id(&DocumentId::from_raw("abd")).matches(&d));
    }

    #[test]
    fn operators() {
        let d = doc("abc", json!({"n": 3, "tag": "a"}));
        assert!(Selector::all().and("n", json!({"$gt": 2, "$lte": 3})).matches(&d));
        assert!(!Selector::all().and("n", json!({"$lt": 3})).matches(&d));
        assert!(Selector::all().and("tag", json!({"$in": ["a", "b"]})).matches(&d));
        assert!(Selector::all().and("tag", json!({"$nin": ["c"]})).matches(&d));
        assert!(Selector::all().and("missing", json!({"$exists": false})).matches(&d));
        assert!(!Selector::all().and("n", json!({"$ne": 3})).matches(&d));
        assert!(!Selector::all().and("n", json!({"$regex": "3"})).matches(&d));
    }

    #[test]
    fn nested_objects_without_operators_compare_by_equality() {
        let d = doc("abc", json!({"meta": {"a": 1}}));
        assert!(Selector::eq("meta", json!({"a": 1})).matches(&d));
        let sel = Selector::eq("meta", json!({"a": 1})).and("x", json!({"$exists": false}));
        assert_eq!(sel.equality_fields().count(), 1);
    }

    #[test]
    fn upsert_seed_takes_equalities_and_set_fields() {
        let id = DocumentId::generate();
        let sel = Selector::by_id(&id)
            .and_eq("postId", json!("p1"))
            .and("n", json!({"$gt": 3}));
        let (seed_id, fields) = sel
            .upsert_seed(&Modifier::new().set("body", json!("b")))
            .unwrap();
        assert_eq!(seed_id, id);
        assert_eq!(JsonValue::Object(fields), json!({"postId": "p1", "body": "b"}));

        let (_, fields) = Selector::all().upsert_seed(&Modifier::new()).unwrap();
        assert!(fields.is_empty());
    }

    #[test]
    fn malformed_pinned_ids_are_rejected() {
        let sel = Selector::by_id(&DocumentId::from_raw("not-an-id"));
        let err = sel.target_id().unwrap_err();
        assert!(err.has(ID_FIELD, crate::error::Rule::IdFormat));
        assert!(sel.upsert_seed(&Modifier::new()).is_err());
        assert_eq!(Selector::eq("title", json!("t")).target_id().unwrap(), None);
    }
}
