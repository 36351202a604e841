//! In-process transport: routes procedure calls and channel subscriptions to
//! registered collections by name.
//!
//! Arguments arrive as JSON, positional (`[arg0, arg1]`) or as a single bare
//! value for one-argument calls.

use crate::app::collection::GuardedCollection;
use crate::app::methods::UpdateInput;
use crate::app::publication::Publication;
use crate::domain::document::Fields;
use crate::domain::hooks::CallerContext;
use crate::domain::query::Params;
use crate::error::{FieldViolation, GuardError, GuardResult, Rule, ValidationError};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

pub mod http;

#[derive(Default)]
pub struct Server {
    collections: RwLock<BTreeMap<String, Arc<GuardedCollection>>>,
}

impl Server {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, collection: Arc<GuardedCollection>) -> GuardResult<()> {
        let mut collections = self
            .collections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if collections.contains_key(collection.name()) {
            return Err(GuardError::configuration(format!(
                "collection '{}' is already registered",
                collection.name()
            )));
        }
        info!(collection = %collection.name(), "registered with transport");
        collections.insert(collection.name().to_string(), collection);
        Ok(())
    }

    pub fn collection(&self, name: &str) -> GuardResult<Arc<GuardedCollection>> {
        self.collections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| GuardError::not_found("collection", name))
    }

    pub fn method_names(&self) -> Vec<String> {
        self.collections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .flat_map(|c| c.procedure_names().methods().map(str::to_string))
            .collect()
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.collections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|c| c.channels().is_some())
            .flat_map(|c| c.procedure_names().channels().map(str::to_string))
            .collect()
    }

    fn resolve(&self, kind: &'static str, name: &str) -> GuardResult<(Arc<GuardedCollection>, String)> {
        let (collection, op) = name
            .rsplit_once('.')
            .ok_or_else(|| GuardError::not_found(kind, name))?;
        let collection = self
            .collection(collection)
            .map_err(|_| GuardError::not_found(kind, name))?;
        Ok((collection, op.to_string()))
    }

    /// Calls `<collection>.insert|update|remove`.
    ///
    /// Returns the new id (or `null` when a hook rejected the insert), or the
    /// affected count for update and remove.
    pub async fn call(&self, name: &str, context: CallerContext, args: JsonValue) -> GuardResult<JsonValue> {
        let (collection, op) = self.resolve("method", name)?;
        let mut args = Args::new(name, args);
        debug!(method = %name, "dispatch");
        let methods = collection.methods();
        match op.as_str() {
            "insert" => {
                let doc: Fields = args.object(0, "doc")?;
                let id = methods.insert(context, doc).await?;
                Ok(id.map_or(JsonValue::Null, |id| JsonValue::String(id.to_string())))
            }
            "update" => {
                let input: UpdateInput = args.parse(0, "input")?;
                Ok(JsonValue::from(methods.update(context, input).await?))
            }
            "remove" => {
                let id = args.string(0, "_id")?;
                Ok(JsonValue::from(methods.remove(context, &id).await?))
            }
            _ => Err(GuardError::not_found("method", name)),
        }
    }

    /// Opens `<collection>.byQuery(name, params)` or `<collection>.single(id)`.
    pub async fn subscribe(&self, name: &str, context: CallerContext, args: JsonValue) -> GuardResult<Publication> {
        let (collection, op) = self.resolve("channel", name)?;
        let channels = collection
            .channels()
            .ok_or_else(|| GuardError::not_found("channel", name))?;
        let mut args = Args::new(name, args);
        debug!(channel = %name, "subscribe");
        match op.as_str() {
            "byQuery" => {
                let query = args.string(0, "name")?;
                let params: Params = if args.len() > 1 {
                    args.object(1, "params")?
                } else {
                    Params::new()
                };
                channels.by_query(context, &query, params).await
            }
            "single" => {
                let id = args.string(0, "_id")?;
                channels.single(context, &id).await
            }
            _ => Err(GuardError::not_found("channel", name)),
        }
    }
}

/// Positional JSON arguments of one call.
struct Args<'a> {
    context: &'a str,
    values: Vec<JsonValue>,
}

impl<'a> Args<'a> {
    fn new(context: &'a str, args: JsonValue) -> Self {
        let values = match args {
            JsonValue::Array(values) => values,
            JsonValue::Null => Vec::new(),
            other => vec![other],
        };
        Self { context, values }
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn fail(&self, field: &str, message: String) -> GuardError {
        ValidationError::single(self.context, FieldViolation::new(field, Rule::Argument, message)).into()
    }

    fn take(&mut self, idx: usize, field: &str) -> GuardResult<JsonValue> {
        match self.values.get_mut(idx) {
            Some(v) => Ok(v.take()),
            None => Err(self.fail(field, format!("missing argument {}", idx))),
        }
    }

    fn string(&mut self, idx: usize, field: &str) -> GuardResult<String> {
        match self.take(idx, field)? {
            JsonValue::String(s) => Ok(s),
            other => Err(self.fail(field, format!("expected a string, got {}", other))),
        }
    }

    fn object(&mut self, idx: usize, field: &str) -> GuardResult<Fields> {
        match self.take(idx, field)? {
            JsonValue::Object(map) => Ok(map),
            other => Err(self.fail(field, format!("expected an object, got {}", other))),
        }
    }

    fn parse<T: serde::de::DeserializeOwned>(&mut self, idx: usize, field: &str) -> GuardResult<T> {
        let value = self.take(idx, field)?;
        serde_json::from_value(value).map_err(|e| self.fail(field, e.to_string()))
    }
}
