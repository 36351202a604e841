//! Generated remote procedures: `<collection>.insert`, `.update`, `.remove`.
//!
//! Each call runs validate -> `methods.*` hook -> collection operation. Input
//! is checked against the mutation-safe projection before any hook or store
//! code runs.

use crate::app::collection::GuardedCollection;
use crate::domain::document::{DocumentId, Fields};
use crate::domain::hooks::{
    CallerContext, InsertCall, MethodsInsert, MethodsRemove, MethodsUpdate, RemoveCall, UpdateCall,
};
use crate::domain::modifier::Modifier;
use crate::domain::query::Selector;
use crate::error::GuardResult;
use crate::storage::UpdateOptions;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

/// Transport-facing names of a collection's procedures and channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcedureNames {
    pub insert: String,
    pub update: String,
    pub remove: String,
    pub by_query: String,
    pub single: String,
}

impl ProcedureNames {
    pub fn for_collection(name: &str) -> Self {
        Self {
            insert: format!("{}.insert", name),
            update: format!("{}.update", name),
            remove: format!("{}.remove", name),
            by_query: format!("{}.byQuery", name),
            single: format!("{}.single", name),
        }
    }

    pub fn methods(&self) -> [&str; 3] {
        [&self.insert, &self.update, &self.remove]
    }

    pub fn channels(&self) -> [&str; 2] {
        [&self.by_query, &self.single]
    }
}

/// Argument of the update procedure: `{ "_id": ..., "modifier": { "$set": ... } }`.
///
/// Both parts arrive untyped and are validated by [`Methods::update`].
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UpdateInput {
    #[serde(rename = "_id")]
    pub id: String,
    pub modifier: JsonValue,
}

impl UpdateInput {
    pub fn new(id: &DocumentId, modifier: &Modifier) -> Self {
        Self {
            id: id.to_string(),
            modifier: serde_json::to_value(modifier).unwrap_or(JsonValue::Null),
        }
    }
}

pub struct Methods<'a> {
    collection: &'a GuardedCollection,
}

impl<'a> Methods<'a> {
    pub(crate) fn new(collection: &'a GuardedCollection) -> Self {
        Self { collection }
    }

    /// Returns the new id, or `None` when a hook rejected the call.
    pub async fn insert(&self, context: CallerContext, doc: Fields) -> GuardResult<Option<DocumentId>> {
        let names = self.collection.procedure_names();
        self.collection
            .mutation_safe_schema()?
            .validate_document(&doc)
            .map_err(|e| e.within(&names.insert))?;

        let Some(call) = self
            .collection
            .hooks()
            .run(MethodsInsert, InsertCall { context, doc })?
        else {
            warn!(method = %names.insert, "rejected by hook");
            return Ok(None);
        };
        debug!(method = %names.insert, caller = call.context.caller_id().unwrap_or("-"), "calling");
        self.collection.insert(call.doc).await
    }

    /// Returns the number of documents updated (0 or 1).
    pub async fn update(&self, context: CallerContext, input: UpdateInput) -> GuardResult<u64> {
        let names = self.collection.procedure_names();
        let id = DocumentId::parse(&input.id).map_err(|e| e.within(&names.update))?;
        let modifier = Modifier::from_value(&input.modifier).map_err(|e| e.within(&names.update))?;
        self.collection
            .mutation_safe_schema()?
            .validate_modifier(&modifier)
            .map_err(|e| e.within(&names.update))?;

        let Some(call) = self.collection.hooks().run(
            MethodsUpdate,
            UpdateCall {
                context,
                id,
                modifier,
            },
        )?
        else {
            warn!(method = %names.update, "rejected by hook");
            return Ok(0);
        };
        debug!(method = %names.update, id = %call.id, "calling");
        self.collection
            .update(Selector::by_id(&call.id), call.modifier, UpdateOptions::default())
            .await
    }

    /// Returns the number of documents removed (0 or 1).
    pub async fn remove(&self, context: CallerContext, id: &str) -> GuardResult<u64> {
        let names = self.collection.procedure_names();
        let id = DocumentId::parse(id).map_err(|e| e.within(&names.remove))?;

        let Some(call) = self
            .collection
            .hooks()
            .run(MethodsRemove, RemoveCall { context, id })?
        else {
            warn!(method = %names.remove, "rejected by hook");
            return Ok(0);
        };
        debug!(method = %names.remove, id = %call.id, "calling");
        self.collection.remove(Selector::by_id(&call.id)).await
    }
}
