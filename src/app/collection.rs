//! The guarded collection: one store collection behind schema checks, hooks and
//! generated procedures.

use crate::app::methods::{Methods, ProcedureNames};
use crate::app::publication::{ChildDescriptor, CountRegistry, ReadChannels};
use crate::domain::document::{DocumentId, Document, Fields};
use crate::domain::hooks::{
    Hooks, InsertAfter, InsertBefore, InsertResult, RemoveAfter, RemoveBefore, RemoveOutcome,
    UpdateAfter, UpdateArgs, UpdateBefore, UpdateOutcome, UpsertAfter, UpsertBefore,
    UpsertOutcome,
};
use crate::domain::modifier::Modifier;
use crate::domain::query::{FindOptions, Query, QueryFn, QueryRegistry, Selector};
use crate::domain::query::Params;
use crate::domain::schema::{FieldSpec, Schema, SchemaCell, SchemaProjection};
use crate::error::{GuardError, GuardResult};
use crate::storage::{Cursor, DocumentStore, Origin, UpdateOptions, UpsertResult};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

/// Default param keys stripped from live-count keys.
pub const DEFAULT_PAGINATION_PARAMS: &[&str] = &["limit", "skip"];

/// Where the collection runs. Only the server publishes read channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    #[default]
    Server,
    Client,
}

pub struct GuardedCollectionBuilder {
    name: String,
    store: Arc<dyn DocumentStore>,
    schema: Option<Schema>,
    mutation_fields: Option<Vec<String>>,
    queries: Vec<(String, QueryFn)>,
    children: Vec<ChildDescriptor>,
    role: Role,
    pagination_params: Vec<String>,
}

impl GuardedCollectionBuilder {
    pub fn new(name: impl Into<String>, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            name: name.into(),
            store,
            schema: None,
            mutation_fields: None,
            queries: Vec::new(),
            children: Vec::new(),
            role: Role::Server,
            pagination_params: DEFAULT_PAGINATION_PARAMS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Ordered list of fields clients may write through the generated procedures.
    pub fn mutation_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mutation_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn query<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Params, Option<&str>) -> GuardResult<Query> + Send + Sync + 'static,
    {
        self.queries.push((name.into(), Arc::new(f)));
        self
    }

    pub fn queries<I, S>(mut self, mapping: I) -> Self
    where
        I: IntoIterator<Item = (S, QueryFn)>,
        S: Into<String>,
    {
        self.queries
            .extend(mapping.into_iter().map(|(k, f)| (k.into(), f)));
        self
    }

    pub fn child<F>(mut self, f: F) -> Self
    where
        F: Fn(&Document) -> Cursor + Send + Sync + 'static,
    {
        self.children.push(Arc::new(f));
        self
    }

    pub fn role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn pagination_params<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pagination_params = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Builds the collection in a fixed order: attach schema, deny raw writes,
    /// derive the mutation-safe projection, register procedures, then (server
    /// role only) set up read channels.
    pub fn build(self) -> GuardResult<Arc<GuardedCollection>> {
        let name = self.name.trim().to_string();
        if name.is_empty() || name.contains('.') {
            return Err(GuardError::configuration(format!(
                "invalid collection name '{}'",
                self.name
            )));
        }

        let schema = self.schema.ok_or_else(|| {
            GuardError::configuration(format!("collection '{}' has no schema", name))
        })?;
        let schema = SchemaCell::new(schema);

        self.store.deny_client_writes(&name);

        let mutation_fields = self.mutation_fields.ok_or_else(|| {
            GuardError::configuration(format!(
                "collection '{}' has no mutation-safe field list",
                name
            ))
        })?;
        schema.current().pick(&mutation_fields)?;

        let procedures = ProcedureNames::for_collection(&name);

        let queries = QueryRegistry::new();
        queries.set(self.queries);

        let counts = match self.role {
            Role::Server => Some(Arc::new(CountRegistry::new())),
            Role::Client => {
                if !self.children.is_empty() {
                    return Err(GuardError::configuration(format!(
                        "collection '{}': children need the server role",
                        name
                    )));
                }
                None
            }
        };

        info!(
            collection = %name,
            role = ?self.role,
            fields = mutation_fields.len(),
            queries = queries.names().len(),
            "guarded collection ready"
        );

        Ok(Arc::new(GuardedCollection {
            name,
            store: self.store,
            schema,
            mutation_fields: RwLock::new(mutation_fields),
            hooks: Hooks::new(),
            queries,
            procedures,
            role: self.role,
            children: RwLock::new(self.children),
            counts,
            pagination_params: self.pagination_params,
        }))
    }
}

pub struct GuardedCollection {
    name: String,
    store: Arc<dyn DocumentStore>,
    schema: SchemaCell,
    mutation_fields: RwLock<Vec<String>>,
    hooks: Hooks,
    queries: QueryRegistry,
    procedures: ProcedureNames,
    role: Role,
    children: RwLock<Vec<ChildDescriptor>>,
    counts: Option<Arc<CountRegistry>>,
    pagination_params: Vec<String>,
}

impl GuardedCollection {
    pub fn builder(name: impl Into<String>, store: Arc<dyn DocumentStore>) -> GuardedCollectionBuilder {
        GuardedCollectionBuilder::new(name, store)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn schema(&self) -> Arc<Schema> {
        self.schema.current()
    }

    /// Projection of the current schema onto the current mutation-safe fields.
    /// Derived on every call.
    pub fn mutation_safe_schema(&self) -> GuardResult<SchemaProjection> {
        let fields = self
            .mutation_fields
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        self.schema.current().pick(&fields)
    }

    pub fn mutation_fields(&self) -> Vec<String> {
        self.mutation_fields
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn extend_schema<I, S>(&self, fields: I) -> GuardResult<Arc<Schema>>
    where
        I: IntoIterator<Item = (S, FieldSpec)>,
        S: Into<String>,
    {
        let schema = self.schema.extend(fields)?;
        debug!(collection = %self.name, version = schema.version(), "schema extended");
        Ok(schema)
    }

    /// Makes more declared fields writable through the procedures.
    pub fn extend_mutation_fields<I, S>(&self, names: I) -> GuardResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let schema = self.schema.current();
        let unknown: Vec<&str> = names
            .iter()
            .map(String::as_str)
            .filter(|n| !schema.contains(n))
            .collect();
        if !unknown.is_empty() {
            return Err(GuardError::configuration(format!(
                "mutation fields not declared in schema: {}",
                unknown.join(", ")
            )));
        }
        let mut fields = self
            .mutation_fields
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for name in names {
            if !fields.contains(&name) {
                fields.push(name);
            }
        }
        Ok(())
    }

    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    pub fn queries(&self) -> &QueryRegistry {
        &self.queries
    }

    pub fn procedure_names(&self) -> &ProcedureNames {
        &self.procedures
    }

    pub fn pagination_params(&self) -> &[String] {
        &self.pagination_params
    }

    pub fn methods(&self) -> Methods<'_> {
        Methods::new(self)
    }

    /// Read channels; `None` for client-role collections.
    pub fn channels(&self) -> Option<ReadChannels<'_>> {
        let counts = self.counts.as_ref()?;
        Some(ReadChannels::new(self, counts))
    }

    pub fn counts(&self) -> Option<&Arc<CountRegistry>> {
        self.counts.as_ref()
    }

    pub fn children(&self) -> Vec<ChildDescriptor> {
        self.children
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_children(&self, children: Vec<ChildDescriptor>) -> GuardResult<()> {
        self.require_server("children")?;
        *self.children.write().unwrap_or_else(PoisonError::into_inner) = children;
        Ok(())
    }

    pub fn add_child<F>(&self, f: F) -> GuardResult<()>
    where
        F: Fn(&Document) -> Cursor + Send + Sync + 'static,
    {
        self.require_server("children")?;
        self.children
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(f));
        Ok(())
    }

    fn require_server(&self, what: &str) -> GuardResult<()> {
        match self.role {
            Role::Server => Ok(()),
            Role::Client => Err(GuardError::configuration(format!(
                "collection '{}': {} need the server role",
                self.name, what
            ))),
        }
    }

    pub fn find(&self, selector: Selector, options: FindOptions) -> Cursor {
        self.find_query(Query::new(selector, options))
    }

    pub fn find_query(&self, query: Query) -> Cursor {
        Cursor::new(self.store.clone(), self.name.clone(), query)
    }

    /// `insert.before` -> store insert -> `insert.after`.
    ///
    /// The document is checked against the full schema after the before-hooks
    /// ran. `Ok(None)` means a before-hook rejected it.
    pub async fn insert(&self, doc: Fields) -> GuardResult<Option<DocumentId>> {
        let Some(doc) = self.hooks.run(InsertBefore, doc)? else {
            return Ok(None);
        };
        self.schema
            .current()
            .validate_document(&doc)
            .map_err(|e| e.within(&self.procedures.insert))?;

        let id = self
            .store
            .insert(&self.name, doc.clone(), &Origin::Server)
            .await?;
        let payload = InsertResult {
            result: id.clone(),
            doc: Document::new(id.clone(), doc),
        };
        let result = self
            .hooks
            .run(InsertAfter, payload)?
            .map(|p| p.result)
            .unwrap_or(id);
        Ok(Some(result))
    }

    /// `update.before` -> store update -> `update.after`. Returns the affected count.
    pub async fn update(
        &self,
        selector: Selector,
        modifier: Modifier,
        options: UpdateOptions,
    ) -> GuardResult<u64> {
        let args = UpdateArgs {
            selector,
            modifier,
            options,
        };
        let Some(UpdateArgs {
            selector,
            modifier,
            options,
        }) = self.hooks.run(UpdateBefore, args)?
        else {
            return Ok(0);
        };
        self.schema
            .current()
            .validate_modifier(&modifier)
            .map_err(|e| e.within(&self.procedures.update))?;

        let result = self
            .store
            .update(&self.name, &selector, &modifier, options, &Origin::Server)
            .await?;
        let outcome = UpdateOutcome {
            result,
            selector,
            modifier,
            options,
        };
        Ok(self
            .hooks
            .run(UpdateAfter, outcome)?
            .map(|o| o.result)
            .unwrap_or(result))
    }

    /// Like [`update`](Self::update), but inserts when nothing matches.
    pub async fn upsert(
        &self,
        selector: Selector,
        modifier: Modifier,
        options: UpdateOptions,
    ) -> GuardResult<UpsertResult> {
        let args = UpdateArgs {
            selector,
            modifier,
            options,
        };
        let Some(UpdateArgs {
            selector,
            modifier,
            options,
        }) = self.hooks.run(UpsertBefore, args)?
        else {
            return Ok(UpsertResult::default());
        };
        let context = format!("{}.upsert", self.name);
        let schema = self.schema.current();
        schema
            .validate_modifier(&modifier)
            .map_err(|e| e.within(&context))?;
        if let Err(e) = selector.target_id() {
            return Err(e.within(&context).into());
        }

        // an inserted document must satisfy the whole schema, not just the touched fields
        let seed_check = |seed: &Fields| -> GuardResult<()> {
            schema
                .validate_document(seed)
                .map_err(|e| e.within(&context).into())
        };
        let result = self
            .store
            .upsert(&self.name, &selector, &modifier, options, &Origin::Server, &seed_check)
            .await?;
        let outcome = UpsertOutcome {
            result: result.clone(),
            selector,
            modifier,
            options,
        };
        Ok(self
            .hooks
            .run(UpsertAfter, outcome)?
            .map(|o| o.result)
            .unwrap_or(result))
    }

    /// `remove.before` -> store remove -> `remove.after`. Returns the removed count.
    pub async fn remove(&self, selector: Selector) -> GuardResult<u64> {
        let Some(selector) = self.hooks.run(RemoveBefore, selector)? else {
            return Ok(0);
        };
        let result = self
            .store
            .remove(&self.name, &selector, &Origin::Server)
            .await?;
        Ok(self
            .hooks
            .run(RemoveAfter, RemoveOutcome { result, selector })?
            .map(|o| o.result)
            .unwrap_or(result))
    }
}

impl fmt::Debug for GuardedCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardedCollection")
            .field("name", &self.name)
            .field("role", &self.role)
            .field("schema_version", &self.schema.version())
            .field("mutation_fields", &self.mutation_fields())
            .field("queries", &self.queries.names())
            .field("hooks", &self.hooks)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::schema::FieldType;
    use crate::error::Rule;
    use crate::storage::MemoryStore;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::new([
            ("title", FieldSpec::required(FieldType::String)),
            ("body", FieldSpec::optional(FieldType::String)),
            ("views", FieldSpec::optional(FieldType::Integer)),
        ])
    }

    fn fields(v: serde_json::Value) -> Fields {
        v.as_object().cloned().unwrap_or_default()
    }

    fn collection() -> Arc<GuardedCollection> {
        GuardedCollectionBuilder::new("posts", Arc::new(MemoryStore::new()))
            .schema(schema())
            .mutation_fields(["title", "body"])
            .build()
            .unwrap()
    }

    #[test]
    fn build_requires_schema_and_fields() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let err = GuardedCollectionBuilder::new("posts", store.clone())
            .mutation_fields(["title"])
            .build()
            .unwrap_err();
        assert!(matches!(err, GuardError::Configuration(_)));

        let err = GuardedCollectionBuilder::new("posts", store.clone())
            .schema(schema())
            .build()
            .unwrap_err();
        assert!(matches!(err, GuardError::Configuration(_)));

        let err = GuardedCollectionBuilder::new("posts", store)
            .schema(schema())
            .mutation_fields(["title", "secret"])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("secret"));
    }

    #[test]
    fn client_role_has_no_channels() {
        let c = GuardedCollectionBuilder::new("posts", Arc::new(MemoryStore::new()))
            .schema(schema())
            .mutation_fields(["title"])
            .role(Role::Client)
            .build()
            .unwrap();
        assert!(c.channels().is_none());
        assert!(c.add_child(|_| unreachable!()).is_err());
        assert_eq!(c.procedure_names().insert, "posts.insert");
    }

    #[test]
    fn projection_follows_schema_and_field_extension() {
        let c = collection();
        assert_eq!(c.mutation_safe_schema().unwrap().fields(), ["title", "body"]);

        c.extend_schema([("tags", FieldSpec::optional(FieldType::Array))])
            .unwrap();
        assert!(c.schema().contains("tags"));
        assert!(c.mutation_safe_schema().unwrap().field("tags").is_none());

        c.extend_mutation_fields(["tags"]).unwrap();
        let projection = c.mutation_safe_schema().unwrap();
        assert!(projection.field("tags").is_some());
        assert!(projection
            .validate_document(&fields(json!({"title": "t", "tags": ["a"]})))
            .is_ok());

        assert!(c.extend_mutation_fields(["nope"]).is_err());
        assert!(c
            .extend_schema([("title", FieldSpec::required(FieldType::Integer))])
            .is_err());
    }

    #[tokio::test]
    async fn insert_runs_hooks_around_the_store() {
        let c = collection();
        c.hooks().register(InsertBefore, |mut doc: Fields| {
            doc.insert("views".into(), json!(0));
            doc
        });
        let seen = Arc::new(RwLock::new(None));
        let sink = seen.clone();
        c.hooks().register(InsertAfter, move |p: InsertResult| {
            *sink.write().unwrap() = Some(p.doc.clone());
            p
        });

        let id = c
            .insert(fields(json!({"title": "hello"})))
            .await
            .unwrap()
            .unwrap();
        let stored = seen.read().unwrap().clone().unwrap();
        assert_eq!(stored.id(), &id);
        assert_eq!(stored.get("views"), Some(json!(0)));

        let docs = c.find(Selector::by_id(&id), FindOptions::default()).fetch().await.unwrap();
        assert_eq!(docs, vec![stored]);
    }

    #[tokio::test]
    async fn full_schema_is_enforced_after_before_hooks() {
        let c = collection();
        c.hooks().register(InsertBefore, |mut doc: Fields| {
            doc.insert("views".into(), json!("many"));
            doc
        });
        let err = c.insert(fields(json!({"title": "x"}))).await.unwrap_err();
        match err {
            GuardError::Validation(v) => {
                assert_eq!(v.context, "posts.insert");
                assert!(v.has("views", Rule::Type));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(c.find(Selector::all(), FindOptions::default()).count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn before_hooks_can_rewrite_and_reject() {
        let c = collection();
        let id = c.insert(fields(json!({"title": "a"}))).await.unwrap().unwrap();

        // rewrite every update to touch nothing but `body`
        c.hooks().register(UpdateBefore, |mut args: UpdateArgs| {
            args.modifier = Modifier::new().set("body", json!("rewritten"));
            args
        });
        let n = c
            .update(
                Selector::by_id(&id),
                Modifier::new().set("title", json!("b")),
                UpdateOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(n, 1);
        let doc = &c.find(Selector::by_id(&id), FindOptions::default()).fetch().await.unwrap()[0];
        assert_eq!(doc.get("title"), Some(json!("a")));
        assert_eq!(doc.get("body"), Some(json!("rewritten")));

        c.hooks().register_guard(RemoveBefore, |_sel| None);
        assert_eq!(c.remove(Selector::by_id(&id)).await.unwrap(), 0);
        assert_eq!(c.find(Selector::all(), FindOptions::default()).count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn upsert_reports_inserts() {
        let c = collection();
        let sel = Selector::eq("title", json!("t"));
        let r = c
            .upsert(sel.clone(), Modifier::new().set("body", json!("b")), UpdateOptions::default())
            .await
            .unwrap();
        assert_eq!(r.number_affected, 1);
        let inserted = r.inserted_id.unwrap();
        let doc = &c.find(Selector::by_id(&inserted), FindOptions::default()).fetch().await.unwrap()[0];
        assert_eq!(doc.get("title"), Some(json!("t")));

        let r = c
            .upsert(sel, Modifier::new().set("body", json!("c")), UpdateOptions::default())
            .await
            .unwrap();
        assert_eq!(r.inserted_id, None);
    }

    #[tokio::test]
    async fn upsert_inserts_must_satisfy_the_full_schema() {
        let c = collection();
        let pinned = DocumentId::generate();
        let err = c
            .upsert(
                Selector::by_id(&pinned),
                Modifier::new().set("body", json!("b")),
                UpdateOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(&err, GuardError::Validation(v)
            if v.context == "posts.upsert" && v.has("title", Rule::Required)));
        assert_eq!(c.find(Selector::all(), FindOptions::default()).count().await.unwrap(), 0);

        // the same modifier is fine once the selector supplies the required field
        let r = c
            .upsert(
                Selector::by_id(&pinned).and_eq("title", json!("t")),
                Modifier::new().set("body", json!("b")),
                UpdateOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(r.inserted_id, Some(pinned.clone()));

        // updates of an existing document stay partial
        let r = c
            .upsert(
                Selector::by_id(&pinned),
                Modifier::new().set("views", json!(3)),
                UpdateOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(r, UpsertResult { number_affected: 1, inserted_id: None });
    }

    #[tokio::test]
    async fn upsert_refuses_malformed_pinned_ids() {
        let c = collection();
        let err = c
            .upsert(
                Selector::by_id(&DocumentId::from_raw("not-an-id")).and_eq("title", json!("t")),
                Modifier::new().set("body", json!("b")),
                UpdateOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(&err, GuardError::Validation(v)
            if v.context == "posts.upsert" && v.has("_id", Rule::IdFormat)));
        assert_eq!(c.find(Selector::all(), FindOptions::default()).count().await.unwrap(), 0);
    }
}
