//! In-memory reference store.
//!
//! Each collection is an insertion-ordered `Vec<Document>` behind one lock, so
//! every single-document write is atomic. Committed changes are broadcast to
//! watchers after the lock is released.

use super::{ChangeEvent, ChangeKind, DocumentStore, Origin, SeedCheck, UpdateOptions, UpsertResult};
use crate::domain::document::{Document, DocumentId, Fields, ID_FIELD};
use crate::domain::modifier::Modifier;
use crate::domain::query::{Query, Selector};
use crate::error::{FieldViolation, GuardError, GuardResult, Rule, ValidationError};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, warn};

const CHANGE_FEED_CAPACITY: usize = 1024;

pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
    denied: RwLock<HashSet<String>>,
    changes: broadcast::Sender<ChangeEvent>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            collections: RwLock::new(HashMap::new()),
            denied: RwLock::new(HashSet::new()),
            changes,
        }
    }

    fn check_origin(&self, collection: &str, origin: &Origin, op: &str) -> GuardResult<()> {
        if let Origin::Client(ctx) = origin {
            let denied = self
                .denied
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .contains(collection);
            if denied {
                warn!(
                    collection,
                    op,
                    caller = ctx.caller_id().unwrap_or("-"),
                    "refused direct client write"
                );
                return Err(GuardError::Authorization(format!(
                    "direct {} on '{}' is not allowed; use the collection's methods",
                    op, collection
                )));
            }
        }
        Ok(())
    }

    fn publish(&self, events: Vec<ChangeEvent>) {
        for event in events {
            // no receivers is fine
            let _ = self.changes.send(event);
        }
    }

    fn event(collection: &str, id: &DocumentId, kind: ChangeKind) -> ChangeEvent {
        ChangeEvent {
            collection: collection.to_string(),
            id: id.clone(),
            kind,
        }
    }

    /// Applies `modifier` to the first (or every, with `multi`) match. Returns matched count.
    fn apply_update(
        docs: &mut [Document],
        collection: &str,
        selector: &Selector,
        modifier: &Modifier,
        options: UpdateOptions,
        events: &mut Vec<ChangeEvent>,
    ) -> u64 {
        let mut matched = 0;
        for doc in docs.iter_mut().filter(|d| selector.matches(d)) {
            matched += 1;
            if modifier.apply(doc.fields_mut()) {
                events.push(Self::event(collection, doc.id(), ChangeKind::Updated));
            }
            if !options.multi {
                break;
            }
        }
        matched
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(&self, collection: &str, doc: Fields, origin: &Origin) -> GuardResult<DocumentId> {
        self.check_origin(collection, origin, "insert")?;
        let id = {
            let mut collections = self
                .collections
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let docs = collections.entry(collection.to_string()).or_default();
            let mut id = DocumentId::generate();
            while docs.iter().any(|d| d.id() == &id) {
                id = DocumentId::generate();
            }
            docs.push(Document::new(id.clone(), doc));
            id
        };
        debug!(collection, id = %id, "inserted");
        self.publish(vec![Self::event(collection, &id, ChangeKind::Inserted)]);
        Ok(id)
    }

    async fn update(
        &self,
        collection: &str,
        selector: &Selector,
        modifier: &Modifier,
        options: UpdateOptions,
        origin: &Origin,
    ) -> GuardResult<u64> {
        self.check_origin(collection, origin, "update")?;
        let mut events = Vec::new();
        let matched = {
            let mut collections = self
                .collections
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            match collections.get_mut(collection) {
                Some(docs) => {
                    Self::apply_update(docs, collection, selector, modifier, options, &mut events)
                }
                None => 0,
            }
        };
        self.publish(events);
        Ok(matched)
    }

    async fn upsert(
        &self,
        collection: &str,
        selector: &Selector,
        modifier: &Modifier,
        options: UpdateOptions,
        origin: &Origin,
        seed_check: &SeedCheck<'_>,
    ) -> GuardResult<UpsertResult> {
        self.check_origin(collection, origin, "upsert")?;
        let mut events = Vec::new();
        let result = {
            let mut collections = self
                .collections
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let docs = collections.entry(collection.to_string()).or_default();
            let matched =
                Self::apply_update(docs, collection, selector, modifier, options, &mut events);
            if matched > 0 {
                UpsertResult {
                    number_affected: matched,
                    inserted_id: None,
                }
            } else {
                let (id, fields) = selector.upsert_seed(modifier)?;
                seed_check(&fields)?;
                if docs.iter().any(|d| d.id() == &id) {
                    return Err(ValidationError::single(
                        format!("{}.upsert", collection),
                        FieldViolation::new(ID_FIELD, Rule::IdFormat, format!("id {} is already taken", id)),
                    )
                    .into());
                }
                docs.push(Document::new(id.clone(), fields));
                events.push(Self::event(collection, &id, ChangeKind::Inserted));
                UpsertResult {
                    number_affected: 1,
                    inserted_id: Some(id),
                }
            }
        };
        self.publish(events);
        Ok(result)
    }

    async fn remove(&self, collection: &str, selector: &Selector, origin: &Origin) -> GuardResult<u64> {
        self.check_origin(collection, origin, "remove")?;
        let mut events = Vec::new();
        {
            let mut collections = self
                .collections
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(docs) = collections.get_mut(collection) {
                docs.retain(|d| {
                    if selector.matches(d) {
                        events.push(Self::event(collection, d.id(), ChangeKind::Removed));
                        false
                    } else {
                        true
                    }
                });
            }
        }
        let removed = events.len() as u64;
        self.publish(events);
        Ok(removed)
    }

    async fn find(&self, collection: &str, query: &Query) -> GuardResult<Vec<Document>> {
        let mut out: Vec<Document> = {
            let collections = self
                .collections
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            collections
                .get(collection)
                .map(|docs| {
                    docs.iter()
                        .filter(|d| query.selector.matches(d))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        };
        query.options.apply(&mut out);
        Ok(out)
    }

    async fn count(&self, collection: &str, selector: &Selector) -> GuardResult<u64> {
        let collections = self
            .collections
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(collections
            .get(collection)
            .map(|docs| docs.iter().filter(|d| selector.matches(d)).count() as u64)
            .unwrap_or(0))
    }

    fn deny_client_writes(&self, collection: &str) {
        self.denied
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(collection.to_string());
    }

    fn watch(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }
}
