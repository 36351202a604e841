use super::DocumentStore;
use crate::domain::document::Document;
use crate::domain::query::Query;
use crate::error::GuardResult;
use std::fmt;
use std::sync::Arc;

/// A lazily evaluated result set: a store, a collection and a query.
///
/// Cursors own their store handle, so they outlive the collection that produced them.
#[derive(Clone)]
pub struct Cursor {
    store: Arc<dyn DocumentStore>,
    collection: String,
    query: Query,
}

impl Cursor {
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<String>, query: Query) -> Self {
        Self {
            store,
            collection: collection.into(),
            query,
        }
    }

    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub async fn fetch(&self) -> GuardResult<Vec<Document>> {
        self.store.find(&self.collection, &self.query).await
    }

    /// Total matches for the selector; limit and skip do not apply.
    pub async fn count(&self) -> GuardResult<u64> {
        self.store.count(&self.collection, &self.query.selector).await
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("collection", &self.collection)
            .field("query", &self.query)
            .finish()
    }
}
