//! The document store seam.
//!
//! Guarded collections only talk to storage through [`DocumentStore`]. The store
//! owns durability and query execution; this crate ships [`MemoryStore`] as the
//! reference implementation.

use crate::domain::document::{Document, DocumentId, Fields};
use crate::domain::hooks::CallerContext;
use crate::domain::modifier::Modifier;
use crate::domain::query::{Query, Selector};
use crate::error::GuardResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

pub mod cursor;
pub mod memory;

pub use cursor::Cursor;
pub use memory::MemoryStore;

/// Where a write comes from.
///
/// `Server` writes are issued by guarded collections on behalf of their generated
/// procedures. `Client` writes come straight from a caller and are refused on any
/// collection that denies client writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Server,
    Client(CallerContext),
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Update every match instead of the first one.
    #[serde(default)]
    pub multi: bool,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertResult {
    pub number_affected: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inserted_id: Option<DocumentId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Inserted,
    Updated,
    Removed,
}

/// One committed single-document change, broadcast to watchers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub collection: String,
    pub id: DocumentId,
    pub kind: ChangeKind,
}

/// Vets the document an upsert is about to create, before it is stored.
pub type SeedCheck<'a> = dyn Fn(&Fields) -> GuardResult<()> + Send + Sync + 'a;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Inserts a document and returns the id the store assigned.
    async fn insert(&self, collection: &str, doc: Fields, origin: &Origin) -> GuardResult<DocumentId>;

    /// Returns the number of documents changed or matched (0 or 1 unless `multi`).
    async fn update(
        &self,
        collection: &str,
        selector: &Selector,
        modifier: &Modifier,
        options: UpdateOptions,
        origin: &Origin,
    ) -> GuardResult<u64>;

    /// Updates like [`update`](Self::update); when nothing matches, inserts the
    /// selector's upsert seed once `seed_check` accepts it.
    async fn upsert(
        &self,
        collection: &str,
        selector: &Selector,
        modifier: &Modifier,
        options: UpdateOptions,
        origin: &Origin,
        seed_check: &SeedCheck<'_>,
    ) -> GuardResult<UpsertResult>;

    async fn remove(&self, collection: &str, selector: &Selector, origin: &Origin) -> GuardResult<u64>;

    async fn find(&self, collection: &str, query: &Query) -> GuardResult<Vec<Document>>;

    /// Number of matches for `selector`, ignoring any pagination.
    async fn count(&self, collection: &str, selector: &Selector) -> GuardResult<u64>;

    /// From now on, refuse `Origin::Client` writes to `collection`.
    fn deny_client_writes(&self, collection: &str);

    fn watch(&self) -> broadcast::Receiver<ChangeEvent>;
}
