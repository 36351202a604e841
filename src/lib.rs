pub mod app;
pub mod codec;
pub mod domain;
pub mod error;
pub mod infra;
pub mod storage;
pub mod transport;

// Convenience re-exports (keeps call-sites clean)
pub use app::{
    ChannelState, GuardedCollection, GuardedCollectionBuilder, Publication, PublishedSet, Role,
    UpdateInput,
};
pub use domain::document::{Document, DocumentId, Fields};
pub use domain::hooks::{CallerContext, EventKind, Hooks};
pub use domain::modifier::Modifier;
pub use domain::query::{FindOptions, Params, Query, Selector};
pub use domain::schema::{FieldSpec, FieldType, Schema};
pub use error::{GuardError, GuardResult, Rule, ValidationError};
pub use storage::{DocumentStore, MemoryStore, Origin};
pub use transport::Server;
