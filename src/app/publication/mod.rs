//! Read channels: `<collection>.byQuery` and `<collection>.single`.
//!
//! Clients name a registered query and pass params; they never send selectors.
//! Arguments are validated before any hook or store code runs, and a hook
//! rejection closes the channel with an empty result instead of failing.

use crate::app::collection::GuardedCollection;
use crate::domain::document::{Document, DocumentId};
use crate::domain::hooks::{ByQueryRequest, CallerContext, PublishByQuery, PublishSingle, SingleRequest};
use crate::domain::query::{FindOptions, Params, Selector};
use crate::error::{FieldViolation, GuardResult, Rule, ValidationError};
use crate::storage::Cursor;
use std::sync::Arc;
use tracing::debug;

pub mod channel;
pub mod count;

pub use channel::{ChannelState, ChannelUpdate, PublishedSet, Publication};
pub use count::{count_key, CountRegistry, LiveCount};

/// Dependent result set of one parent document.
pub type ChildDescriptor = Arc<dyn Fn(&Document) -> Cursor + Send + Sync>;

pub struct ReadChannels<'a> {
    collection: &'a GuardedCollection,
    counts: &'a Arc<CountRegistry>,
}

impl<'a> ReadChannels<'a> {
    pub(crate) fn new(collection: &'a GuardedCollection, counts: &'a Arc<CountRegistry>) -> Self {
        Self { collection, counts }
    }

    /// Opens `byQuery(name, params)`: the query's documents, their children and
    /// a live count of every match (pagination ignored).
    pub async fn by_query(
        &self,
        context: CallerContext,
        name: &str,
        params: Params,
    ) -> GuardResult<Publication> {
        let channel = self.collection.procedure_names().by_query.clone();
        let mut publication = Publication::opening(channel.clone());
        if name.trim().is_empty() {
            return Err(ValidationError::single(
                channel,
                FieldViolation::new("name", Rule::Argument, "query name must be a non-empty string"),
            )
            .into());
        }

        let request = ByQueryRequest {
            context,
            name: name.to_string(),
            params,
        };
        let request = match self.collection.hooks().run(PublishByQuery, request)? {
            Some(request) if !request.name.trim().is_empty() => request,
            _ => {
                publication.reject();
                return Ok(publication);
            }
        };

        let query_fn = self.collection.queries().get(&request.name)?;
        let query = query_fn(&request.params, request.context.caller_id())?;
        debug!(channel = %channel, query = %request.name, selector = ?query.selector, options = ?query.options, "resolved");

        let store = self.collection.store().clone();
        let changes = store.watch();
        let key = count_key(
            self.collection.name(),
            &request.name,
            &request.params,
            self.collection.pagination_params(),
        );
        let count = self
            .counts
            .acquire(key, store, self.collection.name(), query.selector.clone())
            .await?;

        publication.publish(
            self.collection.find_query(query),
            self.collection.children(),
            Some(count),
            changes,
        );
        Ok(publication)
    }

    /// Opens `single(id)`: one document plus its children.
    pub async fn single(&self, context: CallerContext, id: &str) -> GuardResult<Publication> {
        let channel = self.collection.procedure_names().single.clone();
        let mut publication = Publication::opening(channel.clone());
        let id = DocumentId::parse(id).map_err(|e| e.within(&channel))?;

        let Some(request) = self
            .collection
            .hooks()
            .run(PublishSingle, SingleRequest { context, id })?
        else {
            publication.reject();
            return Ok(publication);
        };

        let changes = self.collection.store().watch();
        publication.publish(
            self.collection
                .find(Selector::by_id(&request.id), FindOptions::default().limit(1)),
            self.collection.children(),
            None,
            changes,
        );
        Ok(publication)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::collection::GuardedCollectionBuilder;
    use crate::domain::query::{usize_param, Query};
    use crate::domain::schema::{FieldSpec, FieldType, Schema};
    use crate::error::GuardError;
    use crate::storage::{DocumentStore, MemoryStore};
    use serde_json::json;

    fn posts(store: Arc<dyn DocumentStore>) -> Arc<GuardedCollection> {
        GuardedCollectionBuilder::new("posts", store)
            .schema(Schema::new([("title", FieldSpec::required(FieldType::String))]))
            .mutation_fields(["title"])
            .query("all", |params, _caller| {
                let mut options = FindOptions::default();
                options.limit = usize_param(params, "limit");
                Ok(Query::new(Selector::all(), options))
            })
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn malformed_arguments_never_reach_the_store() {
        let c = posts(Arc::new(MemoryStore::new()));
        let channels = c.channels().unwrap();

        let err = channels
            .by_query(CallerContext::anonymous(), " ", Params::new())
            .await
            .unwrap_err();
        assert!(matches!(&err, GuardError::Validation(v) if v.has("name", Rule::Argument)));

        let err = channels
            .single(CallerContext::anonymous(), "short")
            .await
            .unwrap_err();
        assert!(matches!(&err, GuardError::Validation(v) if v.context == "posts.single"));

        let err = channels
            .by_query(CallerContext::anonymous(), "missing", Params::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GuardError::NotFound { kind: "query", .. }));
        assert_eq!(c.counts().unwrap().active(), 0);
    }

    #[tokio::test]
    async fn hooks_may_rewrite_the_request() {
        let c = posts(Arc::new(MemoryStore::new()));
        for i in 0..3 {
            c.insert(json!({"title": format!("p{i}")}).as_object().cloned().unwrap())
                .await
                .unwrap();
        }
        // cap page size server-side
        c.hooks().register(PublishByQuery, |mut req: ByQueryRequest| {
            req.params.insert("limit".into(), json!(1));
            req
        });
        let mut params = Params::new();
        params.insert("limit".into(), json!(50));
        let mut channel = c
            .channels()
            .unwrap()
            .by_query(CallerContext::anonymous(), "all", params)
            .await
            .unwrap();
        let set = channel.snapshot().await.unwrap();
        assert_eq!(set.collection("posts").len(), 1);
        assert_eq!(set.count, Some(3));
        assert_eq!(channel.state(), ChannelState::Publishing);

        channel.close();
        assert_eq!(channel.state(), ChannelState::Closed);
        assert!(channel.snapshot().await.unwrap().is_empty());
        assert!(channel.next_change().await.is_none());
    }

    #[tokio::test]
    async fn rejected_by_query_publishes_nothing_and_tracks_no_count() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let denied = posts(store.clone());
        denied
            .insert(json!({"title": "p"}).as_object().cloned().unwrap())
            .await
            .unwrap();
        denied
            .hooks()
            .register_guard(PublishByQuery, |_req: ByQueryRequest| None);

        let blanked = GuardedCollectionBuilder::new("drafts", store)
            .schema(Schema::new([("title", FieldSpec::required(FieldType::String))]))
            .mutation_fields(["title"])
            .query("all", |_params, _caller| Ok(Query::new(Selector::all(), FindOptions::default())))
            .build()
            .unwrap();
        blanked
            .insert(json!({"title": "d"}).as_object().cloned().unwrap())
            .await
            .unwrap();
        blanked.hooks().register(PublishByQuery, |mut req: ByQueryRequest| {
            req.name.clear();
            req
        });

        for c in [&denied, &blanked] {
            let mut channel = c
                .channels()
                .unwrap()
                .by_query(CallerContext::user("u1"), "all", Params::new())
                .await
                .unwrap();
            assert_eq!(channel.state(), ChannelState::Closed);
            assert!(channel.live_count().is_none());
            let set = channel.snapshot().await.unwrap();
            assert!(set.is_empty());
            assert_eq!(set.count, None);
            assert!(channel.next_change().await.is_none());
            assert_eq!(c.counts().unwrap().active(), 0);
        }
    }
}
