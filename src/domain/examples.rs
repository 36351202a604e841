//! Example collections: posts with their comments.
//!
//! Used by the demo binaries and the integration tests.

use crate::app::collection::{GuardedCollection, GuardedCollectionBuilder, DEFAULT_PAGINATION_PARAMS};
use crate::domain::document::Fields;
use crate::domain::query::{usize_param, FindOptions, Query, Selector};
use crate::domain::schema::{FieldSpec, FieldType, Schema};
use crate::error::GuardResult;
use crate::storage::DocumentStore;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Name of the paginated "every post" query.
pub const ALL_POSTS: &str = "posts.all";

pub struct PostsAndComments {
    pub posts: Arc<GuardedCollection>,
    pub comments: Arc<GuardedCollection>,
}

/// `posts {title, body}` publishing its comments as children, and
/// `comments {body, postId}` where clients may only write `body`.
pub fn posts_and_comments(store: Arc<dyn DocumentStore>) -> GuardResult<PostsAndComments> {
    let pagination = DEFAULT_PAGINATION_PARAMS.iter().map(|s| s.to_string()).collect();
    posts_and_comments_with(store, pagination)
}

/// Same as [`posts_and_comments`], with custom pagination param keys for `posts.all`.
pub fn posts_and_comments_with(
    store: Arc<dyn DocumentStore>,
    pagination: Vec<String>,
) -> GuardResult<PostsAndComments> {
    let comments = GuardedCollectionBuilder::new("comments", store.clone())
        .schema(Schema::new([
            ("body", FieldSpec::required(FieldType::String)),
            ("postId", FieldSpec::required(FieldType::Id)),
        ]))
        .mutation_fields(["body"])
        .build()?;

    let children_of = comments.clone();
    let posts = GuardedCollectionBuilder::new("posts", store)
        .schema(Schema::new([
            ("title", FieldSpec::required(FieldType::String)),
            ("body", FieldSpec::required(FieldType::String)),
        ]))
        .mutation_fields(["title", "body"])
        .pagination_params(pagination)
        .query(ALL_POSTS, |params, _caller| {
            let mut options = FindOptions::default();
            options.limit = usize_param(params, "limit");
            Ok(Query::new(Selector::all(), options))
        })
        .child(move |post| {
            children_of.find(
                Selector::eq("postId", json!(post.id().as_str())),
                FindOptions::default(),
            )
        })
        .build()?;

    Ok(PostsAndComments { posts, comments })
}

fn fields(value: serde_json::Value) -> Fields {
    value.as_object().cloned().unwrap_or_default()
}

/// Inserts `posts` posts with `comments_per_post` comments each, unless posts
/// already exist. Returns the number of posts inserted.
pub async fn seed(demo: &PostsAndComments, posts: usize, comments_per_post: usize) -> GuardResult<usize> {
    if demo.posts.find(Selector::all(), FindOptions::default().limit(1)).count().await? > 0 {
        return Ok(0);
    }
    let mut inserted = 0;
    for _ in 0..posts {
        let Some(post_id) = demo
            .posts
            .insert(fields(json!({"title": "Hello World!", "body": "I'm a post."})))
            .await?
        else {
            continue;
        };
        inserted += 1;
        for _ in 0..comments_per_post {
            demo.comments
                .insert(fields(json!({"body": "I'm a comment!", "postId": post_id.as_str()})))
                .await?;
        }
    }
    info!(posts = inserted, comments_per_post, "seeded example data");
    Ok(inserted)
}
