//! End-to-end behaviour of a guarded collection over the in-memory store:
//! procedures, hooks, read channels, children and live counts.

use guarded_collection::app::publication::count_key;
use guarded_collection::domain::examples::{posts_and_comments, seed, ALL_POSTS};
use guarded_collection::domain::hooks::{
    InsertCall, MethodsInsert, PublishSingle, SingleRequest, UpdateAfter, UpdateOutcome,
};
use guarded_collection::domain::query::usize_param;
use guarded_collection::{
    CallerContext, ChannelState, DocumentId, DocumentStore, FieldSpec, FieldType, Fields,
    FindOptions, GuardError, GuardedCollection, GuardedCollectionBuilder, MemoryStore, Modifier,
    Origin, Params, Query, Schema, Selector, UpdateInput,
};
use serde_json::{json, Value as JsonValue};
use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type TestResult = Result<(), Box<dyn Error>>;

fn fields(v: JsonValue) -> Fields {
    v.as_object().cloned().unwrap_or_default()
}

fn params(v: JsonValue) -> Params {
    v.as_object().cloned().unwrap_or_default()
}

fn docs_collection(store: Arc<dyn DocumentStore>) -> Arc<GuardedCollection> {
    GuardedCollectionBuilder::new("docs", store)
        .schema(Schema::new([
            ("field1", FieldSpec::required(FieldType::Boolean)),
            ("tag", FieldSpec::optional(FieldType::String)),
        ]))
        .mutation_fields(["field1", "tag"])
        .query("all", |params, _caller| {
            let mut options = FindOptions::default();
            options.limit = usize_param(params, "limit");
            Ok(Query::new(Selector::all(), options))
        })
        .query("tagged", |params, _caller| {
            let tag = params.get("tag").cloned().unwrap_or(JsonValue::Null);
            let mut options = FindOptions::default();
            options.limit = usize_param(params, "limit");
            Ok(Query::new(Selector::eq("tag", tag), options))
        })
        .build()
        .expect("valid collection")
}

async fn insert_many(c: &GuardedCollection, n: usize, tag: &str) -> TestResult {
    for _ in 0..n {
        c.methods()
            .insert(CallerContext::anonymous(), fields(json!({"field1": true, "tag": tag})))
            .await?;
    }
    Ok(())
}

#[tokio::test]
async fn insert_then_single_returns_the_document() -> TestResult {
    let c = docs_collection(Arc::new(MemoryStore::new()));
    let id = c
        .methods()
        .insert(CallerContext::user("u1"), fields(json!({"field1": true, "tag": "a"})))
        .await?
        .expect("not rejected");

    let channel = c
        .channels()
        .expect("server role")
        .single(CallerContext::user("u1"), id.as_str())
        .await?;
    let set = channel.snapshot().await?;
    let docs = set.collection("docs");
    assert_eq!(docs.len(), 1);
    assert_eq!(
        docs[0].clone().into_value(),
        json!({"_id": id.as_str(), "field1": true, "tag": "a"})
    );
    assert_eq!(set.count, None);
    Ok(())
}

#[tokio::test]
async fn update_counts_and_after_hook_sees_modifier() -> TestResult {
    let c = docs_collection(Arc::new(MemoryStore::new()));
    let id = c
        .methods()
        .insert(CallerContext::anonymous(), fields(json!({"field1": true})))
        .await?
        .expect("not rejected");

    let observed: Arc<Mutex<Vec<Modifier>>> = Arc::default();
    let sink = observed.clone();
    c.hooks().register(UpdateAfter, move |outcome: UpdateOutcome| {
        sink.lock().unwrap().push(outcome.modifier.clone());
        outcome
    });

    let before = c.find(Selector::all(), FindOptions::default()).fetch().await?;
    let missing = UpdateInput::new(&DocumentId::generate(), &Modifier::new().set("field1", json!(false)));
    assert_eq!(c.methods().update(CallerContext::anonymous(), missing).await?, 0);
    assert_eq!(c.find(Selector::all(), FindOptions::default()).fetch().await?, before);

    let modifier = Modifier::new().set("field1", json!(false));
    let input = UpdateInput::new(&id, &modifier);
    assert_eq!(c.methods().update(CallerContext::anonymous(), input).await?, 1);

    let observed = observed.lock().unwrap();
    assert_eq!(observed.last(), Some(&modifier));
    Ok(())
}

#[tokio::test]
async fn direct_client_writes_are_refused() -> TestResult {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let c = docs_collection(store.clone());
    let client = Origin::Client(CallerContext::user("u1"));

    let err = store
        .insert("docs", fields(json!({"field1": true})), &client)
        .await
        .unwrap_err();
    assert!(matches!(err, GuardError::Authorization(_)));
    let err = store
        .remove("docs", &Selector::all(), &client)
        .await
        .unwrap_err();
    assert!(matches!(err, GuardError::Authorization(_)));

    let id = c
        .methods()
        .insert(CallerContext::user("u1"), fields(json!({"field1": true})))
        .await?;
    assert!(id.is_some());
    assert_eq!(c.find(Selector::all(), FindOptions::default()).count().await?, 1);
    Ok(())
}

#[tokio::test]
async fn by_query_pages_while_count_tracks_every_match() -> TestResult {
    let c = docs_collection(Arc::new(MemoryStore::new()));
    insert_many(&c, 20, "a").await?;
    let channels = c.channels().expect("server role");

    let first = channels
        .by_query(CallerContext::anonymous(), "all", params(json!({"limit": 5})))
        .await?;
    let set = first.snapshot().await?;
    assert_eq!(set.collection("docs").len(), 5);
    assert_eq!(set.count, Some(20));

    let second = channels
        .by_query(CallerContext::anonymous(), "all", params(json!({"limit": 20})))
        .await?;
    let set = second.snapshot().await?;
    assert_eq!(set.collection("docs").len(), 20);
    assert_eq!(set.count, Some(20));
    Ok(())
}

#[tokio::test]
async fn page_size_shares_a_count_but_filters_do_not() -> TestResult {
    let c = docs_collection(Arc::new(MemoryStore::new()));
    insert_many(&c, 3, "a").await?;
    insert_many(&c, 2, "b").await?;
    let channels = c.channels().expect("server role");
    let counts = c.counts().expect("server role");

    let mut small = channels
        .by_query(CallerContext::anonymous(), "tagged", params(json!({"tag": "a", "limit": 1})))
        .await?;
    let mut large = channels
        .by_query(CallerContext::anonymous(), "tagged", params(json!({"limit": 50, "tag": "a"})))
        .await?;
    let other = channels
        .by_query(CallerContext::anonymous(), "tagged", params(json!({"tag": "b", "limit": 1})))
        .await?;

    let small_count = small.live_count().expect("byQuery has a count");
    let large_count = large.live_count().expect("byQuery has a count");
    let other_count = other.live_count().expect("byQuery has a count");
    assert_eq!(small_count.key(), large_count.key());
    assert_ne!(small_count.key(), other_count.key());
    assert_eq!(
        small_count.key(),
        count_key("docs", "tagged", &params(json!({"tag": "a"})), c.pagination_params())
    );
    assert_eq!(counts.active(), 2);

    assert_eq!(small.snapshot().await?.count, Some(3));
    assert_eq!(large.snapshot().await?.collection("docs").len(), 3);
    assert_eq!(other.snapshot().await?.count, Some(2));

    // the shared tracker lives until the last channel using it closes
    let shared = small_count.key().to_string();
    small.close();
    assert!(counts.is_tracking(&shared));
    assert_eq!(counts.active(), 2);
    large.close();
    assert!(!counts.is_tracking(&shared));
    assert_eq!(counts.active(), 1);
    Ok(())
}

#[tokio::test]
async fn live_count_follows_inserts_and_close_releases_it() -> TestResult {
    let c = docs_collection(Arc::new(MemoryStore::new()));
    insert_many(&c, 2, "a").await?;
    let mut channel = c
        .channels()
        .expect("server role")
        .by_query(CallerContext::anonymous(), "all", params(json!({"limit": 1})))
        .await?;
    let mut live = channel.live_count().cloned().expect("byQuery has a count");
    assert_eq!(live.get(), 2);

    insert_many(&c, 1, "a").await?;
    let updated = tokio::time::timeout(Duration::from_secs(2), live.changed()).await?;
    assert_eq!(updated, Some(3));
    assert_eq!(channel.snapshot().await?.collection("docs").len(), 1);

    let key = live.key().to_string();
    drop(live);
    let counts = c.counts().expect("server role");
    assert!(counts.is_tracking(&key));
    channel.close();
    assert_eq!(channel.state(), ChannelState::Closed);
    assert!(!counts.is_tracking(&key));
    assert_eq!(counts.active(), 0);
    Ok(())
}

#[tokio::test]
async fn channel_reports_relevant_changes() -> TestResult {
    let c = docs_collection(Arc::new(MemoryStore::new()));
    insert_many(&c, 1, "a").await?;
    let mut channel = c
        .channels()
        .expect("server role")
        .by_query(CallerContext::anonymous(), "all", Params::new())
        .await?;
    channel.snapshot().await?;

    let id = c
        .insert(fields(json!({"field1": false})))
        .await?
        .expect("not rejected");
    let update = tokio::time::timeout(Duration::from_secs(2), channel.next_change()).await?;
    match update {
        Some(guarded_collection::app::ChannelUpdate::Changed(ev)) => assert_eq!(ev.id, id),
        other => panic!("unexpected update: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn rejected_single_publishes_nothing() -> TestResult {
    let c = docs_collection(Arc::new(MemoryStore::new()));
    let id = c
        .methods()
        .insert(CallerContext::anonymous(), fields(json!({"field1": true})))
        .await?
        .expect("not rejected");
    c.hooks().register_guard(PublishSingle, |_req: SingleRequest| None);

    let channel = c
        .channels()
        .expect("server role")
        .single(CallerContext::anonymous(), id.as_str())
        .await?;
    assert_eq!(channel.state(), ChannelState::Closed);
    let set = channel.snapshot().await?;
    assert!(set.is_empty());
    assert_eq!(set.len(), 0);
    Ok(())
}

#[tokio::test]
async fn by_query_publishes_parents_with_their_children() -> TestResult {
    let demo = posts_and_comments(Arc::new(MemoryStore::new()))?;
    seed(&demo, 1, 2).await?;
    // an unrelated comment must not be published
    demo.comments
        .insert(fields(json!({"body": "elsewhere", "postId": DocumentId::generate().as_str()})))
        .await?;

    let channel = demo
        .posts
        .channels()
        .expect("server role")
        .by_query(CallerContext::anonymous(), ALL_POSTS, params(json!({"limit": 10})))
        .await?;
    let set = channel.snapshot().await?;
    let posts = set.collection("posts");
    assert_eq!(posts.len(), 1);
    let comments = set.collection("comments");
    assert_eq!(comments.len(), 2);
    let post_id = json!(posts[0].id().as_str());
    assert!(comments.iter().all(|c| c.get("postId") == Some(post_id.clone())));
    Ok(())
}

#[tokio::test]
async fn children_can_be_added_after_build() -> TestResult {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let c = docs_collection(store.clone());
    insert_many(&c, 2, "a").await?;
    let store_for_child = store.clone();
    c.add_child(move |parent| {
        guarded_collection::storage::Cursor::new(
            store_for_child.clone(),
            "notes",
            Query::new(
                Selector::eq("docId", json!(parent.id().as_str())),
                FindOptions::default(),
            ),
        )
    })?;
    let first = c.find(Selector::all(), FindOptions::default()).fetch().await?;
    store
        .insert("notes", fields(json!({"docId": first[0].id().as_str()})), &Origin::Server)
        .await?;

    let channel = c
        .channels()
        .expect("server role")
        .by_query(CallerContext::anonymous(), "all", Params::new())
        .await?;
    let set = channel.snapshot().await?;
    assert_eq!(set.collection("docs").len(), 2);
    assert_eq!(set.collection("notes").len(), 1);
    Ok(())
}

#[tokio::test]
async fn method_hooks_can_reject_inserts() -> TestResult {
    let c = docs_collection(Arc::new(MemoryStore::new()));
    c.hooks().register_guard(MethodsInsert, |call: InsertCall| call.context.caller_id.is_some().then_some(call));

    let anonymous = c
        .methods()
        .insert(CallerContext::anonymous(), fields(json!({"field1": true})))
        .await?;
    assert_eq!(anonymous, None);
    let signed_in = c
        .methods()
        .insert(CallerContext::user("u1"), fields(json!({"field1": true})))
        .await?;
    assert!(signed_in.is_some());
    assert_eq!(c.find(Selector::all(), FindOptions::default()).count().await?, 1);
    Ok(())
}

#[tokio::test]
async fn hook_errors_surface_to_the_caller() -> TestResult {
    let c = docs_collection(Arc::new(MemoryStore::new()));
    c.hooks()
        .register_fallible(MethodsInsert, |_call: InsertCall| Err(anyhow::anyhow!("audit sink down")));
    let err = c
        .methods()
        .insert(CallerContext::anonymous(), fields(json!({"field1": true})))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "HOOK");
    assert!(err.to_string().contains("methods.insert"));
    assert_eq!(c.find(Selector::all(), FindOptions::default()).count().await?, 0);
    Ok(())
}

#[tokio::test]
async fn concurrent_procedures_do_not_interfere() -> TestResult {
    let c = docs_collection(Arc::new(MemoryStore::new()));
    let mut handles = Vec::new();
    for i in 0..16 {
        let c = c.clone();
        handles.push(tokio::spawn(async move {
            c.methods()
                .insert(
                    CallerContext::user(format!("u{i}")),
                    fields(json!({"field1": i % 2 == 0})),
                )
                .await
        }));
    }
    let mut ids = Vec::new();
    for h in handles {
        ids.push(h.await??.expect("not rejected"));
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 16);
    assert_eq!(
        c.find(Selector::eq("field1", json!(true)), FindOptions::default())
            .count()
            .await?,
        8
    );
    Ok(())
}
