//! Walkthrough of the example collections: paginated reads, "load more", a
//! write through the generated procedures and the live count reacting to it.

use guarded_collection::domain::examples::{posts_and_comments, seed, ALL_POSTS};
use guarded_collection::infra::{config, logging};
use guarded_collection::{CallerContext, DocumentStore, MemoryStore, Origin, Server};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::load_env();
    logging::init();

    let store = Arc::new(MemoryStore::new());
    let demo = posts_and_comments(store.clone())?;
    seed(&demo, 20, 2).await?;

    let server = Server::new();
    server.register(demo.posts.clone())?;
    server.register(demo.comments.clone())?;

    let caller = CallerContext::user("demo-user");

    // first page
    let mut channel = server
        .subscribe("posts.byQuery", caller.clone(), json!([ALL_POSTS, {"limit": 5}]))
        .await?;
    let page = channel.snapshot().await?;
    info!(
        posts = page.collection("posts").len(),
        comments = page.collection("comments").len(),
        total = ?page.count,
        "first page"
    );

    // load more: the caller asks for a bigger page, the count is shared
    let mut bigger = server
        .subscribe("posts.byQuery", caller.clone(), json!([ALL_POSTS, {"limit": 10}]))
        .await?;
    let page = bigger.snapshot().await?;
    info!(posts = page.collection("posts").len(), total = ?page.count, "after load more");

    // raw client writes are refused; the generated procedure is the way in
    let denied = store
        .insert("posts", json!({"title": "sneaky"}).as_object().cloned().unwrap_or_default(), &Origin::Client(caller.clone()))
        .await;
    info!(refused = denied.is_err(), "direct client insert");

    let id = server
        .call("posts.insert", caller.clone(), json!([{"title": "Fresh", "body": "Just in."}]))
        .await?;
    info!(id = %id, "inserted through posts.insert");

    if let Some(live) = channel.live_count() {
        let mut live = live.clone();
        let total = tokio::time::timeout(Duration::from_secs(1), async {
            while live.get() < 21 {
                if live.changed().await.is_none() {
                    break;
                }
            }
            live.get()
        })
        .await
        .unwrap_or_else(|_| live.get());
        info!(total, "live count after insert");
    }

    let tracked = || demo.posts.counts().map_or(0, |c| c.active());
    // both pages share one count key, so the tracker outlives the first close
    channel.close();
    info!(tracked = tracked(), "first page closed");
    bigger.close();
    info!(tracked = tracked(), "load-more page closed");
    Ok(())
}
