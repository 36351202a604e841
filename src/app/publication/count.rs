//! Live result counts.
//!
//! One background tracker per count key, shared by every channel that asks for
//! the same key. A tracker lives as long as at least one [`LiveCount`] handle
//! does; dropping the last handle aborts its task and unregisters the key.

use crate::codec::canonical::canonical_object_without;
use crate::domain::query::{Params, Selector};
use crate::error::GuardResult;
use crate::storage::DocumentStore;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// `<collection>.byQuery.<query>.<canonical params>`, without pagination params.
///
/// Channels that differ only in page size share a key; channels that differ in
/// any other param do not.
pub fn count_key(collection: &str, query: &str, params: &Params, pagination: &[String]) -> String {
    format!(
        "{}.byQuery.{}.{}",
        collection,
        query,
        canonical_object_without(params, pagination)
    )
}

struct Tracker {
    key: String,
    rx: watch::Receiver<u64>,
    task: JoinHandle<()>,
    registry: Weak<CountRegistry>,
}

impl Drop for Tracker {
    fn drop(&mut self) {
        self.task.abort();
        if let Some(registry) = self.registry.upgrade() {
            let mut entries = registry
                .entries
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            // a fresh tracker may already have taken the key
            if entries.get(&self.key).map_or(false, |w| w.strong_count() == 0) {
                entries.remove(&self.key);
            }
        }
        info!(key = %self.key, "count tracker stopped");
    }
}

/// Handle on a shared live count.
#[derive(Clone)]
pub struct LiveCount {
    rx: watch::Receiver<u64>,
    tracker: Arc<Tracker>,
}

impl LiveCount {
    pub fn key(&self) -> &str {
        &self.tracker.key
    }

    pub fn get(&self) -> u64 {
        *self.rx.borrow()
    }

    /// Waits for the next change and returns the new value.
    /// `None` once the tracker has stopped.
    pub async fn changed(&mut self) -> Option<u64> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }
}

impl fmt::Debug for LiveCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveCount")
            .field("key", &self.key())
            .field("value", &self.get())
            .finish()
    }
}

/// Per-collection table of running count trackers.
#[derive(Default)]
pub struct CountRegistry {
    entries: Mutex<HashMap<String, Weak<Tracker>>>,
}

impl CountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently tracked.
    pub fn active(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    pub fn is_tracking(&self, key: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map_or(false, |w| w.strong_count() > 0)
    }

    fn lookup(&self, key: &str) -> Option<LiveCount> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let tracker = entries.get(key)?.upgrade()?;
        Some(LiveCount {
            rx: tracker.rx.clone(),
            tracker,
        })
    }

    /// Returns the live count for `key`, starting a tracker when none is running.
    ///
    /// The tracker counts `selector` matches in `collection` and recounts after
    /// every committed change to that collection.
    pub async fn acquire(
        self: &Arc<Self>,
        key: String,
        store: Arc<dyn DocumentStore>,
        collection: &str,
        selector: Selector,
    ) -> GuardResult<LiveCount> {
        if let Some(live) = self.lookup(&key) {
            debug!(key = %key, "sharing live count");
            return Ok(live);
        }

        // subscribe first so no change between the initial count and the loop is missed
        let mut changes = store.watch();
        let initial = store.count(collection, &selector).await?;
        let (tx, rx) = watch::channel(initial);

        let collection = collection.to_string();
        let task_key = key.clone();
        let task = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(ev) if ev.collection != collection => continue,
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(key = %task_key, skipped, "change feed lagged, recounting");
                    }
                    Err(RecvError::Closed) => break,
                }
                match store.count(&collection, &selector).await {
                    Ok(n) => {
                        tx.send_if_modified(|current| {
                            if *current == n {
                                false
                            } else {
                                *current = n;
                                true
                            }
                        });
                    }
                    Err(e) => warn!(key = %task_key, error = %e, "recount failed"),
                }
            }
        });

        let tracker = Arc::new(Tracker {
            key: key.clone(),
            rx: rx.clone(),
            task,
            registry: Arc::downgrade(self),
        });

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = entries.get(&key).and_then(Weak::upgrade) {
            // lost the race; ours is dropped (and aborted) once the lock is released
            drop(entries);
            return Ok(LiveCount {
                rx: existing.rx.clone(),
                tracker: existing,
            });
        }
        entries.insert(key.clone(), Arc::downgrade(&tracker));
        drop(entries);
        info!(key = %key, initial, "count tracker started");
        Ok(LiveCount { rx, tracker })
    }
}

impl fmt::Debug for CountRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CountRegistry")
            .field("active", &self.active())
            .finish()
    }
}
