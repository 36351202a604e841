use super::count::LiveCount;
use super::ChildDescriptor;
use crate::domain::document::{Document, DocumentId};
use crate::error::GuardResult;
use crate::storage::{ChangeEvent, Cursor};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    Opening,
    Publishing,
    Closed,
}

/// Everything a channel publishes at one point in time.
///
/// Documents are grouped by collection; a document reached through several
/// parents appears once.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PublishedSet {
    pub documents: BTreeMap<String, Vec<Document>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
}

impl PublishedSet {
    pub fn is_empty(&self) -> bool {
        self.documents.values().all(Vec::is_empty)
    }

    pub fn len(&self) -> usize {
        self.documents.values().map(Vec::len).sum()
    }

    pub fn collection(&self, name: &str) -> &[Document] {
        self.documents.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    fn push(&mut self, seen: &mut HashSet<(String, DocumentId)>, collection: &str, docs: Vec<Document>) {
        let slot = self.documents.entry(collection.to_string()).or_default();
        for doc in docs {
            if seen.insert((collection.to_string(), doc.id().clone())) {
                slot.push(doc);
            }
        }
    }
}

/// What woke a publishing channel up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelUpdate {
    Changed(ChangeEvent),
    /// Changes were missed; take a fresh snapshot.
    Resync,
}

/// One open read channel.
///
/// A publishing channel holds its primary cursor, the child descriptors it was
/// opened with, and (for `byQuery`) a handle on the shared live count. Closing
/// or dropping the channel releases all of them.
pub struct Publication {
    name: String,
    state: ChannelState,
    primary: Option<Cursor>,
    children: Vec<ChildDescriptor>,
    count: Option<LiveCount>,
    changes: Option<broadcast::Receiver<ChangeEvent>>,
    watched: Mutex<BTreeSet<String>>,
}

impl Publication {
    /// A channel whose arguments are still being checked. Publishes nothing yet.
    pub(crate) fn opening(name: String) -> Self {
        debug!(channel = %name, "channel opening");
        Self {
            name,
            state: ChannelState::Opening,
            primary: None,
            children: Vec::new(),
            count: None,
            changes: None,
            watched: Mutex::new(BTreeSet::new()),
        }
    }

    /// Opening -> Publishing.
    pub(crate) fn publish(
        &mut self,
        primary: Cursor,
        children: Vec<ChildDescriptor>,
        count: Option<LiveCount>,
        changes: broadcast::Receiver<ChangeEvent>,
    ) {
        if self.state != ChannelState::Opening {
            return;
        }
        *self.watched.lock().unwrap_or_else(PoisonError::into_inner) =
            BTreeSet::from([primary.collection_name().to_string()]);
        info!(channel = %self.name, children = children.len(), "channel publishing");
        self.state = ChannelState::Publishing;
        self.primary = Some(primary);
        self.children = children;
        self.count = count;
        self.changes = Some(changes);
    }

    /// Opening -> Closed, with an empty result.
    pub(crate) fn reject(&mut self) {
        if self.state != ChannelState::Opening {
            return;
        }
        info!(channel = %self.name, "channel rejected by hook");
        self.state = ChannelState::Closed;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn live_count(&self) -> Option<&LiveCount> {
        self.count.as_ref()
    }

    /// Primary documents, then every child result set of every primary document.
    pub async fn snapshot(&self) -> GuardResult<PublishedSet> {
        let mut set = PublishedSet::default();
        let Some(primary) = &self.primary else {
            return Ok(set);
        };

        let mut seen = HashSet::new();
        let parents = primary.fetch().await?;
        let mut watched = BTreeSet::from([primary.collection_name().to_string()]);
        let mut dependents = Vec::new();
        for parent in &parents {
            for child in &self.children {
                let cursor = child(parent);
                watched.insert(cursor.collection_name().to_string());
                let docs = cursor.fetch().await?;
                dependents.push((cursor.collection_name().to_string(), docs));
            }
        }
        set.push(&mut seen, primary.collection_name(), parents);
        for (collection, docs) in dependents {
            set.push(&mut seen, &collection, docs);
        }
        set.count = self.count.as_ref().map(LiveCount::get);

        debug!(channel = %self.name, documents = set.len(), count = ?set.count, "snapshot");
        *self.watched.lock().unwrap_or_else(PoisonError::into_inner) = watched;
        Ok(set)
    }

    /// Waits for a committed change to any collection this channel published
    /// from in its last snapshot. `None` once the channel is closed.
    pub async fn next_change(&mut self) -> Option<ChannelUpdate> {
        let changes = self.changes.as_mut()?;
        loop {
            match changes.recv().await {
                Ok(ev) => {
                    let relevant = self
                        .watched
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .contains(&ev.collection);
                    if relevant {
                        return Some(ChannelUpdate::Changed(ev));
                    }
                }
                Err(RecvError::Lagged(_)) => return Some(ChannelUpdate::Resync),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Stops publishing and releases the live count.
    pub fn close(&mut self) {
        if self.state == ChannelState::Closed {
            return;
        }
        self.state = ChannelState::Closed;
        self.primary = None;
        self.children.clear();
        self.count = None;
        self.changes = None;
        info!(channel = %self.name, "channel closed");
    }
}

impl fmt::Debug for Publication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publication")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("primary", &self.primary)
            .field("children", &self.children.len())
            .field("count", &self.count)
            .finish()
    }
}
