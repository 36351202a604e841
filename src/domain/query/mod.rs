//! Server-defined read queries.
//!
//! Clients never send selectors. They send a query *name* and opaque params;
//! the [`QueryRegistry`] maps the name to a server-authored [`QueryFn`] that
//! turns params into a concrete [`Query`].

use crate::domain::document::Document;
use crate::error::GuardResult;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::cmp::Ordering;
use std::sync::Arc;

pub mod registry;
pub mod selector;

pub use registry::QueryRegistry;
pub use selector::Selector;

/// Client-supplied query parameters. Opaque to this layer.
pub type Params = Map<String, JsonValue>;

/// `(params, caller_id) -> query`. Trusted code, registered by the service owner.
pub type QueryFn = Arc<dyn Fn(&Params, Option<&str>) -> GuardResult<Query> + Send + Sync>;

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

/// Pagination and ordering for a read.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<SortSpec>,
}

impl FindOptions {
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn sort_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort.push(SortSpec {
            field: field.into(),
            direction,
        });
        self
    }

    /// Sorts then pages `docs` in place. Stable, so unsorted input keeps store order.
    pub fn apply(&self, docs: &mut Vec<Document>) {
        if !self.sort.is_empty() {
            docs.sort_by(|a, b| {
                for spec in &self.sort {
                    let av = a.get(&spec.field);
                    let ord = match (&av, b.get(&spec.field)) {
                        (None, None) => Ordering::Equal,
                        (None, Some(_)) => Ordering::Less,
                        (Some(_), None) => Ordering::Greater,
                        (Some(_), Some(bv)) => {
                            selector::compare(av.as_ref(), &bv).unwrap_or(Ordering::Equal)
                        }
                    };
                    let ord = match spec.direction {
                        SortDirection::Asc => ord,
                        SortDirection::Desc => ord.reverse(),
                    };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }
        let skip = self.skip.unwrap_or(0).min(docs.len());
        docs.drain(..skip);
        if let Some(limit) = self.limit {
            docs.truncate(limit);
        }
    }
}

/// A concrete read: `{selector, options}`.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct Query {
    #[serde(default)]
    pub selector: Selector,
    #[serde(default)]
    pub options: FindOptions,
}

impl Query {
    pub fn new(selector: Selector, options: FindOptions) -> Self {
        Self { selector, options }
    }

    /// Same filter, no pagination. This is what live counts track.
    pub fn without_options(&self) -> Self {
        Self {
            selector: self.selector.clone(),
            options: FindOptions::default(),
        }
    }
}

/// Reads an optional non-negative integer param, e.g. `limit`.
pub fn usize_param(params: &Params, key: &str) -> Option<usize> {
    params
        .get(key)
        .and_then(JsonValue::as_u64)
        .map(|n| n as usize)
}
