//! QueryRegistry for mapping query names to server-authored query functions.

use super::{Params, Query, QueryFn};
use crate::error::{GuardError, GuardResult};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// A registry that maps query names to their [`QueryFn`] implementations.
///
/// Populated by the service owner only. Read-mostly: lookups clone the `Arc`
/// and release the lock before the function runs.
pub struct QueryRegistry {
    queries: RwLock<HashMap<String, QueryFn>>,
}

impl QueryRegistry {
    /// Creates a new empty QueryRegistry.
    pub fn new() -> Self {
        Self {
            queries: RwLock::new(HashMap::new()),
        }
    }

    /// Merges entries into the registry. Existing names are overridden, others kept.
    pub fn set<I, S>(&self, mapping: I)
    where
        I: IntoIterator<Item = (S, QueryFn)>,
        S: Into<String>,
    {
        let mut queries = self.queries.write().unwrap_or_else(PoisonError::into_inner);
        for (name, f) in mapping {
            queries.insert(name.into(), f);
        }
    }

    /// Registers a single query from a closure.
    pub fn insert<F>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(&Params, Option<&str>) -> GuardResult<Query> + Send + Sync + 'static,
    {
        let f: QueryFn = Arc::new(f);
        self.set([(name.into(), f)]);
    }

    /// Retrieves a query function by name.
    pub fn get(&self, name: &str) -> GuardResult<QueryFn> {
        self.queries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| GuardError::not_found("query", name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.queries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Returns all registered query names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .queries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

impl Default for QueryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for QueryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryRegistry")
            .field("queries", &self.names())
            .finish()
    }
}
