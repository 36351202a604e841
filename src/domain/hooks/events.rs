//! Payload shapes carried by each hook event.

use crate::domain::document::{Document, DocumentId, Fields};
use crate::domain::modifier::Modifier;
use crate::domain::query::{Params, Selector};
use crate::storage::{UpdateOptions, UpsertResult};
use serde::{Deserialize, Serialize};

/// Who is calling, as reported by the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerContext {
    #[serde(default)]
    pub caller_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl CallerContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(id: impl Into<String>) -> Self {
        Self {
            caller_id: Some(id.into()),
            session_id: None,
        }
    }

    pub fn caller_id(&self) -> Option<&str> {
        self.caller_id.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertResult {
    pub result: DocumentId,
    pub doc: Document,
}

/// Arguments of `update` / `upsert`; before-hooks may rewrite any of them.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateArgs {
    pub selector: Selector,
    pub modifier: Modifier,
    pub options: UpdateOptions,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOutcome {
    pub result: u64,
    pub selector: Selector,
    pub modifier: Modifier,
    pub options: UpdateOptions,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpsertOutcome {
    pub result: UpsertResult,
    pub selector: Selector,
    pub modifier: Modifier,
    pub options: UpdateOptions,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoveOutcome {
    pub result: u64,
    pub selector: Selector,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertCall {
    pub context: CallerContext,
    pub doc: Fields,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateCall {
    pub context: CallerContext,
    pub id: DocumentId,
    pub modifier: Modifier,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoveCall {
    pub context: CallerContext,
    pub id: DocumentId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ByQueryRequest {
    pub context: CallerContext,
    pub name: String,
    pub params: Params,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SingleRequest {
    pub context: CallerContext,
    pub id: DocumentId,
}
