//! Hook pipeline engine.
//!
//! Every interception point is a typed event ([`InsertBefore`], [`MethodsUpdate`],
//! [`PublishSingle`], ...). Each event owns one [`HookChain`] of handlers that are
//! folded left to right over the payload:
//!
//! ```text
//! run(E, p) = hn(...h2(h1(p)))
//! ```
//!
//! A handler may return `None` to reject the payload. The chain stops there and
//! the caller decides what rejection means (empty result, zero affected rows).
//! Handler errors are returned to the caller as [`GuardError::Hook`].

use crate::domain::document::Fields;
use crate::domain::query::Selector;
use crate::error::{GuardError, GuardResult};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

pub mod events;

pub use events::{
    ByQueryRequest, CallerContext, InsertCall, InsertResult, RemoveCall, RemoveOutcome,
    SingleRequest, UpdateArgs, UpdateCall, UpdateOutcome, UpsertOutcome,
};

/// Stored handler form: transform, reject (`Ok(None)`) or fail.
pub type Handler<P> = Arc<dyn Fn(P) -> anyhow::Result<Option<P>> + Send + Sync>;

/// Ordered handlers for one event.
pub struct HookChain<P> {
    kind: EventKind,
    handlers: RwLock<Vec<Handler<P>>>,
}

impl<P> HookChain<P> {
    fn new(kind: EventKind) -> Self {
        Self {
            kind,
            handlers: RwLock::new(Vec::new()),
        }
    }

    pub fn register(&self, handler: Handler<P>) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handler);
    }

    pub fn len(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Folds the chain over `payload`. `Ok(None)` means a handler rejected it.
    ///
    /// Works on a snapshot: handlers registered while this runs apply to later calls.
    pub fn run(&self, payload: P) -> GuardResult<Option<P>> {
        let handlers: Vec<Handler<P>> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut current = payload;
        for (idx, handler) in handlers.iter().enumerate() {
            let next = handler(current).map_err(|source| GuardError::Hook {
                event: self.kind,
                source,
            })?;
            match next {
                Some(p) => current = p,
                None => {
                    debug!(event = %self.kind, handler = idx, "hook rejected payload");
                    return Ok(None);
                }
            }
        }
        Ok(Some(current))
    }
}

/// Compile-time link between an event marker and its payload and chain.
pub trait HookEvent: Copy + 'static {
    type Payload: 'static;
    const KIND: EventKind;

    fn chain(hooks: &Hooks) -> &HookChain<Self::Payload>;
}

macro_rules! hook_events {
    ($( $(#[$meta:meta])* $marker:ident => $field:ident : $payload:ty = $name:literal; )*) => {
        /// Every interception point a guarded collection exposes.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum EventKind {
            $( $marker, )*
        }

        impl EventKind {
            pub const ALL: &'static [EventKind] = &[$( EventKind::$marker, )*];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $( EventKind::$marker => $name, )*
                }
            }
        }

        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq)]
            pub struct $marker;

            impl HookEvent for $marker {
                type Payload = $payload;
                const KIND: EventKind = EventKind::$marker;

                fn chain(hooks: &Hooks) -> &HookChain<$payload> {
                    &hooks.$field
                }
            }
        )*

        /// The per-collection hook registry: one typed chain per [`EventKind`].
        pub struct Hooks {
            $( $field: HookChain<$payload>, )*
        }

        impl Hooks {
            pub fn new() -> Self {
                Self {
                    $( $field: HookChain::new(EventKind::$marker), )*
                }
            }

            pub fn handler_count(&self, kind: EventKind) -> usize {
                match kind {
                    $( EventKind::$marker => self.$field.len(), )*
                }
            }
        }
    };
}

hook_events! {
    /// Candidate document, before the store insert.
    InsertBefore => insert_before: Fields = "insert.before";
    /// Assigned id plus the stored document.
    InsertAfter => insert_after: InsertResult = "insert.after";
    UpdateBefore => update_before: UpdateArgs = "update.before";
    UpdateAfter => update_after: UpdateOutcome = "update.after";
    UpsertBefore => upsert_before: UpdateArgs = "upsert.before";
    UpsertAfter => upsert_after: UpsertOutcome = "upsert.after";
    /// Selector of the documents about to be removed.
    RemoveBefore => remove_before: Selector = "remove.before";
    RemoveAfter => remove_after: RemoveOutcome = "remove.after";
    /// Validated input of the generated insert procedure.
    MethodsInsert => methods_insert: InsertCall = "methods.insert";
    MethodsUpdate => methods_update: UpdateCall = "methods.update";
    MethodsRemove => methods_remove: RemoveCall = "methods.remove";
    /// A `byQuery` channel request, before the query is resolved.
    PublishByQuery => publish_by_query: ByQueryRequest = "publish.byQuery";
    PublishSingle => publish_single: SingleRequest = "publish.single";
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Hooks {
    /// Appends a plain transform to `event`'s chain.
    pub fn register<E, F>(&self, _event: E, f: F)
    where
        E: HookEvent,
        F: Fn(E::Payload) -> E::Payload + Send + Sync + 'static,
    {
        E::chain(self).register(Arc::new(move |p| Ok(Some(f(p)))));
    }

    /// Appends a handler that may reject the payload by returning `None`.
    pub fn register_guard<E, F>(&self, _event: E, f: F)
    where
        E: HookEvent,
        F: Fn(E::Payload) -> Option<E::Payload> + Send + Sync + 'static,
    {
        E::chain(self).register(Arc::new(move |p| Ok(f(p))));
    }

    /// Appends a handler that may reject or fail.
    pub fn register_fallible<E, F>(&self, _event: E, f: F)
    where
        E: HookEvent,
        F: Fn(E::Payload) -> anyhow::Result<Option<E::Payload>> + Send + Sync + 'static,
    {
        E::chain(self).register(Arc::new(f));
    }

    pub fn run<E: HookEvent>(&self, _event: E, payload: E::Payload) -> GuardResult<Option<E::Payload>> {
        E::chain(self).run(payload)
    }
}

impl Default for Hooks {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for kind in EventKind::ALL {
            map.entry(&kind.as_str(), &self.handler_count(*kind));
        }
        map.finish()
    }
}
