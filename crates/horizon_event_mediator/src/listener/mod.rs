//! # Listener Contracts
//!
//! A listener is a capability object handling exactly one payload type,
//! either synchronously ([`EventListener`]) or asynchronously
//! ([`AsyncEventListener`]). Behavioural knobs live in
//! [`ListenerOptions`], returned by the concrete implementation and
//! resolved once per `(kind, concrete listener type)`.

mod metadata;
mod registry;

pub use metadata::{compare_listeners, ListenerMetadata, MetadataCache};
pub use registry::{ListenerProvider, ListenerRegistry, ListenerRequest};

use crate::error::ListenerError;
use crate::events::Event;
use async_trait::async_trait;
use std::any::TypeId;
use std::sync::Arc;

/// Calling convention of a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerKind {
    Sync,
    Async,
}

impl ListenerKind {
    /// Synchronous listeners touch game state and default to the main
    /// context; asynchronous listeners default to running off it.
    pub fn default_requires_main_thread(self) -> bool {
        matches!(self, ListenerKind::Sync)
    }
}

/// Options a listener declares for itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerOptions {
    /// Higher runs earlier
    pub priority: i32,
    /// Run ahead of every other listener without any context hand-off.
    /// Only legal on synchronous listeners.
    pub must_run_instantly: bool,
    /// `None` selects the kind default
    pub requires_main_thread: Option<bool>,
}

impl ListenerOptions {
    pub const fn new() -> Self {
        Self {
            priority: 0,
            must_run_instantly: false,
            requires_main_thread: None,
        }
    }

    pub const fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub const fn run_instantly(mut self) -> Self {
        self.must_run_instantly = true;
        self
    }

    pub const fn main_thread(mut self, required: bool) -> Self {
        self.requires_main_thread = Some(required);
        self
    }
}

/// Synchronous handler for payloads of type `E`.
pub trait EventListener<E: Event>: Send + Sync + 'static {
    fn handle_event(&self, event: &mut E) -> Result<(), ListenerError>;

    fn options(&self) -> ListenerOptions {
        ListenerOptions::new()
    }
}

/// Asynchronous handler for payloads of type `E`.
#[async_trait]
pub trait AsyncEventListener<E: Event>: Send + Sync + 'static {
    async fn handle_event(&self, event: &mut E) -> Result<(), ListenerError>;

    fn options(&self) -> ListenerOptions {
        ListenerOptions::new()
    }
}

pub(crate) enum ListenerFn<E: Event> {
    Sync(Arc<dyn EventListener<E>>),
    Async(Arc<dyn AsyncEventListener<E>>),
}

/// Type-erased listener together with the identity of its concrete type.
pub struct ListenerHandle<E: Event> {
    pub(crate) listener: ListenerFn<E>,
    type_id: TypeId,
    name: &'static str,
}

impl<E: Event> ListenerHandle<E> {
    pub fn sync<L: EventListener<E>>(listener: Arc<L>) -> Self {
        Self {
            listener: ListenerFn::Sync(listener),
            type_id: TypeId::of::<L>(),
            name: std::any::type_name::<L>(),
        }
    }

    pub fn asynchronous<L: AsyncEventListener<E>>(listener: Arc<L>) -> Self {
        Self {
            listener: ListenerFn::Async(listener),
            type_id: TypeId::of::<L>(),
            name: std::any::type_name::<L>(),
        }
    }

    pub fn kind(&self) -> ListenerKind {
        match self.listener {
            ListenerFn::Sync(_) => ListenerKind::Sync,
            ListenerFn::Async(_) => ListenerKind::Async,
        }
    }

    /// Resolved listener identity used in log lines
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Cache key: a listener type implementing the contract for several
    /// payloads declares its options per payload.
    pub(crate) fn key(&self) -> (ListenerKind, TypeId, TypeId) {
        (self.kind(), TypeId::of::<E>(), self.type_id)
    }

    pub(crate) fn options(&self) -> ListenerOptions {
        match &self.listener {
            ListenerFn::Sync(listener) => listener.options(),
            ListenerFn::Async(listener) => listener.options(),
        }
    }
}

impl<E: Event> Clone for ListenerHandle<E> {
    fn clone(&self) -> Self {
        let listener = match &self.listener {
            ListenerFn::Sync(listener) => ListenerFn::Sync(listener.clone()),
            ListenerFn::Async(listener) => ListenerFn::Async(listener.clone()),
        };
        Self {
            listener,
            type_id: self.type_id,
            name: self.name,
        }
    }
}

impl<E: Event> std::fmt::Debug for ListenerHandle<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("name", &self.name)
            .field("kind", &self.kind())
            .finish()
    }
}
