//! # Event Payload Capabilities
//!
//! An event payload is any caller-defined value describing something that
//! happened or something that is requested. The [`Event`] trait is the
//! only requirement; everything else is opt-in:
//!
//! - **Cancellable** payloads expose a [`Cancellable`] view so listeners can
//!   stop the chain and/or the underlying action
//! - **Player scoped** payloads name an owning [`PlayerId`], which routes
//!   per-player synchronization
//! - **Synchronized** payload *types* declare a [`SyncPolicy`] through
//!   [`Event::synchronization`]
//!
//! ```rust
//! use horizon_event_mediator::*;
//!
//! #[derive(Debug)]
//! struct BarricadeDestroyRequested {
//!     player: PlayerId,
//!     cancel: CancelState,
//! }
//!
//! impl Event for BarricadeDestroyRequested {
//!     fn synchronization() -> SyncPolicy {
//!         SyncPolicy::per_player().with_tag("buildables")
//!     }
//!
//!     fn player(&self) -> Option<PlayerId> {
//!         Some(self.player)
//!     }
//!
//!     cancellable_via!(cancel);
//! }
//! ```

use crate::types::PlayerId;
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::any::TypeId;

/// Trait implemented by every payload type that can be dispatched.
pub trait Event: Send + Sync + 'static {
    /// Type-level synchronization policy. Resolved once per type.
    fn synchronization() -> SyncPolicy
    where
        Self: Sized,
    {
        SyncPolicy::none()
    }

    /// Cancellable view of this payload, if it supports cancellation.
    fn as_cancellable(&self) -> Option<&dyn Cancellable> {
        None
    }

    /// Mutable cancellable view, used to force cancellation after a fault.
    fn as_cancellable_mut(&mut self) -> Option<&mut dyn Cancellable> {
        None
    }

    /// Owning player for player scoped payloads.
    fn player(&self) -> Option<PlayerId> {
        None
    }
}

/// Cancellation contract for payloads.
///
/// `cancel(true)` stops both the remaining listeners and the underlying
/// action. `cancel(false)` only vetoes the action; listeners keep running.
pub trait Cancellable {
    fn is_cancelled(&self) -> bool;
    fn is_action_cancelled(&self) -> bool;
    fn cancel(&mut self, cancel_action: bool);
}

/// Stock [`Cancellable`] implementation to embed in payload structs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CancelState {
    cancelled: bool,
    action_cancelled: bool,
}

impl CancelState {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Cancellable for CancelState {
    fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    fn is_action_cancelled(&self) -> bool {
        self.action_cancelled
    }

    fn cancel(&mut self, cancel_action: bool) {
        self.action_cancelled = true;
        if cancel_action {
            self.cancelled = true;
        }
    }
}

/// Wires a [`CancelState`] (or any [`Cancellable`]) field into the two
/// cancellation hooks of [`Event`]. Use inside the `impl Event` block.
#[macro_export]
macro_rules! cancellable_via {
    ($field:ident) => {
        fn as_cancellable(&self) -> Option<&dyn $crate::Cancellable> {
            Some(&self.$field)
        }

        fn as_cancellable_mut(&mut self) -> Option<&mut dyn $crate::Cancellable> {
            Some(&mut self.$field)
        }
    };
}

/// Scope in which conflicting events of one type are serialized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SynchronizationContext {
    /// No synchronization; entering is a no-op
    #[default]
    None,
    /// Serialized against other events of the same owning player
    PerPlayer,
    /// Serialized against everything, including all per-player activity
    Global,
}

/// Link from an "X happened" event to the "X requested" event it reports.
///
/// Both share the requested type's bucket, so a synchronized request also
/// blocks the matching happened event.
#[derive(Debug, Clone, Copy)]
pub struct RequestModel {
    pub(crate) type_id: TypeId,
    pub(crate) type_name: &'static str,
    pub(crate) policy: fn() -> SyncPolicy,
}

impl RequestModel {
    pub fn of<R: Event>() -> Self {
        Self {
            type_id: TypeId::of::<R>(),
            type_name: std::any::type_name::<R>(),
            policy: R::synchronization,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

/// Synchronization policy declared by a payload type.
#[derive(Debug, Clone, Default)]
pub struct SyncPolicy {
    pub context: SynchronizationContext,
    /// Opaque lock names. An event with tags occupies one bucket per tag
    /// instead of the bucket of its concrete type.
    pub tags: SmallVec<[CompactString; 2]>,
    pub request_model: Option<RequestModel>,
}

impl SyncPolicy {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn per_player() -> Self {
        Self::with_context(SynchronizationContext::PerPlayer)
    }

    pub fn global() -> Self {
        Self::with_context(SynchronizationContext::Global)
    }

    pub fn with_context(context: SynchronizationContext) -> Self {
        Self {
            context,
            ..Self::default()
        }
    }

    /// Policy of a happened event reporting the request `R`. Without an
    /// explicit context the request's context and tags are inherited.
    pub fn happened_of<R: Event>() -> Self {
        Self {
            request_model: Some(RequestModel::of::<R>()),
            ..Self::default()
        }
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        let tag = CompactString::new(tag);
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
        self
    }

    pub fn with_tags<'a>(self, tags: impl IntoIterator<Item = &'a str>) -> Self {
        tags.into_iter().fold(self, Self::with_tag)
    }

    /// Overrides the context, keeping tags and request model.
    pub fn in_context(mut self, context: SynchronizationContext) -> Self {
        self.context = context;
        self
    }

    pub fn is_synchronized(&self) -> bool {
        self.context != SynchronizationContext::None
    }
}

// Plain values used as ad-hoc payloads and in tests
impl Event for String {}
impl Event for () {}
