//! Bookkeeping record of one event instance inside the engine.

use crate::events::SynchronizationContext;
use crate::types::{EventId, PlayerId};
use compact_str::CompactString;
use smallvec::SmallVec;
use std::any::TypeId;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Group an entry is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncScope {
    /// The global group, fanned out into every per-player group
    Global,
    /// The group of one player
    Player(PlayerId),
}

/// Synchronization policy of a payload type after request-model
/// inheritance has been applied.
#[derive(Debug, Clone)]
pub struct ResolvedPolicy {
    pub context: SynchronizationContext,
    pub tags: SmallVec<[CompactString; 2]>,
    /// Key of the type bucket used when no tags are declared
    pub type_key: TypeId,
    pub type_name: &'static str,
}

impl ResolvedPolicy {
    pub fn is_synchronized(&self) -> bool {
        self.context != SynchronizationContext::None
    }
}

#[derive(Debug, Default)]
struct Waiter {
    sender: Option<oneshot::Sender<()>>,
    receiver: Option<oneshot::Receiver<()>>,
}

/// One event instance passing through the synchronization engine.
///
/// `Created -> (Current | Queued) -> Current -> Exited`. An entry that
/// lost its slot to the timeout sweep is marked abandoned and counts as
/// exited.
#[derive(Debug)]
pub struct SyncEntry {
    id: EventId,
    event_name: &'static str,
    policy: Arc<ResolvedPolicy>,
    scope: SyncScope,
    created_at: Instant,
    /// Buckets this entry is still queued in
    waits: AtomicUsize,
    waiter: Mutex<Waiter>,
    abandoned: AtomicBool,
    exited: AtomicBool,
}

impl SyncEntry {
    pub(crate) fn new(
        id: EventId,
        event_name: &'static str,
        policy: Arc<ResolvedPolicy>,
        scope: SyncScope,
    ) -> Self {
        Self {
            id,
            event_name,
            policy,
            scope,
            created_at: Instant::now(),
            waits: AtomicUsize::new(0),
            waiter: Mutex::new(Waiter::default()),
            abandoned: AtomicBool::new(false),
            exited: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn event_name(&self) -> &'static str {
        self.event_name
    }

    pub fn policy(&self) -> &ResolvedPolicy {
        &self.policy
    }

    pub fn scope(&self) -> SyncScope {
        self.scope
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Number of buckets this entry still waits in.
    pub fn wait_count(&self) -> usize {
        self.waits.load(Ordering::Acquire)
    }

    pub fn is_waiting(&self) -> bool {
        self.wait_count() > 0
    }

    pub fn is_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::Acquire)
    }

    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }

    /// Records one more bucket to wait in, creating the one-shot waiter on
    /// first use.
    pub(crate) fn park(&self) {
        self.waits.fetch_add(1, Ordering::AcqRel);
        let mut waiter = self.waiter.lock().unwrap_or_else(PoisonError::into_inner);
        if waiter.sender.is_none() && waiter.receiver.is_none() {
            let (sender, receiver) = oneshot::channel();
            waiter.sender = Some(sender);
            waiter.receiver = Some(receiver);
        }
    }

    /// Records promotion in one bucket. Returns `true` when this was the
    /// last bucket the entry waited in.
    pub(crate) fn unpark(&self) -> bool {
        let previous = self
            .waits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |waits| Some(waits.saturating_sub(1)))
            .unwrap_or(0);
        previous == 1
    }

    /// Resumes the suspended caller, if any. Resolving twice is a no-op.
    pub(crate) fn resolve(&self) {
        let sender = self
            .waiter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sender
            .take();
        if let Some(sender) = sender {
            let _ = sender.send(());
        }
    }

    pub(crate) fn take_receiver(&self) -> Option<oneshot::Receiver<()>> {
        self.waiter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .receiver
            .take()
    }

    /// Marks the entry exited. Returns `false` if it already was.
    pub(crate) fn mark_exited(&self) -> bool {
        !self.exited.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn mark_abandoned(&self) {
        self.abandoned.store(true, Ordering::Release);
        self.waits.store(0, Ordering::Release);
    }

    pub(crate) fn is(&self, other: &SyncEntry) -> bool {
        std::ptr::eq(self, other)
    }
}
