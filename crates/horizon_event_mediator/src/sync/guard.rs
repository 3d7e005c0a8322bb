//! Waitable registration and the scoped release guard.

use super::engine::SyncEngine;
use super::entry::SyncEntry;
use crate::types::EventId;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Pending registration returned by [`SyncEngine::enter`].
///
/// The entry is already registered (current or queued) when this is
/// created. Awaiting it yields the [`SyncGuard`]; dropping it before
/// completion withdraws the entry from every queue and releases any slot
/// it already holds.
#[derive(Debug)]
#[must_use = "the entry stays registered until the future is awaited or dropped"]
pub struct EnterFuture {
    engine: SyncEngine,
    entry: Option<Arc<SyncEntry>>,
    receiver: Option<oneshot::Receiver<()>>,
}

impl EnterFuture {
    pub(crate) fn new(engine: SyncEngine, entry: Arc<SyncEntry>) -> Self {
        let receiver = entry.take_receiver();
        Self {
            engine,
            entry: Some(entry),
            receiver,
        }
    }

    pub(crate) fn unsynchronized(engine: SyncEngine) -> Self {
        Self {
            engine,
            entry: None,
            receiver: None,
        }
    }

    /// The registered entry, `None` for unsynchronized payload types.
    pub fn entry(&self) -> Option<&SyncEntry> {
        self.entry.as_deref()
    }

    /// Whether awaiting would complete without suspending.
    pub fn is_ready(&self) -> bool {
        self.entry.as_ref().map_or(true, |entry| !entry.is_waiting())
    }
}

impl Future for EnterFuture {
    type Output = SyncGuard;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<SyncGuard> {
        let this = &mut *self;
        if let Some(receiver) = this.receiver.as_mut() {
            if Pin::new(receiver).poll(cx).is_pending() {
                return Poll::Pending;
            }
            this.receiver = None;
        }

        Poll::Ready(SyncGuard {
            engine: this.engine.clone(),
            entry: this.entry.take(),
        })
    }
}

impl Drop for EnterFuture {
    fn drop(&mut self) {
        if let Some(entry) = self.entry.take() {
            self.engine.exit(&entry);
        }
    }
}

/// Exclusive access to every bucket an entry was routed to.
///
/// Released exactly once: explicitly via [`SyncGuard::exit`] or when
/// dropped, whichever comes first.
#[derive(Debug)]
#[must_use = "dropping the guard releases the synchronization slots immediately"]
pub struct SyncGuard {
    engine: SyncEngine,
    entry: Option<Arc<SyncEntry>>,
}

impl SyncGuard {
    pub fn entry(&self) -> Option<&SyncEntry> {
        self.entry.as_deref()
    }

    pub fn entry_id(&self) -> Option<EventId> {
        self.entry.as_ref().map(|entry| entry.id())
    }

    pub fn is_synchronized(&self) -> bool {
        self.entry.is_some()
    }

    /// Whether the timeout sweep or an engine shutdown took this entry's
    /// slots away before it was resumed or while it ran.
    pub fn is_abandoned(&self) -> bool {
        self.entry.as_ref().is_some_and(|entry| entry.is_abandoned())
    }

    pub fn exit(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(entry) = self.entry.take() {
            self.engine.exit(&entry);
        }
    }
}

impl Drop for SyncGuard {
    fn drop(&mut self) {
        self.release();
    }
}
