//! The mutual exclusion unit: one current occupant plus a FIFO queue.

use super::entry::SyncEntry;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{trace, warn};

/// Work produced while mutating buckets under the engine lock.
///
/// Wake-ups are buffered and resolved after the lock is released; timed
/// out occupants are collected and detached from every group once the
/// current fan-out has finished.
#[derive(Debug)]
pub(crate) struct SweepContext {
    pub now: Instant,
    pub timeout: Duration,
    pub wake: Vec<Arc<SyncEntry>>,
    pub abandoned: Vec<Arc<SyncEntry>>,
}

impl SweepContext {
    pub fn new(timeout: Duration) -> Self {
        Self {
            now: Instant::now(),
            timeout,
            wake: Vec::new(),
            abandoned: Vec::new(),
        }
    }

    /// Resolves every buffered wake-up.
    pub fn wake_all(self) {
        for entry in self.wake {
            entry.resolve();
        }
    }
}

#[derive(Debug)]
pub(crate) struct SyncBucket {
    current: Option<Arc<SyncEntry>>,
    current_since: Instant,
    queue: VecDeque<Arc<SyncEntry>>,
}

impl Default for SyncBucket {
    fn default() -> Self {
        Self {
            current: None,
            current_since: Instant::now(),
            queue: VecDeque::new(),
        }
    }
}

impl SyncBucket {
    pub fn is_current(&self, entry: &SyncEntry) -> bool {
        self.current.as_ref().is_some_and(|current| current.is(entry))
    }

    pub fn is_queued(&self, entry: &SyncEntry) -> bool {
        self.queue.iter().any(|queued| queued.is(entry))
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none() && self.queue.is_empty()
    }

    /// Inserts `entry`. Returns `true` if it became current right away,
    /// otherwise it was parked at the tail of the queue.
    pub fn enter_event(&mut self, entry: &Arc<SyncEntry>, cx: &mut SweepContext) -> bool {
        if self.current.is_none() {
            self.occupy(entry.clone(), cx.now);
            return true;
        }
        if self.check_for_timeout(Some(entry), cx) {
            return true;
        }

        entry.park();
        self.queue.push_back(entry.clone());
        trace!(
            event = entry.event_name(),
            event_id = %entry.id(),
            position = self.queue.len(),
            "⏳ Queued behind current occupant"
        );
        false
    }

    /// Releases the bucket if `entry` is its occupant and promotes the
    /// queue head. Returns whether the bucket is now empty.
    pub fn exit_event(&mut self, entry: &SyncEntry, cx: &mut SweepContext) -> bool {
        if self.is_current(entry) {
            self.current = None;
            self.promote_next(cx);
        } else {
            self.check_for_timeout(None, cx);
        }
        self.is_empty()
    }

    /// Removes `entry` from the queue without promoting anything.
    pub fn withdraw(&mut self, entry: &SyncEntry) -> bool {
        let before = self.queue.len();
        self.queue.retain(|queued| !queued.is(entry));
        before != self.queue.len()
    }

    /// Forcibly moves past an occupant that held the bucket longer than the
    /// timeout, as long as somebody is waiting for it. The occupant is
    /// pushed onto `cx.abandoned`; the queue head (or `incoming`, when the
    /// queue is empty) becomes current. Returns `true` if `incoming` was
    /// promoted.
    pub fn check_for_timeout(&mut self, incoming: Option<&Arc<SyncEntry>>, cx: &mut SweepContext) -> bool {
        let Some(current) = self.current.as_ref() else {
            return false;
        };
        if incoming.is_none() && self.queue.is_empty() {
            return false;
        }
        let held = cx.now.saturating_duration_since(self.current_since);
        if held < cx.timeout {
            return false;
        }

        warn!(
            event = current.event_name(),
            event_id = %current.id(),
            age_ms = held.as_millis() as u64,
            "⏰ Synchronization timeout, promoting next entry past stuck occupant"
        );
        if let Some(stale) = self.current.take() {
            if !cx.abandoned.iter().any(|known| known.is(&stale)) {
                cx.abandoned.push(stale);
            }
        }

        if self.promote_next(cx) {
            return false;
        }
        match incoming {
            Some(entry) => {
                self.occupy(entry.clone(), cx.now);
                true
            }
            None => false,
        }
    }

    /// Entries currently held by this bucket, occupant first.
    pub fn drain(&mut self) -> Vec<Arc<SyncEntry>> {
        self.current.take().into_iter().chain(self.queue.drain(..)).collect()
    }

    fn occupy(&mut self, entry: Arc<SyncEntry>, now: Instant) {
        self.current = Some(entry);
        self.current_since = now;
    }

    fn promote_next(&mut self, cx: &mut SweepContext) -> bool {
        let Some(next) = self.queue.pop_front() else {
            return false;
        };
        trace!(event = next.event_name(), event_id = %next.id(), "▶️ Promoted to current");
        if next.unpark() {
            cx.wake.push(next.clone());
        }
        self.occupy(next, cx.now);
        true
    }
}
