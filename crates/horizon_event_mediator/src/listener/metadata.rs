//! Listener metadata resolution and ordering.

use super::{ListenerHandle, ListenerKind, ListenerOptions};
use crate::error::DispatchError;
use crate::events::Event;
use dashmap::DashMap;
use std::any::TypeId;
use std::cmp::Ordering;

/// Resolved, immutable metadata of one concrete listener type for one
/// payload type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerMetadata {
    pub kind: ListenerKind,
    pub priority: i32,
    pub must_run_instantly: bool,
    pub requires_main_thread: bool,
}

impl ListenerMetadata {
    pub fn from_options(
        kind: ListenerKind,
        options: ListenerOptions,
        listener: &'static str,
        event: &'static str,
    ) -> Result<Self, DispatchError> {
        if options.must_run_instantly && kind == ListenerKind::Async {
            return Err(DispatchError::InstantAsyncListener { listener, event });
        }

        Ok(Self {
            kind,
            priority: options.priority,
            must_run_instantly: options.must_run_instantly,
            requires_main_thread: options
                .requires_main_thread
                .unwrap_or_else(|| kind.default_requires_main_thread()),
        })
    }

    fn runs_instantly(&self) -> bool {
        self.must_run_instantly && self.kind == ListenerKind::Sync
    }
}

/// Orders listeners for invocation: synchronous must-run-instantly
/// listeners first, then descending priority. Equal elements keep their
/// discovery order as long as the caller uses a stable sort.
pub fn compare_listeners(a: &ListenerMetadata, b: &ListenerMetadata) -> Ordering {
    match (a.runs_instantly(), b.runs_instantly()) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => b.priority.cmp(&a.priority),
    }
}

/// Cache of resolved metadata keyed by `(kind, payload type, concrete
/// listener type)`.
///
/// Entries are computed on first encounter and never invalidated.
/// Invalid declarations are not cached so every encounter reports them.
#[derive(Debug, Default)]
pub struct MetadataCache {
    entries: DashMap<(ListenerKind, TypeId, TypeId), ListenerMetadata>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve<E: Event>(
        &self,
        handle: &ListenerHandle<E>,
    ) -> Result<ListenerMetadata, DispatchError> {
        let key = handle.key();
        if let Some(metadata) = self.entries.get(&key) {
            return Ok(*metadata);
        }

        let metadata = ListenerMetadata::from_options(
            handle.kind(),
            handle.options(),
            handle.name(),
            std::any::type_name::<E>(),
        )?;
        Ok(*self.entries.entry(key).or_insert(metadata))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ListenerError;
    use crate::listener::{AsyncEventListener, EventListener};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Arc;

    fn meta(kind: ListenerKind, priority: i32, instant: bool) -> ListenerMetadata {
        ListenerMetadata {
            kind,
            priority,
            must_run_instantly: instant,
            requires_main_thread: true,
        }
    }

    #[test]
    fn instant_sync_listeners_sort_first() {
        let mut listeners = vec![
            (0, meta(ListenerKind::Async, 50, false)),
            (1, meta(ListenerKind::Sync, -10, true)),
            (2, meta(ListenerKind::Sync, 10, false)),
            (3, meta(ListenerKind::Sync, 10, false)),
        ];
        listeners.sort_by(|a, b| compare_listeners(&a.1, &b.1));
        let order: Vec<_> = listeners.iter().map(|(i, _)| *i).collect();
        assert_eq!(order, vec![1, 0, 2, 3]);
    }

    #[test]
    fn kind_defaults_select_main_thread_affinity() {
        let sync = ListenerMetadata::from_options(ListenerKind::Sync, ListenerOptions::new(), "l", "e").unwrap();
        let asynchronous = ListenerMetadata::from_options(ListenerKind::Async, ListenerOptions::new(), "l", "e").unwrap();
        assert!(sync.requires_main_thread);
        assert!(!asynchronous.requires_main_thread);

        let pinned = ListenerMetadata::from_options(
            ListenerKind::Async,
            ListenerOptions::new().main_thread(true),
            "l",
            "e",
        )
        .unwrap();
        assert!(pinned.requires_main_thread);
    }

    #[test]
    fn instant_async_listener_is_rejected() {
        let result = ListenerMetadata::from_options(
            ListenerKind::Async,
            ListenerOptions::new().run_instantly(),
            "listener",
            "event",
        );
        assert!(matches!(result, Err(DispatchError::InstantAsyncListener { .. })));
    }

    struct Shifting {
        priority: AtomicI32,
        asked: AtomicUsize,
    }

    impl EventListener<String> for Shifting {
        fn handle_event(&self, _event: &mut String) -> Result<(), ListenerError> {
            Ok(())
        }

        fn options(&self) -> ListenerOptions {
            self.asked.fetch_add(1, AtomicOrdering::SeqCst);
            ListenerOptions::new().priority(self.priority.fetch_add(1, AtomicOrdering::SeqCst))
        }
    }

    #[test]
    fn metadata_is_resolved_once_per_type() {
        let cache = MetadataCache::new();
        let listener = Arc::new(Shifting {
            priority: AtomicI32::new(5),
            asked: AtomicUsize::new(0),
        });
        let handle = ListenerHandle::sync(listener.clone());

        assert_eq!(cache.resolve(&handle).unwrap().priority, 5);
        assert_eq!(cache.resolve(&handle).unwrap().priority, 5);
        assert_eq!(listener.asked.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    struct Dual;

    impl EventListener<String> for Dual {
        fn handle_event(&self, _event: &mut String) -> Result<(), ListenerError> {
            Ok(())
        }

        fn options(&self) -> ListenerOptions {
            ListenerOptions::new().priority(10)
        }
    }

    impl EventListener<()> for Dual {
        fn handle_event(&self, _event: &mut ()) -> Result<(), ListenerError> {
            Ok(())
        }

        fn options(&self) -> ListenerOptions {
            ListenerOptions::new().priority(-10)
        }
    }

    #[test]
    fn metadata_is_cached_per_payload_type() {
        let cache = MetadataCache::new();
        let listener = Arc::new(Dual);
        let chat: ListenerHandle<String> = ListenerHandle::sync(listener.clone());
        let unit: ListenerHandle<()> = ListenerHandle::sync(listener);

        assert_eq!(cache.resolve(&chat).unwrap().priority, 10);
        assert_eq!(cache.resolve(&unit).unwrap().priority, -10);
        assert_eq!(cache.len(), 2);
    }

    struct EagerAsync;

    #[async_trait]
    impl AsyncEventListener<String> for EagerAsync {
        async fn handle_event(&self, _event: &mut String) -> Result<(), ListenerError> {
            Ok(())
        }

        fn options(&self) -> ListenerOptions {
            ListenerOptions::new().run_instantly()
        }
    }

    #[test]
    fn invalid_metadata_is_not_cached() {
        let cache = MetadataCache::new();
        let handle = ListenerHandle::asynchronous(Arc::new(EagerAsync));
        assert!(cache.resolve(&handle).is_err());
        assert!(cache.resolve(&handle).is_err());
        assert!(cache.is_empty());
    }
}
