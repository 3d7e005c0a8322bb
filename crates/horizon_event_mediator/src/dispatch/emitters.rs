/// Event dispatch: ordered listener invocation
use super::core::EventDispatcher;
use crate::error::ListenerError;
use crate::events::Event;
use crate::listener::{compare_listeners, ListenerFn, ListenerHandle, ListenerMetadata};
use crate::main_context::{MainContext, MainGuard};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};
use tracing::{error, trace, warn};

type Caught = Result<Result<(), ListenerError>, Box<dyn Any + Send>>;

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("listener panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("listener panicked: {message}")
    } else {
        "listener panicked with unknown payload".to_string()
    }
}

fn flatten(caught: Caught) -> Result<(), ListenerError> {
    caught.unwrap_or_else(|payload| Err(ListenerError::Failed(panic_message(payload))))
}

fn is_cancelled<E: Event>(event: &E) -> bool {
    event.as_cancellable().is_some_and(|cancellable| cancellable.is_cancelled())
}

impl EventDispatcher {
    /// Invokes every listener for `E` and reports whether the caller's
    /// underlying action should proceed.
    ///
    /// 1. Hops onto the main context (the only unconditional suspension)
    /// 2. Collects registered and provided listeners and resolves their
    ///    cached metadata
    /// 3. Sorts them: must-run-instantly first, then descending priority,
    ///    ties in discovery order
    /// 4. Invokes them in order, stopping as soon as the payload reports
    ///    `is_cancelled()`. Asynchronous listeners that do not need the
    ///    main context run off it; the next main-affine listener hops back.
    ///
    /// A failing or panicking listener is logged, the payload is forced
    /// into the cancelled state and the chain stops. Nothing propagates to
    /// the caller. The chain also stops for non-cancellable payloads,
    /// which always return `true`.
    pub async fn dispatch<E: Event>(&self, event: &mut E) -> bool {
        let event_name = std::any::type_name::<E>();
        let nested = MainContext::is_current();
        let mut main_guard: Option<MainGuard> = if nested {
            None
        } else {
            Some(self.main.enter().await)
        };

        let listeners = self.ordered_listeners::<E>();
        let mut invoked = 0u64;
        let mut faults = 0u64;

        for (handle, metadata) in &listeners {
            if is_cancelled(event) {
                trace!(event = event_name, listener = handle.name(), "Dispatch short-circuited by cancellation");
                break;
            }

            let started = Instant::now();
            let outcome = match &handle.listener {
                ListenerFn::Sync(listener) => {
                    if metadata.requires_main_thread
                        && !metadata.must_run_instantly
                        && !nested
                        && main_guard.is_none()
                    {
                        main_guard = Some(self.main.enter().await);
                    }
                    let on_main = nested || main_guard.is_some();
                    let caught = MainContext::sync_scope(on_main, || {
                        std::panic::catch_unwind(AssertUnwindSafe(|| listener.handle_event(event)))
                    });
                    flatten(caught)
                }
                ListenerFn::Async(listener) => {
                    if metadata.requires_main_thread {
                        if !nested && main_guard.is_none() {
                            main_guard = Some(self.main.enter().await);
                        }
                    } else if !nested {
                        // Off-context work: other chains may use the main context meanwhile
                        main_guard = None;
                    }
                    let on_main = nested || main_guard.is_some();
                    let caught = MainContext::scope(
                        on_main,
                        AssertUnwindSafe(listener.handle_event(event)).catch_unwind(),
                    )
                    .await;
                    flatten(caught)
                }
            };
            invoked += 1;
            self.report_if_slow(handle, event_name, started.elapsed());

            match outcome {
                Ok(()) => {}
                Err(ListenerError::Halt) => {}
                Err(fault) => {
                    faults += 1;
                    error!(
                        event = event_name,
                        listener = handle.name(),
                        error = %fault,
                        "❌ Listener failed, cancelling remaining chain"
                    );
                    if let Some(cancellable) = event.as_cancellable_mut() {
                        cancellable.cancel(true);
                    }
                    break;
                }
            }
        }
        drop(main_guard);

        let proceed = event
            .as_cancellable()
            .map_or(true, |cancellable| !cancellable.is_action_cancelled());

        let mut stats = self.stats.write().await;
        stats.events_dispatched += 1;
        stats.listeners_invoked += invoked;
        stats.listener_faults += faults;
        if !proceed {
            stats.events_cancelled += 1;
        }

        proceed
    }

    /// Listeners for `E` with resolved metadata, in invocation order.
    pub(crate) fn ordered_listeners<E: Event>(&self) -> Vec<(ListenerHandle<E>, ListenerMetadata)> {
        let mut resolved: Vec<_> = self
            .registry
            .listeners_for::<E>()
            .into_iter()
            .filter_map(|handle| match self.registry.metadata().resolve(&handle) {
                Ok(metadata) => Some((handle, metadata)),
                Err(e) => {
                    error!(listener = handle.name(), error = %e, "Skipping misconfigured listener");
                    None
                }
            })
            .collect();

        // Stable: equal keys stay in discovery order
        resolved.sort_by(|a, b| compare_listeners(&a.1, &b.1));
        resolved
    }

    fn report_if_slow<E: Event>(&self, handle: &ListenerHandle<E>, event_name: &str, elapsed: Duration) {
        if let Some(threshold) = self.settings.slow_listener_threshold() {
            if elapsed > threshold {
                warn!(
                    event = event_name,
                    listener = handle.name(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "🐌 Slow listener"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{CancelState, Cancellable};
    use crate::listener::{AsyncEventListener, EventListener, ListenerOptions, ListenerRegistry};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    struct Probe {
        log: Vec<&'static str>,
        cancel: CancelState,
    }

    impl Event for Probe {
        crate::cancellable_via!(cancel);
    }

    struct Step<const PRIORITY: i32>(&'static str);

    impl<const PRIORITY: i32> EventListener<Probe> for Step<PRIORITY> {
        fn handle_event(&self, event: &mut Probe) -> Result<(), ListenerError> {
            event.log.push(self.0);
            Ok(())
        }

        fn options(&self) -> ListenerOptions {
            ListenerOptions::new().priority(PRIORITY)
        }
    }

    struct Instant0;

    impl EventListener<Probe> for Instant0 {
        fn handle_event(&self, event: &mut Probe) -> Result<(), ListenerError> {
            event.log.push("instant");
            Ok(())
        }

        fn options(&self) -> ListenerOptions {
            ListenerOptions::new().priority(-100).run_instantly()
        }
    }

    struct Veto;

    impl EventListener<Probe> for Veto {
        fn handle_event(&self, event: &mut Probe) -> Result<(), ListenerError> {
            event.log.push("veto");
            event.cancel.cancel(true);
            Ok(())
        }

        fn options(&self) -> ListenerOptions {
            ListenerOptions::new().priority(5)
        }
    }

    struct Panics;

    impl EventListener<Probe> for Panics {
        fn handle_event(&self, _event: &mut Probe) -> Result<(), ListenerError> {
            panic!("boom");
        }

        fn options(&self) -> ListenerOptions {
            ListenerOptions::new().priority(5)
        }
    }

    struct Halts;

    impl EventListener<Probe> for Halts {
        fn handle_event(&self, event: &mut Probe) -> Result<(), ListenerError> {
            event.log.push("halts");
            Err(ListenerError::Halt)
        }

        fn options(&self) -> ListenerOptions {
            ListenerOptions::new().priority(5)
        }
    }

    fn dispatcher(registry: ListenerRegistry) -> EventDispatcher {
        EventDispatcher::new(Arc::new(registry), MainContext::new())
    }

    #[tokio::test]
    async fn listeners_run_by_priority_with_instant_first() {
        let registry = ListenerRegistry::new();
        registry.register_sync(Step::<{ -5 }>("low")).unwrap();
        registry.register_sync(Step::<10>("high")).unwrap();
        registry.register_sync(Instant0).unwrap();
        registry.register_sync(Step::<0>("mid")).unwrap();

        let dispatcher = dispatcher(registry);
        let mut probe = Probe::default();
        assert!(dispatcher.dispatch(&mut probe).await);
        assert_eq!(probe.log, vec!["instant", "high", "mid", "low"]);
    }

    #[tokio::test]
    async fn cancellation_stops_later_listeners() {
        let registry = ListenerRegistry::new();
        registry.register_sync(Step::<10>("first")).unwrap();
        registry.register_sync(Veto).unwrap();
        registry.register_sync(Step::<0>("never")).unwrap();

        let dispatcher = dispatcher(registry);
        let mut probe = Probe::default();
        assert!(!dispatcher.dispatch(&mut probe).await);
        assert_eq!(probe.log, vec!["first", "veto"]);
        assert_eq!(dispatcher.get_stats().await.events_cancelled, 1);
    }

    #[tokio::test]
    async fn panicking_listener_cancels_the_payload() {
        let registry = ListenerRegistry::new();
        registry.register_sync(Panics).unwrap();
        registry.register_sync(Step::<0>("never")).unwrap();

        let dispatcher = dispatcher(registry);
        let mut probe = Probe::default();
        assert!(!dispatcher.dispatch(&mut probe).await);
        assert!(probe.cancel.is_cancelled());
        assert!(probe.log.is_empty());

        let stats = dispatcher.get_stats().await;
        assert_eq!(stats.listener_faults, 1);
        assert_eq!(stats.listeners_invoked, 1);
    }

    #[tokio::test]
    async fn halt_is_swallowed_and_chain_continues() {
        let registry = ListenerRegistry::new();
        registry.register_sync(Halts).unwrap();
        registry.register_sync(Step::<0>("after")).unwrap();

        let dispatcher = dispatcher(registry);
        let mut probe = Probe::default();
        assert!(dispatcher.dispatch(&mut probe).await);
        assert_eq!(probe.log, vec!["halts", "after"]);
        assert_eq!(dispatcher.get_stats().await.listener_faults, 0);
    }

    struct Affinity {
        seen: Arc<Mutex<Vec<(&'static str, bool)>>>,
    }

    impl EventListener<String> for Affinity {
        fn handle_event(&self, _event: &mut String) -> Result<(), ListenerError> {
            self.seen.lock().unwrap().push(("sync", MainContext::is_current()));
            Ok(())
        }
    }

    struct OffMain {
        seen: Arc<Mutex<Vec<(&'static str, bool)>>>,
    }

    #[async_trait]
    impl AsyncEventListener<String> for OffMain {
        async fn handle_event(&self, _event: &mut String) -> Result<(), ListenerError> {
            self.seen.lock().unwrap().push(("async", MainContext::is_current()));
            tokio::task::yield_now().await;
            Ok(())
        }

        fn options(&self) -> ListenerOptions {
            ListenerOptions::new().priority(10)
        }
    }

    #[tokio::test]
    async fn async_listener_runs_off_main_and_sync_listener_hops_back() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let registry = ListenerRegistry::new();
        registry.register_async(OffMain { seen: seen.clone() }).unwrap();
        registry.register_sync(Affinity { seen: seen.clone() }).unwrap();

        let dispatcher = dispatcher(registry);
        let mut payload = String::from("tick");
        assert!(dispatcher.dispatch(&mut payload).await);
        assert_eq!(*seen.lock().unwrap(), vec![("async", false), ("sync", true)]);
        assert!(!dispatcher.main_context().is_held());
    }

    struct Fails;

    impl EventListener<String> for Fails {
        fn handle_event(&self, _event: &mut String) -> Result<(), ListenerError> {
            Err(ListenerError::failed("storage offline"))
        }

        fn options(&self) -> ListenerOptions {
            ListenerOptions::new().priority(5)
        }
    }

    struct Appends;

    impl EventListener<String> for Appends {
        fn handle_event(&self, event: &mut String) -> Result<(), ListenerError> {
            event.push_str(" seen");
            Ok(())
        }
    }

    #[tokio::test]
    async fn fault_stops_the_chain_of_a_non_cancellable_payload() {
        let registry = ListenerRegistry::new();
        registry.register_sync(Fails).unwrap();
        registry.register_sync(Appends).unwrap();

        let dispatcher = dispatcher(registry);
        let mut payload = String::from("chat");
        assert!(dispatcher.dispatch(&mut payload).await);
        assert_eq!(payload, "chat");

        let stats = dispatcher.get_stats().await;
        assert_eq!(stats.listener_faults, 1);
        assert_eq!(stats.listeners_invoked, 1);
    }

    #[tokio::test]
    async fn non_cancellable_payload_always_proceeds() {
        let dispatcher = dispatcher(ListenerRegistry::new());
        let mut payload = String::new();
        assert!(dispatcher.dispatch(&mut payload).await);
        assert_eq!(dispatcher.get_stats().await.events_dispatched, 1);
    }
}
