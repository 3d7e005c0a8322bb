//! Orchestration of dispatch and synchronization behind one handle.

use crate::config::MediatorConfig;
use crate::dispatch::{DispatchStats, EventDispatcher};
use crate::events::Event;
use crate::listener::ListenerRegistry;
use crate::main_context::MainContext;
use crate::sync::{PlayerDirectory, SyncEngine, SyncStats};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Combined statistics of both engines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediatorStats {
    pub dispatch: DispatchStats,
    pub sync: SyncStats,
}

/// Owns the listener registry, the dispatch engine, the synchronization
/// engine and the main context they share.
#[derive(Debug)]
pub struct EventMediator {
    registry: Arc<ListenerRegistry>,
    dispatcher: Arc<EventDispatcher>,
    sync: SyncEngine,
    main: MainContext,
    config: MediatorConfig,
}

impl EventMediator {
    pub fn new(config: MediatorConfig, directory: Arc<dyn PlayerDirectory>) -> Self {
        let registry = Arc::new(ListenerRegistry::new());
        let main = MainContext::new();
        let dispatcher = Arc::new(EventDispatcher::with_settings(
            registry.clone(),
            main.clone(),
            config.dispatch.clone(),
        ));
        let sync = SyncEngine::new(directory, config.sync.clone());

        Self {
            registry,
            dispatcher,
            sync,
            main,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<ListenerRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    pub fn sync_engine(&self) -> &SyncEngine {
        &self.sync
    }

    pub fn main_context(&self) -> &MainContext {
        &self.main
    }

    pub fn config(&self) -> &MediatorConfig {
        &self.config
    }

    pub fn start(&self) {
        self.sync.start();
        info!(
            timeout_secs = self.config.sync.timeout_secs,
            sweep_interval_ms = self.config.sync.sweep_interval_ms,
            "🚀 Event mediator started"
        );
    }

    pub fn stop(&self) {
        self.sync.stop();
        info!("🛑 Event mediator stopped");
    }

    /// Dispatches `event` without synchronization.
    pub async fn dispatch<E: Event>(&self, event: &mut E) -> bool {
        self.dispatcher.dispatch(event).await
    }

    /// Serializes `event` against conflicting events, dispatches it and
    /// releases its synchronization slots again, on every path.
    ///
    /// Returns whether the underlying action should proceed. An entry that
    /// lost its slots before it got to run is not dispatched and reports
    /// `false`.
    pub async fn raise<E: Event>(&self, event: &mut E) -> bool {
        let guard = self.sync.enter(&*event).await;
        if guard.is_abandoned() {
            warn!(
                event = std::any::type_name::<E>(),
                event_id = ?guard.entry_id(),
                "⚠️ Synchronization slot abandoned before dispatch, dropping event"
            );
            return false;
        }

        let proceed = self.dispatcher.dispatch(event).await;
        guard.exit();
        proceed
    }

    pub async fn get_stats(&self) -> MediatorStats {
        MediatorStats {
            dispatch: self.dispatcher.get_stats().await,
            sync: self.sync.get_stats(),
        }
    }
}

/// Creates a mediator ready to be started.
pub fn create_event_mediator(
    config: MediatorConfig,
    directory: Arc<dyn PlayerDirectory>,
) -> Arc<EventMediator> {
    Arc::new(EventMediator::new(config, directory))
}
