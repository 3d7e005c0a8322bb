/// Core EventDispatcher implementation
use super::stats::DispatchStats;
use crate::config::DispatchSettings;
use crate::listener::ListenerRegistry;
use crate::main_context::MainContext;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Resolves and invokes every listener registered for a payload type.
///
/// Listeners come from the shared [`ListenerRegistry`] and its providers.
/// They are invoked in priority order on the [`MainContext`], with
/// cooperative cancellation and per-listener fault isolation; see
/// [`EventDispatcher::dispatch`].
pub struct EventDispatcher {
    pub(super) registry: Arc<ListenerRegistry>,
    pub(super) main: MainContext,
    pub(super) settings: DispatchSettings,
    pub(super) stats: RwLock<DispatchStats>,
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("registry", &self.registry)
            .field("settings", &self.settings)
            .finish()
    }
}

impl EventDispatcher {
    pub fn new(registry: Arc<ListenerRegistry>, main: MainContext) -> Self {
        Self::with_settings(registry, main, DispatchSettings::default())
    }

    pub fn with_settings(
        registry: Arc<ListenerRegistry>,
        main: MainContext,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            registry,
            main,
            settings,
            stats: RwLock::new(DispatchStats::default()),
        }
    }

    pub fn registry(&self) -> &Arc<ListenerRegistry> {
        &self.registry
    }

    pub fn main_context(&self) -> &MainContext {
        &self.main
    }

    pub async fn get_stats(&self) -> DispatchStats {
        self.stats.read().await.clone()
    }
}
