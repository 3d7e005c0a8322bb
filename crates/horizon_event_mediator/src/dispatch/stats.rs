use serde::{Deserialize, Serialize};

/// Counters collected by the dispatch engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStats {
    /// Total number of dispatch calls
    pub events_dispatched: u64,
    /// Listener invocations across all dispatches
    pub listeners_invoked: u64,
    /// Listener invocations that failed or panicked
    pub listener_faults: u64,
    /// Dispatches whose underlying action ended up cancelled
    pub events_cancelled: u64,
}
