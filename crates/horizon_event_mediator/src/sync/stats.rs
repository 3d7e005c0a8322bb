use serde::{Deserialize, Serialize};

/// Counters and gauges of the synchronization engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    /// Synchronized entries registered through `enter`
    pub entries_entered: u64,
    /// Entries that had to wait behind a conflicting occupant
    pub entries_queued: u64,
    /// Occupants abandoned by the timeout sweep
    pub timeouts: u64,
    /// Per-player groups currently alive
    pub active_groups: usize,
    /// Global entries that have not exited yet
    pub active_global_entries: usize,
}
