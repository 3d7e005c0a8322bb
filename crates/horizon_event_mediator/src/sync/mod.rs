//! Cross-event synchronization: buckets, groups and the engine that
//! routes entries through them.

mod bucket;
mod directory;
mod engine;
mod entry;
mod group;
mod guard;
mod stats;

pub use directory::{InMemoryPlayerDirectory, PlayerDirectory};
pub use engine::SyncEngine;
pub use entry::{ResolvedPolicy, SyncEntry, SyncScope};
pub use guard::{EnterFuture, SyncGuard};
pub use stats::SyncStats;
