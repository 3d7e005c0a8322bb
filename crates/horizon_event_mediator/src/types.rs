//! # Core Type Definitions
//!
//! Identifiers shared by the dispatch and synchronization halves of the
//! mediator.
//!
//! - [`PlayerId`] - Unique identifier for a connected player (actor)
//! - [`EventId`] - Monotonic id assigned to every synchronized event instance

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a player in the game world.
///
/// This is a wrapper around UUID that provides type safety and ensures
/// player IDs cannot be confused with other types of IDs in the system.
/// Player ids are ordered so synchronization groups can be visited in a
/// stable round-robin order.
///
/// # Examples
///
/// ```rust
/// use horizon_event_mediator::PlayerId;
///
/// let player_id = PlayerId::new();
/// let parsed: PlayerId = player_id.to_string().parse().unwrap();
/// assert_eq!(player_id, parsed);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    /// Creates a new random player ID using UUID v4.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::str::FromStr for PlayerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic identifier of one event instance passing through the
/// synchronization engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(pub u64);

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}
