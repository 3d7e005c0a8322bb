//! Player directory: the external source of truth for who is online.

use crate::types::PlayerId;
use dashmap::DashSet;

/// Resolves player connectivity for synchronization group management.
///
/// Consulted when groups are seeded at start and when an empty group of a
/// disconnected player is garbage collected.
pub trait PlayerDirectory: Send + Sync {
    fn is_online(&self, player: PlayerId) -> bool;

    fn online_players(&self) -> Vec<PlayerId>;
}

/// Thread-safe in-memory [`PlayerDirectory`].
#[derive(Debug, Default)]
pub struct InMemoryPlayerDirectory {
    online: DashSet<PlayerId>,
}

impl InMemoryPlayerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `player` online. Returns `false` if it already was.
    pub fn connect(&self, player: PlayerId) -> bool {
        self.online.insert(player)
    }

    /// Marks `player` offline. Returns `false` if it was not online.
    pub fn disconnect(&self, player: PlayerId) -> bool {
        self.online.remove(&player).is_some()
    }

    pub fn len(&self) -> usize {
        self.online.len()
    }

    pub fn is_empty(&self) -> bool {
        self.online.is_empty()
    }
}

impl PlayerDirectory for InMemoryPlayerDirectory {
    fn is_online(&self, player: PlayerId) -> bool {
        self.online.contains(&player)
    }

    fn online_players(&self) -> Vec<PlayerId> {
        let mut players: Vec<_> = self.online.iter().map(|entry| *entry).collect();
        players.sort();
        players
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_and_disconnect_track_presence() {
        let directory = InMemoryPlayerDirectory::new();
        let player = PlayerId::new();

        assert!(directory.connect(player));
        assert!(!directory.connect(player));
        assert!(directory.is_online(player));
        assert_eq!(directory.online_players(), vec![player]);

        assert!(directory.disconnect(player));
        assert!(!directory.is_online(player));
        assert!(directory.is_empty());
    }
}
