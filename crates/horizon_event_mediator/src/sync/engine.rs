//! # Synchronization Engine
//!
//! Serializes conflicting events. Every synchronized payload type routes
//! its instances into buckets (one per tag, or one per type) inside a
//! synchronization group: the global group or the group of the owning
//! player. A global entry is additionally entered into every per-player
//! group, and groups created later replay the global entries still active.
//!
//! All bucket and group state sits behind one lock. Waiters are resumed
//! after it is released.

use super::bucket::SweepContext;
use super::directory::PlayerDirectory;
use super::entry::{ResolvedPolicy, SyncEntry, SyncScope};
use super::group::SyncGroup;
use super::guard::EnterFuture;
use super::stats::SyncStats;
use crate::config::SyncSettings;
use crate::events::{Event, SynchronizationContext};
use crate::types::{EventId, PlayerId};
use dashmap::DashMap;
use std::any::TypeId;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Default)]
struct EngineState {
    global: SyncGroup,
    players: BTreeMap<PlayerId, SyncGroup>,
    /// Global entries that have not exited, in arrival order
    active_global: Vec<Arc<SyncEntry>>,
    /// Player group visited by the previous periodic sweep
    sweep_cursor: Option<PlayerId>,
    stats: SyncStats,
}

impl EngineState {
    /// Group of `player`, created and seeded with the active global
    /// entries on first use.
    fn player_group(&mut self, player: PlayerId, cx: &mut SweepContext) -> &mut SyncGroup {
        if !self.players.contains_key(&player) {
            let mut group = SyncGroup::for_player(player);
            // Running entries already own their slots everywhere else
            let (running, waiting): (Vec<_>, Vec<_>) =
                self.active_global.iter().partition(|entry| !entry.is_waiting());
            for entry in running.into_iter().chain(waiting) {
                group.enter(entry, cx);
            }
            debug!(
                player = %player,
                seeded = self.active_global.len(),
                "👥 Created synchronization group"
            );
            self.players.insert(player, group);
        }
        self.players
            .entry(player)
            .or_insert_with(|| SyncGroup::for_player(player))
    }

    fn group(&self, scope: SyncScope) -> Option<&SyncGroup> {
        match scope {
            SyncScope::Global => Some(&self.global),
            SyncScope::Player(player) => self.players.get(&player),
        }
    }

    /// Removes `entry` from every group it was routed to.
    fn detach(&mut self, entry: &SyncEntry, cx: &mut SweepContext, directory: &dyn PlayerDirectory) {
        match entry.scope() {
            SyncScope::Player(player) => {
                let emptied = self
                    .players
                    .get_mut(&player)
                    .is_some_and(|group| group.exit(entry, cx));
                if emptied {
                    self.collect_group(player, directory);
                }
            }
            SyncScope::Global => {
                self.global.exit(entry, cx);
                let emptied: Vec<PlayerId> = self
                    .players
                    .iter_mut()
                    .filter_map(|(player, group)| group.exit(entry, cx).then_some(*player))
                    .collect();
                self.active_global.retain(|active| !active.is(entry));
                for player in emptied {
                    self.collect_group(player, directory);
                }
            }
        }
    }

    /// Drops the empty group of a player that is no longer online.
    fn collect_group(&mut self, player: PlayerId, directory: &dyn PlayerDirectory) {
        if directory.is_online(player) {
            return;
        }
        let removable = self.players.get(&player).is_some_and(SyncGroup::is_empty);
        if removable {
            self.players.remove(&player);
            debug!(player = %player, "🧹 Removed synchronization group of disconnected player");
        }
    }

    /// Detaches every occupant the timeout sweep moved past and resumes
    /// it, marked abandoned.
    fn release_abandoned(&mut self, cx: &mut SweepContext, directory: &dyn PlayerDirectory) {
        while let Some(stale) = cx.abandoned.pop() {
            if !stale.mark_exited() {
                continue;
            }
            stale.mark_abandoned();
            self.stats.timeouts += 1;
            self.detach(&stale, cx, directory);
            cx.wake.push(stale);
        }
    }

    /// Sweeps the player group after the cursor, wrapping around, or the
    /// global group when there are no player groups.
    fn sweep_next(&mut self, cx: &mut SweepContext) {
        let next = self
            .sweep_cursor
            .and_then(|cursor| {
                self.players
                    .range((Bound::Excluded(cursor), Bound::Unbounded))
                    .next()
                    .map(|(player, _)| *player)
            })
            .or_else(|| self.players.keys().next().copied());

        self.sweep_cursor = next;
        match next.and_then(|player| self.players.get_mut(&player)) {
            Some(group) => group.sweep(cx),
            None => self.global.sweep(cx),
        }
    }
}

struct EngineShared {
    state: Mutex<EngineState>,
    directory: Arc<dyn PlayerDirectory>,
    settings: SyncSettings,
    policies: DashMap<TypeId, Arc<ResolvedPolicy>>,
    next_id: AtomicU64,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for EngineShared {
    fn drop(&mut self) {
        let sweeper = self.sweeper.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = sweeper.take() {
            task.abort();
        }
    }
}

/// Handle to a synchronization engine. Clones share the same state.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineShared>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("settings", &self.inner.settings)
            .field("cached_policies", &self.inner.policies.len())
            .finish()
    }
}

impl SyncEngine {
    /// Creates an engine. Zero timeout or sweep interval values are
    /// replaced (see [`SyncSettings::normalized`]) so the sweep keeps
    /// running.
    pub fn new(directory: Arc<dyn PlayerDirectory>, settings: SyncSettings) -> Self {
        let normalized = settings.normalized();
        if normalized != settings {
            warn!(
                timeout_secs = settings.timeout_secs,
                sweep_interval_ms = settings.sweep_interval_ms,
                "⚠️ Unusable synchronization settings, using timeout {}s and sweep interval {}ms",
                normalized.timeout_secs,
                normalized.sweep_interval_ms
            );
        }
        let settings = normalized;

        Self {
            inner: Arc::new(EngineShared {
                state: Mutex::new(EngineState::default()),
                directory,
                settings,
                policies: DashMap::new(),
                next_id: AtomicU64::new(1),
                sweeper: Mutex::new(None),
            }),
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.inner.settings
    }

    /// Resolved policy of `E`, computed once per type.
    ///
    /// A type linked to a request model uses the request's type bucket and,
    /// when it declares no context of its own, the request's context and
    /// tags.
    pub fn policy_for<E: Event>(&self) -> Arc<ResolvedPolicy> {
        let key = TypeId::of::<E>();
        if let Some(policy) = self.inner.policies.get(&key) {
            return policy.value().clone();
        }
        self.inner
            .policies
            .entry(key)
            .or_insert_with(|| Arc::new(resolve_policy::<E>()))
            .value()
            .clone()
    }

    /// Registers `event` for serialized execution.
    ///
    /// Registration happens before this returns; the future resolves to a
    /// [`crate::SyncGuard`] once every conflicting entry ahead of it has
    /// exited. Unsynchronized payload types get a guard without an entry.
    pub fn enter<E: Event>(&self, event: &E) -> EnterFuture {
        let policy = self.policy_for::<E>();
        let scope = match policy.context {
            SynchronizationContext::None => return EnterFuture::unsynchronized(self.clone()),
            SynchronizationContext::Global => SyncScope::Global,
            SynchronizationContext::PerPlayer => match event.player() {
                Some(player) => SyncScope::Player(player),
                None => {
                    warn!(
                        event = policy.type_name,
                        "⚠️ Per-player synchronized event carries no player, synchronizing globally"
                    );
                    SyncScope::Global
                }
            },
        };

        let id = EventId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let entry = Arc::new(SyncEntry::new(id, std::any::type_name::<E>(), policy, scope));
        let mut cx = self.sweep_context();
        {
            let mut state = self.lock();
            let current = match scope {
                SyncScope::Player(player) => state.player_group(player, &mut cx).enter(&entry, &mut cx),
                SyncScope::Global => {
                    let mut current = state.global.enter(&entry, &mut cx);
                    for group in state.players.values_mut() {
                        current &= group.enter(&entry, &mut cx);
                    }
                    state.active_global.push(entry.clone());
                    current
                }
            };

            state.stats.entries_entered += 1;
            if !current {
                state.stats.entries_queued += 1;
            }
            trace!(event = entry.event_name(), event_id = %id, current, "🔒 Entered synchronization");
            state.release_abandoned(&mut cx, self.inner.directory.as_ref());
        }
        cx.wake_all();

        EnterFuture::new(self.clone(), entry)
    }

    /// Releases every slot `entry` holds or waits for. Exiting twice, or
    /// exiting an entry the timeout sweep abandoned, is a no-op.
    pub fn exit(&self, entry: &SyncEntry) {
        if !entry.mark_exited() {
            trace!(event = entry.event_name(), event_id = %entry.id(), "Exit of an entry that already left");
            return;
        }

        let mut cx = self.sweep_context();
        {
            let mut state = self.lock();
            let directory = self.inner.directory.as_ref();
            state.detach(entry, &mut cx, directory);
            state.release_abandoned(&mut cx, directory);
        }
        cx.wake_all();
        trace!(event = entry.event_name(), event_id = %entry.id(), "🔓 Exited synchronization");
    }

    /// One periodic sweep step: checks the next player group in
    /// round-robin order for stuck occupants.
    pub fn tick(&self) {
        let mut cx = self.sweep_context();
        {
            let mut state = self.lock();
            state.sweep_next(&mut cx);
            state.release_abandoned(&mut cx, self.inner.directory.as_ref());
        }
        cx.wake_all();
    }

    /// Seeds groups for every online player and spawns the periodic sweep
    /// on the current tokio runtime.
    pub fn start(&self) {
        let players = self.inner.directory.online_players();
        let mut cx = self.sweep_context();
        {
            let mut state = self.lock();
            for player in &players {
                state.player_group(*player, &mut cx);
            }
        }
        cx.wake_all();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let task = handle.spawn(sweep_loop(
                    Arc::downgrade(&self.inner),
                    self.inner.settings.sweep_interval(),
                ));
                if let Some(previous) = self.sweeper().replace(task) {
                    previous.abort();
                }
            }
            Err(_) => warn!("⚠️ No tokio runtime available, periodic synchronization sweep disabled"),
        }

        info!(players = players.len(), "🔒 Synchronization engine started");
    }

    /// Stops the periodic sweep, resumes every waiter (marked abandoned)
    /// and tears down all groups.
    pub fn stop(&self) {
        if let Some(task) = self.sweeper().take() {
            task.abort();
        }

        let drained = {
            let mut state = self.lock();
            let mut entries = state.global.drain();
            for (_, mut group) in std::mem::take(&mut state.players) {
                entries.extend(group.drain());
            }
            state.active_global.clear();
            state.sweep_cursor = None;
            entries
        };

        let mut released = 0usize;
        for entry in drained {
            if entry.is_waiting() {
                entry.mark_abandoned();
                entry.resolve();
                released += 1;
            }
        }
        info!(released, "🔒 Synchronization engine stopped");
    }

    /// Ensures `player` has a group, seeded with the active global entries.
    pub fn player_connected(&self, player: PlayerId) {
        let mut cx = self.sweep_context();
        {
            let mut state = self.lock();
            state.player_group(player, &mut cx);
            state.release_abandoned(&mut cx, self.inner.directory.as_ref());
        }
        cx.wake_all();
    }

    /// Drops the group of `player` if it is empty. A group still in use is
    /// collected by the exit that empties it, once the directory reports
    /// the player offline.
    pub fn player_disconnected(&self, player: PlayerId) {
        let mut state = self.lock();
        let removable = state.players.get(&player).is_some_and(|group| {
            debug_assert_eq!(group.owner(), Some(player));
            group.is_empty()
        });
        if removable {
            state.players.remove(&player);
            debug!(player = %player, "🧹 Removed synchronization group of disconnected player");
        }
    }

    /// Whether `entry` is current in every bucket it uses within `scope`.
    pub fn is_current(&self, scope: SyncScope, entry: &SyncEntry) -> bool {
        self.lock().group(scope).is_some_and(|group| group.is_current(entry))
    }

    /// Whether `entry` waits in at least one bucket within `scope`.
    pub fn is_queued(&self, scope: SyncScope, entry: &SyncEntry) -> bool {
        self.lock().group(scope).is_some_and(|group| group.is_queued(entry))
    }

    pub fn has_group(&self, player: PlayerId) -> bool {
        self.lock().players.contains_key(&player)
    }

    pub fn get_stats(&self) -> SyncStats {
        let state = self.lock();
        SyncStats {
            active_groups: state.players.len(),
            active_global_entries: state.active_global.len(),
            ..state.stats.clone()
        }
    }

    fn sweep_context(&self) -> SweepContext {
        SweepContext::new(self.inner.settings.timeout())
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sweeper(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.inner.sweeper.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn sweep_loop(engine: Weak<EngineShared>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let Some(inner) = engine.upgrade() else {
            break;
        };
        SyncEngine { inner }.tick();
    }
}

fn resolve_policy<E: Event>() -> ResolvedPolicy {
    let own = E::synchronization();
    let Some(model) = own.request_model else {
        return ResolvedPolicy {
            context: own.context,
            tags: own.tags,
            type_key: TypeId::of::<E>(),
            type_name: std::any::type_name::<E>(),
        };
    };

    let (context, tags) = if own.is_synchronized() {
        (own.context, own.tags)
    } else {
        let requested = (model.policy)();
        (requested.context, requested.tags)
    };
    ResolvedPolicy {
        context,
        tags,
        type_key: model.type_id,
        type_name: model.type_name,
    }
}
