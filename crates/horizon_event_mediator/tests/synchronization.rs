//! Synchronization engine behaviour through the public API.

use horizon_event_mediator::*;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Per-player event serialized on the "buildables" tag.
struct DestroyStructure(PlayerId);

impl Event for DestroyStructure {
    fn synchronization() -> SyncPolicy {
        SyncPolicy::per_player().with_tag("buildables")
    }

    fn player(&self) -> Option<PlayerId> {
        Some(self.0)
    }
}

/// Per-player event serialized on its own type bucket.
struct OpenStorage(PlayerId);

impl Event for OpenStorage {
    fn synchronization() -> SyncPolicy {
        SyncPolicy::per_player()
    }

    fn player(&self) -> Option<PlayerId> {
        Some(self.0)
    }
}

/// Another per-player event on a different tag.
struct CraftItem(PlayerId);

impl Event for CraftItem {
    fn synchronization() -> SyncPolicy {
        SyncPolicy::per_player().with_tag("crafting")
    }

    fn player(&self) -> Option<PlayerId> {
        Some(self.0)
    }
}

/// Global event sharing the "buildables" tag.
struct WipeBuildables;

impl Event for WipeBuildables {
    fn synchronization() -> SyncPolicy {
        SyncPolicy::global().with_tag("buildables")
    }
}

struct SpawnVehicleRequested(PlayerId);

impl Event for SpawnVehicleRequested {
    fn synchronization() -> SyncPolicy {
        SyncPolicy::per_player()
    }

    fn player(&self) -> Option<PlayerId> {
        Some(self.0)
    }
}

struct VehicleSpawned(PlayerId);

impl Event for VehicleSpawned {
    fn synchronization() -> SyncPolicy {
        SyncPolicy::happened_of::<SpawnVehicleRequested>()
    }

    fn player(&self) -> Option<PlayerId> {
        Some(self.0)
    }
}

fn engine() -> (SyncEngine, Arc<InMemoryPlayerDirectory>) {
    let directory = Arc::new(InMemoryPlayerDirectory::new());
    let engine = SyncEngine::new(directory.clone(), SyncSettings::default());
    (engine, directory)
}

#[tokio::test]
async fn queued_entry_is_resumed_when_the_occupant_exits() {
    let (engine, _) = engine();
    let player = PlayerId::new();

    let a = engine.enter(&OpenStorage(player));
    assert!(a.is_ready());
    let a = a.await;
    let a_entry = a.entry().unwrap();
    assert_eq!(a_entry.wait_count(), 0);
    assert!(engine.is_current(SyncScope::Player(player), a_entry));

    let b = engine.enter(&OpenStorage(player));
    let b_entry = b.entry().unwrap();
    assert_eq!(b_entry.wait_count(), 1);
    assert!(engine.is_queued(SyncScope::Player(player), b_entry));
    assert!(!b.is_ready());

    a.exit();
    let b = tokio::time::timeout(Duration::from_secs(1), b)
        .await
        .expect("b resumes after a exits");
    let b_entry = b.entry().unwrap();
    assert_eq!(b_entry.wait_count(), 0);
    assert!(engine.is_current(SyncScope::Player(player), b_entry));
    assert!(!b.is_abandoned());

    let stats = engine.get_stats();
    assert_eq!(stats.entries_entered, 2);
    assert_eq!(stats.entries_queued, 1);
}

#[tokio::test]
async fn entries_in_one_bucket_run_in_arrival_order() {
    let (engine, _) = engine();
    let player = PlayerId::new();
    let order = Arc::new(Mutex::new(Vec::new()));

    let holder = engine.enter(&DestroyStructure(player)).await;
    let mut tasks = Vec::new();
    for index in 0..5 {
        // Registration happens here, in arrival order
        let pending = engine.enter(&DestroyStructure(player));
        let order = order.clone();
        tasks.push(tokio::spawn(async move {
            let guard = pending.await;
            order.lock().unwrap().push(index);
            tokio::task::yield_now().await;
            guard.exit();
        }));
    }

    tokio::task::yield_now().await;
    assert!(order.lock().unwrap().is_empty());
    holder.exit();

    for task in tasks {
        task.await.unwrap();
    }
    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn different_tags_do_not_conflict() {
    let (engine, _) = engine();
    let player = PlayerId::new();

    let destroy = engine.enter(&DestroyStructure(player));
    let craft = engine.enter(&CraftItem(player));
    assert!(destroy.is_ready());
    assert!(craft.is_ready());

    let other_player = engine.enter(&DestroyStructure(PlayerId::new()));
    assert!(other_player.is_ready());
}

#[tokio::test]
async fn global_entry_occupies_every_group() {
    let (engine, directory) = engine();
    let alice = PlayerId::new();
    let bob = PlayerId::new();
    directory.connect(alice);
    directory.connect(bob);
    engine.start();

    let digging = engine.enter(&DestroyStructure(alice)).await;
    let wipe = engine.enter(&WipeBuildables);
    let wipe_entry = wipe.entry().unwrap();

    assert!(engine.is_current(SyncScope::Global, wipe_entry));
    assert!(engine.is_current(SyncScope::Player(bob), wipe_entry));
    assert!(engine.is_queued(SyncScope::Player(alice), wipe_entry));
    assert_eq!(wipe_entry.wait_count(), 1);

    // Bob's own activity on the tag now waits for the global wipe
    let bob_build = engine.enter(&DestroyStructure(bob));
    assert!(!bob_build.is_ready());

    digging.exit();
    let wipe = tokio::time::timeout(Duration::from_secs(1), wipe).await.unwrap();
    assert!(!bob_build.is_ready());
    wipe.exit();

    let bob_build = tokio::time::timeout(Duration::from_secs(1), bob_build).await.unwrap();
    assert!(bob_build.is_synchronized());
    engine.stop();
}

#[tokio::test]
async fn late_group_replays_active_global_entries() {
    let (engine, _) = engine();
    let wipe = engine.enter(&WipeBuildables).await;
    let wipe_entry_id = wipe.entry_id();

    let newcomer = PlayerId::new();
    engine.player_connected(newcomer);
    assert!(engine.is_current(SyncScope::Player(newcomer), wipe.entry().unwrap()));

    let build = engine.enter(&DestroyStructure(newcomer));
    assert!(!build.is_ready());
    assert_eq!(engine.get_stats().active_global_entries, 1);

    wipe.exit();
    let build = tokio::time::timeout(Duration::from_secs(1), build).await.unwrap();
    assert_ne!(build.entry_id(), wipe_entry_id);
    assert_eq!(engine.get_stats().active_global_entries, 0);
}

#[tokio::test]
async fn exit_is_idempotent() {
    let (engine, _) = engine();
    let player = PlayerId::new();

    let first = engine.enter(&OpenStorage(player)).await;
    let second = engine.enter(&OpenStorage(player));

    let entry = first.entry().unwrap();
    engine.exit(entry);
    engine.exit(entry);
    assert!(entry.has_exited());

    let second = tokio::time::timeout(Duration::from_secs(1), second).await.unwrap();
    // Releasing the guard of an already exited entry changes nothing
    first.exit();
    assert!(engine.is_current(SyncScope::Player(player), second.entry().unwrap()));
}

#[tokio::test]
async fn happened_event_waits_for_its_request() {
    let (engine, _) = engine();
    let player = PlayerId::new();

    let request = engine.enter(&SpawnVehicleRequested(player)).await;
    let happened = engine.enter(&VehicleSpawned(player));
    assert!(!happened.is_ready());

    request.exit();
    let happened = tokio::time::timeout(Duration::from_secs(1), happened).await.unwrap();
    assert!(happened.is_synchronized());
}

#[tokio::test]
async fn dropping_a_pending_entry_withdraws_it() {
    let (engine, _) = engine();
    let player = PlayerId::new();

    let a = engine.enter(&OpenStorage(player)).await;
    let b = engine.enter(&OpenStorage(player));
    let c = engine.enter(&OpenStorage(player));
    drop(b);

    a.exit();
    let c = tokio::time::timeout(Duration::from_secs(1), c).await.unwrap();
    assert!(engine.is_current(SyncScope::Player(player), c.entry().unwrap()));
}

#[tokio::test(start_paused = true)]
async fn timeout_sweep_promotes_past_a_stuck_occupant() {
    let (engine, _) = engine();
    let player = PlayerId::new();

    let stuck = engine.enter(&OpenStorage(player)).await;
    let waiting = engine.enter(&OpenStorage(player));

    tokio::time::advance(Duration::from_secs(10)).await;
    engine.tick();
    assert!(!waiting.is_ready());

    tokio::time::advance(Duration::from_secs(6)).await;
    engine.tick();
    assert!(waiting.is_ready());
    let waiting = waiting.await;

    // The stuck occupant keeps running; it only learns it lost the slot
    assert!(stuck.is_abandoned());
    assert!(stuck.entry().unwrap().has_exited());
    assert!(engine.is_current(SyncScope::Player(player), waiting.entry().unwrap()));

    stuck.exit();
    assert!(engine.is_current(SyncScope::Player(player), waiting.entry().unwrap()));
    assert_eq!(engine.get_stats().timeouts, 1);
}

#[tokio::test(start_paused = true)]
async fn occupant_without_waiters_is_never_timed_out() {
    let (engine, _) = engine();
    let player = PlayerId::new();

    let alone = engine.enter(&OpenStorage(player)).await;
    tokio::time::advance(Duration::from_secs(60)).await;
    engine.tick();
    assert!(!alone.is_abandoned());
    assert_eq!(engine.get_stats().timeouts, 0);
}

#[tokio::test(start_paused = true)]
async fn periodic_sweep_runs_after_start() {
    let (engine, directory) = engine();
    let player = PlayerId::new();
    directory.connect(player);
    engine.start();

    let _stuck = engine.enter(&DestroyStructure(player)).await;
    let waiting = engine.enter(&DestroyStructure(player));

    // The paused clock auto-advances while the runtime is idle
    let waiting = tokio::time::timeout(Duration::from_secs(30), waiting)
        .await
        .expect("sweep promotes the waiting entry");
    assert!(waiting.is_synchronized());
    assert_eq!(engine.get_stats().timeouts, 1);
    engine.stop();
}

#[tokio::test(start_paused = true)]
async fn zero_sweep_interval_still_runs_the_periodic_sweep() {
    let directory = Arc::new(InMemoryPlayerDirectory::new());
    let settings = SyncSettings {
        timeout_secs: 1,
        sweep_interval_ms: 0,
    };
    let engine = SyncEngine::new(directory.clone(), settings);
    let player = PlayerId::new();
    directory.connect(player);
    engine.start();

    let _stuck = engine.enter(&DestroyStructure(player)).await;
    let waiting = engine.enter(&DestroyStructure(player));

    let waiting = tokio::time::timeout(Duration::from_secs(5), waiting)
        .await
        .expect("sweep promotes the waiting entry");
    assert!(waiting.is_synchronized());
    assert_eq!(engine.get_stats().timeouts, 1);
    engine.stop();
}

#[tokio::test]
async fn stop_resumes_every_waiter_as_abandoned() {
    let (engine, _) = engine();
    let player = PlayerId::new();

    let holder = engine.enter(&OpenStorage(player)).await;
    let waiting = engine.enter(&OpenStorage(player));
    engine.stop();

    let waiting = tokio::time::timeout(Duration::from_secs(1), waiting).await.unwrap();
    assert!(waiting.is_abandoned());
    assert!(!holder.is_abandoned());
    assert_eq!(engine.get_stats().active_groups, 0);
}
