//! Scripted soak scenario: simulated players demolishing structures and
//! spawning vehicles while listeners veto, audit and report.

use async_trait::async_trait;
use horizon_event_mediator::{
    cancellable_via, AsyncEventListener, CancelState, Cancellable, DispatchError, Event, EventListener,
    EventMediator, InMemoryPlayerDirectory, ListenerError, ListenerOptions, PlayerId, SyncPolicy,
};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// A player asks to destroy one of their structures.
#[derive(Debug)]
pub struct StructureDestroyRequested {
    pub player: PlayerId,
    pub structure: u64,
    cancel: CancelState,
}

impl Event for StructureDestroyRequested {
    fn synchronization() -> SyncPolicy {
        SyncPolicy::per_player().with_tag("buildables")
    }

    fn player(&self) -> Option<PlayerId> {
        Some(self.player)
    }

    cancellable_via!(cancel);
}

/// A player asks for a vehicle; the vehicle pool is shared by everyone.
#[derive(Debug)]
pub struct VehicleSpawnRequested {
    pub player: PlayerId,
    cancel: CancelState,
}

impl Event for VehicleSpawnRequested {
    fn synchronization() -> SyncPolicy {
        SyncPolicy::global().with_tag("vehicle_pool")
    }

    fn player(&self) -> Option<PlayerId> {
        Some(self.player)
    }

    cancellable_via!(cancel);
}

/// A requested vehicle was spawned.
#[derive(Debug)]
pub struct VehicleSpawned {
    pub player: PlayerId,
}

impl Event for VehicleSpawned {
    fn synchronization() -> SyncPolicy {
        SyncPolicy::happened_of::<VehicleSpawnRequested>()
    }

    fn player(&self) -> Option<PlayerId> {
        Some(self.player)
    }
}

/// Every seventh structure is a protected landmark.
struct ProtectedStructures;

impl EventListener<StructureDestroyRequested> for ProtectedStructures {
    fn handle_event(&self, event: &mut StructureDestroyRequested) -> Result<(), ListenerError> {
        if event.structure % 7 == 0 {
            debug!(player = %event.player, structure = event.structure, "Protected structure");
            event.cancel.cancel(true);
        }
        Ok(())
    }

    fn options(&self) -> ListenerOptions {
        ListenerOptions::new().priority(10)
    }
}

/// Writes an audit record off the main context.
struct DestructionAudit {
    records: Arc<AtomicUsize>,
}

#[async_trait]
impl AsyncEventListener<StructureDestroyRequested> for DestructionAudit {
    async fn handle_event(&self, _event: &mut StructureDestroyRequested) -> Result<(), ListenerError> {
        tokio::time::sleep(Duration::from_millis(1)).await;
        self.records.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Caps how many vehicles may be granted in total.
struct VehicleQuota {
    granted: Arc<AtomicUsize>,
    limit: usize,
}

impl EventListener<VehicleSpawnRequested> for VehicleQuota {
    fn handle_event(&self, event: &mut VehicleSpawnRequested) -> Result<(), ListenerError> {
        let reserved = self
            .granted
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |granted| {
                (granted < self.limit).then_some(granted + 1)
            });
        if reserved.is_err() {
            debug!(player = %event.player, limit = self.limit, "Vehicle quota exhausted");
            event.cancel.cancel(false);
        }
        Ok(())
    }
}

struct SpawnTelemetry {
    spawned: Arc<AtomicUsize>,
}

impl EventListener<VehicleSpawned> for SpawnTelemetry {
    fn handle_event(&self, _event: &mut VehicleSpawned) -> Result<(), ListenerError> {
        self.spawned.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn options(&self) -> ListenerOptions {
        ListenerOptions::new().run_instantly()
    }
}

/// Shared counters of one scenario run.
#[derive(Debug, Clone, Default)]
pub struct Counters {
    audit_records: Arc<AtomicUsize>,
    granted: Arc<AtomicUsize>,
    vehicles: Arc<AtomicUsize>,
}

/// Registers the scenario listeners with the mediator.
pub fn register_listeners(
    mediator: &EventMediator,
    counters: &Counters,
    vehicle_limit: usize,
) -> Result<(), DispatchError> {
    let registry = mediator.registry();
    registry.register_sync(ProtectedStructures)?;
    registry.register_async(DestructionAudit {
        records: counters.audit_records.clone(),
    })?;
    registry.register_sync(VehicleQuota {
        granted: counters.granted.clone(),
        limit: vehicle_limit,
    })?;
    registry.register_sync(SpawnTelemetry {
        spawned: counters.vehicles.clone(),
    })?;
    Ok(())
}

/// Outcome of a scenario run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScenarioReport {
    pub players: usize,
    pub raised: usize,
    pub proceeded: usize,
    pub vetoed: usize,
    pub audit_records: usize,
    pub vehicles_spawned: usize,
    pub elapsed_ms: u64,
}

#[derive(Debug, Default)]
struct PlayerTally {
    raised: usize,
    proceeded: usize,
}

async fn play(mediator: Arc<EventMediator>, player: PlayerId, events: usize) -> PlayerTally {
    let mut tally = PlayerTally::default();
    for step in 0..events {
        let proceeded = if step % 10 == 9 {
            let mut request = VehicleSpawnRequested {
                player,
                cancel: CancelState::new(),
            };
            let proceed = mediator.raise(&mut request).await;
            if proceed {
                tally.raised += 1;
                if mediator.raise(&mut VehicleSpawned { player }).await {
                    tally.proceeded += 1;
                }
            }
            proceed
        } else {
            let mut request = StructureDestroyRequested {
                player,
                structure: step as u64,
                cancel: CancelState::new(),
            };
            mediator.raise(&mut request).await
        };

        tally.raised += 1;
        if proceeded {
            tally.proceeded += 1;
        }
    }
    tally
}

/// Connects `players` simulated players and lets each raise `events`
/// events concurrently.
pub async fn run(
    mediator: Arc<EventMediator>,
    directory: &InMemoryPlayerDirectory,
    counters: &Counters,
    players: usize,
    events: usize,
) -> ScenarioReport {
    let started = Instant::now();
    let ids: Vec<PlayerId> = (0..players).map(|_| PlayerId::new()).collect();
    for player in &ids {
        directory.connect(*player);
        mediator.sync_engine().player_connected(*player);
    }
    info!(players, events, "🎮 Scenario started");

    let tasks = ids
        .iter()
        .map(|player| tokio::spawn(play(mediator.clone(), *player, events)));
    let mut report = ScenarioReport {
        players,
        ..ScenarioReport::default()
    };
    for result in futures::future::join_all(tasks).await {
        match result {
            Ok(tally) => {
                report.raised += tally.raised;
                report.proceeded += tally.proceeded;
            }
            Err(e) => tracing::error!("Simulated player task failed: {}", e),
        }
    }

    for player in &ids {
        directory.disconnect(*player);
        mediator.sync_engine().player_disconnected(*player);
    }

    report.vetoed = report.raised - report.proceeded;
    report.audit_records = counters.audit_records.load(Ordering::Relaxed);
    report.vehicles_spawned = counters.vehicles.load(Ordering::Relaxed);
    report.elapsed_ms = started.elapsed().as_millis() as u64;
    info!(raised = report.raised, vetoed = report.vetoed, "🏁 Scenario finished");
    report
}
