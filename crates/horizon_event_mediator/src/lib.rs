//! # Horizon Event Mediator
//!
//! Prioritised in-process event dispatch and cross-event synchronization
//! for game servers. Gameplay code raises events ("a structure is about to
//! be destroyed", "a vehicle was spawned") and any number of independent
//! listeners observe, veto or augment them.
//!
//! ## Core Features
//!
//! - **Prioritised Dispatch**: Listeners run by descending priority, with
//!   must-run-instantly listeners ahead of everything else
//! - **Cooperative Cancellation**: Cancellable payloads stop the chain
//!   and/or the underlying action
//! - **Fault Isolation**: A failing or panicking listener is logged and
//!   cancels the payload instead of crashing the caller
//! - **Main Context Affinity**: Main-affine listeners always run on the
//!   single main context; asynchronous listeners may work off it
//! - **Synchronization**: Conflicting events are serialized per tag or per
//!   type, scoped to one player or globally
//! - **Statistics**: Built-in counters for both engines
//!
//! ## Quick Start Example
//!
//! ```rust
//! use horizon_event_mediator::*;
//! use std::sync::Arc;
//!
//! #[derive(Debug, Default)]
//! struct DoorOpenRequested {
//!     cancel: CancelState,
//! }
//!
//! impl Event for DoorOpenRequested {
//!     fn synchronization() -> SyncPolicy {
//!         SyncPolicy::global().with_tag("doors")
//!     }
//!
//!     cancellable_via!(cancel);
//! }
//!
//! struct LockedDoors;
//!
//! impl EventListener<DoorOpenRequested> for LockedDoors {
//!     fn handle_event(&self, event: &mut DoorOpenRequested) -> Result<(), ListenerError> {
//!         event.cancel.cancel(false);
//!         Ok(())
//!     }
//!
//!     fn options(&self) -> ListenerOptions {
//!         ListenerOptions::new().priority(10)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let directory = Arc::new(InMemoryPlayerDirectory::new());
//!     let mediator = create_event_mediator(MediatorConfig::default(), directory);
//!     mediator.registry().register_sync(LockedDoors)?;
//!     mediator.start();
//!
//!     let proceed = mediator.raise(&mut DoorOpenRequested::default()).await;
//!     assert!(!proceed);
//!
//!     mediator.stop();
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod listener;
pub mod main_context;
pub mod mediator;
pub mod sync;
pub mod types;

pub use async_trait::async_trait;
pub use config::{DispatchSettings, LoggingSettings, MediatorConfig, SyncSettings};
pub use dispatch::{DispatchStats, EventDispatcher};
pub use error::{ConfigError, DispatchError, ListenerError};
pub use events::{
    CancelState, Cancellable, Event, RequestModel, SyncPolicy, SynchronizationContext,
};
pub use listener::{
    AsyncEventListener, EventListener, ListenerHandle, ListenerKind, ListenerMetadata,
    ListenerOptions, ListenerProvider, ListenerRegistry, ListenerRequest,
};
pub use main_context::{MainContext, MainGuard};
pub use mediator::{create_event_mediator, EventMediator, MediatorStats};
pub use sync::{
    EnterFuture, InMemoryPlayerDirectory, PlayerDirectory, ResolvedPolicy, SyncEngine, SyncEntry,
    SyncGuard, SyncScope, SyncStats,
};
pub use types::{EventId, PlayerId};
