//! Listener registry (the service locator) and dynamic listener providers.

use super::metadata::MetadataCache;
use super::{AsyncEventListener, EventListener, ListenerHandle, ListenerKind};
use crate::error::DispatchError;
use crate::events::Event;
use dashmap::DashMap;
use std::any::{Any, TypeId};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Source of listeners enumerated at dispatch time, e.g. UI components
/// that register themselves while they are visible.
pub trait ListenerProvider: Send + Sync {
    /// Offer every listener this provider has for the requested payload type.
    fn enumerate(&self, request: &mut ListenerRequest<'_>);

    fn provider_name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

struct Collected<E: Event> {
    sync: Vec<ListenerHandle<E>>,
    asynchronous: Vec<ListenerHandle<E>>,
}

impl<E: Event> Default for Collected<E> {
    fn default() -> Self {
        Self {
            sync: Vec::new(),
            asynchronous: Vec::new(),
        }
    }
}

impl<E: Event> Collected<E> {
    fn push(&mut self, handle: ListenerHandle<E>) {
        match handle.kind() {
            ListenerKind::Sync => self.sync.push(handle),
            ListenerKind::Async => self.asynchronous.push(handle),
        }
    }
}

/// Request handed to a [`ListenerProvider`] for one payload type.
///
/// Offers for any other payload type are ignored, so a provider may offer
/// everything it holds without checking [`ListenerRequest::wants`] first.
pub struct ListenerRequest<'a> {
    event_type: TypeId,
    event_name: &'static str,
    sink: &'a mut dyn Any,
}

impl ListenerRequest<'_> {
    pub fn event_type(&self) -> TypeId {
        self.event_type
    }

    pub fn event_name(&self) -> &'static str {
        self.event_name
    }

    pub fn wants<E: Event>(&self) -> bool {
        self.event_type == TypeId::of::<E>()
    }

    pub fn offer<E: Event>(&mut self, handle: ListenerHandle<E>) -> bool {
        match self.sink.downcast_mut::<Collected<E>>() {
            Some(collected) => {
                collected.push(handle);
                true
            }
            None => false,
        }
    }

    pub fn offer_sync<E: Event, L: EventListener<E>>(&mut self, listener: Arc<L>) -> bool {
        self.offer(ListenerHandle::sync(listener))
    }

    pub fn offer_async<E: Event, L: AsyncEventListener<E>>(&mut self, listener: Arc<L>) -> bool {
        self.offer(ListenerHandle::asynchronous(listener))
    }
}

/// Registry of listeners keyed by payload type, plus the providers that
/// contribute listeners dynamically.
pub struct ListenerRegistry {
    /// `TypeId::of::<E>()` -> `Collected<E>`
    listeners: DashMap<TypeId, Box<dyn Any + Send + Sync>>,
    providers: RwLock<Vec<Arc<dyn ListenerProvider>>>,
    metadata: MetadataCache,
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("event_types", &self.listeners.len())
            .field("providers", &self.provider_count())
            .field("cached_metadata", &self.metadata.len())
            .finish()
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self {
            listeners: DashMap::new(),
            providers: RwLock::new(Vec::new()),
            metadata: MetadataCache::new(),
        }
    }

    pub fn metadata(&self) -> &MetadataCache {
        &self.metadata
    }

    /// Registers a synchronous listener for `E`.
    pub fn register_sync<E, L>(&self, listener: L) -> Result<(), DispatchError>
    where
        E: Event,
        L: EventListener<E>,
    {
        self.register_handle(ListenerHandle::sync(Arc::new(listener)))
    }

    /// Registers an asynchronous listener for `E`. Rejects listeners that
    /// declare `must_run_instantly`.
    pub fn register_async<E, L>(&self, listener: L) -> Result<(), DispatchError>
    where
        E: Event,
        L: AsyncEventListener<E>,
    {
        self.register_handle(ListenerHandle::asynchronous(Arc::new(listener)))
    }

    /// Registers an already wrapped listener, validating its metadata first.
    pub fn register_handle<E: Event>(&self, handle: ListenerHandle<E>) -> Result<(), DispatchError> {
        let metadata = self.metadata.resolve(&handle)?;
        let name = handle.name();

        let mut entry = self
            .listeners
            .entry(TypeId::of::<E>())
            .or_insert_with(|| Box::new(Collected::<E>::default()));
        if let Some(collected) = entry.downcast_mut::<Collected<E>>() {
            collected.push(handle);
        }
        drop(entry);

        debug!(
            event = std::any::type_name::<E>(),
            listener = name,
            priority = metadata.priority,
            "📝 Registered listener"
        );
        Ok(())
    }

    pub fn add_provider(&self, provider: Arc<dyn ListenerProvider>) {
        debug!(provider = provider.provider_name(), "📝 Registered listener provider");
        self.providers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(provider);
    }

    pub fn provider_count(&self) -> usize {
        self.providers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Number of listeners registered directly for `E` (providers excluded).
    pub fn listener_count<E: Event>(&self) -> usize {
        self.listeners
            .get(&TypeId::of::<E>())
            .and_then(|entry| {
                entry
                    .downcast_ref::<Collected<E>>()
                    .map(|collected| collected.sync.len() + collected.asynchronous.len())
            })
            .unwrap_or(0)
    }

    /// Every listener for `E` in discovery order: registered synchronous,
    /// provided synchronous, registered asynchronous, provided asynchronous.
    pub fn listeners_for<E: Event>(&self) -> Vec<ListenerHandle<E>> {
        let mut registered = Collected::<E>::default();
        if let Some(entry) = self.listeners.get(&TypeId::of::<E>()) {
            if let Some(collected) = entry.downcast_ref::<Collected<E>>() {
                registered.sync.extend(collected.sync.iter().cloned());
                registered.asynchronous.extend(collected.asynchronous.iter().cloned());
            }
        }

        let mut provided = Collected::<E>::default();
        let providers = self
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for provider in providers {
            let mut request = ListenerRequest {
                event_type: TypeId::of::<E>(),
                event_name: std::any::type_name::<E>(),
                sink: &mut provided,
            };
            provider.enumerate(&mut request);
        }

        let mut all = registered.sync;
        all.append(&mut provided.sync);
        all.append(&mut registered.asynchronous);
        all.append(&mut provided.asynchronous);
        all
    }
}
