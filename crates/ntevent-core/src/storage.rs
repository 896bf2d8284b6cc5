//! The listener storage facade.
//!
//! One mutex guards the whole aggregate: the poller and listener arenas,
//! the four category sets, and the delivery thread state with its callback
//! table. Every public operation holds the lock only for bookkeeping;
//! callbacks run on the delivery thread with the lock released, and
//! blocking waits release it before they block.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use ntevent_types::{
    check_instance, Category, ConnectionInfo, Event, EventData, EventFlags, Handle, HandleError,
    ListenerHandle, LogMessage, PollerHandle, TopicInfo, Value, ValueEventData,
};
use serde::Serialize;

use crate::config::StorageConfig;
use crate::delivery::{
    DeliverySource, DeliveryState, DeliveryStatus, DeliveryThread, ListenerCallback,
};
use crate::error::DeliveryError;
use crate::listener::{CategorySets, Listener, Poller, VetoFn};
use crate::registry::HandleMap;

/// A removed listener and the aggregate mask it had at removal.
pub type RemovedListener = (ListenerHandle, EventFlags);

/// Point-in-time counters for a storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    /// The instance id the storage was created with.
    pub instance: u8,
    /// Live pollers, including the delivery thread's own poller.
    pub pollers: usize,
    /// Live listeners.
    pub listeners: usize,
    /// Members of the connection category set.
    pub connection_listeners: usize,
    /// Members of the topic category set.
    pub topic_listeners: usize,
    /// Members of the value category set.
    pub value_listeners: usize,
    /// Members of the log category set.
    pub log_listeners: usize,
    /// Registered push-style callbacks.
    pub callbacks: usize,
    /// Events queued across all pollers and not yet read.
    pub queued_events: usize,
    /// Delivery thread lifecycle.
    pub delivery: DeliveryStatus,
}

struct Inner {
    pollers: HandleMap<PollerHandle, Poller>,
    listeners: HandleMap<ListenerHandle, Listener>,
    categories: CategorySets,
    delivery: DeliveryState,
}

impl Inner {
    fn is_delivery_poller(&self, poller: PollerHandle) -> bool {
        self.delivery.running().is_some_and(|t| t.poller == poller)
    }

    fn add_listener(&mut self, poller: PollerHandle) -> ListenerHandle {
        if !self.pollers.contains(poller) {
            return ListenerHandle::INVALID;
        }
        self.listeners
            .add(|handle| Listener::new(handle, poller))
            .unwrap_or(ListenerHandle::INVALID)
    }

    /// Removes listeners and returns their final masks. Callbacks dropped
    /// from the delivery table are pushed to `graveyard` so the caller can
    /// release them after unlocking.
    fn remove_listeners(
        &mut self,
        handles: &[ListenerHandle],
        graveyard: &mut Vec<ListenerCallback>,
    ) -> Vec<RemovedListener> {
        let mut removed = Vec::with_capacity(handles.len());
        for &handle in handles {
            let Some(listener) = self.listeners.remove(handle) else {
                continue;
            };
            if let Some(thread) = self.delivery.running_mut() {
                if thread.poller == listener.poller {
                    graveyard.extend(thread.callbacks.remove(&handle));
                }
            }
            self.categories.remove(handle, listener.mask);
            listener.signal.destroy();
            tracing::debug!(listener = %handle, mask = %listener.mask, "removed listener");
            removed.push((handle, listener.mask));
        }
        removed
    }

    /// Queues events for the explicit `targets`, or for every member of
    /// `category` when `targets` is empty. Returns the number of events
    /// kept.
    fn fan_out<P>(
        &mut self,
        category: Category,
        targets: &[ListenerHandle],
        flags: EventFlags,
        items: &[P],
        make: impl Fn(&P) -> EventData,
    ) -> usize {
        let Inner {
            pollers,
            listeners,
            categories,
            ..
        } = self;
        let mut delivered = 0;
        let mut signal = |handle: ListenerHandle| {
            let Some(listener) = listeners.get_mut(handle) else {
                return;
            };
            let Some(poller) = pollers.get_mut(listener.poller) else {
                return;
            };
            let kept = listener.deliver(flags, items, &mut poller.queue, &make);
            if kept > 0 {
                listener.signal.set();
                poller.signal.set();
                delivered += kept;
            }
        };
        if targets.is_empty() {
            for &handle in categories.members(category) {
                signal(handle);
            }
        } else {
            for &handle in targets {
                signal(handle);
            }
        }
        tracing::trace!(%category, %flags, delivered, "notified listeners");
        delivered
    }
}

pub(crate) struct Shared {
    instance: u8,
    config: StorageConfig,
    inner: Mutex<Inner>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl DeliverySource for Shared {
    fn drain(&self, poller: PollerHandle) -> Vec<Event> {
        self.lock()
            .pollers
            .get_mut(poller)
            .map(Poller::take_queue)
            .unwrap_or_default()
    }

    fn callback(&self, listener: ListenerHandle) -> Option<ListenerCallback> {
        self.lock()
            .delivery
            .running()
            .and_then(|thread| thread.callbacks.get(&listener).cloned())
    }
}

/// Thread-safe listener registry and event fan-out for one instance.
///
/// Consumers either own a poller and drain it with
/// [`read_listener_queue`](Self::read_listener_queue), or register a
/// callback that runs on the storage's delivery thread. The store calls the
/// `notify_*` methods once it has decided that something changed.
///
/// Dropping the storage stops and joins the delivery thread. A callback
/// that needs to call back into the storage should capture a
/// `Weak` reference; a strong one keeps the storage alive through its own
/// callback table.
pub struct ListenerStorage {
    shared: Arc<Shared>,
}

impl ListenerStorage {
    /// Creates an empty storage for `instance` with default configuration.
    ///
    /// # Errors
    ///
    /// Returns `HandleError::InstanceOutOfRange` if `instance` does not fit
    /// the handle encoding.
    pub fn new(instance: u8) -> Result<Self, HandleError> {
        Self::with_config(instance, StorageConfig::default())
    }

    /// Creates an empty storage for `instance`.
    ///
    /// # Errors
    ///
    /// Returns `HandleError::InstanceOutOfRange` if `instance` does not fit
    /// the handle encoding.
    pub fn with_config(instance: u8, config: StorageConfig) -> Result<Self, HandleError> {
        let instance = check_instance(instance)?;
        Ok(Self {
            shared: Arc::new(Shared {
                instance,
                config,
                inner: Mutex::new(Inner {
                    pollers: HandleMap::new(instance),
                    listeners: HandleMap::new(instance),
                    categories: CategorySets::default(),
                    delivery: DeliveryState::NotStarted,
                }),
            }),
        })
    }

    /// The instance id handles from this storage carry.
    pub fn instance(&self) -> u8 {
        self.shared.instance
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.shared.lock()
    }

    /// Allocates a new poller.
    ///
    /// Returns [`PollerHandle::INVALID`] if the handle space is exhausted.
    pub fn create_listener_poller(&self) -> PollerHandle {
        let handle = self
            .lock()
            .pollers
            .add(Poller::new)
            .unwrap_or(PollerHandle::INVALID);
        tracing::debug!(poller = %handle, "created listener poller");
        handle
    }

    /// Destroys a poller after removing every listener bound to it.
    ///
    /// Returns the removed listeners with their final masks so the caller
    /// can finish its own teardown. Unknown handles yield an empty result.
    pub fn destroy_listener_poller(&self, poller: PollerHandle) -> Vec<RemovedListener> {
        let mut graveyard = Vec::new();
        let removed = {
            let mut inner = self.lock();
            if inner.is_delivery_poller(poller) {
                tracing::warn!(%poller, "refusing to destroy the delivery thread's poller");
                return Vec::new();
            }
            let Some(record) = inner.pollers.remove(poller) else {
                return Vec::new();
            };
            let bound: Vec<ListenerHandle> = inner
                .listeners
                .iter()
                .filter(|(_, listener)| listener.poller == record.handle)
                .map(|(handle, _)| handle)
                .collect();
            let removed = inner.remove_listeners(&bound, &mut graveyard);
            record.signal.destroy();
            removed
        };
        tracing::debug!(%poller, listeners = removed.len(), "destroyed listener poller");
        drop(graveyard);
        removed
    }

    /// Adds a pull-style listener whose events are queued on `poller`.
    ///
    /// A non-empty `mask` becomes the listener's first source, with no
    /// veto; [`activate`](Self::activate) adds more. Returns
    /// [`ListenerHandle::INVALID`] if `poller` is unknown or belongs to the
    /// delivery thread.
    pub fn add_listener(&self, poller: PollerHandle, mask: EventFlags) -> ListenerHandle {
        let mut inner = self.lock();
        if inner.is_delivery_poller(poller) {
            tracing::warn!(%poller, "refusing to bind a pull listener to the delivery thread's poller");
            return ListenerHandle::INVALID;
        }
        let handle = inner.add_listener(poller);
        if !handle.is_valid() {
            return handle;
        }
        if !mask.is_empty() {
            if let Some(record) = inner.listeners.get_mut(handle) {
                let delta = record.add_source(mask, None);
                inner.categories.grow(handle, delta);
            }
        }
        tracing::debug!(listener = %handle, %poller, %mask, "added listener");
        handle
    }

    /// Adds a push-style listener whose events are passed to `callback` on
    /// the delivery thread, starting that thread if needed.
    ///
    /// Returns [`ListenerHandle::INVALID`] if the thread cannot be started.
    pub fn add_callback_listener<F>(&self, callback: F) -> ListenerHandle
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let mut inner = self.lock();
        if let Err(err) = self.ensure_delivery_thread(&mut inner) {
            tracing::error!(error = %err, "cannot add callback listener");
            return ListenerHandle::INVALID;
        }
        let Some(poller) = inner.delivery.running().map(|t| t.poller) else {
            return ListenerHandle::INVALID;
        };
        let handle = inner.add_listener(poller);
        if handle.is_valid() {
            if let Some(thread) = inner.delivery.running_mut() {
                thread.callbacks.insert(handle, Arc::new(callback));
            }
            tracing::debug!(listener = %handle, "added callback listener");
        }
        handle
    }

    fn ensure_delivery_thread(&self, inner: &mut Inner) -> Result<(), DeliveryError> {
        match inner.delivery {
            DeliveryState::Running(_) => return Ok(()),
            DeliveryState::Stopped => return Err(DeliveryError::Stopped),
            DeliveryState::NotStarted => {}
        }
        let poller = inner
            .pollers
            .add(Poller::new)
            .ok_or(DeliveryError::PollerUnavailable)?;
        let Some(doorbell) = inner.pollers.get(poller).map(|p| Arc::clone(&p.signal)) else {
            inner.pollers.remove(poller);
            return Err(DeliveryError::PollerUnavailable);
        };
        match DeliveryThread::start(
            &self.shared.config.delivery_thread_name,
            Arc::clone(&self.shared),
            poller,
            doorbell,
        ) {
            Ok(thread) => {
                inner.delivery = DeliveryState::Running(thread);
                Ok(())
            }
            Err(err) => {
                inner.pollers.remove(poller);
                Err(err)
            }
        }
    }

    /// Adds a source to an existing listener.
    ///
    /// The listener joins every category set newly covered by `mask`.
    /// Unknown listeners are ignored.
    pub fn activate(&self, listener: ListenerHandle, mask: EventFlags, veto: Option<VetoFn>) {
        let mut inner = self.lock();
        let Some(record) = inner.listeners.get_mut(listener) else {
            return;
        };
        let delta = record.add_source(mask, veto);
        inner.categories.grow(listener, delta);
        tracing::debug!(%listener, %mask, %delta, "activated listener source");
    }

    /// Removes a listener.
    ///
    /// Returns its handle and final mask, or nothing if it was already
    /// gone.
    pub fn remove_listener(&self, listener: ListenerHandle) -> Vec<RemovedListener> {
        let mut graveyard = Vec::new();
        let removed = self.lock().remove_listeners(&[listener], &mut graveyard);
        drop(graveyard);
        removed
    }

    /// Swaps out and returns everything queued on `poller`. Never blocks.
    ///
    /// The delivery thread's own poller always reads as empty.
    pub fn read_listener_queue(&self, poller: PollerHandle) -> Vec<Event> {
        let mut inner = self.lock();
        if inner.is_delivery_poller(poller) {
            tracing::warn!(%poller, "refusing to read the delivery thread's poller");
            return Vec::new();
        }
        inner
            .pollers
            .get_mut(poller)
            .map(Poller::take_queue)
            .unwrap_or_default()
    }

    /// Blocks until the delivery thread has completed one full dispatch
    /// pass that began after this call, or `timeout` elapses.
    ///
    /// Returns `false` on timeout, or immediately when no delivery thread
    /// is running.
    pub fn wait_for_listener_queue(&self, timeout: Duration) -> bool {
        let (control, ticket) = {
            let inner = self.lock();
            let Some(thread) = inner.delivery.running() else {
                return false;
            };
            let control = Arc::clone(&thread.control);
            let ticket = control.request_flush();
            (control, ticket)
        };
        control.wait_flushed(ticket, timeout)
    }

    /// Blocks until `listener` has new events or `timeout` elapses.
    ///
    /// Returns `false` on timeout, for unknown listeners, and when the
    /// listener is removed while waiting.
    pub fn wait_for_listener(&self, listener: ListenerHandle, timeout: Duration) -> bool {
        let signal = self
            .lock()
            .listeners
            .get(listener)
            .map(|l| Arc::clone(&l.signal));
        signal.is_some_and(|s| s.wait(Some(timeout)))
    }

    /// Blocks until any listener on `poller` has new events or `timeout`
    /// elapses.
    ///
    /// Returns `false` on timeout, for unknown pollers, and when the poller
    /// is destroyed while waiting. The delivery thread's own poller is
    /// refused immediately; its signal wakes that thread.
    pub fn wait_for_poller(&self, poller: PollerHandle, timeout: Duration) -> bool {
        let signal = {
            let inner = self.lock();
            if inner.is_delivery_poller(poller) {
                tracing::warn!(%poller, "refusing to wait on the delivery thread's poller");
                return false;
            }
            inner.pollers.get(poller).map(|p| Arc::clone(&p.signal))
        };
        signal.is_some_and(|s| s.wait(Some(timeout)))
    }

    /// Queues one connection event per entry of `infos`.
    ///
    /// An empty `targets` slice broadcasts to every connection listener.
    pub fn notify_connection(
        &self,
        targets: &[ListenerHandle],
        flags: EventFlags,
        infos: &[ConnectionInfo],
    ) {
        if flags.is_empty() {
            return;
        }
        self.lock()
            .fan_out(Category::Connection, targets, flags, infos, |info| {
                EventData::Connection(info.clone())
            });
    }

    /// Queues one topic event per entry of `infos`.
    ///
    /// An empty `targets` slice broadcasts to every topic listener.
    pub fn notify_topic(&self, targets: &[ListenerHandle], flags: EventFlags, infos: &[TopicInfo]) {
        if flags.is_empty() {
            return;
        }
        self.lock()
            .fan_out(Category::Topic, targets, flags, infos, |info| {
                EventData::Topic(info.clone())
            });
    }

    /// Queues a value change for `topic` as seen through `subentry`.
    ///
    /// An empty `targets` slice broadcasts to every value listener.
    pub fn notify_value(
        &self,
        targets: &[ListenerHandle],
        flags: EventFlags,
        topic: Handle,
        subentry: Handle,
        value: &Value,
    ) {
        if flags.is_empty() {
            return;
        }
        let data = ValueEventData {
            topic,
            subentry,
            value: value.clone(),
        };
        self.lock().fan_out(
            Category::Value,
            targets,
            flags,
            std::slice::from_ref(&data),
            |data| EventData::Value(data.clone()),
        );
    }

    /// Queues a log message.
    ///
    /// An empty `targets` slice broadcasts to every log listener.
    pub fn notify_log(
        &self,
        targets: &[ListenerHandle],
        flags: EventFlags,
        level: u32,
        filename: &str,
        line: u32,
        message: &str,
    ) {
        if flags.is_empty() {
            return;
        }
        let record = LogMessage {
            level,
            filename: filename.to_string(),
            line,
            message: message.to_string(),
        };
        self.lock().fan_out(
            Category::Log,
            targets,
            flags,
            std::slice::from_ref(&record),
            |record| EventData::Log(record.clone()),
        );
    }

    /// Returns current counters.
    pub fn stats(&self) -> StorageStats {
        let inner = self.lock();
        StorageStats {
            instance: self.shared.instance,
            pollers: inner.pollers.len(),
            listeners: inner.listeners.len(),
            connection_listeners: inner.categories.len(Category::Connection),
            topic_listeners: inner.categories.len(Category::Topic),
            value_listeners: inner.categories.len(Category::Value),
            log_listeners: inner.categories.len(Category::Log),
            callbacks: inner.delivery.running().map_or(0, |t| t.callbacks.len()),
            queued_events: inner.pollers.iter().map(|(_, p)| p.queue.len()).sum(),
            delivery: inner.delivery.status(),
        }
    }
}

impl Drop for ListenerStorage {
    fn drop(&mut self) {
        let delivery = std::mem::replace(&mut self.lock().delivery, DeliveryState::Stopped);
        if let DeliveryState::Running(thread) = delivery {
            thread.shutdown();
        }

        let inner = self.lock();
        for (_, poller) in inner.pollers.iter() {
            poller.signal.destroy();
        }
        for (_, listener) in inner.listeners.iter() {
            listener.signal.destroy();
        }
    }
}

impl std::fmt::Debug for ListenerStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerStorage")
            .field("instance", &self.shared.instance)
            .finish_non_exhaustive()
    }
}
