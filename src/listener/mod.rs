//! Listener registry and dispatch of decoded telegrams and events.
//!
//! Radio telegrams are routed by sender id, events are broadcast, and while
//! discovery is active teach-in traffic goes exclusively to the teach-in
//! listener. Listener callbacks run on the read loop; keep them short.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::Error;
use crate::protocol::{EventMessage, EventType, RadioTelegram, Rorg, SenderId};

/// Receives radio telegrams from one sender.
pub trait PacketListener: Send + Sync {
    /// Called for every telegram from a sender this listener is registered for.
    fn packet_received(&self, telegram: &RadioTelegram);
}

/// Receives teach-in traffic while discovery is active.
pub trait TeachInListener: Send + Sync {
    /// Called for teach-in telegrams (and RPS telegrams, which carry no
    /// teach-in flag).
    fn teach_in_received(&self, telegram: &RadioTelegram);

    /// Called for Smart Ack confirm-learn events.
    fn confirm_learn_received(&self, _event: &EventMessage) {}
}

/// Receives module events.
pub trait EventListener: Send + Sync {
    /// Called for every event except confirm-learn.
    fn event_received(&self, event: &EventMessage);
}

/// Receives unrecoverable I/O failures.
pub trait ErrorListener: Send + Sync {
    /// Called once per failure.
    fn error_occurred(&self, error: &Error);
}

impl<F> PacketListener for F
where
    F: Fn(&RadioTelegram) + Send + Sync,
{
    fn packet_received(&self, telegram: &RadioTelegram) {
        self(telegram);
    }
}

impl<F> TeachInListener for F
where
    F: Fn(&RadioTelegram) + Send + Sync,
{
    fn teach_in_received(&self, telegram: &RadioTelegram) {
        self(telegram);
    }
}

impl<F> EventListener for F
where
    F: Fn(&EventMessage) + Send + Sync,
{
    fn event_received(&self, event: &EventMessage) {
        self(event);
    }
}

impl<F> ErrorListener for F
where
    F: Fn(&Error) + Send + Sync,
{
    fn error_occurred(&self, error: &Error) {
        self(error);
    }
}

/// Where a dispatched telegram or event ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routing {
    /// Nobody received it.
    Dropped,
    /// Delivered to the teach-in listener only.
    TeachIn,
    /// Delivered to this many regular listeners.
    Listeners(usize),
}

#[derive(Default)]
struct Listeners {
    packet: HashMap<SenderId, Vec<Arc<dyn PacketListener>>>,
    teach_in: Option<Arc<dyn TeachInListener>>,
    event: Vec<Arc<dyn EventListener>>,
    filtered_sender_id: Option<SenderId>,
}

/// Listener identity is the allocation, not the value.
fn same_listener<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Subscriptions of device handlers.
///
/// The lock is held only to mutate or snapshot the mappings; callbacks are
/// invoked on the snapshot so slow listeners never block registration.
#[derive(Default)]
pub struct ListenerRegistry {
    inner: RwLock<Listeners>,
}

impl ListenerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Listeners> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Listeners> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a listener for telegrams from `sender_id`.
    pub fn add_packet_listener(&self, listener: Arc<dyn PacketListener>, sender_id: SenderId) {
        let mut inner = self.write();
        let listeners = inner.packet.entry(sender_id).or_default();
        if !listeners.iter().any(|l| same_listener(l, &listener)) {
            listeners.push(listener);
        }
    }

    /// Removes a listener registered for `sender_id`.
    pub fn remove_packet_listener(&self, listener: &Arc<dyn PacketListener>, sender_id: SenderId) {
        let mut inner = self.write();
        if let Some(listeners) = inner.packet.get_mut(&sender_id) {
            listeners.retain(|l| !same_listener(l, listener));
            if listeners.is_empty() {
                inner.packet.remove(&sender_id);
            }
        }
    }

    /// Registers an event listener.
    pub fn add_event_listener(&self, listener: Arc<dyn EventListener>) {
        let mut inner = self.write();
        if !inner.event.iter().any(|l| same_listener(l, &listener)) {
            inner.event.push(listener);
        }
    }

    /// Removes an event listener.
    pub fn remove_event_listener(&self, listener: &Arc<dyn EventListener>) {
        self.write().event.retain(|l| !same_listener(l, listener));
    }

    /// Routes teach-in traffic to `listener` until [`stop_discovery`](Self::stop_discovery).
    pub fn start_discovery(&self, listener: Arc<dyn TeachInListener>) {
        self.write().teach_in = Some(listener);
    }

    /// Ends discovery; teach-in telegrams are discarded again.
    pub fn stop_discovery(&self) {
        self.write().teach_in = None;
    }

    /// Returns true while a teach-in listener is registered.
    #[must_use]
    pub fn is_discovering(&self) -> bool {
        self.read().teach_in.is_some()
    }

    /// Ignores telegrams from the base id block of `sender_id`.
    ///
    /// Used with the gateway's own base id so telegrams it sent and a
    /// repeater echoed back are not mistaken for device traffic.
    pub fn set_filtered_sender_id(&self, sender_id: Option<SenderId>) {
        self.write().filtered_sender_id = sender_id;
    }

    /// Returns the number of listeners registered for `sender_id`.
    #[must_use]
    pub fn packet_listener_count(&self, sender_id: SenderId) -> usize {
        self.read().packet.get(&sender_id).map_or(0, Vec::len)
    }

    /// Returns true if any sender has listeners registered.
    #[must_use]
    pub fn has_packet_listeners(&self) -> bool {
        !self.read().packet.is_empty()
    }

    /// Releases every listener.
    pub fn clear(&self) {
        let mut inner = self.write();
        inner.packet.clear();
        inner.event.clear();
        inner.teach_in = None;
    }

    /// Routes a radio telegram.
    pub fn dispatch_telegram(&self, telegram: &RadioTelegram) -> Routing {
        if telegram.rorg() == Rorg::Unknown {
            tracing::trace!("discarding telegram with unknown RORG");
            return Routing::Dropped;
        }
        let Some(sender_id) = telegram.sender_id() else {
            return Routing::Dropped;
        };

        let (teach_in, listeners) = {
            let inner = self.read();
            if inner
                .filtered_sender_id
                .is_some_and(|filtered| filtered.same_base_block(sender_id))
            {
                tracing::trace!("discarding own telegram from {sender_id}");
                return Routing::Dropped;
            }
            (inner.teach_in.clone(), inner.packet.get(&sender_id).cloned())
        };

        if telegram.is_teach_in() || telegram.rorg() == Rorg::Rps {
            if let Some(teach_in) = teach_in {
                tracing::info!("received teach-in telegram from {sender_id}");
                teach_in.teach_in_received(telegram);
                return Routing::TeachIn;
            }
            if telegram.is_teach_in() {
                tracing::info!("discarding teach-in telegram from unknown device {sender_id}");
                return Routing::Dropped;
            }
        }

        let Some(listeners) = listeners else {
            tracing::trace!("no listener for {sender_id}");
            return Routing::Dropped;
        };
        for listener in &listeners {
            listener.packet_received(telegram);
        }
        Routing::Listeners(listeners.len())
    }

    /// Routes a module event.
    pub fn dispatch_event(&self, event: &EventMessage) -> Routing {
        if event.event_type() == EventType::SmartAckConfirmLearn {
            let teach_in = self.read().teach_in.clone();
            return match teach_in {
                Some(listener) => {
                    tracing::info!("received confirm-learn event");
                    listener.confirm_learn_received(event);
                    Routing::TeachIn
                }
                None => {
                    tracing::info!("discarding confirm-learn event, discovery is not active");
                    Routing::Dropped
                }
            };
        }

        let listeners = self.read().event.clone();
        for listener in &listeners {
            listener.event_received(event);
        }
        Routing::Listeners(listeners.len())
    }
}
