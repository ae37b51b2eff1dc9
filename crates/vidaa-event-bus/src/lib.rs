//! Event bus with typed pub/sub
//!
//! State changes and reauth requests are published here. Subscribers get a
//! `tokio::sync::broadcast` receiver per event type.

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};
use vidaa_core::{Context, Event, EventData, EventType};

/// Default channel capacity for event subscriptions
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// The event bus for publishing and subscribing to events
pub struct EventBus {
    /// Map of event types to their broadcast senders
    listeners: DashMap<EventType, broadcast::Sender<Event>>,
    capacity: usize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            listeners: DashMap::new(),
            capacity,
        }
    }

    /// Subscribe to events of a specific type
    pub fn subscribe(&self, event_type: impl Into<EventType>) -> broadcast::Receiver<Event> {
        let event_type = event_type.into();
        trace!(event_type = %event_type, "Subscribing to event type");

        self.listeners
            .entry(event_type)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Subscribe to the event type of `T`
    pub fn subscribe_typed<T: EventData>(&self) -> broadcast::Receiver<Event> {
        self.subscribe(T::event_type())
    }

    /// Fire an event to its type's subscribers
    pub fn fire(&self, event: Event) {
        debug!(event_type = %event.event_type, "Firing event");

        if let Some(sender) = self.listeners.get(&event.event_type) {
            // A send error only means nobody is listening
            let _ = sender.send(event);
        }
    }

    /// Fire a typed event
    pub fn fire_typed<T: EventData>(&self, data: T, context: Context) {
        match Event::typed(&data, context) {
            Ok(event) => self.fire(event),
            Err(e) => warn!(event_type = T::event_type(), error = %e, "Dropping unserializable event"),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
