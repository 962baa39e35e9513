//! Notifications emitted by devices and by the client.
//!
//! Both kinds travel over tokio broadcast channels wrapped in [`EventBus`].
//! Publishing with no subscribers is not an error; a slow subscriber that
//! falls more than the channel capacity behind sees `RecvError::Lagged`.
//!
//! Device-level notifications are derived by [`FacetState::update`], which
//! diffs the relay and in-use facets of the latest cached state against the
//! previously recorded values.

use std::net::SocketAddr;

use tokio::sync::broadcast;

use crate::{
    device::{Device, DeviceKind},
    response::EnergyReading,
};

/// Default channel capacity for an event bus.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Notifications emitted by a single device.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// The relay was turned on.
    PowerOn,
    /// The relay was turned off.
    PowerOff,
    /// The relay state was read from the device, changed or not.
    PowerUpdate(bool),
    /// The device started drawing power (or its relay turned on).
    InUse,
    /// The device stopped drawing power (or its relay turned off).
    NotInUse,
    /// The in-use state was read from the device, changed or not.
    InUseUpdate(bool),
    /// A fresh energy meter reading arrived.
    EmeterRealtimeUpdate(EnergyReading),
}

/// Notifications emitted by a [`Client`](crate::Client).
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Discovery saw a device for the first time.
    DeviceNew {
        /// Coarse device classification.
        device_kind: DeviceKind,
        /// The registry entry.
        device: Device,
    },
    /// Discovery saw a known device again.
    DeviceOnline {
        /// Coarse device classification.
        device_kind: DeviceKind,
        /// The registry entry.
        device: Device,
    },
    /// A known device missed too many discovery cycles.
    DeviceOffline {
        /// Coarse device classification.
        device_kind: DeviceKind,
        /// The registry entry.
        device: Device,
    },
    /// A discovery reply could not be decoded. Discovery keeps running.
    DiscoveryInvalid {
        /// Sender of the datagram.
        addr: SocketAddr,
        /// The datagram as received.
        response: Vec<u8>,
        /// The datagram after decryption.
        decrypted: Vec<u8>,
    },
    /// Discovery hit a socket error and stopped.
    Error {
        /// Description of the failure.
        message: String,
    },
}

impl ClientEvent {
    /// The device carried by this event, if any.
    pub fn device(&self) -> Option<&Device> {
        match self {
            ClientEvent::DeviceNew { device, .. }
            | ClientEvent::DeviceOnline { device, .. }
            | ClientEvent::DeviceOffline { device, .. } => Some(device),
            _ => None,
        }
    }

    /// The kind tag carried by this event, if any.
    pub fn device_kind(&self) -> Option<DeviceKind> {
        match self {
            ClientEvent::DeviceNew { device_kind, .. }
            | ClientEvent::DeviceOnline { device_kind, .. }
            | ClientEvent::DeviceOffline { device_kind, .. } => Some(*device_kind),
            _ => None,
        }
    }
}

/// Broadcasts events of type `E` to any number of subscribers.
///
/// Clones share the same channel.
#[derive(Debug)]
pub struct EventBus<E> {
    sender: broadcast::Sender<E>,
}

impl<E: Clone> EventBus<E> {
    /// Creates a bus with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Creates a bus buffering at most `capacity` events per subscriber.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Returns a receiver for every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Publishes an event to all current subscribers.
    pub fn publish(&self, event: E) {
        // No subscribers is fine
        let _ = self.sender.send(event);
    }
}

impl<E: Clone> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

/// Last recorded value of each derived facet.
///
/// `None` means nothing has been recorded yet, so the first update always
/// counts as a change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FacetState {
    /// Relay on/off.
    pub relay_state: Option<bool>,
    /// In use (power above threshold, or relay on without metering).
    pub in_use: Option<bool>,
}

impl FacetState {
    /// Records the current facets without producing events.
    pub fn seed(relay_state: bool, in_use: bool) -> Self {
        Self {
            relay_state: Some(relay_state),
            in_use: Some(in_use),
        }
    }

    /// Records the current facets and returns the events to emit, in order.
    ///
    /// Transition events are produced only on change; the update events are
    /// always produced.
    pub fn update(&mut self, relay_state: bool, in_use: bool) -> Vec<DeviceEvent> {
        let mut events = Vec::with_capacity(4);

        if self.in_use != Some(in_use) {
            self.in_use = Some(in_use);
            events.push(if in_use {
                DeviceEvent::InUse
            } else {
                DeviceEvent::NotInUse
            });
        }
        events.push(DeviceEvent::InUseUpdate(in_use));

        if self.relay_state != Some(relay_state) {
            self.relay_state = Some(relay_state);
            events.push(if relay_state {
                DeviceEvent::PowerOn
            } else {
                DeviceEvent::PowerOff
            });
        }
        events.push(DeviceEvent::PowerUpdate(relay_state));

        events
    }
}
