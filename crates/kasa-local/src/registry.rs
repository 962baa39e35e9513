//! Registry of known devices, keyed by device id and optional outlet id.
//!
//! Entries are never removed while the owning client is alive; devices that
//! stop answering discovery are marked offline instead.

use std::collections::HashMap;

use crate::device::{Device, DeviceStatus};

/// Registry key: device id plus full outlet id for outlet entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceKey {
    /// Hardware device id.
    pub device_id: String,
    /// Full outlet id, `None` for whole-device entries.
    pub child_id: Option<String>,
}

impl DeviceKey {
    /// Key for a whole device.
    pub fn device(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            child_id: None,
        }
    }

    /// Key for one outlet of a device.
    pub fn child(device_id: impl Into<String>, child_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            child_id: Some(child_id.into()),
        }
    }
}

/// Distance travelled by a wrapping sequence counter from `last` to `current`.
///
/// The counter runs `0..=ceiling` and then wraps to 0.
///
/// ```
/// use kasa_local::registry::sequence_distance;
///
/// assert_eq!(sequence_distance(7, 4, u64::MAX), 3);
/// assert_eq!(sequence_distance(1, 9, 10), 3); // 9 -> 10 -> 0 -> 1
/// ```
pub fn sequence_distance(current: u64, last: u64, ceiling: u64) -> u64 {
    if current >= last {
        current - last
    } else {
        (ceiling - last.min(ceiling))
            .saturating_add(current)
            .saturating_add(1)
    }
}

/// Map from [`DeviceKey`] to device handle.
#[derive(Debug, Default)]
pub struct Registry {
    devices: HashMap<DeviceKey, Device>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up an entry.
    pub fn get(&self, key: &DeviceKey) -> Option<Device> {
        self.devices.get(key).cloned()
    }

    /// Stores an entry, replacing any previous one under the same key.
    pub fn insert(&mut self, key: DeviceKey, device: Device) {
        self.devices.insert(key, device);
    }

    /// Finds an entry whose [`Device::id`] equals `id`.
    pub fn find_by_id(&self, id: &str) -> Option<Device> {
        self.devices.values().find(|device| device.id() == id).cloned()
    }

    /// All entries, in no particular order.
    pub fn devices(&self) -> Vec<Device> {
        self.devices.values().cloned().collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Returns true if the registry has no entries.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Marks entries silent for at least `tolerance` cycles as offline.
    ///
    /// Returns only the entries that changed state, so an entry is reported
    /// once per outage.
    pub fn mark_silent_offline(&self, sequence: u64, tolerance: u64, ceiling: u64) -> Vec<Device> {
        self.devices
            .values()
            .filter(|device| device.status() != DeviceStatus::Offline)
            .filter(|device| {
                sequence_distance(sequence, device.last_seen_sequence(), ceiling) >= tolerance
            })
            .filter(|device| device.mark_offline())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        device::DeviceOptions,
        transport::{NetworkTransport, SendOptions},
    };
    use serde_json::json;
    use std::sync::Arc;

    fn device(id: &str, last_seen: u64) -> Device {
        let device = Device::new(
            Arc::new(NetworkTransport::new()),
            json!({"deviceId": id, "alias": id}),
            "127.0.0.1",
            9999,
            None,
            SendOptions::default(),
            DeviceOptions::default(),
        );
        device.set_last_seen_sequence(last_seen);
        device
    }

    #[test]
    fn test_offline_exactly_at_tolerance() {
        let mut registry = Registry::new();
        registry.insert(DeviceKey::device("A"), device("A", 5));

        assert!(registry.mark_silent_offline(7, 3, u64::MAX).is_empty());

        let offline = registry.mark_silent_offline(8, 3, u64::MAX);
        assert_eq!(offline.len(), 1);
        assert_eq!(offline[0].status(), DeviceStatus::Offline);

        // Reported once per outage
        assert!(registry.mark_silent_offline(9, 3, u64::MAX).is_empty());
    }

    #[test]
    fn test_offline_across_wrap() {
        let mut registry = Registry::new();
        registry.insert(DeviceKey::device("B"), device("B", 9));

        assert!(registry.mark_silent_offline(0, 3, 10).is_empty());
        assert_eq!(registry.mark_silent_offline(1, 3, 10).len(), 1);
    }

    #[test]
    fn test_find_by_id() {
        let mut registry = Registry::new();
        registry.insert(DeviceKey::device("C"), device("C", 0));
        assert_eq!(registry.find_by_id("C").map(|d| d.alias()), Some("C".to_string()));
        assert!(registry.find_by_id("D").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_sequence_distance_without_wrap() {
        assert_eq!(sequence_distance(5, 5, u64::MAX), 0);
        assert_eq!(sequence_distance(8, 5, u64::MAX), 3);
    }

    #[test]
    fn test_sequence_distance_across_wrap() {
        // Ceiling 3: sequence runs 0, 1, 2, 3, 0, ...
        assert_eq!(sequence_distance(0, 3, 3), 1);
        assert_eq!(sequence_distance(1, 2, 3), 3);
        assert_eq!(sequence_distance(0, u64::MAX, u64::MAX), 1);
    }

    #[test]
    fn test_keys_distinguish_outlets() {
        let mut keys = std::collections::HashSet::new();
        keys.insert(DeviceKey::device("8006"));
        keys.insert(DeviceKey::child("8006", "800600"));
        keys.insert(DeviceKey::child("8006", "800601"));
        keys.insert(DeviceKey::device("8006"));
        assert_eq!(keys.len(), 3);
    }
}
