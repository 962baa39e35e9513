//! Builders for common command trees.
//!
//! Commands are nested JSON objects of the form `{module: {operation: args}}`.
//! Several modules may be combined in one request with [`merge`].
//!
//! # Example
//!
//! ```
//! use kasa_local::commands;
//!
//! let cmd = commands::merge([commands::sysinfo(), commands::emeter_realtime()]);
//! assert!(cmd["system"]["get_sysinfo"].is_object());
//! assert!(cmd["emeter"]["get_realtime"].is_object());
//! ```

use serde_json::{Map, Value, json};

/// The `system` module.
pub const SYSTEM: &str = "system";

/// The `emeter` module.
pub const EMETER: &str = "emeter";

/// Routing key for outlet addressing, attached at the envelope root.
pub const CONTEXT: &str = "context";

/// The fixed discovery probe.
pub const DISCOVERY_PROBE: &str = r#"{"system":{"get_sysinfo":{}}}"#;

/// Get system information.
pub fn sysinfo() -> Value {
    json!({ SYSTEM: { "get_sysinfo": {} } })
}

/// Turn the relay on or off.
pub fn set_relay_state(on: bool) -> Value {
    json!({ SYSTEM: { "set_relay_state": { "state": u8::from(on) } } })
}

/// Change the device (or outlet) alias.
pub fn set_alias(alias: &str) -> Value {
    json!({ SYSTEM: { "set_dev_alias": { "alias": alias } } })
}

/// Turn the LED indicator off (`true`) or on (`false`).
pub fn set_led_off(off: bool) -> Value {
    json!({ SYSTEM: { "set_led_off": { "off": u8::from(off) } } })
}

/// Set the device location.
///
/// Devices also take the coordinates as integers scaled by 10000.
pub fn set_location(latitude: f64, longitude: f64) -> Value {
    json!({
        SYSTEM: {
            "set_dev_location": {
                "latitude": latitude,
                "longitude": longitude,
                "latitude_i": (latitude * 10000.0).round() as i64,
                "longitude_i": (longitude * 10000.0).round() as i64,
            }
        }
    })
}

/// Reboot the device after `delay` seconds.
pub fn reboot(delay: u32) -> Value {
    json!({ SYSTEM: { "reboot": { "delay": delay } } })
}

/// Factory reset the device after `delay` seconds.
///
/// **Warning:** This will erase all settings and require re-setup.
pub fn reset(delay: u32) -> Value {
    json!({ SYSTEM: { "reset": { "delay": delay } } })
}

/// Get real-time energy meter readings.
///
/// Only available on devices with energy monitoring (e.g., HS110, KP115).
pub fn emeter_realtime() -> Value {
    json!({ EMETER: { "get_realtime": {} } })
}

/// Combines several command trees into one request.
///
/// Operations for the same module are merged; later entries win on conflict.
pub fn merge(commands: impl IntoIterator<Item = Value>) -> Value {
    let mut merged = Map::new();
    for command in commands {
        let Value::Object(modules) = command else {
            continue;
        };
        for (module, operations) in modules {
            let slot = merged
                .entry(module)
                .or_insert_with(|| Value::Object(Map::new()));
            match (slot, operations) {
                (Value::Object(existing), Value::Object(ops)) => existing.extend(ops),
                (slot, operations) => *slot = operations,
            }
        }
    }
    Value::Object(merged)
}
