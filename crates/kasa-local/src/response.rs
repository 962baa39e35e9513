//! Typed views of device replies.
//!
//! Devices answer with loosely typed JSON and field names vary between
//! models and firmware. These structures tolerate missing fields, and a field
//! of an unexpected type falls back to its default without affecting the
//! others. They are only ever derived from the raw reply; the raw
//! `serde_json::Value` remains the source of truth.
//!
//! # Example
//!
//! ```
//! use kasa_local::response::SysInfo;
//!
//! let json = r#"{"alias":"Living Room","model":"HS103","mic_type":"IOT.SMARTPLUGSWITCH"}"#;
//! let info: SysInfo = serde_json::from_str(json).unwrap();
//! assert_eq!(info.alias, "Living Room");
//! assert_eq!(info.type_name(), "IOT.SMARTPLUGSWITCH");
//! ```

use serde::{Deserialize, Deserializer, Serialize, de::DeserializeOwned};
use serde_json::Value;

/// Device system information, the result of `system.get_sysinfo`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SysInfo {
    /// Device alias/name set by the user.
    #[serde(default, deserialize_with = "lenient")]
    pub alias: String,

    /// Device model (e.g., "HS103", "KP115", "HS300(US)").
    #[serde(default, deserialize_with = "lenient")]
    pub model: String,

    /// Unique device ID.
    #[serde(default, rename = "deviceId", deserialize_with = "lenient")]
    pub device_id: String,

    /// Hardware version.
    #[serde(default, deserialize_with = "lenient")]
    pub hw_ver: String,

    /// Software/firmware version.
    #[serde(default, deserialize_with = "lenient")]
    pub sw_ver: String,

    /// Free-form description, reported by some models.
    #[serde(default, deserialize_with = "lenient")]
    pub description: Option<String>,

    /// Device name, reported by some models instead of `description`.
    #[serde(default, deserialize_with = "lenient")]
    pub dev_name: Option<String>,

    /// MAC address. Some devices use `mic_mac` or `ethernet_mac` instead.
    #[serde(default, deserialize_with = "lenient")]
    pub mac: String,

    /// MAC address field used by bulbs.
    #[serde(default, deserialize_with = "lenient")]
    pub mic_mac: String,

    /// MAC address field used by wired devices.
    #[serde(default, deserialize_with = "lenient")]
    pub ethernet_mac: String,

    /// Device type identifier, e.g. `IOT.SMARTPLUGSWITCH`.
    #[serde(default, rename = "type", deserialize_with = "lenient")]
    pub device_type: String,

    /// Device type identifier used by bulbs, e.g. `IOT.SMARTBULB`.
    #[serde(default, deserialize_with = "lenient")]
    pub mic_type: String,

    /// Feature flags, e.g. `TIM:ENE`.
    #[serde(default, deserialize_with = "lenient")]
    pub feature: String,

    /// Current relay state (1 = on, 0 = off).
    /// For power strips, check `children` for individual outlets.
    #[serde(default, deserialize_with = "lenient")]
    pub relay_state: u8,

    /// Whether the LED indicator is off (1 = off, 0 = on).
    #[serde(default, deserialize_with = "lenient")]
    pub led_off: u8,

    /// Brightness, present only on dimmable plugs and switches.
    #[serde(default, deserialize_with = "lenient")]
    pub brightness: Option<u8>,

    /// Seconds since the relay was turned on (0 if off).
    #[serde(default, deserialize_with = "lenient")]
    pub on_time: u64,

    /// WiFi signal strength in dBm.
    #[serde(default, deserialize_with = "lenient")]
    pub rssi: i32,

    /// Outlets of multi-outlet devices such as the HS300.
    #[serde(default, deserialize_with = "lenient_items")]
    pub children: Vec<ChildInfo>,

    /// Error code from the response (0 = success).
    #[serde(default, deserialize_with = "lenient")]
    pub err_code: i32,
}

/// Deserializes a field, falling back to its default when the device reports
/// an unexpected type (e.g. a float `rssi`).
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).unwrap_or_default())
}

/// Like `lenient`, for lists: entries that do not fit are skipped.
fn lenient_items<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let items: Vec<Value> = lenient(deserializer)?;
    Ok(items
        .into_iter()
        .filter_map(|item| T::deserialize(item).ok())
        .collect())
}

impl SysInfo {
    /// Returns the MAC address from `mac`, `mic_mac` or `ethernet_mac`.
    pub fn mac_address(&self) -> &str {
        [&self.mac, &self.mic_mac, &self.ethernet_mac]
            .into_iter()
            .find(|mac| !mac.is_empty())
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Returns the type tag from `type`, falling back to `mic_type`.
    pub fn type_name(&self) -> &str {
        if self.device_type.is_empty() {
            &self.mic_type
        } else {
            &self.device_type
        }
    }

    /// Returns `description`, falling back to `dev_name`.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref().or(self.dev_name.as_deref())
    }

    /// Returns true if the relay is on.
    pub fn is_on(&self) -> bool {
        self.relay_state == 1
    }

    /// Returns true if the LED is off.
    pub fn is_led_off(&self) -> bool {
        self.led_off == 1
    }

    /// Returns true if the feature flags include energy metering.
    pub fn supports_emeter(&self) -> bool {
        self.feature.contains("ENE")
    }

    /// Returns true if the device reports a brightness level.
    pub fn supports_dimmer(&self) -> bool {
        self.brightness.is_some()
    }

    /// Returns true if this device has outlets.
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }
}

/// One outlet of a multi-outlet device.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ChildInfo {
    /// Outlet id. Short forms (`"0"`, `"01"`) are relative to the parent id.
    #[serde(default, deserialize_with = "lenient")]
    pub id: String,

    /// User-assigned alias for this outlet.
    #[serde(default, deserialize_with = "lenient")]
    pub alias: String,

    /// Current relay state (1 = on, 0 = off).
    #[serde(default, deserialize_with = "lenient")]
    pub state: u8,

    /// Seconds since this outlet was turned on.
    #[serde(default, deserialize_with = "lenient")]
    pub on_time: u64,
}

impl ChildInfo {
    /// Returns true if this outlet is on.
    pub fn is_on(&self) -> bool {
        self.state == 1
    }
}

/// Energy meter reading, the result of `emeter.get_realtime`.
///
/// Different device models report values in different units:
/// - Some use `voltage_mv`, `current_ma`, `power_mw` (millivolts/milliamps/milliwatts)
/// - Others use `voltage`, `current`, `power` (volts/amps/watts)
///
/// The accessor methods normalize to V, A, W and Wh.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct EnergyReading {
    /// Voltage in millivolts (some devices).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voltage_mv: Option<f64>,

    /// Voltage in volts (some devices).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voltage: Option<f64>,

    /// Current in milliamps (some devices).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_ma: Option<f64>,

    /// Current in amps (some devices).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<f64>,

    /// Power in milliwatts (some devices).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_mw: Option<f64>,

    /// Power in watts (some devices).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power: Option<f64>,

    /// Total energy in watt-hours (some devices).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_wh: Option<f64>,

    /// Total energy in kilowatt-hours (some devices use this field name).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,

    /// Error code from the response (0 = success).
    #[serde(default)]
    pub err_code: i32,
}

impl EnergyReading {
    /// Returns the voltage in volts, normalizing from millivolts if needed.
    pub fn voltage_v(&self) -> Option<f64> {
        self.voltage_mv.map(|mv| mv / 1000.0).or(self.voltage)
    }

    /// Returns the current in amps, normalizing from milliamps if needed.
    pub fn current_a(&self) -> Option<f64> {
        self.current_ma.map(|ma| ma / 1000.0).or(self.current)
    }

    /// Returns the power in watts, normalizing from milliwatts if needed.
    pub fn power_w(&self) -> Option<f64> {
        self.power_mw.map(|mw| mw / 1000.0).or(self.power)
    }

    /// Returns the total energy in watt-hours.
    pub fn total_wh(&self) -> Option<f64> {
        self.total_wh.or(self.total.map(|kwh| kwh * 1000.0))
    }
}
