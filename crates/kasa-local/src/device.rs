//! Device identity, cached state and the operations feature code builds on.
//!
//! A [`Device`] is a cheap, clonable handle. Every clone refers to the same
//! identity: the registry, event payloads and callers all observe the same
//! cached state.
//!
//! Cached system info is held as an immutable [`SysInfoSnapshot`]. A refresh
//! or a successful set operation builds a new snapshot (including its outlet
//! index) and swaps it in under the state lock, so readers never see a
//! half-updated outlet map.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Weak},
    time::Duration,
};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::{sync::broadcast, task::JoinHandle, time::Instant};
use tracing::{debug, error, warn};

use crate::{
    commands,
    dispatch::{self, normalize_child_id},
    error::{DecodeError, Error},
    events::{DeviceEvent, EventBus, FacetState},
    response::{ChildInfo, EnergyReading, SysInfo},
    transport::{SendOptions, Transport},
};

/// Power draw, in watts, above which a metering device counts as in use.
pub const DEFAULT_IN_USE_THRESHOLD: f64 = 0.1;

/// Coarse device classification derived from the type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// Smart plugs, power strips, switches.
    Plug,
    /// Smart bulbs and light strips.
    Bulb,
    /// Anything else.
    Device,
}

impl DeviceKind {
    /// Classifies a `type`/`mic_type` tag by case-insensitive substring.
    ///
    /// ```
    /// use kasa_local::DeviceKind;
    ///
    /// assert_eq!(DeviceKind::from_type_name("IOT.SMARTPLUGSWITCH"), DeviceKind::Plug);
    /// assert_eq!(DeviceKind::from_type_name("IOT.SMARTBULB"), DeviceKind::Bulb);
    /// assert_eq!(DeviceKind::from_type_name(""), DeviceKind::Device);
    /// ```
    pub fn from_type_name(type_name: &str) -> Self {
        let lower = type_name.to_lowercase();
        if lower.contains("plug") {
            DeviceKind::Plug
        } else if lower.contains("bulb") {
            DeviceKind::Bulb
        } else {
            DeviceKind::Device
        }
    }

    /// Lowercase tag: `plug`, `bulb` or `device`.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::Plug => "plug",
            DeviceKind::Bulb => "bulb",
            DeviceKind::Device => "device",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reachability as tracked by discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    /// Seen within the offline tolerance.
    #[default]
    Online,
    /// Missed too many discovery cycles.
    Offline,
}

/// Which outlets a command addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ChildScope {
    /// The device's own outlet, if it was created for one.
    #[default]
    Inherit,
    /// The whole device, no routing context.
    Parent,
    /// The given outlets. Short ids are expanded against the device id.
    Only(Vec<String>),
}

/// Per-device settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceOptions {
    /// Default send options for this device, merged over the client's.
    #[serde(default)]
    pub send_options: SendOptions,

    /// Power draw in watts above which the device counts as in use.
    #[serde(default = "default_in_use_threshold")]
    pub in_use_threshold: f64,
}

fn default_in_use_threshold() -> f64 {
    DEFAULT_IN_USE_THRESHOLD
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self {
            send_options: SendOptions::default(),
            in_use_threshold: DEFAULT_IN_USE_THRESHOLD,
        }
    }
}

impl DeviceOptions {
    /// Creates options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default send options.
    pub fn with_send_options(mut self, send_options: SendOptions) -> Self {
        self.send_options = send_options;
        self
    }

    /// Sets the in-use threshold, in watts.
    pub fn with_in_use_threshold(mut self, watts: f64) -> Self {
        self.in_use_threshold = watts;
        self
    }
}

/// Immutable system info snapshot with its derived outlet index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SysInfoSnapshot {
    raw: Value,
    info: SysInfo,
    children: Vec<ChildInfo>,
    index: HashMap<String, usize>,
}

impl SysInfoSnapshot {
    /// Builds a snapshot from a raw `get_sysinfo` object.
    ///
    /// Outlet ids are stored in their full form. A field of an unexpected
    /// type reads as its default in the typed view; the raw value is kept
    /// as is.
    pub fn new(raw: Value) -> Self {
        let info: SysInfo = if raw.is_null() {
            SysInfo::default()
        } else {
            serde_json::from_value(raw.clone()).unwrap_or_else(|e| {
                debug!(error = %e, "sysinfo has unexpected shape");
                SysInfo::default()
            })
        };

        let children: Vec<ChildInfo> = info
            .children
            .iter()
            .map(|child| ChildInfo {
                id: normalize_child_id(&info.device_id, &child.id),
                ..child.clone()
            })
            .collect();
        let index = children
            .iter()
            .enumerate()
            .map(|(i, child)| (child.id.clone(), i))
            .collect();

        Self {
            raw,
            info,
            children,
            index,
        }
    }

    /// The raw `get_sysinfo` object.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// The typed view of the raw object.
    pub fn info(&self) -> &SysInfo {
        &self.info
    }

    /// Outlets in reported order, with full ids.
    pub fn children(&self) -> &[ChildInfo] {
        &self.children
    }

    /// Looks up an outlet by id; short ids are expanded first.
    pub fn child(&self, child_id: &str) -> Option<&ChildInfo> {
        let id = normalize_child_id(&self.info.device_id, child_id);
        self.index.get(&id).map(|&i| &self.children[i])
    }

    /// Returns a new snapshot with `apply` run on the device object, or on
    /// the matching outlet object when `child_id` is given.
    fn modified(
        &self,
        child_id: Option<&str>,
        apply: impl FnOnce(&mut Map<String, Value>),
    ) -> Self {
        let mut raw = self.raw.clone();
        let target = match child_id {
            Some(id) => raw
                .get_mut("children")
                .and_then(Value::as_array_mut)
                .and_then(|children| {
                    children.iter_mut().find(|child| {
                        child
                            .get("id")
                            .and_then(Value::as_str)
                            .is_some_and(|cid| normalize_child_id(&self.info.device_id, cid) == id)
                    })
                }),
            None => Some(&mut raw),
        };

        if let Some(Value::Object(object)) = target {
            apply(object);
        }

        Self::new(raw)
    }
}

/// Result of [`Device::get_info`].
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    /// The fresh `get_sysinfo` object.
    pub sysinfo: Value,
    /// The fresh energy reading, if the device meters energy.
    pub emeter: Option<EnergyReading>,
}

#[derive(Debug)]
struct DeviceState {
    host: String,
    port: u16,
    snapshot: Arc<SysInfoSnapshot>,
    status: DeviceStatus,
    last_seen_sequence: u64,
    emeter: Option<EnergyReading>,
    last_state: FacetState,
    emit_events: bool,
}

struct DeviceInner {
    transport: Arc<dyn Transport>,
    send_defaults: SendOptions,
    in_use_threshold: f64,
    child_id: Option<String>,
    state: RwLock<DeviceState>,
    events: EventBus<DeviceEvent>,
    polling: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for DeviceInner {
    fn drop(&mut self) {
        if let Some(handle) = self.polling.get_mut().take() {
            handle.abort();
        }
    }
}

/// Handle to one device or one outlet of a multi-outlet device.
#[derive(Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id())
            .field("alias", &self.alias())
            .field("host", &self.host())
            .field("port", &self.port())
            .field("status", &self.status())
            .finish()
    }
}

impl Device {
    /// Creates a device from a `get_sysinfo` object.
    ///
    /// `send_defaults` are the caller's defaults; `options.send_options` are
    /// merged over them. Facets are recorded without emitting events.
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        sysinfo: Value,
        host: impl Into<String>,
        port: u16,
        child_id: Option<String>,
        send_defaults: SendOptions,
        options: DeviceOptions,
    ) -> Self {
        let seeded = !sysinfo.is_null();
        let device = Self {
            inner: Arc::new(DeviceInner {
                transport,
                send_defaults: options.send_options.merged_with(&send_defaults),
                in_use_threshold: options.in_use_threshold,
                child_id,
                state: RwLock::new(DeviceState {
                    host: host.into(),
                    port,
                    snapshot: Arc::new(SysInfoSnapshot::new(sysinfo)),
                    status: DeviceStatus::Online,
                    last_seen_sequence: 0,
                    emeter: None,
                    last_state: FacetState::default(),
                    emit_events: true,
                }),
                events: EventBus::new(),
                polling: Mutex::new(None),
            }),
        };

        if seeded {
            let (relay_state, in_use) = (device.relay_state(), device.in_use());
            device.inner.state.write().last_state = FacetState::seed(relay_state, in_use);
        }

        device
    }

    // Identity

    /// Outlet id if this handle addresses an outlet, otherwise the device id.
    pub fn id(&self) -> String {
        self.child_id().unwrap_or_else(|| self.device_id())
    }

    /// Cached `deviceId`.
    pub fn device_id(&self) -> String {
        self.snapshot().info().device_id.clone()
    }

    /// Full outlet id, if this handle addresses an outlet.
    pub fn child_id(&self) -> Option<String> {
        let raw = self.inner.child_id.as_deref()?;
        Some(normalize_child_id(&self.snapshot().info().device_id, raw))
    }

    /// Current host.
    pub fn host(&self) -> String {
        self.inner.state.read().host.clone()
    }

    /// Current port.
    pub fn port(&self) -> u16 {
        self.inner.state.read().port
    }

    /// Reachability as tracked by discovery.
    pub fn status(&self) -> DeviceStatus {
        self.inner.state.read().status
    }

    /// Discovery sequence number at which this device was last seen.
    pub fn last_seen_sequence(&self) -> u64 {
        self.inner.state.read().last_seen_sequence
    }

    // Cached info

    /// The current snapshot.
    pub fn snapshot(&self) -> Arc<SysInfoSnapshot> {
        Arc::clone(&self.inner.state.read().snapshot)
    }

    /// The raw cached `get_sysinfo` object.
    pub fn sysinfo(&self) -> Value {
        self.snapshot().raw().clone()
    }

    /// Outlet alias for outlet handles, otherwise the device alias.
    pub fn alias(&self) -> String {
        let snapshot = self.snapshot();
        match self.child_id() {
            Some(id) => snapshot.child(&id).map(|c| c.alias.clone()).unwrap_or_default(),
            None => snapshot.info().alias.clone(),
        }
    }

    /// Same as [`alias`](Self::alias).
    pub fn name(&self) -> String {
        self.alias()
    }

    /// Cached `description`, or `dev_name`.
    pub fn description(&self) -> Option<String> {
        self.snapshot().info().description().map(str::to_string)
    }

    /// Cached `model`.
    pub fn model(&self) -> String {
        self.snapshot().info().model.clone()
    }

    /// Cached `type`, or `mic_type`.
    pub fn type_name(&self) -> String {
        self.snapshot().info().type_name().to_string()
    }

    /// Coarse classification of [`type_name`](Self::type_name).
    pub fn kind(&self) -> DeviceKind {
        DeviceKind::from_type_name(self.snapshot().info().type_name())
    }

    /// Cached `sw_ver`.
    pub fn software_version(&self) -> String {
        self.snapshot().info().sw_ver.clone()
    }

    /// Cached `hw_ver`.
    pub fn hardware_version(&self) -> String {
        self.snapshot().info().hw_ver.clone()
    }

    /// Cached MAC from `mac`, `mic_mac` or `ethernet_mac`.
    pub fn mac(&self) -> String {
        self.snapshot().info().mac_address().to_string()
    }

    /// [`mac`](Self::mac) with non-alphanumerics removed, uppercased.
    pub fn mac_normalized(&self) -> String {
        normalize_mac(&self.mac())
    }

    /// Outlets with full ids.
    pub fn children(&self) -> Vec<ChildInfo> {
        self.snapshot().children().to_vec()
    }

    /// One outlet by full or short id.
    pub fn child(&self, child_id: &str) -> Option<ChildInfo> {
        self.snapshot().child(child_id).cloned()
    }

    /// Cached relay state of this outlet, or of the device.
    pub fn relay_state(&self) -> bool {
        let snapshot = self.snapshot();
        match self.child_id() {
            Some(id) => snapshot.child(&id).is_some_and(ChildInfo::is_on),
            None => snapshot.info().is_on(),
        }
    }

    /// Whether the feature flags include energy metering.
    pub fn supports_emeter(&self) -> bool {
        self.snapshot().info().supports_emeter()
    }

    /// Whether the device reports a brightness level.
    pub fn supports_dimmer(&self) -> bool {
        self.snapshot().info().supports_dimmer()
    }

    /// Last energy reading, if any.
    pub fn emeter_realtime(&self) -> Option<EnergyReading> {
        self.inner.state.read().emeter.clone()
    }

    /// Power above the threshold on metering devices, relay state otherwise.
    pub fn in_use(&self) -> bool {
        if self.supports_emeter() {
            let power = self
                .emeter_realtime()
                .and_then(|reading| reading.power_w())
                .unwrap_or_default();
            power > self.inner.in_use_threshold
        } else {
            self.relay_state()
        }
    }

    // Events

    /// Receives this device's events.
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.inner.events.subscribe()
    }

    /// Enables or suppresses event emission.
    pub fn set_emit_events(&self, enabled: bool) {
        self.inner.state.write().emit_events = enabled;
    }

    /// Whether events are emitted.
    pub fn emit_events_enabled(&self) -> bool {
        self.inner.state.read().emit_events
    }

    fn emit_facet_events(&self) {
        let (relay_state, in_use) = (self.relay_state(), self.in_use());
        let events = {
            let mut state = self.inner.state.write();
            if !state.emit_events {
                return;
            }
            state.last_state.update(relay_state, in_use)
        };

        debug!(id = %self.id(), relay_state, in_use, "device state updated");
        for event in events {
            self.inner.events.publish(event);
        }
    }

    fn store_snapshot(&self, snapshot: SysInfoSnapshot) {
        self.inner.state.write().snapshot = Arc::new(snapshot);
    }

    /// Replaces the cached snapshot and re-evaluates facets.
    pub(crate) fn replace_sysinfo(&self, sysinfo: Value) {
        self.store_snapshot(SysInfoSnapshot::new(sysinfo));
        self.emit_facet_events();
    }

    fn modify_sysinfo(&self, child_id: Option<&str>, apply: impl FnOnce(&mut Map<String, Value>)) {
        let mut state = self.inner.state.write();
        let updated = state.snapshot.modified(child_id, apply);
        state.snapshot = Arc::new(updated);
    }

    fn store_emeter(&self, reading: EnergyReading) {
        self.inner.state.write().emeter = Some(reading.clone());
        if self.emit_events_enabled() {
            self.inner
                .events
                .publish(DeviceEvent::EmeterRealtimeUpdate(reading));
        }
    }

    // Discovery bookkeeping

    pub(crate) fn mark_seen(&self, host: &str, port: u16, sysinfo: Value, sequence: u64) {
        {
            let mut state = self.inner.state.write();
            state.host = host.to_string();
            state.port = port;
            state.status = DeviceStatus::Online;
            state.last_seen_sequence = sequence;
        }
        self.replace_sysinfo(sysinfo);
    }

    pub(crate) fn set_last_seen_sequence(&self, sequence: u64) {
        self.inner.state.write().last_seen_sequence = sequence;
    }

    /// Marks the device offline; returns false if it already was.
    pub(crate) fn mark_offline(&self) -> bool {
        let mut state = self.inner.state.write();
        if state.status == DeviceStatus::Offline {
            return false;
        }
        state.status = DeviceStatus::Offline;
        true
    }

    // Operations

    /// Sends a raw payload and returns the parsed reply.
    pub async fn send(&self, payload: &str, options: SendOptions) -> Result<Value, Error> {
        let effective = options.merged_with(&self.inner.send_defaults).resolve();
        let (host, port) = (self.host(), self.port());

        self.inner
            .transport
            .send(payload, &host, port, effective)
            .await
            .inspect_err(|e| error!(alias = %self.alias(), host = %host, error = %e, "send failed"))
    }

    /// Sends `command` to the outlets selected by `scope` and validates the reply.
    ///
    /// See [`dispatch::process_response`] for the result shape.
    pub async fn send_command(
        &self,
        mut command: Value,
        scope: ChildScope,
        options: SendOptions,
    ) -> Result<Value, Error> {
        let child_ids: Vec<String> = match scope {
            ChildScope::Inherit => self.inner.child_id.iter().cloned().collect(),
            ChildScope::Parent => Vec::new(),
            ChildScope::Only(ids) => ids,
        };
        dispatch::attach_child_ids(&mut command, &self.device_id(), &child_ids);

        let effective = options.merged_with(&self.inner.send_defaults).resolve();
        let (host, port) = (self.host(), self.port());
        dispatch::send_command(self.inner.transport.as_ref(), &host, port, &command, effective)
            .await
            .inspect_err(|e| {
                debug!(alias = %self.alias(), command = %command, error = %e, "command failed")
            })
    }

    /// Queries `system.get_sysinfo` and replaces the cached snapshot.
    pub async fn refresh(&self, options: SendOptions) -> Result<Value, Error> {
        let sysinfo = self
            .send_command(commands::sysinfo(), ChildScope::Parent, options)
            .await?;
        self.replace_sysinfo(sysinfo.clone());
        Ok(sysinfo)
    }

    /// Queries system info and the energy meter in one request.
    ///
    /// A failure of the `emeter` module alone is tolerated, since many models
    /// do not meter energy.
    pub async fn get_info(&self, options: SendOptions) -> Result<DeviceInfo, Error> {
        let command = commands::merge([commands::emeter_realtime(), commands::sysinfo()]);
        let data = match self.send_command(command, ChildScope::Inherit, options).await {
            Ok(data) => data,
            Err(Error::Response(e)) if e.only_module_failed(commands::EMETER) => e.response,
            Err(e) => return Err(e),
        };

        let sysinfo = data["system"]["get_sysinfo"].clone();
        let emeter = data[commands::EMETER]
            .get("get_realtime")
            .map(|reading| serde_json::from_value::<EnergyReading>(reading.clone()))
            .transpose()
            .unwrap_or_else(|e| {
                warn!(alias = %self.alias(), error = %e, "unexpected emeter reading");
                None
            });

        if let Some(reading) = &emeter {
            self.store_emeter(reading.clone());
        }
        self.replace_sysinfo(sysinfo.clone());

        Ok(DeviceInfo { sysinfo, emeter })
    }

    /// Changes the alias of this outlet, or of the device.
    pub async fn set_alias(&self, alias: &str, options: SendOptions) -> Result<(), Error> {
        self.send_command(commands::set_alias(alias), ChildScope::Inherit, options)
            .await?;
        let child_id = self.child_id();
        self.modify_sysinfo(child_id.as_deref(), |object| {
            object.insert("alias".into(), Value::from(alias));
        });
        Ok(())
    }

    /// Sets the device location.
    pub async fn set_location(
        &self,
        latitude: f64,
        longitude: f64,
        options: SendOptions,
    ) -> Result<Value, Error> {
        self.send_command(
            commands::set_location(latitude, longitude),
            ChildScope::Parent,
            options,
        )
        .await
    }

    /// Reboots the device after `delay` seconds.
    pub async fn reboot(&self, delay: u32, options: SendOptions) -> Result<Value, Error> {
        self.send_command(commands::reboot(delay), ChildScope::Parent, options)
            .await
    }

    /// Factory resets the device after `delay` seconds.
    pub async fn reset(&self, delay: u32, options: SendOptions) -> Result<Value, Error> {
        self.send_command(commands::reset(delay), ChildScope::Parent, options)
            .await
    }

    /// Refreshes and returns whether the LED is on.
    pub async fn get_led_state(&self, options: SendOptions) -> Result<bool, Error> {
        self.refresh(options).await?;
        Ok(!self.snapshot().info().is_led_off())
    }

    /// Turns the LED on or off.
    pub async fn set_led_state(&self, on: bool, options: SendOptions) -> Result<(), Error> {
        self.send_command(commands::set_led_off(!on), ChildScope::Parent, options)
            .await?;
        self.modify_sysinfo(None, |object| {
            object.insert("led_off".into(), Value::from(u8::from(!on)));
        });
        Ok(())
    }

    /// Blinks the LED `times` times, one on/off cycle per `rate`, then
    /// restores its original state.
    ///
    /// `set_led_off` is slow on most firmware, so the rate is not guaranteed.
    pub async fn blink(
        &self,
        times: u32,
        rate: Duration,
        options: SendOptions,
    ) -> Result<(), Error> {
        let original = self.get_led_state(options).await?;
        let half = rate / 2;
        let mut current = false;

        for _ in 0..times * 2 {
            current = !current;
            let started = Instant::now();
            self.set_led_state(current, options).await?;
            tokio::time::sleep_until(started + half).await;
        }

        if current != original {
            self.set_led_state(original, options).await?;
        }
        Ok(())
    }

    /// Refreshes and returns the relay state.
    pub async fn get_power_state(&self, options: SendOptions) -> Result<bool, Error> {
        self.refresh(options).await?;
        Ok(self.relay_state())
    }

    /// Turns the relay of this outlet, or of the device, on or off.
    pub async fn set_power_state(&self, on: bool, options: SendOptions) -> Result<(), Error> {
        self.send_command(commands::set_relay_state(on), ChildScope::Inherit, options)
            .await?;

        let child_id = self.child_id();
        let field = if child_id.is_some() { "state" } else { "relay_state" };
        self.modify_sysinfo(child_id.as_deref(), |object| {
            object.insert(field.into(), Value::from(u8::from(on)));
        });
        self.emit_facet_events();
        Ok(())
    }

    /// Reads the relay state and sets the opposite; returns the new state.
    pub async fn toggle_power_state(&self, options: SendOptions) -> Result<bool, Error> {
        let on = self.get_power_state(options).await?;
        self.set_power_state(!on, options).await?;
        Ok(!on)
    }

    /// Queries `emeter.get_realtime`, caches it and re-evaluates facets.
    pub async fn get_emeter_realtime(&self, options: SendOptions) -> Result<EnergyReading, Error> {
        let result = self
            .send_command(commands::emeter_realtime(), ChildScope::Inherit, options)
            .await?;
        let reading: EnergyReading = serde_json::from_value(result)
            .map_err(|e| DecodeError::InvalidJson(e.to_string()))?;

        self.store_emeter(reading.clone());
        self.emit_facet_events();
        Ok(reading)
    }

    /// Refreshes whichever state in-use depends on and returns it.
    pub async fn get_in_use(&self, options: SendOptions) -> Result<bool, Error> {
        if self.supports_emeter() {
            self.get_emeter_realtime(options).await?;
        } else {
            self.refresh(options).await?;
        }
        Ok(self.in_use())
    }

    /// Calls [`get_info`](Self::get_info) every `interval` until stopped.
    ///
    /// The first poll happens after one interval. Failed polls are logged and
    /// polling continues. Restarting replaces the previous polling task.
    pub fn start_polling(&self, interval: Duration) {
        let weak: Weak<DeviceInner> = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let device = Device { inner };
                if let Err(e) = device.get_info(SendOptions::default()).await {
                    warn!(alias = %device.alias(), error = %e, "poll failed");
                }
            }
        });

        if let Some(previous) = self.inner.polling.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Stops polling. Does nothing if not polling.
    pub fn stop_polling(&self) {
        if let Some(handle) = self.inner.polling.lock().take() {
            handle.abort();
        }
    }

    /// Whether a polling task is active.
    pub fn is_polling(&self) -> bool {
        self.inner
            .polling
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

/// Strips non-alphanumeric characters and uppercases.
///
/// ```
/// assert_eq!(kasa_local::device::normalize_mac("aa:bb:cc:00:11:22"), "AABBCC001122");
/// ```
pub fn normalize_mac(mac: &str) -> String {
    mac.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}
