//! Periodic broadcast discovery with online/offline tracking.
//!
//! A discovery session owns one bound UDP socket with broadcast enabled and
//! runs as a single tokio task. On every tick it:
//!
//! 1. marks registry entries silent for `offline_tolerance` cycles offline
//! 2. sends the probe `{"system":{"get_sysinfo":{}}}` to the broadcast address
//!    and to every unicast target
//! 3. advances the sequence counter, wrapping to 0 past the ceiling
//!
//! The first tick fires immediately. Replies are decoded, filtered (device
//! type, allowed MACs, excluded MACs, predicate, in that order) and upserted
//! into the registry. Undecodable replies are reported as
//! [`ClientEvent::DiscoveryInvalid`] and otherwise ignored; socket errors end
//! the session with [`ClientEvent::Error`].
//!
//! Because the timer, the socket and the shutdown signal are all handled by
//! the one task, registry updates are serialized and nothing fires after
//! [`stop`](DiscoveryHandle::stop) has returned.

use std::{
    fmt,
    future::pending,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use glob_match::glob_match;
use serde_json::Value;
use tokio::{
    net::UdpSocket,
    sync::watch,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, error, warn};

use crate::{
    client::Shared,
    codec, commands, crypto,
    device::{Device, DeviceKind, DeviceOptions, normalize_mac},
    dispatch::normalize_child_id,
    error::{DecodeError, Error},
    events::ClientEvent,
    registry::DeviceKey,
};

/// Port devices listen on for discovery probes.
pub const DISCOVERY_PORT: u16 = 9999;

/// Default broadcast address.
pub const DEFAULT_BROADCAST_ADDR: Ipv4Addr = Ipv4Addr::BROADCAST;

/// Default time between probes.
pub const DEFAULT_DISCOVERY_INTERVAL: Duration = Duration::from_secs(10);

/// Default number of missed cycles before a device is marked offline.
pub const DEFAULT_OFFLINE_TOLERANCE: u64 = 3;

/// Largest discovery reply accepted.
const MAX_DATAGRAM: usize = 64 * 1024;

/// Predicate over the raw `get_sysinfo` object of a reply.
pub type DeviceFilter = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// A host queried by unicast in addition to the broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryTarget {
    /// Hostname or IP address.
    pub host: String,
    /// Port, 9999 by default.
    pub port: u16,
}

impl DiscoveryTarget {
    /// Creates a target on the default port.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DISCOVERY_PORT,
        }
    }

    /// Sets the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

/// Discovery session settings.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use kasa_local::{DeviceKind, DiscoveryConfig};
///
/// let config = DiscoveryConfig::new()
///     .with_interval(Duration::from_secs(5))
///     .with_device_types(vec![DeviceKind::Plug])
///     .with_mac_addresses(vec!["AA:BB:*".into()]);
/// assert_eq!(config.offline_tolerance, 3);
/// ```
#[derive(Clone)]
pub struct DiscoveryConfig {
    /// Local address to bind.
    pub bind_addr: IpAddr,
    /// Local port to bind, 0 for ephemeral.
    pub bind_port: u16,
    /// Address probes are broadcast to.
    pub broadcast_addr: IpAddr,
    /// Port probes are broadcast to.
    pub broadcast_port: u16,
    /// Time between probes.
    pub interval: Duration,
    /// Overall session duration; zero runs until stopped.
    pub timeout: Duration,
    /// Missed cycles before a device is marked offline.
    pub offline_tolerance: u64,
    /// Allowed device kinds; empty allows all.
    pub device_types: Vec<DeviceKind>,
    /// Excluded device kinds.
    pub exclude_device_types: Vec<DeviceKind>,
    /// Allowed MAC patterns (`*` and `?` globs); empty allows all.
    pub mac_addresses: Vec<String>,
    /// Excluded MAC patterns.
    pub exclude_mac_addresses: Vec<String>,
    /// Custom predicate, applied last.
    pub filter: Option<DeviceFilter>,
    /// Hosts probed by unicast on every cycle.
    pub targets: Vec<DiscoveryTarget>,
    /// Register each outlet of a multi-outlet device separately.
    pub breakout_children: bool,
    /// Largest sequence number before wrapping to 0.
    pub sequence_ceiling: u64,
    /// Options for devices created by discovery; the client's when unset.
    pub device_options: Option<DeviceOptions>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            bind_port: 0,
            broadcast_addr: IpAddr::V4(DEFAULT_BROADCAST_ADDR),
            broadcast_port: DISCOVERY_PORT,
            interval: DEFAULT_DISCOVERY_INTERVAL,
            timeout: Duration::ZERO,
            offline_tolerance: DEFAULT_OFFLINE_TOLERANCE,
            device_types: Vec::new(),
            exclude_device_types: Vec::new(),
            mac_addresses: Vec::new(),
            exclude_mac_addresses: Vec::new(),
            filter: None,
            targets: Vec::new(),
            breakout_children: true,
            sequence_ceiling: u64::MAX,
            device_options: None,
        }
    }
}

impl fmt::Debug for DiscoveryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoveryConfig")
            .field("bind_addr", &self.bind_addr)
            .field("bind_port", &self.bind_port)
            .field("broadcast_addr", &self.broadcast_addr)
            .field("broadcast_port", &self.broadcast_port)
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .field("offline_tolerance", &self.offline_tolerance)
            .field("device_types", &self.device_types)
            .field("exclude_device_types", &self.exclude_device_types)
            .field("mac_addresses", &self.mac_addresses)
            .field("exclude_mac_addresses", &self.exclude_mac_addresses)
            .field("filter", &self.filter.as_ref().map(|_| "<fn>"))
            .field("targets", &self.targets)
            .field("breakout_children", &self.breakout_children)
            .field("sequence_ceiling", &self.sequence_ceiling)
            .field("device_options", &self.device_options)
            .finish()
    }
}

impl DiscoveryConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the local bind address and port.
    pub fn with_bind(mut self, addr: IpAddr, port: u16) -> Self {
        self.bind_addr = addr;
        self.bind_port = port;
        self
    }

    /// Sets the broadcast address.
    pub fn with_broadcast_addr(mut self, addr: IpAddr) -> Self {
        self.broadcast_addr = addr;
        self
    }

    /// Sets the port probes are broadcast to.
    pub fn with_broadcast_port(mut self, port: u16) -> Self {
        self.broadcast_port = port;
        self
    }

    /// Sets the time between probes.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the overall session duration; zero runs until stopped.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the number of missed cycles before a device goes offline.
    pub fn with_offline_tolerance(mut self, cycles: u64) -> Self {
        self.offline_tolerance = cycles;
        self
    }

    /// Restricts discovery to the given device kinds.
    pub fn with_device_types(mut self, kinds: Vec<DeviceKind>) -> Self {
        self.device_types = kinds;
        self
    }

    /// Ignores devices of the given kinds.
    pub fn with_exclude_device_types(mut self, kinds: Vec<DeviceKind>) -> Self {
        self.exclude_device_types = kinds;
        self
    }

    /// Restricts discovery to MACs matching one of `patterns`.
    pub fn with_mac_addresses(mut self, patterns: Vec<String>) -> Self {
        self.mac_addresses = patterns;
        self
    }

    /// Ignores MACs matching one of `patterns`.
    pub fn with_exclude_mac_addresses(mut self, patterns: Vec<String>) -> Self {
        self.exclude_mac_addresses = patterns;
        self
    }

    /// Sets a predicate over the raw `get_sysinfo` object.
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Adds a host probed by unicast.
    pub fn with_target(mut self, target: DiscoveryTarget) -> Self {
        self.targets.push(target);
        self
    }

    /// Registers whole multi-outlet devices instead of one entry per outlet.
    pub fn with_breakout_children(mut self, breakout: bool) -> Self {
        self.breakout_children = breakout;
        self
    }

    /// Sets the largest sequence number before wrapping.
    pub fn with_sequence_ceiling(mut self, ceiling: u64) -> Self {
        self.sequence_ceiling = ceiling;
        self
    }

    /// Sets the options for devices created by discovery.
    pub fn with_device_options(mut self, options: DeviceOptions) -> Self {
        self.device_options = Some(options);
        self
    }

    /// Applies the filters in order and reports the first that rejects.
    pub fn accepts(&self, sysinfo: &Value) -> Result<(), FilterReason> {
        let kind = kind_from_sysinfo(sysinfo);
        if !self.device_types.is_empty() && !self.device_types.contains(&kind) {
            return Err(FilterReason::DeviceType(kind));
        }
        if self.exclude_device_types.contains(&kind) {
            return Err(FilterReason::DeviceTypeExcluded(kind));
        }

        let mac = mac_from_sysinfo(sysinfo);
        if !self.mac_addresses.is_empty() && !mac_matches_any(mac, &self.mac_addresses) {
            return Err(FilterReason::MacNotAllowed(mac.to_string()));
        }
        if mac_matches_any(mac, &self.exclude_mac_addresses) {
            return Err(FilterReason::MacExcluded(mac.to_string()));
        }

        if let Some(filter) = &self.filter
            && !filter(sysinfo)
        {
            return Err(FilterReason::Predicate);
        }

        Ok(())
    }
}

/// Why a discovery reply was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterReason {
    /// The device kind is not in the allowed list.
    DeviceType(DeviceKind),
    /// The device kind is excluded.
    DeviceTypeExcluded(DeviceKind),
    /// The MAC matches no allowed pattern.
    MacNotAllowed(String),
    /// The MAC matches an excluded pattern.
    MacExcluded(String),
    /// The custom predicate returned false.
    Predicate,
}

impl fmt::Display for FilterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterReason::DeviceType(kind) => write!(f, "device type {} not allowed", kind),
            FilterReason::DeviceTypeExcluded(kind) => write!(f, "device type {} excluded", kind),
            FilterReason::MacNotAllowed(mac) => write!(f, "mac {} not allowed", mac),
            FilterReason::MacExcluded(mac) => write!(f, "mac {} excluded", mac),
            FilterReason::Predicate => write!(f, "rejected by filter"),
        }
    }
}

/// Classifies a raw `get_sysinfo` object by `type`, then `mic_type`.
pub fn kind_from_sysinfo(sysinfo: &Value) -> DeviceKind {
    let type_name = ["type", "mic_type"]
        .into_iter()
        .filter_map(|field| sysinfo.get(field).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .unwrap_or_default();
    DeviceKind::from_type_name(type_name)
}

fn mac_from_sysinfo(sysinfo: &Value) -> &str {
    ["mac", "mic_mac", "ethernet_mac"]
        .into_iter()
        .filter_map(|field| sysinfo.get(field).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .unwrap_or_default()
}

/// Matches a MAC against glob patterns, ignoring separators and case.
///
/// ```
/// use kasa_local::discovery::mac_matches_any;
///
/// let patterns = vec!["AA:BB:*".to_string()];
/// assert!(mac_matches_any("aa:bb:cc:dd:ee:ff", &patterns));
/// assert!(!mac_matches_any("aa:bc:cc:dd:ee:ff", &patterns));
/// ```
pub fn mac_matches_any(mac: &str, patterns: &[String]) -> bool {
    let mac = normalize_mac(mac);
    patterns.iter().any(|pattern| {
        let pattern: String = pattern
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '*' || *c == '?')
            .map(|c| c.to_ascii_uppercase())
            .collect();
        glob_match(&pattern, &mac)
    })
}

/// Extracts `system.get_sysinfo` from a discovery datagram.
pub fn parse_reply(datagram: &[u8]) -> Result<Value, DecodeError> {
    let mut reply = codec::decode(datagram)?;
    match reply
        .get_mut("system")
        .and_then(|system| system.get_mut("get_sysinfo"))
        .filter(|sysinfo| sysinfo.is_object())
    {
        Some(sysinfo) => Ok(sysinfo.take()),
        None => Err(DecodeError::InvalidJson("missing system.get_sysinfo".into())),
    }
}

/// Discovery packet sequence counter, wrapping to 0 past `ceiling`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceCounter {
    current: u64,
    ceiling: u64,
}

impl SequenceCounter {
    /// Starts at 0.
    pub fn new(ceiling: u64) -> Self {
        Self { current: 0, ceiling }
    }

    /// Current sequence number.
    pub fn current(&self) -> u64 {
        self.current
    }

    /// Largest value before wrapping.
    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }

    /// Moves to the next sequence number.
    pub fn advance(&mut self) -> u64 {
        self.current = if self.current >= self.ceiling {
            0
        } else {
            self.current + 1
        };
        self.current
    }
}

/// Handle to a running discovery session.
#[derive(Debug)]
pub(crate) struct DiscoveryHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl DiscoveryHandle {
    /// Signals the session to stop and waits until it has.
    pub(crate) async fn stop(self) {
        // The task may already have ended on timeout or error
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "discovery task ended abnormally");
        }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Binds the discovery socket and spawns the session task.
pub(crate) async fn start(
    shared: Arc<Shared>,
    config: DiscoveryConfig,
) -> Result<DiscoveryHandle, Error> {
    if config.interval.is_zero() {
        return Err(Error::Discovery("discovery interval must be non-zero".into()));
    }

    let bind = SocketAddr::new(config.bind_addr, config.bind_port);
    let socket = UdpSocket::bind(bind)
        .await
        .and_then(|socket| {
            socket.set_broadcast(true)?;
            Ok(socket)
        })
        .map_err(|e| Error::Discovery(format!("bind {}: {}", bind, e)))?;

    if let Ok(local) = socket.local_addr() {
        debug!(addr = %local, "discovery listening");
    }

    let (shutdown, shutdown_rx) = watch::channel(false);
    let session = Session {
        sequence: SequenceCounter::new(config.sequence_ceiling),
        shared,
        config,
        socket,
    };
    let task = tokio::spawn(session.run(shutdown_rx));

    Ok(DiscoveryHandle { shutdown, task })
}

struct Session {
    shared: Arc<Shared>,
    config: DiscoveryConfig,
    socket: UdpSocket,
    sequence: SequenceCounter,
}

impl Session {
    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let deadline =
            (!self.config.timeout.is_zero()).then(|| Instant::now() + self.config.timeout);
        let overall = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => pending().await,
            }
        };
        tokio::pin!(overall);

        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            tokio::select! {
                biased;

                _ = shutdown.changed() => {
                    debug!("discovery stop requested");
                    break;
                }
                _ = &mut overall => {
                    debug!(timeout = ?self.config.timeout, "discovery timeout reached");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        self.fail(format!("send failed: {}", e));
                        break;
                    }
                }
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((n, addr)) => self.handle_reply(&buf[..n], addr),
                    Err(e) => {
                        self.fail(format!("receive failed: {}", e));
                        break;
                    }
                },
            }
        }

        debug!(sequence = self.sequence.current(), "discovery stopped");
    }

    fn fail(&self, message: String) {
        error!(error = %message, "discovery socket error");
        self.shared.events.publish(ClientEvent::Error { message });
    }

    async fn tick(&mut self) -> std::io::Result<()> {
        let offline = self.shared.registry.lock().mark_silent_offline(
            self.sequence.current(),
            self.config.offline_tolerance,
            self.sequence.ceiling(),
        );
        for device in offline {
            debug!(id = %device.id(), alias = %device.alias(), "device offline");
            self.shared.events.publish(ClientEvent::DeviceOffline {
                device_kind: device.kind(),
                device,
            });
        }

        let probe = codec::encode(commands::DISCOVERY_PROBE);
        let broadcast = SocketAddr::new(self.config.broadcast_addr, self.config.broadcast_port);
        debug!(sequence = self.sequence.current(), addr = %broadcast, "sending discovery probe");
        self.socket.send_to(&probe, broadcast).await?;

        for target in &self.config.targets {
            debug!(host = %target.host, port = target.port, "sending direct discovery probe");
            self.socket
                .send_to(&probe, (target.host.as_str(), target.port))
                .await?;
        }

        self.sequence.advance();
        Ok(())
    }

    fn handle_reply(&self, datagram: &[u8], addr: SocketAddr) {
        let sysinfo = match parse_reply(datagram) {
            Ok(sysinfo) => sysinfo,
            Err(e) => {
                debug!(addr = %addr, error = %e, "invalid discovery reply");
                self.shared.events.publish(ClientEvent::DiscoveryInvalid {
                    addr,
                    response: datagram.to_vec(),
                    decrypted: crypto::decrypt(datagram),
                });
                return;
            }
        };

        if let Err(reason) = self.config.accepts(&sysinfo) {
            let alias = sysinfo.get("alias").and_then(Value::as_str).unwrap_or_default();
            debug!(addr = %addr, alias, reason = %reason, "filtered out");
            return;
        }

        let device_id = sysinfo
            .get("deviceId")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let child_ids: Vec<String> = if self.config.breakout_children {
            sysinfo
                .get("children")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(|child| child.get("id").and_then(Value::as_str))
                .map(|id| normalize_child_id(&device_id, id))
                .collect()
        } else {
            Vec::new()
        };

        let host = addr.ip().to_string();
        if child_ids.is_empty() {
            self.upsert(DeviceKey::device(&device_id), None, sysinfo, &host, addr.port());
        } else {
            for child_id in child_ids {
                let key = DeviceKey::child(&device_id, &child_id);
                self.upsert(key, Some(child_id), sysinfo.clone(), &host, addr.port());
            }
        }
    }

    fn upsert(
        &self,
        key: DeviceKey,
        child_id: Option<String>,
        sysinfo: Value,
        host: &str,
        port: u16,
    ) {
        let sequence = self.sequence.current();
        let existing = self.shared.registry.lock().get(&key);

        let event = match existing {
            Some(device) => {
                device.mark_seen(host, port, sysinfo, sequence);
                ClientEvent::DeviceOnline {
                    device_kind: device.kind(),
                    device,
                }
            }
            None => {
                let device = Device::new(
                    Arc::clone(&self.shared.transport),
                    sysinfo,
                    host,
                    port,
                    child_id,
                    self.shared.send_defaults,
                    self.config
                        .device_options
                        .clone()
                        .unwrap_or_else(|| self.shared.device_options.clone()),
                );
                device.set_last_seen_sequence(sequence);
                self.shared.registry.lock().insert(key, device.clone());
                debug!(id = %device.id(), alias = %device.alias(), host, "new device");
                ClientEvent::DeviceNew {
                    device_kind: device.kind(),
                    device,
                }
            }
        };

        self.shared.events.publish(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sequence_wraps_at_ceiling() {
        let mut sequence = SequenceCounter::new(2);
        assert_eq!(sequence.advance(), 1);
        assert_eq!(sequence.advance(), 2);
        assert_eq!(sequence.advance(), 0);
        assert_eq!(sequence.advance(), 1);
    }

    #[test]
    fn test_sequence_wraps_at_u64_max() {
        let mut sequence = SequenceCounter {
            current: u64::MAX - 1,
            ceiling: u64::MAX,
        };
        assert_eq!(sequence.advance(), u64::MAX);
        assert_eq!(sequence.advance(), 0);
    }

    #[test]
    fn test_mac_patterns() {
        let allow = vec!["AA:BB:*".to_string()];
        assert!(mac_matches_any("AABBCCDDEEFF", &allow));
        assert!(mac_matches_any("aa-bb-cc-dd-ee-ff", &allow));

        let third_octet = vec!["??:CC:*".to_string()];
        assert!(!mac_matches_any("AA:BB:CC:DD:EE:FF", &third_octet));
        assert!(mac_matches_any("AA:CC:BB:DD:EE:FF", &third_octet));

        assert!(!mac_matches_any("AA:BB:CC:DD:EE:FF", &[]));
    }

    #[test]
    fn test_filters_apply_in_order() {
        let bulb = json!({"mic_type": "IOT.SMARTBULB", "mic_mac": "AABBCCDDEEFF"});
        let plug =
            json!({"type": "IOT.SMARTPLUGSWITCH", "mac": "11:22:33:44:55:66", "alias": "Desk"});

        let config = DiscoveryConfig::new().with_device_types(vec![DeviceKind::Plug]);
        assert_eq!(
            config.accepts(&bulb),
            Err(FilterReason::DeviceType(DeviceKind::Bulb))
        );
        assert_eq!(config.accepts(&plug), Ok(()));

        let config = DiscoveryConfig::new().with_exclude_device_types(vec![DeviceKind::Plug]);
        assert_eq!(
            config.accepts(&plug),
            Err(FilterReason::DeviceTypeExcluded(DeviceKind::Plug))
        );
        assert_eq!(config.accepts(&bulb), Ok(()));

        let config = DiscoveryConfig::new()
            .with_mac_addresses(vec!["11:22:*".into()])
            .with_exclude_mac_addresses(vec!["*:66".into()]);
        assert_eq!(
            config.accepts(&bulb),
            Err(FilterReason::MacNotAllowed("AABBCCDDEEFF".into()))
        );
        assert_eq!(
            config.accepts(&plug),
            Err(FilterReason::MacExcluded("11:22:33:44:55:66".into()))
        );

        let config = DiscoveryConfig::new().with_filter(|sysinfo| sysinfo["alias"] == "Desk");
        assert_eq!(config.accepts(&plug), Ok(()));
        assert_eq!(config.accepts(&bulb), Err(FilterReason::Predicate));
    }

    #[test]
    fn test_kind_from_sysinfo() {
        assert_eq!(kind_from_sysinfo(&json!({"type": "IOT.SMARTPLUGSWITCH"})), DeviceKind::Plug);
        assert_eq!(
            kind_from_sysinfo(&json!({"type": "", "mic_type": "IOT.SMARTBULB"})),
            DeviceKind::Bulb
        );
        assert_eq!(kind_from_sysinfo(&json!({})), DeviceKind::Device);
    }

    #[test]
    fn test_parse_reply() {
        let datagram = codec::encode(r#"{"system":{"get_sysinfo":{"alias":"Lamp","err_code":0}}}"#);
        assert_eq!(parse_reply(&datagram).unwrap()["alias"], "Lamp");

        let wrong_shape = codec::encode(r#"{"system":{}}"#);
        assert!(parse_reply(&wrong_shape).is_err());

        assert!(parse_reply(b"\x00\x01garbage").is_err());
    }
}
