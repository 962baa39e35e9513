//! Entry point tying the transport, the registry, discovery and events together.
//!
//! A [`Client`] owns:
//!
//! - the default [`SendOptions`] merged into every exchange
//! - the [`Transport`] (a [`NetworkTransport`] with its own socket-id counter)
//! - the device [`Registry`] filled by discovery
//! - the [`ClientEvent`] channel
//! - at most one running discovery session
//!
//! Clones share all of the above. When the last clone is dropped, a running
//! discovery session stops on its own.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, error};

use crate::{
    commands,
    device::{Device, DeviceKind, DeviceOptions},
    discovery::{self, DiscoveryConfig, DiscoveryHandle},
    dispatch,
    error::Error,
    events::{ClientEvent, DEFAULT_CHANNEL_CAPACITY, EventBus},
    registry::Registry,
    transport::{NetworkTransport, SendOptions, Transport},
};

/// Client settings.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use kasa_local::{ClientOptions, SendOptions, TransportKind};
///
/// let options: ClientOptions = serde_json::from_str(
///     r#"{"send_options":{"timeout":2500,"transport":"udp"}}"#,
/// ).unwrap();
/// assert_eq!(options.send_options.timeout, Some(Duration::from_millis(2500)));
/// assert_eq!(options.send_options.transport, Some(TransportKind::Udp));
/// assert_eq!(options.event_capacity, 256);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientOptions {
    /// Defaults for every exchange made through this client.
    #[serde(default)]
    pub send_options: SendOptions,

    /// Defaults for devices created by this client.
    #[serde(default)]
    pub device_options: DeviceOptions,

    /// Buffered client events per subscriber.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_event_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            send_options: SendOptions::default(),
            device_options: DeviceOptions::default(),
            event_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl ClientOptions {
    /// Creates options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default send options.
    pub fn with_send_options(mut self, send_options: SendOptions) -> Self {
        self.send_options = send_options;
        self
    }

    /// Sets the default device options.
    pub fn with_device_options(mut self, device_options: DeviceOptions) -> Self {
        self.device_options = device_options;
        self
    }

    /// Sets the client event channel capacity.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }
}

/// State shared between a client and its discovery session.
pub(crate) struct Shared {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) send_defaults: SendOptions,
    pub(crate) device_options: DeviceOptions,
    pub(crate) registry: Mutex<Registry>,
    pub(crate) events: EventBus<ClientEvent>,
}

/// Handle for talking to devices on the local network.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use kasa_local::{Client, ClientEvent, DiscoveryConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), kasa_local::Error> {
///     let client = Client::default();
///     let mut events = client.subscribe();
///
///     client
///         .start_discovery(DiscoveryConfig::new().with_interval(Duration::from_secs(5)))
///         .await?;
///
///     while let Ok(event) = events.recv().await {
///         if let ClientEvent::DeviceNew { device, device_kind } = event {
///             println!("{} {} at {}", device_kind, device.alias(), device.host());
///         }
///     }
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Client {
    shared: Arc<Shared>,
    discovery: Arc<tokio::sync::Mutex<Option<DiscoveryHandle>>>,
}

impl Default for Client {
    fn default() -> Self {
        Self::new(ClientOptions::default())
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("send_defaults", &self.shared.send_defaults)
            .field("devices", &self.shared.registry.lock().len())
            .finish()
    }
}

impl Client {
    /// Creates a client using the network transport.
    pub fn new(options: ClientOptions) -> Self {
        Self::with_transport(Arc::new(NetworkTransport::new()), options)
    }

    /// Creates a client using a custom transport.
    pub fn with_transport(transport: Arc<dyn Transport>, options: ClientOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                transport,
                send_defaults: options.send_options,
                device_options: options.device_options,
                registry: Mutex::new(Registry::new()),
                events: EventBus::with_capacity(options.event_capacity.max(1)),
            }),
            discovery: Arc::new(tokio::sync::Mutex::new(None)),
        }
    }

    /// Default send options of this client.
    pub fn send_defaults(&self) -> SendOptions {
        self.shared.send_defaults
    }

    /// Sends a raw payload and returns the parsed reply, unvalidated.
    pub async fn send(
        &self,
        payload: &str,
        host: &str,
        port: u16,
        options: SendOptions,
    ) -> Result<Value, Error> {
        let effective = options.merged_with(&self.shared.send_defaults).resolve();
        self.shared.transport.send(payload, host, port, effective).await
    }

    /// Queries `system.get_sysinfo` and returns the sysinfo object.
    pub async fn get_sysinfo(
        &self,
        host: &str,
        port: u16,
        options: SendOptions,
    ) -> Result<Value, Error> {
        debug!(host, port, "get_sysinfo");
        let effective = options.merged_with(&self.shared.send_defaults).resolve();
        dispatch::send_command(
            self.shared.transport.as_ref(),
            host,
            port,
            &commands::sysinfo(),
            effective,
        )
        .await
    }

    /// Queries a device directly and returns a handle seeded with its sysinfo.
    ///
    /// The device is not added to the registry.
    pub async fn get_device(
        &self,
        host: &str,
        port: u16,
        options: SendOptions,
    ) -> Result<Device, Error> {
        let sysinfo = self.get_sysinfo(host, port, options).await?;
        Ok(self.device_from_sysinfo(sysinfo, host, port, None))
    }

    /// Returns a handle with an empty snapshot, without touching the network.
    ///
    /// Call [`Device::refresh`] to populate it.
    pub fn device(&self, host: &str, port: u16) -> Device {
        self.device_from_sysinfo(Value::Null, host, port, None)
    }

    /// Returns a handle for an already known sysinfo object.
    ///
    /// `child_id` selects one outlet; short ids are expanded against the
    /// device id.
    pub fn device_from_sysinfo(
        &self,
        sysinfo: Value,
        host: &str,
        port: u16,
        child_id: Option<&str>,
    ) -> Device {
        Device::new(
            Arc::clone(&self.shared.transport),
            sysinfo,
            host,
            port,
            child_id.map(str::to_string),
            self.shared.send_defaults,
            self.shared.device_options.clone(),
        )
    }

    /// Classifies a raw sysinfo object by `type`, then `mic_type`.
    pub fn kind_from_sysinfo(sysinfo: &Value) -> DeviceKind {
        discovery::kind_from_sysinfo(sysinfo)
    }

    /// Returns a receiver for client events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.shared.events.subscribe()
    }

    /// All devices found by discovery.
    pub fn devices(&self) -> Vec<Device> {
        self.shared.registry.lock().devices()
    }

    /// Finds a discovered device by [`Device::id`].
    pub fn device_by_id(&self, id: &str) -> Option<Device> {
        self.shared.registry.lock().find_by_id(id)
    }

    /// Starts discovery.
    ///
    /// Fails if a session is already running or the socket cannot be bound.
    /// A bind failure is also published as [`ClientEvent::Error`].
    pub async fn start_discovery(&self, config: DiscoveryConfig) -> Result<(), Error> {
        let mut slot = self.discovery.lock().await;
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Err(Error::Discovery("discovery already running".into()));
        }
        if let Some(finished) = slot.take() {
            finished.stop().await;
        }

        debug!(?config, "starting discovery");
        match discovery::start(Arc::clone(&self.shared), config).await {
            Ok(handle) => {
                *slot = Some(handle);
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "discovery failed to start");
                self.shared.events.publish(ClientEvent::Error { message: e.to_string() });
                Err(e)
            }
        }
    }

    /// Stops discovery. Does nothing if it is not running.
    ///
    /// No discovery event is published after this returns.
    pub async fn stop_discovery(&self) {
        let handle = self.discovery.lock().await.take();
        if let Some(handle) = handle {
            handle.stop().await;
            debug!("discovery stopped");
        }
    }

    /// Returns true while a discovery session is running.
    pub async fn is_discovering(&self) -> bool {
        self.discovery
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::EffectiveSendOptions;
    use async_trait::async_trait;
    use serde_json::json;
    use std::net::{IpAddr, Ipv4Addr};

    struct FixedTransport {
        reply: Value,
        seen: Mutex<Vec<(String, String, u16, EffectiveSendOptions)>>,
    }

    #[async_trait]
    impl Transport for FixedTransport {
        async fn send(
            &self,
            payload: &str,
            host: &str,
            port: u16,
            options: EffectiveSendOptions,
        ) -> Result<Value, Error> {
            self.seen
                .lock()
                .push((payload.to_string(), host.to_string(), port, options));
            Ok(self.reply.clone())
        }
    }

    fn client(reply: Value, options: ClientOptions) -> (Client, Arc<FixedTransport>) {
        let transport = Arc::new(FixedTransport {
            reply,
            seen: Mutex::new(Vec::new()),
        });
        (Client::with_transport(transport.clone(), options), transport)
    }

    #[test]
    fn test_options_roundtrip_defaults() {
        let options: ClientOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, ClientOptions::default());
    }

    #[tokio::test]
    async fn test_get_device_uses_merged_options() {
        let reply = json!({"system":{"get_sysinfo":{
            "alias":"Kettle","deviceId":"80","type":"IOT.SMARTPLUGSWITCH",
            "relay_state":1,"err_code":0
        }}});
        let defaults = SendOptions::new().with_timeout(std::time::Duration::from_secs(2));
        let (client, transport) = client(reply, ClientOptions::new().with_send_options(defaults));

        let device = client.get_device("10.0.0.5", 9999, SendOptions::new()).await.unwrap();
        assert_eq!(device.alias(), "Kettle");
        assert_eq!(device.kind(), DeviceKind::Plug);
        assert!(device.relay_state());
        assert!(client.devices().is_empty());

        let seen = transport.seen.lock();
        assert_eq!(seen[0].1, "10.0.0.5");
        assert_eq!(seen[0].3.timeout, std::time::Duration::from_secs(2));
    }

    #[test]
    fn test_device_without_network() {
        let (client, transport) = client(Value::Null, ClientOptions::default());
        let device = client.device("10.0.0.9", 9999);
        assert_eq!(device.host(), "10.0.0.9");
        assert_eq!(device.alias(), "");
        assert!(transport.seen.lock().is_empty());
    }

    #[test]
    fn test_kind_from_sysinfo() {
        assert_eq!(
            Client::kind_from_sysinfo(&json!({"mic_type":"IOT.SMARTBULB"})),
            DeviceKind::Bulb
        );
    }

    #[tokio::test]
    async fn test_stop_discovery_is_idempotent() {
        let (client, _) = client(Value::Null, ClientOptions::default());
        client.stop_discovery().await;

        let config = DiscoveryConfig::new()
            .with_bind(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
            .with_broadcast_addr(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .with_broadcast_port(9);
        client.start_discovery(config.clone()).await.unwrap();
        assert!(client.is_discovering().await);
        assert!(matches!(
            client.start_discovery(config).await,
            Err(Error::Discovery(_))
        ));

        client.stop_discovery().await;
        assert!(!client.is_discovering().await);
        client.stop_discovery().await;
    }
}
