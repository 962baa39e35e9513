//! Transport layer for communicating with TP-Link Kasa devices.
//!
//! One call performs one request/response exchange:
//!
//! - [`tcp`]: length-prefixed stream on port 9999 (the default)
//! - [`udp`]: a single datagram each way, no length prefix
//!
//! [`NetworkTransport`] picks between them from the effective
//! [`SendOptions`] and tags every exchange with a diagnostic socket id so
//! concurrent exchanges can be told apart in logs.

pub mod tcp;
pub mod udp;

use std::{
    fmt,
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

/// Default timeout for one exchange.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Socket type used for an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Length-prefixed TCP stream.
    #[default]
    Tcp,
    /// Single UDP datagram.
    Udp,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Tcp => write!(f, "TCP"),
            TransportKind::Udp => write!(f, "UDP"),
        }
    }
}

/// Per-call send options.
///
/// Every field is optional; unset fields fall back to the defaults of the
/// device or client, one field at a time.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use kasa_local::transport::{SendOptions, TransportKind};
///
/// let defaults = SendOptions::new().with_timeout(Duration::from_secs(5));
/// let call = SendOptions::new().with_transport(TransportKind::Udp);
///
/// let effective = call.merged_with(&defaults).resolve();
/// assert_eq!(effective.timeout, Duration::from_secs(5));
/// assert_eq!(effective.transport, TransportKind::Udp);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOptions {
    /// Timeout for the whole exchange, in milliseconds when serialized.
    /// Zero disables the timer.
    #[serde(
        default,
        with = "duration_ms",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,

    /// Socket type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<TransportKind>,
}

impl SendOptions {
    /// Creates options with every field unset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the transport.
    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Fills unset fields from `defaults`.
    pub fn merged_with(&self, defaults: &SendOptions) -> SendOptions {
        SendOptions {
            timeout: self.timeout.or(defaults.timeout),
            transport: self.transport.or(defaults.transport),
        }
    }

    /// Resolves unset fields to the library defaults.
    pub fn resolve(&self) -> EffectiveSendOptions {
        EffectiveSendOptions {
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            transport: self.transport.unwrap_or_default(),
        }
    }
}

/// Fully resolved send options for one exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveSendOptions {
    /// Timeout for the whole exchange. Zero disables the timer.
    pub timeout: Duration,
    /// Socket type.
    pub transport: TransportKind,
}

impl Default for EffectiveSendOptions {
    fn default() -> Self {
        SendOptions::default().resolve()
    }
}

/// Trait for one request/response exchange with a device.
///
/// The network implementation is [`NetworkTransport`]; tests substitute their
/// own to script replies.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `payload` (JSON text) to `host:port` and returns the parsed reply.
    async fn send(
        &self,
        payload: &str,
        host: &str,
        port: u16,
        options: EffectiveSendOptions,
    ) -> Result<Value, Error>;
}

/// Transport over real sockets.
///
/// Clones share the diagnostic socket-id counter.
#[derive(Debug, Clone, Default)]
pub struct NetworkTransport {
    socket_ids: Arc<AtomicU64>,
}

impl NetworkTransport {
    /// Creates a transport with its own socket-id counter.
    pub fn new() -> Self {
        Self::default()
    }

    fn next_socket_id(&self) -> u64 {
        self.socket_ids.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[async_trait]
impl Transport for NetworkTransport {
    async fn send(
        &self,
        payload: &str,
        host: &str,
        port: u16,
        options: EffectiveSendOptions,
    ) -> Result<Value, Error> {
        let socket_id = self.next_socket_id();
        match options.transport {
            TransportKind::Tcp => {
                tcp::exchange(socket_id, payload, host, port, options.timeout).await
            }
            TransportKind::Udp => {
                udp::exchange(socket_id, payload, host, port, options.timeout).await
            }
        }
    }
}

/// Runs `exchange` under `limit`; a zero limit runs it unbounded.
///
/// Whichever finishes first wins: on timeout the exchange future is dropped,
/// which releases its socket.
pub(crate) async fn with_deadline<T, F>(
    socket_id: u64,
    kind: TransportKind,
    limit: Duration,
    exchange: F,
) -> Result<T, Error>
where
    F: Future<Output = Result<T, Error>>,
{
    if limit.is_zero() {
        return exchange.await;
    }

    match tokio::time::timeout(limit, exchange).await {
        Ok(result) => result,
        Err(_) => {
            tracing::debug!(socket_id, timeout = ?limit, "{} timeout", kind);
            Err(Error::Timeout(format!("{} timeout after {:?}", kind, limit)))
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_resolve_to_tcp_ten_seconds() {
        let effective = SendOptions::new().resolve();
        assert_eq!(effective.timeout, Duration::from_secs(10));
        assert_eq!(effective.transport, TransportKind::Tcp);
    }

    #[test]
    fn test_merge_overrides_per_field() {
        let defaults = SendOptions::new()
            .with_timeout(Duration::from_millis(2500))
            .with_transport(TransportKind::Udp);
        let call = SendOptions::new().with_timeout(Duration::from_millis(100));

        let merged = call.merged_with(&defaults);
        assert_eq!(merged.timeout, Some(Duration::from_millis(100)));
        assert_eq!(merged.transport, Some(TransportKind::Udp));
    }

    #[test]
    fn test_send_options_serde() {
        let options: SendOptions =
            serde_json::from_str(r#"{"timeout":1500,"transport":"udp"}"#).unwrap();
        assert_eq!(options.timeout, Some(Duration::from_millis(1500)));
        assert_eq!(options.transport, Some(TransportKind::Udp));

        let empty: SendOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, SendOptions::default());
        assert_eq!(serde_json::to_string(&empty).unwrap(), "{}");
    }

    #[test]
    fn test_socket_ids_increase() {
        let transport = NetworkTransport::new();
        let shared = transport.clone();
        assert_eq!(transport.next_socket_id(), 1);
        assert_eq!(shared.next_socket_id(), 2);
        assert_eq!(NetworkTransport::new().next_socket_id(), 1);
    }

    #[tokio::test]
    async fn test_deadline_times_out() {
        let result: Result<(), Error> = with_deadline(
            1,
            TransportKind::Tcp,
            Duration::from_millis(10),
            std::future::pending(),
        )
        .await;
        assert!(matches!(result, Err(Error::Timeout(_))));
    }

    #[tokio::test]
    async fn test_zero_deadline_is_unbounded() {
        let result = with_deadline(1, TransportKind::Udp, Duration::ZERO, async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
