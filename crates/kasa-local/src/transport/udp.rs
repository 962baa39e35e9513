//! Single-datagram UDP exchange.
//!
//! One encrypted datagram is sent without a length prefix and the first reply
//! datagram is decoded. There are no retries; callers decide whether to try
//! again.

use std::{
    net::{Ipv4Addr, Ipv6Addr, SocketAddr},
    time::Duration,
};

use serde_json::Value;
use tokio::net::{UdpSocket, lookup_host};
use tracing::debug;

use crate::{
    codec,
    error::Error,
    transport::{TransportKind, with_deadline},
};

/// Largest datagram accepted as a reply.
const MAX_DATAGRAM: usize = 64 * 1024;

/// Performs one UDP request/response exchange with `host:port`.
///
/// The ephemeral socket is bound inside the exchange future, so it is closed
/// on success, error and timeout alike.
pub async fn exchange(
    socket_id: u64,
    payload: &str,
    host: &str,
    port: u16,
    limit: Duration,
) -> Result<Value, Error> {
    with_deadline(socket_id, TransportKind::Udp, limit, async {
        let target = resolve(host, port).await?;
        let bind: SocketAddr = if target.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };

        let socket = UdpSocket::bind(bind).await?;
        let request = codec::encode(payload);
        debug!(socket_id, addr = %target, bytes = request.len(), "sending datagram");
        socket.send_to(&request, target).await?;

        let mut buf = vec![0u8; MAX_DATAGRAM];
        let (n, from) = socket.recv_from(&mut buf).await?;
        debug!(socket_id, from = %from, bytes = n, "received datagram");

        Ok(codec::decode(&buf[..n])?)
    })
    .await
}

async fn resolve(host: &str, port: u16) -> Result<SocketAddr, Error> {
    lookup_host((host, port))
        .await
        .map_err(|e| Error::ConnectionFailed(format!("{}:{}: {}", host, port, e)))?
        .next()
        .ok_or_else(|| Error::ConnectionFailed(format!("{}:{}: no address", host, port)))
}
