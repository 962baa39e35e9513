//! Length-prefixed TCP exchange.
//!
//! The request is written with a 4-byte big-endian length header. The reply
//! is accumulated across reads until the declared length has arrived; the
//! write side is then half-closed so the device closes the connection, and the
//! frame is decoded once the stream reports EOF. A stream that ends before the
//! declared length fails with [`DecodeError::Truncated`](crate::error::DecodeError::Truncated).

use std::time::Duration;

use serde_json::Value;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpStream,
};
use tracing::debug;

use crate::{
    codec::{self, FrameBuffer},
    error::Error,
    transport::{TransportKind, with_deadline},
};

const READ_CHUNK: usize = 4096;

/// Performs one TCP request/response exchange with `host:port`.
///
/// The whole exchange (connect, write, read) is bounded by `limit`; zero
/// disables the bound. The stream is owned by the exchange future and is
/// closed exactly once when that future completes or is dropped.
pub async fn exchange(
    socket_id: u64,
    payload: &str,
    host: &str,
    port: u16,
    limit: Duration,
) -> Result<Value, Error> {
    with_deadline(socket_id, TransportKind::Tcp, limit, async {
        debug!(socket_id, host, port, "connecting");

        let mut stream = TcpStream::connect((host, port))
            .await
            .map_err(|e| Error::ConnectionFailed(format!("{}:{}: {}", host, port, e)))?;

        debug!(socket_id, peer = ?stream.peer_addr().ok(), "connected");

        let request = codec::encode_with_length_header(payload);
        debug!(socket_id, bytes = request.len(), "sending request");
        stream.write_all(&request).await?;

        read_reply(socket_id, &mut stream).await
    })
    .await
}

/// Reads a length-prefixed reply from `stream` until the peer closes it.
pub(crate) async fn read_reply<S>(socket_id: u64, stream: &mut S) -> Result<Value, Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut frame = FrameBuffer::new();
    let mut chunk = [0u8; READ_CHUNK];
    let mut half_closed = false;

    loop {
        let n = match stream.read(&mut chunk).await {
            Ok(n) => n,
            // Some firmware resets instead of closing once it has answered
            Err(e) if frame.is_complete() => {
                debug!(socket_id, error = %e, "read error after complete reply");
                0
            }
            Err(e) => return Err(e.into()),
        };

        if n == 0 {
            debug!(
                socket_id,
                segments = frame.segments(),
                received = frame.received_len(),
                expected = ?frame.expected_len(),
                "connection closed"
            );
            return Ok(frame.finish()?);
        }

        if frame.push(&chunk[..n])? && !half_closed {
            debug!(
                socket_id,
                bytes = frame.received_len(),
                "reply complete, closing write side"
            );
            half_closed = true;
            if let Err(e) = stream.shutdown().await {
                debug!(socket_id, error = %e, "shutdown failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;

    const REPLY: &str = r#"{"system":{"get_sysinfo":{"alias":"Kitchen","err_code":0}}}"#;

    #[tokio::test]
    async fn test_read_reply_across_segments() {
        let (mut client, mut device) = tokio::io::duplex(64);
        let frame = codec::encode_with_length_header(REPLY);

        let writer = tokio::spawn(async move {
            for part in frame.chunks(7) {
                device.write_all(part).await.unwrap();
                tokio::task::yield_now().await;
            }
            // Wait for the client's half-close before closing
            let mut rest = Vec::new();
            device.read_to_end(&mut rest).await.unwrap();
            drop(device);
        });

        let value = read_reply(1, &mut client).await.unwrap();
        assert_eq!(value["system"]["get_sysinfo"]["alias"], "Kitchen");
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_read_reply_truncated() {
        let (mut client, mut device) = tokio::io::duplex(256);

        let mut frame = 50u32.to_be_bytes().to_vec();
        frame.extend(codec::encode(&"x".repeat(30)));
        device.write_all(&frame).await.unwrap();
        drop(device);

        let err = read_reply(2, &mut client).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Decode(DecodeError::Truncated {
                expected: 50,
                received: 30
            })
        ));
    }

    #[tokio::test]
    async fn test_read_reply_closed_without_data() {
        let (mut client, device) = tokio::io::duplex(16);
        drop(device);

        let err = read_reply(3, &mut client).await.unwrap_err();
        assert!(matches!(err, Error::Decode(DecodeError::MissingHeader(0))));
    }
}
