//! Wire codec for one request/response exchange.
//!
//! Payloads are UTF-8 JSON encrypted with the [`xor`](crate::crypto::xor)
//! cipher. UDP datagrams carry the bare ciphertext; TCP streams prefix it with
//! a 4-byte big-endian length of the plaintext.
//!
//! Device replies over TCP may arrive in several segments. [`FrameBuffer`]
//! accumulates them until the declared length is satisfied and refuses to
//! produce a value from a truncated frame.

use serde_json::Value;

use crate::{crypto, error::DecodeError};

/// Size of the TCP length header.
pub const HEADER_LEN: usize = 4;

/// Largest payload accepted from a device.
pub const MAX_PAYLOAD_LEN: usize = 1024 * 1024;

/// Encrypts `payload` for a UDP datagram.
pub fn encode(payload: &str) -> Vec<u8> {
    crypto::encrypt(payload.as_bytes())
}

/// Encrypts `payload` with the TCP length header.
pub fn encode_with_length_header(payload: &str) -> Vec<u8> {
    crypto::encrypt_with_header(payload.as_bytes())
}

/// Decrypts a bare ciphertext and parses it as JSON.
pub fn decode(ciphertext: &[u8]) -> Result<Value, DecodeError> {
    parse_plaintext(&crypto::decrypt(ciphertext))
}

/// Parses decrypted bytes as JSON.
pub fn parse_plaintext(plaintext: &[u8]) -> Result<Value, DecodeError> {
    if plaintext.is_empty() {
        return Err(DecodeError::Empty);
    }

    let text =
        std::str::from_utf8(plaintext).map_err(|e| DecodeError::InvalidUtf8(e.to_string()))?;
    serde_json::from_str(text).map_err(|e| DecodeError::InvalidJson(e.to_string()))
}

/// Accumulates a length-prefixed TCP reply across reads.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
    segments: usize,
}

impl FrameBuffer {
    /// Creates an empty frame buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one received segment.
    ///
    /// Returns `Ok(true)` once the declared payload length has been reached.
    pub fn push(&mut self, data: &[u8]) -> Result<bool, DecodeError> {
        self.segments += 1;
        self.buf.extend_from_slice(data);

        if let Some(expected) = self.expected_len()
            && expected > MAX_PAYLOAD_LEN
        {
            return Err(DecodeError::Oversized(expected));
        }

        Ok(self.is_complete())
    }

    /// Payload length declared by the header, once 4 bytes have arrived.
    pub fn expected_len(&self) -> Option<usize> {
        let header: [u8; HEADER_LEN] = self.buf.get(..HEADER_LEN)?.try_into().ok()?;
        Some(u32::from_be_bytes(header) as usize)
    }

    /// Payload bytes received so far, excluding the header.
    pub fn received_len(&self) -> usize {
        self.buf.len().saturating_sub(HEADER_LEN)
    }

    /// Number of segments pushed so far.
    pub fn segments(&self) -> usize {
        self.segments
    }

    /// Returns true once the declared payload length has been received.
    pub fn is_complete(&self) -> bool {
        self.expected_len()
            .is_some_and(|expected| self.received_len() >= expected)
    }

    /// Decodes the accumulated frame.
    ///
    /// Fails with [`DecodeError::Truncated`] if the stream ended early. Bytes
    /// past the declared length are ignored.
    pub fn finish(self) -> Result<Value, DecodeError> {
        let Some(expected) = self.expected_len() else {
            return Err(DecodeError::MissingHeader(self.buf.len()));
        };

        let received = self.received_len();
        if received < expected {
            return Err(DecodeError::Truncated { expected, received });
        }

        decode(&self.buf[HEADER_LEN..HEADER_LEN + expected])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SYSINFO: &str = r#"{"system":{"get_sysinfo":{"alias":"Lamp","err_code":0}}}"#;

    #[test]
    fn test_decode_udp_payload() {
        let value = decode(&encode(SYSINFO)).unwrap();
        assert_eq!(value["system"]["get_sysinfo"]["alias"], "Lamp");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = decode(&encode("not json")).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidJson(_)));

        let err = decode(&[]).unwrap_err();
        assert_eq!(err, DecodeError::Empty);
    }

    #[test]
    fn test_decode_rejects_invalid_utf8() {
        let cipher = crypto::encrypt(&[0xff, 0xfe, 0x7b]);
        assert!(matches!(decode(&cipher), Err(DecodeError::InvalidUtf8(_))));
    }

    #[test]
    fn test_frame_buffer_accumulates_segments() {
        let frame = encode_with_length_header(SYSINFO);
        let mut buffer = FrameBuffer::new();

        assert!(!buffer.push(&frame[..2]).unwrap());
        assert_eq!(buffer.expected_len(), None);
        assert!(!buffer.push(&frame[2..20]).unwrap());
        assert_eq!(buffer.expected_len(), Some(SYSINFO.len()));
        assert!(buffer.push(&frame[20..]).unwrap());
        assert_eq!(buffer.segments(), 3);

        let value = buffer.finish().unwrap();
        assert_eq!(value["system"]["get_sysinfo"]["err_code"], 0);
    }

    #[test]
    fn test_frame_buffer_truncated() {
        // Declared length 50, only 30 bytes of payload before close
        let mut frame = 50u32.to_be_bytes().to_vec();
        frame.extend(vec![0u8; 30]);

        let mut buffer = FrameBuffer::new();
        assert!(!buffer.push(&frame).unwrap());
        assert_eq!(
            buffer.finish().unwrap_err(),
            DecodeError::Truncated {
                expected: 50,
                received: 30
            }
        );
    }

    #[test]
    fn test_frame_buffer_missing_header() {
        let mut buffer = FrameBuffer::new();
        buffer.push(&[0, 0]).unwrap();
        assert_eq!(buffer.finish().unwrap_err(), DecodeError::MissingHeader(2));
    }

    #[test]
    fn test_frame_buffer_oversized() {
        let mut buffer = FrameBuffer::new();
        let header = ((MAX_PAYLOAD_LEN + 1) as u32).to_be_bytes();
        assert_eq!(
            buffer.push(&header).unwrap_err(),
            DecodeError::Oversized(MAX_PAYLOAD_LEN + 1)
        );
    }

    #[test]
    fn test_frame_buffer_ignores_trailing_bytes() {
        let mut frame = encode_with_length_header(SYSINFO);
        frame.extend_from_slice(b"trailing");

        let mut buffer = FrameBuffer::new();
        assert!(buffer.push(&frame).unwrap());
        assert!(buffer.finish().is_ok());
    }
}
