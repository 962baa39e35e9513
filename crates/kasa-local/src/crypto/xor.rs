//! XOR autokey cipher for the TP-Link Smart Home Protocol.
//!
//! Every byte is XORed with the previous ciphertext byte, starting from a
//! fixed key of 171. The cipher never changes the payload length, so the TCP
//! length header can describe either the plaintext or the ciphertext.

/// Initial key for the XOR autokey cipher.
const INITIAL_KEY: u8 = 171;

/// Encrypts a plaintext payload (no length prefix).
///
/// This is the UDP framing: one datagram holds exactly the ciphertext.
///
/// # Example
///
/// ```
/// use kasa_local::crypto::xor::encrypt;
///
/// let command = br#"{"system":{"get_sysinfo":{}}}"#;
/// let encrypted = encrypt(command);
///
/// // No length header for UDP
/// assert_eq!(encrypted.len(), command.len());
/// ```
pub fn encrypt(plaintext: &[u8]) -> Vec<u8> {
    let mut key = INITIAL_KEY;
    let mut result = Vec::with_capacity(plaintext.len());

    for &byte in plaintext {
        let encrypted = key ^ byte;
        key = encrypted;
        result.push(encrypted);
    }

    result
}

/// Encrypts a plaintext payload and prepends the TCP length header.
///
/// The result is a 4-byte big-endian length of the plaintext followed by the
/// encrypted payload, ready to be written to a TCP stream.
///
/// # Example
///
/// ```
/// use kasa_local::crypto::xor::encrypt_with_header;
///
/// let command = br#"{"system":{"get_sysinfo":{}}}"#;
/// let encrypted = encrypt_with_header(command);
///
/// // First 4 bytes are the length header
/// assert_eq!(encrypted.len(), 4 + command.len());
/// ```
pub fn encrypt_with_header(plaintext: &[u8]) -> Vec<u8> {
    let len = plaintext.len() as u32;

    let mut result = Vec::with_capacity(4 + plaintext.len());
    result.extend_from_slice(&len.to_be_bytes());
    result.extend(encrypt(plaintext));
    result
}

/// Decrypts a ciphertext payload.
///
/// Expects the raw encrypted payload **without** the 4-byte length prefix.
///
/// # Example
///
/// ```
/// use kasa_local::crypto::xor::{decrypt, encrypt_with_header};
///
/// let original = br#"{"system":{"get_sysinfo":{}}}"#;
/// let encrypted = encrypt_with_header(original);
///
/// // Decrypt, skipping the 4-byte length header
/// let decrypted = decrypt(&encrypted[4..]);
/// assert_eq!(&original[..], &decrypted[..]);
/// ```
pub fn decrypt(ciphertext: &[u8]) -> Vec<u8> {
    let mut key = INITIAL_KEY;
    let mut result = Vec::with_capacity(ciphertext.len());

    for &byte in ciphertext {
        result.push(key ^ byte);
        key = byte;
    }

    result
}
