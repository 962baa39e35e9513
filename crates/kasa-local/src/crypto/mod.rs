//! Cipher used by the TP-Link Smart Home Protocol.
//!
//! - [`xor`]: XOR autokey cipher shared by the TCP and UDP transports

pub mod xor;

pub use xor::{decrypt, encrypt, encrypt_with_header};
