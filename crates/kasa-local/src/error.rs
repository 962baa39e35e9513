//! Error types for kasa-local.
//!
//! Transport and codec failures reject the single exchange they belong to.
//! [`ResponseError`] is returned when a reply decoded fine but one or more
//! modules reported a failure; it keeps the raw reply so partial results can
//! still be used.

use std::fmt;

use serde_json::Value;
use thiserror::Error;

/// Error type for kasa-local operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The reply could not be turned back into JSON.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Operation timed out.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Connection to the device failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// I/O error during communication.
    #[error("I/O error: {0}")]
    IoError(String),

    /// The device answered, but at least one module reported an error.
    #[error(transparent)]
    Response(#[from] ResponseError),

    /// Discovery could not be started.
    #[error("discovery error: {0}")]
    Discovery(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err.to_string())
    }
}

/// Failure to decode a payload received from a device.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Fewer bytes arrived than the length header declared.
    #[error("truncated payload: expected {expected} bytes, received {received}")]
    Truncated {
        /// Length declared by the header.
        expected: usize,
        /// Payload bytes actually received.
        received: usize,
    },

    /// The length header declared an unreasonably large payload.
    #[error("payload too large: {0} bytes")]
    Oversized(usize),

    /// The stream ended before the 4-byte length header was complete.
    #[error("missing length header ({0} bytes received)")]
    MissingHeader(usize),

    /// The decrypted bytes are not valid UTF-8.
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),

    /// The decrypted text is not valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    /// The device replied with an empty payload.
    #[error("empty payload")]
    Empty,
}

/// Why a single module/operation pair was judged a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The reply has no entry (or no `err_code`) for the pair.
    Missing,
    /// The reply's `err_code` was not zero.
    NonZero(i64),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Missing => write!(f, "err_code missing"),
            FailureReason::NonZero(code) => write!(f, "err_code not zero ({code})"),
        }
    }
}

/// One failing module/operation pair of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleFailure {
    /// Module name, e.g. `emeter`.
    pub module: String,
    /// Operation name, e.g. `get_realtime`. `None` if the module was sent empty.
    pub operation: Option<String>,
    /// What was wrong with the result.
    pub reason: FailureReason,
}

/// A structurally valid reply in which one or more modules failed.
///
/// For a single requested pair, `response` is that pair's result object.
/// For several requested pairs, `response` is the full reply, so callers can
/// still pick out the modules that succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseError {
    /// Short description of the failure.
    pub message: String,
    /// Reply payload (leaf result or full reply, see above).
    pub response: Value,
    /// The command that was sent, including any routing context.
    pub command: Value,
    /// Every failing pair, in command order.
    pub failures: Vec<ModuleFailure>,
}

impl ResponseError {
    /// Names of the failing modules, in command order.
    pub fn failing_modules(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.module.as_str()).collect()
    }

    /// Returns true if `module` is the only failing module.
    pub fn only_module_failed(&self, module: &str) -> bool {
        !self.failures.is_empty() && self.failures.iter().all(|f| f.module == module)
    }
}

impl fmt::Display for ResponseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {}", self.message, self.failing_modules().join(","))
    }
}

impl std::error::Error for ResponseError {}
