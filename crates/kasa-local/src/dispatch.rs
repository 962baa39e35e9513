//! Command dispatch and reply validation.
//!
//! A command is sent as one JSON envelope and the reply mirrors its shape.
//! Validation walks the command two levels deep (module, then operation) and
//! checks that the matching reply entry carries `err_code == 0`. Nothing
//! deeper than the operation level is inspected.
//!
//! The result shape depends on how many pairs were requested:
//!
//! - one pair: the pair's result object, e.g. `{"err_code":0,"alias":...}`
//! - several pairs: the whole reply
//!
//! On failure a single pair yields a [`ResponseError`] holding that pair's
//! result, while several pairs yield one aggregate error holding the whole
//! reply so that modules which succeeded can still be read.

use serde_json::{Value, json};
use tracing::debug;

use crate::{
    commands::CONTEXT,
    error::{Error, FailureReason, ModuleFailure, ResponseError},
    transport::{EffectiveSendOptions, Transport},
};

/// Levels of the command tree that are validated: module, then operation.
pub const VALIDATION_DEPTH: usize = 2;

/// Name of the error-code field carried by every result object.
pub const ERR_CODE: &str = "err_code";

/// Expands a short outlet id to its full form.
///
/// A one-character id becomes `device_id + "0" + id`, a two-character id
/// becomes `device_id + id`; anything else is already complete.
///
/// ```
/// use kasa_local::dispatch::normalize_child_id;
///
/// assert_eq!(normalize_child_id("8006", "1"), "800601");
/// assert_eq!(normalize_child_id("8006", "02"), "800602");
/// assert_eq!(normalize_child_id("8006", "800603"), "800603");
/// ```
pub fn normalize_child_id(device_id: &str, child_id: &str) -> String {
    match child_id.chars().count() {
        1 => format!("{}0{}", device_id, child_id),
        2 => format!("{}{}", device_id, child_id),
        _ => child_id.to_string(),
    }
}

/// Attaches `context.child_ids` to the envelope root.
///
/// Ids are normalized against `device_id`. An empty list leaves the command
/// untouched.
pub fn attach_child_ids<S: AsRef<str>>(command: &mut Value, device_id: &str, child_ids: &[S]) {
    if child_ids.is_empty() {
        return;
    }

    let ids: Vec<String> = child_ids
        .iter()
        .map(|id| normalize_child_id(device_id, id.as_ref()))
        .collect();

    if let Value::Object(envelope) = command {
        envelope.insert(CONTEXT.to_string(), json!({ "child_ids": ids }));
    }
}

/// One validated module/operation pair.
#[derive(Debug, Clone, PartialEq)]
pub struct PairResult {
    /// `[module]` or `[module, operation]`.
    pub path: Vec<String>,
    /// The reply entry for the pair, if any.
    pub result: Option<Value>,
    /// Why the pair failed, `None` on success.
    pub failure: Option<FailureReason>,
}

impl PairResult {
    fn to_failure(&self) -> Option<ModuleFailure> {
        let reason = self.failure.clone()?;
        Some(ModuleFailure {
            module: self.path.first().cloned().unwrap_or_default(),
            operation: self.path.get(1).cloned(),
            reason,
        })
    }
}

/// Walks `command` to [`VALIDATION_DEPTH`] and pairs every leaf with its reply.
///
/// The routing `context` key is skipped. When a module is present in the
/// reply but the operation is not, the module-level object is used; devices
/// answer unsupported modules that way.
pub fn validate(command: &Value, response: &Value) -> Vec<PairResult> {
    let mut pairs = Vec::new();
    let mut path = Vec::with_capacity(VALIDATION_DEPTH);
    walk(command, Some(response), &mut path, &mut pairs);
    pairs
}

fn walk<'a>(
    command: &'a Value,
    reply: Option<&'a Value>,
    path: &mut Vec<&'a str>,
    pairs: &mut Vec<PairResult>,
) {
    let branches = command
        .as_object()
        .filter(|obj| !obj.is_empty() && path.len() < VALIDATION_DEPTH);

    let Some(branches) = branches else {
        // An empty command at the root has no pairs
        if !path.is_empty() {
            pairs.push(judge(path, reply));
        }
        return;
    };

    for (key, sub_command) in branches {
        if path.is_empty() && key.as_str() == CONTEXT {
            continue;
        }

        let sub_reply = match reply {
            Some(r) => match r.get(key) {
                Some(found) => Some(found),
                None if !path.is_empty() => Some(r),
                None => None,
            },
            None => None,
        };

        path.push(key.as_str());
        walk(sub_command, sub_reply, path, pairs);
        path.pop();
    }
}

fn judge(path: &[&str], reply: Option<&Value>) -> PairResult {
    let failure = match reply.and_then(|r| r.get(ERR_CODE)).and_then(Value::as_i64) {
        Some(0) => None,
        Some(code) => Some(FailureReason::NonZero(code)),
        None => Some(FailureReason::Missing),
    };

    PairResult {
        path: path.iter().map(|s| s.to_string()).collect(),
        result: reply.cloned(),
        failure,
    }
}

/// Validates `response` against `command` and flattens it.
pub fn process_response(command: &Value, response: Value) -> Result<Value, ResponseError> {
    let mut pairs = validate(command, &response);
    let failures: Vec<ModuleFailure> = pairs.iter().filter_map(PairResult::to_failure).collect();

    if pairs.len() == 1 {
        let pair = pairs.remove(0);
        let result = pair.result.unwrap_or(Value::Null);
        return match failures.into_iter().next() {
            Some(failure) => Err(ResponseError {
                message: failure.reason.to_string(),
                response: result,
                command: command.clone(),
                failures: vec![failure],
            }),
            None => Ok(result),
        };
    }

    if !failures.is_empty() {
        return Err(ResponseError {
            message: ERR_CODE.to_string(),
            response,
            command: command.clone(),
            failures,
        });
    }

    Ok(response)
}

/// Sends `command` to `host:port` and validates the reply.
///
/// Any routing context must already be attached (see [`attach_child_ids`]).
pub async fn send_command(
    transport: &dyn Transport,
    host: &str,
    port: u16,
    command: &Value,
    options: EffectiveSendOptions,
) -> Result<Value, Error> {
    let payload = command.to_string();
    debug!(host, port, transport = %options.transport, "sending command");

    let response = transport.send(&payload, host, port, options).await?;
    Ok(process_response(command, response)?)
}
