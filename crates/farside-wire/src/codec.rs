//! # Payload Codec
//!
//! The proxy treats argument and result payloads as opaque bytes. A [`Codec`]
//! is the only thing that knows their format. It must round-trip values and
//! keep a successful outcome distinguishable from a [`RemoteFault`].

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::error::Error;
use crate::error::Result;

/// Dynamically typed argument and result value.
pub type Value = serde_json::Value;

/// Positional and keyword arguments of one call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallArgs {
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: BTreeMap<String, Value>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a positional argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Sets a keyword argument, replacing an earlier one of the same name.
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(name.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty() && self.kwargs.is_empty()
    }
}

/// Application-level failure reported by the remote side.
///
/// This travels inside a successful transport exchange; it is the remote
/// object refusing or failing the call, not the network failing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFault {
    pub kind: String,
    pub message: String,
}

impl RemoteFault {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for RemoteFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for RemoteFault {}

/// The decoded result of a remote call.
pub type Outcome = std::result::Result<Value, RemoteFault>;

/// Encode/decode pair for call payloads.
///
/// The client side uses `encode_args` and `decode_outcome`; a server uses the
/// mirror pair.
pub trait Codec: Send + Sync + 'static {
    fn encode_args(&self, args: &CallArgs) -> Result<Vec<u8>>;

    fn decode_args(&self, bytes: &[u8]) -> Result<CallArgs>;

    fn encode_outcome(&self, outcome: &Outcome) -> Result<Vec<u8>>;

    fn decode_outcome(&self, bytes: &[u8]) -> Result<Outcome>;
}

/// JSON payloads. Outcomes are encoded as `{"ok": value}` or
/// `{"err": {"kind": .., "message": ..}}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum OutcomeRepr {
    Ok(Value),
    Err(RemoteFault),
}

impl Codec for JsonCodec {
    fn encode_args(&self, args: &CallArgs) -> Result<Vec<u8>> {
        serde_json::to_vec(args).map_err(|e| Error::Encode(e.to_string()))
    }

    fn decode_args(&self, bytes: &[u8]) -> Result<CallArgs> {
        serde_json::from_slice(bytes).map_err(|e| Error::Decode(e.to_string()))
    }

    fn encode_outcome(&self, outcome: &Outcome) -> Result<Vec<u8>> {
        let repr = match outcome {
            Ok(value) => OutcomeRepr::Ok(value.clone()),
            Err(fault) => OutcomeRepr::Err(fault.clone()),
        };
        serde_json::to_vec(&repr).map_err(|e| Error::Encode(e.to_string()))
    }

    fn decode_outcome(&self, bytes: &[u8]) -> Result<Outcome> {
        let repr: OutcomeRepr =
            serde_json::from_slice(bytes).map_err(|e| Error::Decode(e.to_string()))?;
        Ok(match repr {
            OutcomeRepr::Ok(value) => Ok(value),
            OutcomeRepr::Err(fault) => Err(fault),
        })
    }
}
