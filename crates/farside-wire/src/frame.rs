//! # Frames
//!
//! Envelopes for the three remote-object operations. A frame is one
//! self-contained message; length delimiting is the transport's job.
//!
//! Payload fields stay opaque here. The codec that produced them is agreed
//! between client and server out of band.

use serde::Deserialize;
use serde::Serialize;

use crate::codec::RemoteFault;
use crate::error::Error;
use crate::error::Result;

/// Client-to-server message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Instantiate `object_type` under the client-chosen `object_id`.
    Create {
        object_type: String,
        object_id: String,
        args: Vec<u8>,
    },
    /// Invoke `method` on an existing object.
    Call {
        object_id: String,
        method: String,
        payload: Vec<u8>,
    },
    /// Liveness probe.
    Ping,
}

/// Server-to-client message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Response {
    Created,
    /// Encoded [`Outcome`](crate::Outcome) of a call.
    Returned { payload: Vec<u8> },
    /// The server could not carry out the request at all.
    Fault(RemoteFault),
    Pong,
}

impl Request {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        encode(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        decode(bytes)
    }
}

impl Response {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        encode(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        decode(bytes)
    }

    /// Short name of the variant, for protocol error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Returned { .. } => "returned",
            Self::Fault(_) => "fault",
            Self::Pong => "pong",
        }
    }
}

fn encode<T: Serialize>(frame: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(frame).map_err(|e| Error::Encode(e.to_string()))
}

fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| Error::Decode(e.to_string()))
}
