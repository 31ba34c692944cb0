//! # Farside Wire
//!
//! Everything that turns remote-object traffic into bytes:
//!
//! - [`codec`]: the injectable [`Codec`] boundary for call arguments and
//!   call outcomes, with [`JsonCodec`] as the default.
//! - [`frame`]: the request/response envelopes exchanged by a framed client
//!   and a server.
//!
//! The proxy never inspects payload bytes itself. It hands arguments to a
//! codec, ships the opaque result, and asks the codec whether the reply is a
//! value or a [`RemoteFault`].

pub mod codec;
pub mod error;
pub mod frame;

pub use codec::CallArgs;
pub use codec::Codec;
pub use codec::JsonCodec;
pub use codec::Outcome;
pub use codec::RemoteFault;
pub use codec::Value;
pub use error::Error;
pub use error::Result;
pub use frame::Request;
pub use frame::Response;
