//! # Farside
//!
//! Client-side proxies for objects that live in another process.
//!
//! A [`RemoteObjectProxy`] stands in for one remote instance. Building it
//! resolves a server (explicit address, discovery, or a freshly launched
//! process), fires the remote creation request in the background and returns
//! at once. Method calls are validated against a static [`MethodTable`],
//! wait for creation, and are forwarded through a [`RemoteClient`].
//!
//! The collaborators sit behind traits so they can be swapped:
//!
//! - [`transport::Transport`] moves bytes; [`tcp::TcpTransport`] is the default.
//! - [`client::RemoteClient`] speaks the three remote-object operations;
//!   [`client::FramedClient`] implements them over any transport and
//!   [`client::RetryingClient`] adds a retry policy.
//! - [`launcher::ServerLauncher`] starts a server; [`launcher::ProcessLauncher`]
//!   runs an executable.
//! - [`discovery::Discovery`] hands out known servers.

pub mod client;
pub mod discovery;
pub mod dispatch;
pub mod handles;
pub mod launcher;
pub mod proxy;
pub mod tcp;
pub mod transport;

pub use client::Connector;
pub use client::RemoteClient;
pub use dispatch::MethodTable;
pub use dispatch::RemoteMethod;
pub use dispatch::RemoteObject;
pub use handles::ObjectId;
pub use handles::ServerAddr;
pub use proxy::ProxyBuilder;
pub use proxy::ProxyDescriptor;
pub use proxy::ProxyState;
pub use proxy::RemoteObjectProxy;

pub use farside_retry as retry;
pub use farside_wire as wire;

#[cfg(test)]
mod mock_transport;
