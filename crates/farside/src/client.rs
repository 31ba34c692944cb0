//! # Remote Object Client
//!
//! The three operations a proxy needs from the network:
//!
//! - create a remote instance under a client-chosen id,
//! - call a method on it with an opaque payload,
//! - probe whether the server is alive.
//!
//! [`FramedClient`] implements them over any byte [`Transport`].
//! [`RetryingClient`] wraps any client with a [`RetryPolicy`], which is where
//! resilience against transient failures lives; the proxy itself never
//! retries. [`TcpConnector`] assembles both for a server address.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use farside_retry::ConfigError;
use farside_retry::RetryConfig;
use farside_retry::RetryError;
use farside_retry::RetryPolicy;
use farside_wire::RemoteFault;
use farside_wire::Request;
use farside_wire::Response;

use crate::handles::ObjectId;
use crate::handles::ServerAddr;
use crate::tcp::TcpTransport;
use crate::transport;
use crate::transport::Transport;

#[derive(Debug, Clone)]
pub enum Error {
    Transport(transport::Error),
    Wire(farside_wire::Error),
    /// The server answered with an application-level fault.
    Remote(RemoteFault),
    /// The server answered with a frame that does not fit the request.
    Protocol(String),
    /// Every attempt permitted by the retry policy failed.
    RetriesExhausted { attempts: u32, last: Box<Error> },
    Internal(String),
}

impl Error {
    /// Whether another attempt could succeed. Only network failures qualify.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "Transport error: {}", e),
            Self::Wire(e) => write!(f, "Wire error: {}", e),
            Self::Remote(fault) => write!(f, "Remote failure: {}", fault),
            Self::Protocol(msg) => write!(f, "Protocol violation: {}", msg),
            Self::RetriesExhausted { attempts, last } => {
                write!(f, "Retries exhausted after {} attempts: {}", attempts, last)
            }
            Self::Internal(msg) => write!(f, "Internal client error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e),
            Self::Wire(e) => Some(e),
            Self::Remote(fault) => Some(fault),
            Self::RetriesExhausted { last, .. } => Some(last.as_ref()),
            _ => None,
        }
    }
}

impl From<transport::Error> for Error {
    fn from(e: transport::Error) -> Self {
        Self::Transport(e)
    }
}

impl From<farside_wire::Error> for Error {
    fn from(e: farside_wire::Error) -> Self {
        Self::Wire(e)
    }
}

impl From<RetryError<Error>> for Error {
    fn from(e: RetryError<Error>) -> Self {
        match e {
            RetryError::Exhausted { attempts, last } => Self::RetriesExhausted {
                attempts,
                last: Box::new(last),
            },
            RetryError::Aborted(e) => e,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Client for one server hosting remote objects.
#[async_trait::async_trait]
pub trait RemoteClient: Send + Sync + 'static {
    /// Instantiates `object_type` remotely under `object_id`.
    async fn create_remote_instance(
        &self,
        object_type: &str,
        ctor_args: &[u8],
        object_id: &ObjectId,
    ) -> Result<()>;

    /// Invokes `method` and returns the encoded outcome.
    async fn call_remote_method(
        &self,
        object_id: &ObjectId,
        method: &str,
        payload: &[u8],
    ) -> Result<Vec<u8>>;

    /// Liveness probe. Never fails; an unreachable server is `false`.
    async fn is_reachable(&self) -> bool;
}

/// Produces a client for a server address.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, addr: &ServerAddr) -> Arc<dyn RemoteClient>;
}

/// [`RemoteClient`] speaking [`Request`]/[`Response`] frames over a transport.
pub struct FramedClient {
    transport: Arc<dyn Transport>,
    probe_timeout: Duration,
}

impl FramedClient {
    pub fn new(transport: Arc<dyn Transport>, probe_timeout: Duration) -> Self {
        Self {
            transport,
            probe_timeout,
        }
    }

    async fn exchange(&self, request: &Request) -> Result<Response> {
        let payload = request.to_bytes()?;
        let reply = self.transport.call(&payload).await?;
        Ok(Response::from_bytes(&reply)?)
    }
}

#[async_trait::async_trait]
impl RemoteClient for FramedClient {
    async fn create_remote_instance(
        &self,
        object_type: &str,
        ctor_args: &[u8],
        object_id: &ObjectId,
    ) -> Result<()> {
        let request = Request::Create {
            object_type: object_type.to_string(),
            object_id: object_id.to_string(),
            args: ctor_args.to_vec(),
        };
        match self.exchange(&request).await? {
            Response::Created => Ok(()),
            Response::Fault(fault) => Err(Error::Remote(fault)),
            other => Err(Error::Protocol(format!(
                "expected `created`, received `{}`",
                other.kind()
            ))),
        }
    }

    async fn call_remote_method(
        &self,
        object_id: &ObjectId,
        method: &str,
        payload: &[u8],
    ) -> Result<Vec<u8>> {
        let request = Request::Call {
            object_id: object_id.to_string(),
            method: method.to_string(),
            payload: payload.to_vec(),
        };
        match self.exchange(&request).await? {
            Response::Returned { payload } => Ok(payload),
            Response::Fault(fault) => Err(Error::Remote(fault)),
            other => Err(Error::Protocol(format!(
                "expected `returned`, received `{}`",
                other.kind()
            ))),
        }
    }

    async fn is_reachable(&self) -> bool {
        match tokio::time::timeout(self.probe_timeout, self.exchange(&Request::Ping)).await {
            Ok(Ok(Response::Pong)) => true,
            Ok(Ok(other)) => {
                debug!(received = other.kind(), "unexpected probe reply");
                false
            }
            Ok(Err(e)) => {
                debug!(error = %e, "probe failed");
                false
            }
            Err(_) => false,
        }
    }
}

/// Retries transient failures of an inner client. Remote faults and protocol
/// violations are returned as they are.
pub struct RetryingClient {
    inner: Arc<dyn RemoteClient>,
    policy: RetryPolicy,
}

impl RetryingClient {
    pub fn new(inner: Arc<dyn RemoteClient>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait::async_trait]
impl RemoteClient for RetryingClient {
    async fn create_remote_instance(
        &self,
        object_type: &str,
        ctor_args: &[u8],
        object_id: &ObjectId,
    ) -> Result<()> {
        self.policy
            .retry_if(
                || self.inner.create_remote_instance(object_type, ctor_args, object_id),
                Error::is_transient,
            )
            .await
            .map_err(Error::from)
    }

    async fn call_remote_method(
        &self,
        object_id: &ObjectId,
        method: &str,
        payload: &[u8],
    ) -> Result<Vec<u8>> {
        self.policy
            .retry_if(
                || self.inner.call_remote_method(object_id, method, payload),
                Error::is_transient,
            )
            .await
            .map_err(Error::from)
    }

    async fn is_reachable(&self) -> bool {
        self.inner.is_reachable().await
    }
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_io_timeout_ms() -> u64 {
    30_000
}

fn default_probe_timeout_ms() -> u64 {
    1_000
}

/// Timeouts and retry behaviour of TCP clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_io_timeout_ms")]
    pub io_timeout_ms: u64,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Retry policy wrapped around creation and calls. `None` disables retry.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            io_timeout_ms: default_io_timeout_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            retry: None,
        }
    }
}

impl ClientConfig {
    pub fn from_json(text: &str) -> std::result::Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Builds framed TCP clients, optionally behind a retry policy.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
    io_timeout: Duration,
    probe_timeout: Duration,
    retry: Option<RetryPolicy>,
}

impl TcpConnector {
    /// Validates the configuration up front, so a bad retry section fails
    /// here rather than on the first call.
    pub fn new(config: &ClientConfig) -> std::result::Result<Self, ConfigError> {
        let retry = config
            .retry
            .as_ref()
            .map(RetryPolicy::from_config)
            .transpose()?;
        Ok(Self {
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            io_timeout: Duration::from_millis(config.io_timeout_ms),
            probe_timeout: Duration::from_millis(config.probe_timeout_ms),
            retry,
        })
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(default_connect_timeout_ms()),
            io_timeout: Duration::from_millis(default_io_timeout_ms()),
            probe_timeout: Duration::from_millis(default_probe_timeout_ms()),
            retry: None,
        }
    }
}

impl Connector for TcpConnector {
    fn connect(&self, addr: &ServerAddr) -> Arc<dyn RemoteClient> {
        let transport = Arc::new(TcpTransport::new(
            addr.clone(),
            self.connect_timeout,
            self.io_timeout,
        ));
        let framed: Arc<dyn RemoteClient> =
            Arc::new(FramedClient::new(transport, self.probe_timeout));
        match self.retry {
            Some(policy) => Arc::new(RetryingClient::new(framed, policy)),
            None => framed,
        }
    }
}
