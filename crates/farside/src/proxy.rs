//! # Remote Object Proxy
//!
//! The local stand-in for one object hosted by a server.
//!
//! Building a proxy resolves a server, then requests creation of the remote
//! instance on a spawned task and returns without waiting for it. The
//! pending creation is kept as a shared future; every call awaits it before
//! touching the network, so the first call blocks until the object exists
//! and later calls see the settled result.
//!
//! ## Life cycle
//!
//! `Resolving → Creating → Ready | Failed`, or `Resolving → Ready` for a
//! proxy attached to an existing object.
//!
//! ## Invariants
//!
//! - The object id never changes.
//! - At most one creation request per proxy. A failed creation is replayed
//!   to every later call and never retried.
//! - Calls to names outside the method table fail before any I/O.
//! - A server launched by a proxy is stopped exactly once, by that proxy,
//!   on `stop` or when the last handle to it is dropped. Clones and
//!   rehydrated descriptors never own a server.

use std::sync::Arc;
use std::sync::Mutex;

use futures::FutureExt;
use futures::future::BoxFuture;
use futures::future::Shared;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use tracing::info;
use tracing::warn;

use farside_wire::CallArgs;
use farside_wire::Codec;
use farside_wire::JsonCodec;
use farside_wire::RemoteFault;
use farside_wire::Value;

use crate::client;
use crate::client::Connector;
use crate::client::RemoteClient;
use crate::discovery::Discovery;
use crate::dispatch;
use crate::dispatch::MethodTable;
use crate::dispatch::RemoteMethod;
use crate::dispatch::RemoteObject;
use crate::handles::ObjectId;
use crate::handles::ServerAddr;
use crate::launcher;
use crate::launcher::LaunchConfig;
use crate::launcher::ServerLauncher;

#[derive(Debug, Clone)]
pub enum Error {
    /// The method is not part of the type's public surface.
    InvalidMethod { object_type: String, method: String },
    /// Remote creation failed. Replayed on every call.
    Creation {
        object_id: ObjectId,
        addr: ServerAddr,
        cause: client::Error,
    },
    /// The server did not answer the liveness probe.
    UnreachableServer(ServerAddr),
    /// No address, no usable discovered server, and no launcher.
    NoServer,
    Launch(launcher::Error),
    Client(client::Error),
    /// The remote object reported a failure for this call.
    Remote(RemoteFault),
    Codec(farside_wire::Error),
    Config(String),
    /// A descriptor was rehydrated as the wrong type.
    TypeMismatch { expected: String, found: String },
}

impl Error {
    /// Whether the failure came from an exhausted retry policy.
    pub fn is_retries_exhausted(&self) -> bool {
        matches!(
            self,
            Self::Client(client::Error::RetriesExhausted { .. })
                | Self::Creation { cause: client::Error::RetriesExhausted { .. }, .. }
        )
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidMethod { object_type, method } => {
                write!(f, "Method `{}` is not callable on `{}`", method, object_type)
            }
            Self::Creation { object_id, addr, cause } => write!(
                f,
                "Failed to create object {} on {}: {}",
                object_id, addr, cause
            ),
            Self::UnreachableServer(addr) => write!(f, "Server {} is unreachable", addr),
            Self::NoServer => {
                write!(f, "No server address, discovery result or launcher available")
            }
            Self::Launch(e) => write!(f, "Launch error: {}", e),
            Self::Client(e) => write!(f, "Client error: {}", e),
            Self::Remote(fault) => write!(f, "Remote call failed: {}", fault),
            Self::Codec(e) => write!(f, "Codec error: {}", e),
            Self::Config(msg) => write!(f, "Configuration error: {}", msg),
            Self::TypeMismatch { expected, found } => {
                write!(f, "Type mismatch: expected `{}`, found `{}`", expected, found)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Creation { cause, .. } => Some(cause),
            Self::Launch(e) => Some(e),
            Self::Client(e) => Some(e),
            Self::Remote(fault) => Some(fault),
            Self::Codec(e) => Some(e),
            _ => None,
        }
    }
}

impl From<client::Error> for Error {
    fn from(e: client::Error) -> Self {
        match e {
            client::Error::Remote(fault) => Self::Remote(fault),
            other => Self::Client(other),
        }
    }
}

impl From<launcher::Error> for Error {
    fn from(e: launcher::Error) -> Self {
        Self::Launch(e)
    }
}

impl From<farside_wire::Error> for Error {
    fn from(e: farside_wire::Error) -> Self {
        Self::Codec(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub(crate) fn decode_value<R: DeserializeOwned>(value: Value) -> Result<R> {
    serde_json::from_value(value)
        .map_err(|e| Error::Codec(farside_wire::Error::Decode(e.to_string())))
}

type Creation = Shared<BoxFuture<'static, Result<()>>>;

/// Where a proxy is in its life cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyState {
    /// The creation request is still in flight.
    Creating,
    /// Calls are forwarded.
    Ready,
    /// Creation failed; every call reports it.
    Failed,
}

/// Serializable, non-owning form of a proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyDescriptor {
    pub object_type: String,
    pub object_id: ObjectId,
    pub addr: ServerAddr,
}

pub(crate) struct Inner {
    methods: Arc<MethodTable>,
    object_id: ObjectId,
    addr: ServerAddr,
    client: Arc<dyn RemoteClient>,
    codec: Arc<dyn Codec>,
    creation: Option<Creation>,
    attached_only: bool,
    launcher: Mutex<Option<Box<dyn ServerLauncher>>>,
}

impl Inner {
    pub(crate) fn object_id(&self) -> &ObjectId {
        &self.object_id
    }

    async fn wait_created(&self) -> Result<()> {
        match &self.creation {
            Some(creation) => creation.clone().await,
            None => Ok(()),
        }
    }

    fn state(&self) -> ProxyState {
        let Some(creation) = &self.creation else {
            return ProxyState::Ready;
        };
        match creation.clone().now_or_never() {
            None => ProxyState::Creating,
            Some(Ok(())) => ProxyState::Ready,
            Some(Err(_)) => ProxyState::Failed,
        }
    }

    pub(crate) async fn invoke(&self, method: &str, args: CallArgs) -> Result<Value> {
        if !self.methods.contains(method) {
            return Err(Error::InvalidMethod {
                object_type: self.methods.type_name().to_string(),
                method: method.to_string(),
            });
        }

        self.wait_created().await?;

        let payload = self.codec.encode_args(&args)?;
        let reply = self
            .client
            .call_remote_method(&self.object_id, method, &payload)
            .await?;
        self.codec.decode_outcome(&reply)?.map_err(Error::Remote)
    }

    fn launcher_slot(&self) -> std::sync::MutexGuard<'_, Option<Box<dyn ServerLauncher>>> {
        match self.launcher.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn owns_server(&self) -> bool {
        self.launcher_slot().is_some()
    }

    fn stop(&self) {
        let launcher = self.launcher_slot().take();
        let Some(launcher) = launcher else {
            return;
        };
        match launcher.shutdown() {
            Ok(()) => info!(object_id = %self.object_id, addr = %self.addr, "owned server stopped"),
            Err(e) => warn!(
                object_id = %self.object_id,
                addr = %self.addr,
                error = %e,
                "failed to stop owned server"
            ),
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn_creation(
    client: Arc<dyn RemoteClient>,
    object_type: String,
    ctor_args: Vec<u8>,
    object_id: ObjectId,
    addr: ServerAddr,
) -> Creation {
    debug!(%object_id, %addr, %object_type, "requesting remote instance");

    let task_id = object_id.clone();
    let task = tokio::spawn(async move {
        client
            .create_remote_instance(&object_type, &ctor_args, &task_id)
            .await
    });

    async move {
        let cause = match task.await {
            Ok(Ok(())) => {
                info!(%object_id, %addr, "remote instance created");
                return Ok(());
            }
            Ok(Err(e)) => e,
            Err(e) => client::Error::Internal(format!("creation task failed: {}", e)),
        };
        warn!(%object_id, %addr, error = %cause, "remote instance creation failed");
        Err(Error::Creation {
            object_id,
            addr,
            cause,
        })
    }
    .boxed()
    .shared()
}

/// Handle to one remote object.
///
/// Cloning yields a non-owning proxy for the same object.
pub struct RemoteObjectProxy {
    inner: Arc<Inner>,
}

impl RemoteObjectProxy {
    /// Starts building a proxy for a new (or, with
    /// [`ProxyBuilder::attach`], an existing) instance of `T`.
    pub fn builder<T: RemoteObject>(connector: Arc<dyn Connector>) -> ProxyBuilder {
        ProxyBuilder::new(dispatch::table_of::<T>(), connector)
    }

    /// Rebuilds a proxy from its descriptor. The result is attached to the
    /// existing object: it never creates an instance or launches a server.
    pub fn rehydrate<T: RemoteObject>(
        descriptor: ProxyDescriptor,
        connector: &dyn Connector,
        codec: Arc<dyn Codec>,
    ) -> Result<Self> {
        if descriptor.object_type != T::TYPE_NAME {
            return Err(Error::TypeMismatch {
                expected: T::TYPE_NAME.to_string(),
                found: descriptor.object_type,
            });
        }
        let client = connector.connect(&descriptor.addr);
        Ok(Self {
            inner: Arc::new(Inner {
                methods: dispatch::table_of::<T>(),
                object_id: descriptor.object_id,
                addr: descriptor.addr,
                client,
                codec,
                creation: None,
                attached_only: true,
                launcher: Mutex::new(None),
            }),
        })
    }

    pub fn object_id(&self) -> &ObjectId {
        &self.inner.object_id
    }

    pub fn object_type(&self) -> &str {
        self.inner.methods.type_name()
    }

    pub fn address(&self) -> &ServerAddr {
        &self.inner.addr
    }

    pub fn allowed_methods(&self) -> &MethodTable {
        &self.inner.methods
    }

    /// Whether this proxy launched the server it talks to and has not
    /// stopped it yet.
    pub fn owns_server(&self) -> bool {
        self.inner.owns_server()
    }

    pub fn is_attached_only(&self) -> bool {
        self.inner.attached_only
    }

    pub fn state(&self) -> ProxyState {
        self.inner.state()
    }

    /// Waits for the remote instance to exist.
    pub async fn wait_ready(&self) -> Result<()> {
        self.inner.wait_created().await
    }

    /// Calls `method` on the remote object.
    pub async fn invoke(&self, method: &str, args: CallArgs) -> Result<Value> {
        self.inner.invoke(method, args).await
    }

    /// Calls `method` and decodes the result into `R`.
    pub async fn invoke_as<R: DeserializeOwned>(&self, method: &str, args: CallArgs) -> Result<R> {
        let value = self.invoke(method, args).await?;
        decode_value(value)
    }

    /// A callable bound to `method`, validated now.
    pub fn method(&self, method: &str) -> Result<RemoteMethod> {
        if !self.inner.methods.contains(method) {
            return Err(Error::InvalidMethod {
                object_type: self.object_type().to_string(),
                method: method.to_string(),
            });
        }
        Ok(RemoteMethod::new(Arc::clone(&self.inner), method.to_string()))
    }

    /// Stops the server this proxy launched, if any. Idempotent and never
    /// fails; shutdown errors are logged.
    pub fn stop(&self) {
        self.inner.stop();
    }

    pub fn descriptor(&self) -> ProxyDescriptor {
        ProxyDescriptor {
            object_type: self.object_type().to_string(),
            object_id: self.inner.object_id.clone(),
            addr: self.inner.addr.clone(),
        }
    }
}

impl Clone for RemoteObjectProxy {
    /// A proxy for the same object that does not own the server. It still
    /// waits on the original's pending creation.
    fn clone(&self) -> Self {
        Self {
            inner: Arc::new(Inner {
                methods: Arc::clone(&self.inner.methods),
                object_id: self.inner.object_id.clone(),
                addr: self.inner.addr.clone(),
                client: Arc::clone(&self.inner.client),
                codec: Arc::clone(&self.inner.codec),
                creation: self.inner.creation.clone(),
                attached_only: true,
                launcher: Mutex::new(None),
            }),
        }
    }
}

impl std::fmt::Debug for RemoteObjectProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteObjectProxy")
            .field("object_type", &self.object_type())
            .field("object_id", &self.inner.object_id)
            .field("addr", &self.inner.addr)
            .field("attached_only", &self.inner.attached_only)
            .field("owns_server", &self.inner.owns_server())
            .field("state", &self.state())
            .finish()
    }
}

/// Collects the inputs of a proxy and resolves its server.
pub struct ProxyBuilder {
    methods: Arc<MethodTable>,
    connector: Arc<dyn Connector>,
    codec: Arc<dyn Codec>,
    ctor_args: CallArgs,
    addr: Option<ServerAddr>,
    object_id: Option<ObjectId>,
    attached_only: bool,
    discovery: Option<Arc<dyn Discovery>>,
    launcher: Option<Box<dyn ServerLauncher>>,
    launch_config: LaunchConfig,
}

impl ProxyBuilder {
    fn new(methods: Arc<MethodTable>, connector: Arc<dyn Connector>) -> Self {
        Self {
            methods,
            connector,
            codec: Arc::new(JsonCodec),
            ctor_args: CallArgs::new(),
            addr: None,
            object_id: None,
            attached_only: false,
            discovery: None,
            launcher: None,
            launch_config: LaunchConfig::default(),
        }
    }

    /// Constructor arguments of the remote instance.
    pub fn args(mut self, args: CallArgs) -> Self {
        self.ctor_args = args;
        self
    }

    /// Use this server instead of discovering or launching one.
    pub fn address(mut self, addr: ServerAddr) -> Self {
        self.addr = Some(addr);
        self
    }

    pub fn object_id(mut self, object_id: ObjectId) -> Self {
        self.object_id = Some(object_id);
        self
    }

    /// Skip creation; the object already runs remotely. Requires an address
    /// and an object id.
    pub fn attached_only(mut self, attached_only: bool) -> Self {
        self.attached_only = attached_only;
        self
    }

    /// Shorthand for attaching to `object_id` on `addr`.
    pub fn attach(self, addr: ServerAddr, object_id: ObjectId) -> Self {
        self.address(addr).object_id(object_id).attached_only(true)
    }

    pub fn discovery(mut self, discovery: Arc<dyn Discovery>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    /// Launcher used when no server is given or discovered. The proxy takes
    /// ownership and stops the server it launches.
    pub fn launcher(mut self, launcher: Box<dyn ServerLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    pub fn launch_config(mut self, config: LaunchConfig) -> Self {
        self.launch_config = config;
        self
    }

    pub fn codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    /// Resolves the server and, unless attaching, starts remote creation.
    /// Returns before creation completes.
    pub async fn build(self) -> Result<RemoteObjectProxy> {
        if self.attached_only && self.addr.is_none() {
            return Err(Error::Config(
                "attaching to an existing object requires an explicit address".into(),
            ));
        }
        if self.attached_only && self.object_id.is_none() {
            return Err(Error::Config("attaching requires an object id".into()));
        }

        let ProxyBuilder {
            methods,
            connector,
            codec,
            ctor_args,
            addr,
            object_id,
            attached_only,
            discovery,
            launcher,
            launch_config,
        } = self;

        // encoded before resolution so a bad argument never leaves a server behind
        let ctor_bytes = if attached_only {
            Vec::new()
        } else {
            codec.encode_args(&ctor_args)?
        };
        let object_id = object_id.unwrap_or_else(ObjectId::generate);

        let resolved = resolve(
            methods.type_name(),
            connector.as_ref(),
            addr,
            attached_only,
            discovery,
            launcher,
            launch_config,
        )
        .await?;

        let creation = if attached_only {
            None
        } else {
            Some(spawn_creation(
                Arc::clone(&resolved.client),
                methods.type_name().to_string(),
                ctor_bytes,
                object_id.clone(),
                resolved.addr.clone(),
            ))
        };

        Ok(RemoteObjectProxy {
            inner: Arc::new(Inner {
                methods,
                object_id,
                addr: resolved.addr,
                client: resolved.client,
                codec,
                creation,
                attached_only,
                launcher: Mutex::new(resolved.launcher),
            }),
        })
    }
}

struct Resolved {
    addr: ServerAddr,
    client: Arc<dyn RemoteClient>,
    launcher: Option<Box<dyn ServerLauncher>>,
}

async fn resolve(
    object_type: &str,
    connector: &dyn Connector,
    addr: Option<ServerAddr>,
    attached_only: bool,
    discovery: Option<Arc<dyn Discovery>>,
    launcher: Option<Box<dyn ServerLauncher>>,
    launch_config: LaunchConfig,
) -> Result<Resolved> {
    // 1. explicit address
    if let Some(addr) = addr {
        let client = connector.connect(&addr);
        if attached_only && !client.is_reachable().await {
            return Err(Error::UnreachableServer(addr));
        }
        debug!(%addr, attached_only, "using explicit server");
        return Ok(Resolved { addr, client, launcher: None });
    }

    // 2. discovery
    if let Some(discovery) = discovery {
        if let Some(addr) = discovery.allocate().await {
            let client = connector.connect(&addr);
            if client.is_reachable().await {
                info!(%addr, "using discovered server");
                return Ok(Resolved { addr, client, launcher: None });
            }
            warn!(%addr, "discovered server is unreachable");
        }
    }

    // 3. launch our own
    let Some(launcher) = launcher else {
        return Err(Error::NoServer);
    };
    let config = launch_config.with_object_type(object_type);
    let port = launcher.launch(&config).await?;
    let addr = ServerAddr::new(config.host, port);
    info!(%addr, "launched server");
    Ok(Resolved {
        client: connector.connect(&addr),
        addr,
        launcher: Some(launcher),
    })
}
