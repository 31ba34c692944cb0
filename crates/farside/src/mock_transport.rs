//! Fake collaborators for the test suite.
//!
//! `FakeBackend` plays a server hosting counters: `increment(by)` adds to the
//! counter and returns the new value, `get()` returns it, `fail()` answers
//! with a fault. Every operation is counted so tests can assert on network
//! traffic.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use dashmap::DashMap;

use farside_wire::Codec;
use farside_wire::JsonCodec;
use farside_wire::RemoteFault;
use farside_wire::Request;
use farside_wire::Response;

use crate::client;
use crate::client::Connector;
use crate::client::RemoteClient;
use crate::handles::ObjectId;
use crate::handles::ServerAddr;
use crate::launcher;
use crate::launcher::LaunchConfig;
use crate::launcher::ServerLauncher;
use crate::transport;
use crate::transport::Transport;

#[derive(Default)]
pub struct FakeBackend {
    pub creates: AtomicUsize,
    pub calls: AtomicUsize,
    pub probes: AtomicUsize,
    pub create_delay: Duration,
    pub fail_creation: bool,
    down: Mutex<HashSet<ServerAddr>>,
    counters: DashMap<ObjectId, i64>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn slow(create_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            create_delay,
            ..Self::default()
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail_creation: true,
            ..Self::default()
        })
    }

    pub fn mark_down(&self, addr: &ServerAddr) {
        self.down.lock().unwrap().insert(addr.clone());
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn counter(&self, object_id: &ObjectId) -> Option<i64> {
        self.counters.get(object_id).map(|entry| *entry.value())
    }

    pub fn connector(self: &Arc<Self>) -> Arc<FakeConnector> {
        Arc::new(FakeConnector {
            backend: Arc::clone(self),
            connected: Mutex::new(Vec::new()),
        })
    }
}

pub struct FakeConnector {
    backend: Arc<FakeBackend>,
    pub connected: Mutex<Vec<ServerAddr>>,
}

impl Connector for FakeConnector {
    fn connect(&self, addr: &ServerAddr) -> Arc<dyn RemoteClient> {
        self.connected.lock().unwrap().push(addr.clone());
        Arc::new(FakeConnection {
            addr: addr.clone(),
            backend: Arc::clone(&self.backend),
        })
    }
}

struct FakeConnection {
    addr: ServerAddr,
    backend: Arc<FakeBackend>,
}

#[async_trait::async_trait]
impl RemoteClient for FakeConnection {
    async fn create_remote_instance(
        &self,
        object_type: &str,
        ctor_args: &[u8],
        object_id: &ObjectId,
    ) -> client::Result<()> {
        let backend = &self.backend;
        backend.creates.fetch_add(1, Ordering::SeqCst);
        if !backend.create_delay.is_zero() {
            tokio::time::sleep(backend.create_delay).await;
        }
        if backend.fail_creation {
            return Err(client::Error::Remote(RemoteFault::new(
                "CreationError",
                format!("cannot construct {}", object_type),
            )));
        }
        let args = JsonCodec.decode_args(ctor_args)?;
        let start = args.kwargs.get("start").and_then(|v| v.as_i64()).unwrap_or(0);
        backend.counters.insert(object_id.clone(), start);
        Ok(())
    }

    async fn call_remote_method(
        &self,
        object_id: &ObjectId,
        method: &str,
        payload: &[u8],
    ) -> client::Result<Vec<u8>> {
        let backend = &self.backend;
        backend.calls.fetch_add(1, Ordering::SeqCst);

        let Some(mut counter) = backend.counters.get_mut(object_id) else {
            return Err(client::Error::Remote(RemoteFault::new(
                "NotFound",
                format!("no object {}", object_id),
            )));
        };
        let args = JsonCodec.decode_args(payload)?;
        let outcome = match method {
            "increment" => {
                *counter += args.args.first().and_then(|v| v.as_i64()).unwrap_or(1);
                Ok((*counter).into())
            }
            "get" => Ok((*counter).into()),
            "fail" => Err(RemoteFault::new("ValueError", "asked to fail")),
            other => Err(RemoteFault::new("AttributeError", other)),
        };
        Ok(JsonCodec.encode_outcome(&outcome)?)
    }

    async fn is_reachable(&self) -> bool {
        self.backend.probes.fetch_add(1, Ordering::SeqCst);
        !self.backend.down.lock().unwrap().contains(&self.addr)
    }
}

/// Shared record of what a `FakeLauncher` was asked to do.
#[derive(Clone, Default)]
pub struct LaunchLog {
    pub launches: Arc<AtomicUsize>,
    pub shutdowns: Arc<AtomicUsize>,
    pub configs: Arc<Mutex<Vec<LaunchConfig>>>,
}

impl LaunchLog {
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

pub struct FakeLauncher {
    pub log: LaunchLog,
    pub port: u16,
    pub fail_shutdown: bool,
}

impl FakeLauncher {
    pub fn new(log: &LaunchLog, port: u16) -> Box<Self> {
        Box::new(Self {
            log: log.clone(),
            port,
            fail_shutdown: false,
        })
    }
}

#[async_trait::async_trait]
impl ServerLauncher for FakeLauncher {
    async fn launch(&self, config: &LaunchConfig) -> launcher::Result<u16> {
        self.log.launches.fetch_add(1, Ordering::SeqCst);
        self.log.configs.lock().unwrap().push(config.clone());
        Ok(config.port.unwrap_or(self.port))
    }

    fn shutdown(&self) -> launcher::Result<()> {
        self.log.shutdowns.fetch_add(1, Ordering::SeqCst);
        if self.fail_shutdown {
            return Err(launcher::Error::Shutdown("process refused to die".into()));
        }
        Ok(())
    }
}

/// Transport that fails a fixed number of times before answering with a
/// fixed response.
pub struct FlakyTransport {
    pub failures_left: AtomicUsize,
    pub attempts: AtomicUsize,
    pub response: Response,
}

impl FlakyTransport {
    pub fn new(failures: usize, response: Response) -> Arc<Self> {
        Arc::new(Self {
            failures_left: AtomicUsize::new(failures),
            attempts: AtomicUsize::new(0),
            response,
        })
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Transport for FlakyTransport {
    async fn call(&self, payload: &[u8]) -> transport::Result<Vec<u8>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Request::from_bytes(payload)
            .map_err(|e| transport::Error::Io(format!("bad request: {}", e)))?;

        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(transport::Error::ConnectionLost("reset by peer".into()));
        }
        self.response
            .to_bytes()
            .map_err(|e| transport::Error::Io(format!("bad response: {}", e)))
    }
}

/// Transport that answers with raw bytes.
pub struct RawTransport(pub Vec<u8>);

#[async_trait::async_trait]
impl Transport for RawTransport {
    async fn call(&self, _payload: &[u8]) -> transport::Result<Vec<u8>> {
        Ok(self.0.clone())
    }
}
