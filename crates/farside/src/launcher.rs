//! # Server Launcher
//!
//! Starts a server process for a proxy that found no server to use, and
//! stops it again when the owning proxy goes away.
//!
//! ## Invariants
//!
//! - `shutdown` is idempotent: stopping a launcher that never launched, or
//!   one that was already stopped, is `Ok(())`.
//! - `launch` only returns once the server accepts connections.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::process::Child;
use tokio::process::Command;
use tracing::debug;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The server executable could not be started.
    Spawn(String),
    /// No free port could be reserved on the host.
    NoFreePort(String),
    /// The server exited before it started listening.
    Exited(String),
    /// The server did not accept connections in time.
    StartupTimeout { port: u16, waited_ms: u64 },
    /// This launcher already runs a server.
    AlreadyRunning,
    /// The server could not be stopped.
    Shutdown(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spawn(msg) => write!(f, "Failed to spawn server: {}", msg),
            Self::NoFreePort(msg) => write!(f, "No free port available: {}", msg),
            Self::Exited(status) => write!(f, "Server exited during startup: {}", status),
            Self::StartupTimeout { port, waited_ms } => {
                write!(f, "Server on port {} not ready after {} ms", port, waited_ms)
            }
            Self::AlreadyRunning => write!(f, "Launcher already runs a server"),
            Self::Shutdown(msg) => write!(f, "Failed to stop server: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

fn default_host() -> String {
    "localhost".to_string()
}

fn default_max_pool_size() -> usize {
    8192
}

fn default_max_timeout_seconds() -> u64 {
    7200
}

fn default_local_mode() -> bool {
    true
}

fn default_startup_timeout_ms() -> u64 {
    10_000
}

/// Settings handed to a launched server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchConfig {
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind. `None` picks a free one.
    #[serde(default)]
    pub port: Option<u16>,
    /// Number of call results the server keeps around.
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: usize,
    /// How long the server keeps a call result.
    #[serde(default = "default_max_timeout_seconds")]
    pub max_timeout_seconds: u64,
    /// Listen on the loopback interface only.
    #[serde(default = "default_local_mode")]
    pub local_mode: bool,
    #[serde(default = "default_startup_timeout_ms")]
    pub startup_timeout_ms: u64,
    /// Object types the server must be able to instantiate.
    #[serde(default)]
    pub object_types: Vec<String>,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: None,
            max_pool_size: default_max_pool_size(),
            max_timeout_seconds: default_max_timeout_seconds(),
            local_mode: default_local_mode(),
            startup_timeout_ms: default_startup_timeout_ms(),
            object_types: Vec::new(),
        }
    }
}

impl LaunchConfig {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    /// Adds an object type unless it is already listed.
    pub fn with_object_type(mut self, object_type: &str) -> Self {
        if !self.object_types.iter().any(|t| t == object_type) {
            self.object_types.push(object_type.to_string());
        }
        self
    }

    /// Command line flags describing this configuration.
    pub fn to_args(&self, port: u16) -> Vec<String> {
        let mut args = vec![
            "--host".to_string(),
            self.host.clone(),
            "--port".to_string(),
            port.to_string(),
            "--max-pool-size".to_string(),
            self.max_pool_size.to_string(),
            "--max-timeout-seconds".to_string(),
            self.max_timeout_seconds.to_string(),
        ];
        if self.local_mode {
            args.push("--local-mode".to_string());
        }
        for object_type in &self.object_types {
            args.push("--object-type".to_string());
            args.push(object_type.clone());
        }
        args
    }
}

/// Starts and stops a server on behalf of one proxy.
#[async_trait::async_trait]
pub trait ServerLauncher: Send + Sync + 'static {
    /// Starts the server and returns the port it listens on.
    async fn launch(&self, config: &LaunchConfig) -> Result<u16>;

    /// Stops the server. Synchronous so it can run from `Drop`.
    fn shutdown(&self) -> Result<()>;
}

/// Reserves a free port by binding port 0 and releasing it again.
pub fn free_port(host: &str) -> Result<u16> {
    let listener = std::net::TcpListener::bind((host, 0))
        .map_err(|e| Error::NoFreePort(e.to_string()))?;
    let addr = listener
        .local_addr()
        .map_err(|e| Error::NoFreePort(e.to_string()))?;
    Ok(addr.port())
}

const READY_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Launches a server executable as a child process.
///
/// The executable receives the flags produced by [`LaunchConfig::to_args`]
/// after any fixed arguments given here.
pub struct ProcessLauncher {
    program: PathBuf,
    args: Vec<String>,
    child: Mutex<Option<Child>>,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            child: Mutex::new(None),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Whether a launched child is currently held.
    pub fn is_running(&self) -> bool {
        self.slot().is_some()
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<Child>> {
        match self.child.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    async fn wait_ready(child: &mut Child, host: &str, port: u16, timeout: Duration) -> Result<()> {
        let started = tokio::time::Instant::now();
        loop {
            if let Some(status) = child.try_wait().map_err(|e| Error::Spawn(e.to_string()))? {
                return Err(Error::Exited(status.to_string()));
            }
            if TcpStream::connect((host, port)).await.is_ok() {
                return Ok(());
            }
            if started.elapsed() >= timeout {
                return Err(Error::StartupTimeout {
                    port,
                    waited_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }
}

#[async_trait::async_trait]
impl ServerLauncher for ProcessLauncher {
    async fn launch(&self, config: &LaunchConfig) -> Result<u16> {
        if self.is_running() {
            return Err(Error::AlreadyRunning);
        }

        let port = match config.port {
            Some(port) => port,
            None => free_port(&config.host)?,
        };

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .args(config.to_args(port))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Spawn(format!("{}: {}", self.program.display(), e)))?;

        debug!(program = %self.program.display(), port, "server process spawned");

        let timeout = config.startup_timeout();
        if let Err(e) = Self::wait_ready(&mut child, &config.host, port, timeout).await {
            if let Err(kill) = child.start_kill() {
                debug!(
                    program = %self.program.display(),
                    error = %kill,
                    "failed to kill unready server"
                );
            }
            return Err(e);
        }

        info!(program = %self.program.display(), host = %config.host, port, "server launched");
        *self.slot() = Some(child);
        Ok(port)
    }

    fn shutdown(&self) -> Result<()> {
        let Some(mut child) = self.slot().take() else {
            return Ok(());
        };
        child.start_kill().map_err(|e| Error::Shutdown(e.to_string()))?;
        info!(program = %self.program.display(), "server stopped");
        Ok(())
    }
}
