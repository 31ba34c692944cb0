//! # Discovery
//!
//! Optional source of already running servers. A proxy without an explicit
//! address asks discovery first and only launches its own server when
//! nothing usable comes back.

use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use crate::handles::ServerAddr;

/// Hands out a server that can host a new object.
#[async_trait::async_trait]
pub trait Discovery: Send + Sync + 'static {
    /// A candidate server, or `None` if no server is free.
    ///
    /// The candidate is not guaranteed to be alive; callers probe it.
    async fn allocate(&self) -> Option<ServerAddr>;
}

/// Round-robin over a fixed list of servers.
#[derive(Debug, Default)]
pub struct StaticPool {
    addrs: Vec<ServerAddr>,
    next: AtomicUsize,
}

impl StaticPool {
    pub fn new(addrs: Vec<ServerAddr>) -> Self {
        Self {
            addrs,
            next: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }
}

#[async_trait::async_trait]
impl Discovery for StaticPool {
    async fn allocate(&self) -> Option<ServerAddr> {
        if self.addrs.is_empty() {
            return None;
        }
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.addrs.len();
        Some(self.addrs[idx].clone())
    }
}
