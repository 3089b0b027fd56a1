//! Session boundary
//!
//! The transport is an external collaborator: anything that can execute a raw
//! NETCONF RPC body and return the raw reply body. [`SharedSession`] adds the
//! one-RPC-in-flight discipline on top, so the foreground command path and the
//! keep-alive task can share a connection.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::trace;

/// Transport-level failure
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The connection is gone; no further RPC can succeed
    #[error("connection closed")]
    Closed,

    /// Reading from or writing to the connection failed
    #[error("IO error: {0}")]
    Io(String),

    /// The peer sent something that is not a framed NETCONF message
    #[error("framing error: {0}")]
    Framing(String),

    /// Capability exchange failed
    #[error("hello exchange failed: {0}")]
    Hello(String),

    /// The SSH layer failed before or under the NETCONF channel
    #[error("SSH error: {0}")]
    Ssh(String),

    /// The device refused the credentials
    #[error("authentication failed: {0}")]
    Auth(String),
}

impl TransportError {
    /// Whether the link is known to be dead
    pub fn is_dead(&self) -> bool {
        matches!(self, TransportError::Closed)
    }
}

/// Raw reply to one RPC: the XML body inside `<rpc-reply>`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Reply {
    pub data: String,
}

impl Reply {
    pub fn new(data: impl Into<String>) -> Self {
        Self { data: data.into() }
    }
}

/// A live, authenticated NETCONF connection
#[async_trait]
pub trait Session: Send + Sync {
    /// Execute one RPC body (the content of `<rpc>`) and return the reply body
    async fn execute(&self, rpc: &str) -> Result<Reply, TransportError>;

    /// Close the connection. Must be idempotent.
    async fn close(&self);
}

/// A session handle that serializes RPC execution.
///
/// Clones share both the underlying session and the lock: at most one RPC is
/// executing through any clone at a time, later callers wait.
#[derive(Clone)]
pub struct SharedSession {
    inner: Arc<dyn Session>,
    lock: Arc<Mutex<()>>,
}

impl SharedSession {
    pub fn new(session: Arc<dyn Session>) -> Self {
        Self {
            inner: session,
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn execute(&self, rpc: &str) -> Result<Reply, TransportError> {
        let _guard = self.lock.lock().await;
        trace!(rpc, "executing rpc");
        let reply = self.inner.execute(rpc).await;
        if let Ok(reply) = &reply {
            trace!(reply = %reply.data, "rpc reply");
        }
        reply
    }

    pub async fn close(&self) {
        let _guard = self.lock.lock().await;
        self.inner.close().await;
    }
}

impl std::fmt::Debug for SharedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSession").finish_non_exhaustive()
    }
}
