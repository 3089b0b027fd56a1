//! Scripted session for tests and offline runs.
//!
//! [`MockSession`] answers RPCs from a list of routes (first route whose
//! needle occurs in the request wins), records every request, and can be told
//! to fail a specific call.
//!
//! ```ignore
//! use netconf_yang::testing::MockSession;
//! use netconf_yang::session::Reply;
//!
//! let session = MockSession::new();
//! session.on("<get-config>", Reply::new("<data/>"));
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use quick_xml::escape::escape;

use crate::registry::MONITORING_NS;
use crate::session::{Reply, Session, TransportError};
use crate::transport::Connector;

/// In-memory [`Session`] with scripted replies
#[derive(Debug, Default)]
pub struct MockSession {
    routes: Mutex<Vec<(String, Result<Reply, TransportError>)>>,
    failures: Mutex<HashMap<usize, TransportError>>,
    requests: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl MockSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with `reply` to any request containing `needle`
    pub fn on(&self, needle: &str, reply: Reply) {
        self.lock_routes().push((needle.to_string(), Ok(reply)));
    }

    /// Fail any request containing `needle`
    pub fn fail_on(&self, needle: &str, error: TransportError) {
        self.lock_routes().push((needle.to_string(), Err(error)));
    }

    /// Fail the `n`-th request (1-based), whatever it is
    pub fn fail_call(&self, n: usize, error: TransportError) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(n, error);
    }

    /// All requests received so far
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of received requests containing `needle`
    pub fn count(&self, needle: &str) -> usize {
        self.requests().iter().filter(|r| r.contains(needle)).count()
    }

    /// Returns `true` if [`close()`](Session::close) was called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn lock_routes(&self) -> std::sync::MutexGuard<'_, Vec<(String, Result<Reply, TransportError>)>> {
        self.routes.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Session for MockSession {
    async fn execute(&self, rpc: &str) -> Result<Reply, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        let call = {
            let mut requests = self.requests.lock().unwrap_or_else(|e| e.into_inner());
            requests.push(rpc.to_string());
            requests.len()
        };
        if let Some(err) = self
            .failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&call)
        {
            return Err(err);
        }

        self.lock_routes()
            .iter()
            .find(|(needle, _)| rpc.contains(needle.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| Ok(Reply::new("<ok/>")))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// A mock device announcing `modules` (`(name, YANG source)` pairs) in its
/// schema list and serving them through `get-schema`
pub fn device_with(modules: &[(&str, &str)]) -> Arc<MockSession> {
    let session = MockSession::new();
    let entries: String = modules
        .iter()
        .map(|(name, _)| {
            format!(
                "<schema><identifier>{name}</identifier><version>1</version><format>yang</format>\
                 <namespace>urn:{name}</namespace><location>NETCONF</location></schema>"
            )
        })
        .collect();
    session.on(
        "<schemas/>",
        Reply::new(format!(
            "<data><netconf-state xmlns=\"{MONITORING_NS}\"><schemas>{entries}</schemas></netconf-state></data>"
        )),
    );
    for (name, source) in modules {
        session.on(
            &format!("<identifier>{name}</identifier>"),
            Reply::new(format!("<data xmlns=\"{MONITORING_NS}\">{}</data>", escape(*source))),
        );
    }
    Arc::new(session)
}

/// [`Connector`] handing out the same mock session, or failing
#[derive(Debug, Default)]
pub struct MockConnector {
    session: Option<Arc<MockSession>>,
    connects: AtomicUsize,
}

impl MockConnector {
    pub fn new(session: Arc<MockSession>) -> Self {
        Self {
            session: Some(session),
            connects: AtomicUsize::new(0),
        }
    }

    /// A connector whose every attempt is refused
    pub fn unreachable() -> Self {
        Self::default()
    }

    /// Number of connection attempts so far
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self) -> Result<Arc<dyn Session>, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        match &self.session {
            Some(session) => Ok(session.clone()),
            None => Err(TransportError::Io("connection refused".into())),
        }
    }
}
