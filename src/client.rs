//! NETCONF client
//!
//! [`NetconfClient`] ties the pieces together for one device: login runs
//! schema discovery and starts the keep-alive task, operations are encoded
//! against the discovered registry, and logout tears everything down.
//!
//! # Example
//! ```ignore
//! let mut client = NetconfClient::new(ClientOptions::default());
//! client.login(session).await?;
//! let enabled = client.get("/interfaces/interface[name='eth0']/enabled").await?;
//! println!("{}", enabled);
//! client.logout().await;
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::datastore::Datastore;
use crate::decoder::{DecodeMode, Decoded, decode, rpc_error};
use crate::error::{NetconfError, Result};
use crate::keeper::{DEFAULT_KEEPALIVE_INTERVAL, SessionKeeper};
use crate::registry::{DiscoveryOptions, SchemaRegistry};
use crate::request_builder::{FilterKind, Operation, RequestBuilder};
use crate::session::{Session, SharedSession};
use crate::xml::XmlDocument;

/// Client behaviour
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Datastore used by `get-config` and `set`
    pub datastore: Datastore,
    pub keepalive_interval: Duration,
    pub get_config_filter: FilterKind,
    pub discovery: DiscoveryOptions,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            datastore: Datastore::Running,
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            get_config_filter: FilterKind::Subtree,
            discovery: DiscoveryOptions::default(),
        }
    }
}

/// Result of one operation
#[derive(Debug, Clone)]
pub enum Outcome {
    /// A read returned (possibly no) data
    Data(Decoded),
    /// An edit was accepted
    Ok,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Data(decoded) => fmt::Display::fmt(decoded, f),
            Outcome::Ok => f.write_str("ok"),
        }
    }
}

/// Everything that lives exactly as long as a login
#[derive(Debug)]
struct ActiveSession {
    session: SharedSession,
    registry: SchemaRegistry,
    keeper: SessionKeeper,
}

/// A NETCONF client for one device
#[derive(Debug)]
pub struct NetconfClient {
    options: ClientOptions,
    active: Option<ActiveSession>,
}

impl NetconfClient {
    pub fn new(options: ClientOptions) -> Self {
        Self {
            options,
            active: None,
        }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn is_logged_in(&self) -> bool {
        self.active.is_some()
    }

    pub fn datastore(&self) -> Datastore {
        self.options.datastore
    }

    pub fn set_datastore(&mut self, datastore: Datastore) {
        self.options.datastore = datastore;
    }

    /// Schema registry of the current session
    pub fn registry(&self) -> Option<&SchemaRegistry> {
        self.active.as_ref().map(|a| &a.registry)
    }

    /// Whether the keep-alive task of the current session is still running
    pub fn keepalive_running(&self) -> bool {
        self.active.as_ref().is_some_and(|a| a.keeper.is_running())
    }

    /// Take over an established session: discover its schemas and start the
    /// keep-alive task. On failure the session is closed and the client stays
    /// logged out.
    pub async fn login(&mut self, session: Arc<dyn Session>) -> Result<()> {
        if self.active.is_some() {
            return Err(NetconfError::AlreadyLoggedIn);
        }

        let session = SharedSession::new(session);
        let registry = match SchemaRegistry::discover(&session, &self.options.discovery).await {
            Ok(registry) => registry,
            Err(e) => {
                session.close().await;
                return Err(e);
            }
        };

        let keeper = SessionKeeper::start(session.clone(), self.options.keepalive_interval);
        info!(modules = registry.len(), "logged in");
        self.active = Some(ActiveSession {
            session,
            registry,
            keeper,
        });
        Ok(())
    }

    /// Stop the keep-alive task, close the session and drop the registry.
    /// Does nothing when not logged in.
    pub async fn logout(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.keeper.stop().await;
            active.session.close().await;
            info!("logged out");
        }
    }

    /// Encode, send and decode one operation
    pub async fn execute(&self, op: &Operation) -> Result<Outcome> {
        let active = self.active.as_ref().ok_or(NetconfError::NotLoggedIn)?;
        let rpc = RequestBuilder::new(&active.registry)
            .with_get_config_filter(self.options.get_config_filter)
            .build(op)?;

        debug!(operation = op.name(), path = %op.path(), "sending rpc");
        let reply = active.session.execute(&rpc).await?;

        let mode = match op {
            Operation::Get { .. } => DecodeMode::Get,
            Operation::GetConfig { .. } => DecodeMode::GetConfig,
            Operation::EditConfig { .. } => {
                check_ack(&reply.data)?;
                return Ok(Outcome::Ok);
            }
        };
        decode(&reply.data, op.path(), &active.registry, mode).map(Outcome::Data)
    }

    /// `get` at `path`
    pub async fn get(&self, path: &str) -> Result<Decoded> {
        let op = Operation::from_parts("get", path, None, self.options.datastore)?;
        self.read(&op).await
    }

    /// `get-config` at `path` from the current datastore
    pub async fn get_config(&self, path: &str) -> Result<Decoded> {
        let op = Operation::from_parts("get-config", path, None, self.options.datastore)?;
        self.read(&op).await
    }

    /// `edit-config` of the leaf at `path` in the current datastore
    pub async fn set(&self, path: &str, value: &str) -> Result<()> {
        let op = Operation::from_parts("set", path, Some(value), self.options.datastore)?;
        self.execute(&op).await.map(|_| ())
    }

    async fn read(&self, op: &Operation) -> Result<Decoded> {
        match self.execute(op).await? {
            Outcome::Data(decoded) => Ok(decoded),
            Outcome::Ok => Ok(Decoded::NoData),
        }
    }
}

/// An edit reply is accepted unless it carries an `<rpc-error>`
fn check_ack(reply: &str) -> Result<()> {
    let doc = XmlDocument::parse(reply).map_err(NetconfError::ReplyParse)?;
    match rpc_error(&doc) {
        Some(message) => Err(NetconfError::RpcError(message)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::fixtures::*;
    use crate::session::{Reply, TransportError};
    use crate::testing::{MockSession, device_with};

    const IF_NS: &str = "urn:ietf:params:xml:ns:yang:ietf-interfaces";

    fn device() -> Arc<MockSession> {
        device_with(&[("ietf-interfaces", IETF_INTERFACES), ("ietf-ip", IETF_IP)])
    }

    async fn logged_in(mock: &Arc<MockSession>) -> NetconfClient {
        let mut client = NetconfClient::new(ClientOptions::default());
        client.login(mock.clone()).await.unwrap();
        client
    }

    #[tokio::test]
    async fn test_operations_require_login() {
        let client = NetconfClient::new(ClientOptions::default());
        let err = client.get("/interfaces").await.unwrap_err();
        assert!(matches!(err, NetconfError::NotLoggedIn));
        assert_eq!(err.to_string(), "Please login first");
    }

    #[tokio::test]
    async fn test_login_twice_is_rejected() {
        let mock = device();
        let mut client = logged_in(&mock).await;
        assert!(client.keepalive_running());

        let err = client.login(device()).await.unwrap_err();
        assert!(matches!(err, NetconfError::AlreadyLoggedIn));
        client.logout().await;
    }

    #[tokio::test]
    async fn test_failed_discovery_closes_session() {
        let mock = Arc::new(MockSession::new());
        mock.fail_on("<schemas/>", TransportError::Io("refused".into()));
        let mut client = NetconfClient::new(ClientOptions::default());

        assert!(client.login(mock.clone()).await.is_err());
        assert!(!client.is_logged_in());
        assert!(mock.is_closed());
    }

    #[tokio::test]
    async fn test_get_decodes_leaf() {
        let mock = device();
        mock.on(
            "<get><filter",
            Reply::new(format!(
                "<data><interfaces xmlns=\"{IF_NS}\"><interface><name>eth0</name><enabled>true</enabled></interface></interfaces></data>"
            )),
        );
        let mut client = logged_in(&mock).await;

        let decoded = client
            .get("/interfaces/interface[name='eth0']/enabled")
            .await
            .unwrap();
        assert_eq!(decoded.to_string(), "enabled = true");
        client.logout().await;
    }

    #[tokio::test]
    async fn test_set_uses_current_datastore() {
        let mock = device();
        let mut client = logged_in(&mock).await;
        client.set_datastore(Datastore::Candidate);

        client
            .set("/interfaces/interface[name='eth0']/mtu", "9000")
            .await
            .unwrap();
        assert_eq!(mock.count("<edit-config><target><candidate/></target>"), 1);
        client.logout().await;
    }

    #[tokio::test]
    async fn test_set_surfaces_rpc_error() {
        let mock = device();
        mock.on(
            "<edit-config>",
            Reply::new("<rpc-error><error-tag>in-use</error-tag><error-message>locked</error-message></rpc-error>"),
        );
        let mut client = logged_in(&mock).await;

        let err = client
            .set("/interfaces/interface[name='eth0']/enabled", "false")
            .await
            .unwrap_err();
        assert!(matches!(err, NetconfError::RpcError(m) if m == "locked"));
        client.logout().await;
    }

    #[tokio::test]
    async fn test_encoding_error_sends_nothing() {
        let mock = device();
        let mut client = logged_in(&mock).await;
        let before = mock.requests().len();

        let err = client.set("/interfaces/interface/enabled", "true").await.unwrap_err();
        assert!(matches!(err, NetconfError::PathEncoding(_)));
        assert_eq!(mock.requests().len(), before);
        client.logout().await;
    }

    #[tokio::test]
    async fn test_transport_error_keeps_session() {
        let mock = device();
        mock.fail_on("<get-config>", TransportError::Io("broken pipe".into()));
        let mut client = logged_in(&mock).await;

        let err = client.get_config("/interfaces").await.unwrap_err();
        assert!(matches!(err, NetconfError::Transport(_)));
        assert!(client.is_logged_in());
        client.logout().await;
    }

    #[tokio::test]
    async fn test_logout_is_idempotent() {
        let mock = device();
        let mut client = logged_in(&mock).await;

        client.logout().await;
        client.logout().await;
        assert!(!client.is_logged_in());
        assert!(client.registry().is_none());
        assert!(mock.is_closed());
    }
}
