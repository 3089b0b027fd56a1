//! NETCONF 1.0 transport
//!
//! [`StreamSession`] speaks end-of-message framed NETCONF over any async byte
//! stream: it exchanges `<hello>` on open, wraps each RPC body in `<rpc>` with
//! a fresh `message-id`, and hands back the content of `<rpc-reply>`.
//! [`SshConnector`] opens an SSH connection with `russh`, authenticates with a
//! password or a private key, and runs the session over the `netconf`
//! subsystem channel.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use russh::client;
use russh::keys::PrivateKeyWithHashAlg;
use secrecy::{ExposeSecret, SecretBox};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use crate::codec::NetconfCodec;
use crate::session::{Reply, Session, TransportError};
use crate::xml::XmlDocument;

pub const BASE_NS: &str = "urn:ietf:params:xml:ns:netconf:base:1.0";
pub const BASE_1_0: &str = "urn:ietf:params:netconf:base:1.0";

/// Opens sessions to a device
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn Session>, TransportError>;
}

async fn receive<T>(framed: &mut Framed<T, NetconfCodec>) -> Result<String, TransportError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    match framed.next().await {
        Some(message) => Ok(message?),
        None => Err(TransportError::Closed),
    }
}

/// A NETCONF session over an async byte stream
pub struct StreamSession<T> {
    framed: Mutex<Option<Framed<T, NetconfCodec>>>,
    ssh: Mutex<Option<client::Handle<SshHandler>>>,
    next_id: AtomicU64,
    session_id: Option<String>,
}

impl<T> StreamSession<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Exchange hellos over `stream`
    pub async fn open(stream: T) -> Result<Self, TransportError> {
        let mut framed = Framed::new(stream, NetconfCodec::new());

        let hello = receive(&mut framed).await?;
        let session_id = check_server_hello(&hello)?;
        framed
            .send(format!(
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?><hello xmlns=\"{BASE_NS}\">\
                 <capabilities><capability>{BASE_1_0}</capability></capabilities></hello>"
            ))
            .await?;
        debug!(session_id = session_id.as_deref().unwrap_or("-"), "hello exchanged");

        Ok(Self {
            framed: Mutex::new(Some(framed)),
            ssh: Mutex::new(None),
            next_id: AtomicU64::new(1),
            session_id,
        })
    }

    /// Session id announced by the server, if any
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    fn with_ssh(mut self, handle: client::Handle<SshHandler>) -> Self {
        self.ssh = Mutex::new(Some(handle));
        self
    }
}

fn check_server_hello(message: &str) -> Result<Option<String>, TransportError> {
    let doc = XmlDocument::parse(message).map_err(TransportError::Hello)?;
    let hello = doc
        .roots()
        .iter()
        .copied()
        .find(|id| doc.get(*id).name == "hello")
        .ok_or_else(|| TransportError::Hello("server did not send <hello>".into()))?;

    let supports_base = doc
        .descendants_named("capability")
        .into_iter()
        .any(|c| doc.get(c).text.trim() == BASE_1_0);
    if !supports_base {
        return Err(TransportError::Hello(format!("server lacks {}", BASE_1_0)));
    }
    Ok(doc.child_text(hello, "session-id").map(str::to_string))
}

/// Content of `<rpc-reply>`
fn reply_body(message: &str, message_id: u64) -> Result<String, TransportError> {
    let doc = XmlDocument::parse(message).map_err(TransportError::Framing)?;
    let reply = doc
        .roots()
        .iter()
        .copied()
        .find(|id| doc.get(*id).name == "rpc-reply")
        .ok_or_else(|| TransportError::Framing("expected <rpc-reply>".into()))?;

    let id = doc
        .get(reply)
        .attributes
        .iter()
        .find(|(k, _)| k == "message-id")
        .map(|(_, v)| v.as_str());
    if id != Some(message_id.to_string().as_str()) {
        warn!(expected = message_id, got = id.unwrap_or("-"), "message-id mismatch");
    }
    doc.write_siblings(&doc.get(reply).children)
        .map_err(TransportError::Framing)
}

#[async_trait]
impl<T> Session for StreamSession<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn execute(&self, rpc: &str) -> Result<Reply, TransportError> {
        let mut guard = self.framed.lock().await;
        let framed = guard.as_mut().ok_or(TransportError::Closed)?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        framed
            .send(format!("<rpc message-id=\"{id}\" xmlns=\"{BASE_NS}\">{rpc}</rpc>"))
            .await?;
        let message = receive(framed).await?;
        reply_body(&message, id).map(Reply::new)
    }

    async fn close(&self) {
        if let Some(mut framed) = self.framed.lock().await.take() {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let bye = format!("<rpc message-id=\"{id}\" xmlns=\"{BASE_NS}\"><close-session/></rpc>");
            if framed.send(bye).await.is_ok() {
                if let Err(e) = receive(&mut framed).await {
                    debug!(error = %e, "no reply to close-session");
                }
            }
        }
        if let Some(handle) = self.ssh.lock().await.take() {
            if let Err(e) = handle
                .disconnect(russh::Disconnect::ByApplication, "", "en")
                .await
            {
                debug!(error = %e, "ssh already disconnected");
            }
        }
    }
}

/// Accepts every server host key.
///
/// TODO: check host keys against a known_hosts file
#[derive(Debug, Clone, Default)]
pub struct SshHandler;

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        debug!(algorithm = server_public_key.algorithm().as_str(), "server host key");
        Ok(true)
    }
}

fn ssh_error(e: russh::Error) -> TransportError {
    match e {
        russh::Error::Disconnect => TransportError::Closed,
        other => TransportError::Ssh(other.to_string()),
    }
}

/// How to authenticate to the device
pub enum SshAuth {
    Password(SecretBox<String>),
    /// Private key file, with the passphrase protecting it if any
    Key {
        path: PathBuf,
        passphrase: Option<SecretBox<String>>,
    },
}

impl fmt::Debug for SshAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SshAuth::Password(_) => f.write_str("Password(..)"),
            SshAuth::Key { path, .. } => f.debug_struct("Key").field("path", path).finish_non_exhaustive(),
        }
    }
}

/// Where and how to reach a device over SSH
#[derive(Debug)]
pub struct SshConnector {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth: SshAuth,
    /// Drop the SSH connection after this long without traffic
    pub inactivity_timeout: Option<Duration>,
}

impl SshConnector {
    fn ssh_config(&self) -> client::Config {
        client::Config {
            inactivity_timeout: self.inactivity_timeout,
            ..Default::default()
        }
    }

    async fn authenticate(&self, handle: &mut client::Handle<SshHandler>) -> Result<(), TransportError> {
        let result = match &self.auth {
            SshAuth::Password(password) => {
                debug!(user = %self.username, "password authentication");
                handle
                    .authenticate_password(self.username.as_str(), password.expose_secret().as_str())
                    .await
                    .map_err(ssh_error)?
            }
            SshAuth::Key { path, passphrase } => {
                debug!(user = %self.username, key = %path.display(), "private key authentication");
                let key = russh::keys::load_secret_key(
                    path,
                    passphrase.as_ref().map(|p| p.expose_secret().as_str()),
                )
                .map_err(|e| TransportError::Auth(format!("cannot load {}: {}", path.display(), e)))?;
                let hash = handle.best_supported_rsa_hash().await.map_err(ssh_error)?.flatten();
                handle
                    .authenticate_publickey(
                        self.username.as_str(),
                        PrivateKeyWithHashAlg::new(Arc::new(key), hash),
                    )
                    .await
                    .map_err(ssh_error)?
            }
        };

        if result.success() {
            Ok(())
        } else {
            Err(TransportError::Auth(format!("{}@{}", self.username, self.host)))
        }
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn connect(&self) -> Result<Arc<dyn Session>, TransportError> {
        info!(host = %self.host, port = self.port, user = %self.username, "connecting");
        let mut handle = client::connect(
            Arc::new(self.ssh_config()),
            (self.host.as_str(), self.port),
            SshHandler,
        )
        .await
        .map_err(ssh_error)?;
        self.authenticate(&mut handle).await?;

        let channel = handle.channel_open_session().await.map_err(ssh_error)?;
        channel
            .request_subsystem(true, "netconf")
            .await
            .map_err(ssh_error)?;
        info!(host = %self.host, "netconf subsystem open");

        let session = StreamSession::open(channel.into_stream()).await?.with_ssh(handle);
        Ok(Arc::new(session))
    }
}
