//! netconf-yang - schema-aware NETCONF client
//!
//! On login the client fetches every YANG module the device advertises,
//! compiles them into a [`SchemaRegistry`], and from then on turns simple
//! XPath-style instance paths into `get`, `get-config` and `edit-config`
//! RPCs. Replies are re-parsed against the same schema so the caller gets
//! back only the nodes the path selected.
//!
//! # Example
//!
//! ```no_run
//! use netconf_yang::{ClientOptions, NetconfClient};
//! use netconf_yang::transport::{Connector, SshAuth, SshConnector};
//! use secrecy::SecretBox;
//!
//! # async fn run() -> netconf_yang::Result<()> {
//! let connector = SshConnector {
//!     host: "router1".into(),
//!     port: 830,
//!     username: "admin".into(),
//!     auth: SshAuth::Password(SecretBox::new(Box::new("admin".to_string()))),
//!     inactivity_timeout: None,
//! };
//! let mut client = NetconfClient::new(ClientOptions::default());
//! client.login(connector.connect().await?).await?;
//!
//! let enabled = client.get("/interfaces/interface[name='eth0']/enabled").await?;
//! println!("{}", enabled);
//!
//! client.set("/interfaces/interface[name='eth0']/description", "uplink").await?;
//! client.logout().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod command;
pub mod config;
pub mod datastore;
pub mod decoder;
pub mod encoder;
mod error;
pub mod instance_id;
pub mod keeper;
pub mod registry;
pub mod request_builder;
pub mod schema;
pub mod session;
pub mod testing;
pub mod transport;
pub mod tree;
mod types;
pub mod xml;
pub mod yang;

pub use client::{ClientOptions, NetconfClient, Outcome};
pub use datastore::Datastore;
pub use decoder::{DecodeMode, Decoded, Selection};
pub use encoder::Encoder;
pub use error::{NetconfError, Result};
pub use instance_id::InstancePath;
pub use registry::SchemaRegistry;
pub use request_builder::{Operation, RequestBuilder};
pub use session::{Session, SharedSession, TransportError};
pub use types::YangType;
