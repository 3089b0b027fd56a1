//! Error types for netconf-yang

use thiserror::Error;

use crate::session::TransportError;

/// Main error type for NETCONF client operations
#[derive(Debug, Error)]
pub enum NetconfError {
    /// The session failed to execute an RPC or could not be established
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The schema list could not be retrieved from the device
    #[error("failed to fetch YANG schemas: {0}")]
    SchemaFetch(String),

    /// A YANG module (or the schema list itself) could not be parsed
    #[error("failed to parse YANG module {module}: {reason}")]
    SchemaParse { module: String, reason: String },

    /// The path cannot be built against any loaded module
    #[error("cannot encode path {0}")]
    PathEncoding(String),

    /// The device reply is not well-formed XML
    #[error("malformed reply: {0}")]
    ReplyParse(String),

    /// The reply payload does not fit the loaded schema
    #[error("reply does not match schema: {0}")]
    SchemaReparse(String),

    /// The schema does not define the requested path
    #[error("path not defined by schema: {0}")]
    PathLookup(String),

    /// Rejected user input (datastore, operation keyword, path, value)
    #[error("{0}")]
    InvalidInput(String),

    /// The device answered with an rpc-error
    #[error("rpc-error: {0}")]
    RpcError(String),

    /// An operation was requested without an active session
    #[error("Please login first")]
    NotLoggedIn,

    /// A second login was attempted on an active session
    #[error("you are already logged in")]
    AlreadyLoggedIn,

    /// Configuration could not be loaded
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for NETCONF client operations
pub type Result<T> = std::result::Result<T, NetconfError>;
