//! Operation builder
//!
//! Templates NETCONF `<rpc>` bodies for the three supported operations from
//! encoder fragments. The output is the content of `<rpc>`; framing and the
//! `message-id` belong to the transport.

use quick_xml::escape::escape;
use serde::{Deserialize, Serialize};

use crate::datastore::Datastore;
use crate::encoder::Encoder;
use crate::error::{NetconfError, Result};
use crate::instance_id::InstancePath;
use crate::registry::SchemaRegistry;

/// A user-level operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Configuration and state data
    Get { path: InstancePath },
    /// Configuration data from `source`
    GetConfig {
        source: Datastore,
        path: InstancePath,
    },
    /// Set the leaf at `path` to `value` in `target`
    EditConfig {
        target: Datastore,
        path: InstancePath,
        value: String,
    },
}

impl Operation {
    /// Build an operation from its boundary keyword (`get`, `get-config`, `set`)
    pub fn from_parts(
        keyword: &str,
        path: &str,
        value: Option<&str>,
        datastore: Datastore,
    ) -> Result<Self> {
        let path = InstancePath::parse(path)?;
        match (keyword, value) {
            ("get", _) => Ok(Operation::Get { path }),
            ("get-config", _) => Ok(Operation::GetConfig {
                source: datastore,
                path,
            }),
            ("set", Some(value)) if !value.is_empty() => Ok(Operation::EditConfig {
                target: datastore,
                path,
                value: value.to_string(),
            }),
            ("set", _) => Err(NetconfError::InvalidInput("set needs a value".into())),
            (other, _) => Err(NetconfError::InvalidInput(format!(
                "invalid operation: {}",
                other
            ))),
        }
    }

    pub fn path(&self) -> &InstancePath {
        match self {
            Operation::Get { path }
            | Operation::GetConfig { path, .. }
            | Operation::EditConfig { path, .. } => path,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operation::Get { .. } => "get",
            Operation::GetConfig { .. } => "get-config",
            Operation::EditConfig { .. } => "edit-config",
        }
    }
}

/// Filter form used for `get-config`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    /// Subtree filter built from the schema
    #[default]
    Subtree,
    /// The raw path passed as an XPath `select`
    Xpath,
}

/// Builds RPC bodies against a schema registry
#[derive(Debug)]
pub struct RequestBuilder<'r> {
    encoder: Encoder<'r>,
    get_config_filter: FilterKind,
}

impl<'r> RequestBuilder<'r> {
    /// Create a builder using subtree filters for every read
    pub fn new(registry: &'r SchemaRegistry) -> Self {
        Self {
            encoder: Encoder::new(registry),
            get_config_filter: FilterKind::Subtree,
        }
    }

    pub fn with_get_config_filter(mut self, kind: FilterKind) -> Self {
        self.get_config_filter = kind;
        self
    }

    /// Build the `<rpc>` body for `op`
    pub fn build(&self, op: &Operation) -> Result<String> {
        match op {
            Operation::Get { path } => Ok(format!("<get>{}</get>", self.subtree_filter(path)?)),
            Operation::GetConfig { source, path } => {
                let filter = match self.get_config_filter {
                    FilterKind::Subtree => self.subtree_filter(path)?,
                    FilterKind::Xpath => self.xpath_filter(path),
                };
                Ok(format!(
                    "<get-config><source>{}</source>{}</get-config>",
                    source.element(),
                    filter
                ))
            }
            Operation::EditConfig {
                target,
                path,
                value,
            } => {
                let fragment = self.encoder.build_fragment(path, Some(value))?;
                Ok(format!(
                    "<edit-config><target>{}</target><config>{}</config></edit-config>",
                    target.element(),
                    fragment
                ))
            }
        }
    }

    fn subtree_filter(&self, path: &InstancePath) -> Result<String> {
        let fragment = self.encoder.build_fragment(path, None)?;
        Ok(format!(
            "<filter type=\"subtree\"{}>{}</filter>",
            self.declarations(path),
            fragment
        ))
    }

    fn xpath_filter(&self, path: &InstancePath) -> String {
        format!(
            "<filter type=\"xpath\"{} select=\"{}\"/>",
            self.declarations(path),
            escape(path.raw())
        )
    }

    fn declarations(&self, path: &InstancePath) -> String {
        let decls = self.encoder.namespace_declarations(path);
        if decls.is_empty() {
            decls
        } else {
            format!(" {}", decls)
        }
    }
}
