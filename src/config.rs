//! Client configuration
//!
//! Values are layered: built-in defaults, then an optional YAML file, then
//! `NETCONF_`-prefixed environment variables. Command-line flags are applied
//! on top by the binary.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use secrecy::SecretBox;
use serde::{Deserialize, Serialize};

use crate::client::ClientOptions;
use crate::datastore::Datastore;
use crate::error::{NetconfError, Result};
use crate::registry::DiscoveryOptions;
use crate::request_builder::FilterKind;
use crate::transport::{SshAuth, SshConnector};

pub const ENV_PREFIX: &str = "NETCONF_";

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub datastore: Datastore,
    pub host: String,
    pub port: u16,
    pub username: String,
    /// SSH password, or the passphrase of `private_key` when that is set
    pub password: Option<String>,
    /// Private key file for public key authentication
    pub private_key: Option<PathBuf>,
    pub keepalive_interval_secs: u64,
    /// Filter form for `get-config`
    pub get_config_filter: FilterKind,
    /// Default tracing level; `RUST_LOG` wins when set
    pub log_level: String,
    /// Report per-module schema problems at `warn` instead of `debug`
    pub verbose_schema_logs: bool,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("datastore", &self.datastore)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("private_key", &self.private_key)
            .field("keepalive_interval_secs", &self.keepalive_interval_secs)
            .field("get_config_filter", &self.get_config_filter)
            .field("log_level", &self.log_level)
            .field("verbose_schema_logs", &self.verbose_schema_logs)
            .finish()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            datastore: Datastore::Running,
            host: "localhost".into(),
            port: 830,
            username: "root".into(),
            password: None,
            private_key: None,
            keepalive_interval_secs: 18,
            get_config_filter: FilterKind::Subtree,
            log_level: "info".into(),
            verbose_schema_logs: false,
        }
    }
}

impl ClientConfig {
    /// The layered configuration sources
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(ClientConfig::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    /// Load and validate. A given file must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            if !path.exists() {
                return Err(NetconfError::Config(format!(
                    "config file {} not found",
                    path.display()
                )));
            }
        }
        let config: ClientConfig = Self::figment(path)
            .extract()
            .map_err(|e| NetconfError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.keepalive_interval_secs == 0 {
            return Err(NetconfError::Config(
                "keepalive_interval_secs must be at least 1".into(),
            ));
        }
        if self.port == 0 {
            return Err(NetconfError::Config("port must not be 0".into()));
        }
        if self.host.trim().is_empty() {
            return Err(NetconfError::Config("host must not be empty".into()));
        }
        Ok(())
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            datastore: self.datastore,
            keepalive_interval: Duration::from_secs(self.keepalive_interval_secs),
            get_config_filter: self.get_config_filter,
            discovery: DiscoveryOptions {
                verbose_schema_logs: self.verbose_schema_logs,
            },
        }
    }

    /// Whether a password or key is available for login
    pub fn has_credentials(&self) -> bool {
        self.password.is_some() || self.private_key.is_some()
    }

    /// SSH connector for the configured device. A private key wins over a
    /// password; without either there is no way to log in.
    pub fn connector(&self) -> Result<SshConnector> {
        let secret = |s: &String| SecretBox::new(Box::new(s.clone()));
        let auth = match (&self.private_key, &self.password) {
            (Some(path), passphrase) => SshAuth::Key {
                path: path.clone(),
                passphrase: passphrase.as_ref().map(secret),
            },
            (None, Some(password)) => SshAuth::Password(secret(password)),
            (None, None) => {
                return Err(NetconfError::Config(
                    "no password or private_key configured".into(),
                ));
            }
        };
        Ok(SshConnector {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            auth,
            inactivity_timeout: None,
        })
    }
}
