//! NETCONF datastore names
//!
//! Datastore names are injected verbatim into RPC payloads, so only the
//! three standard datastores get past [`Datastore::from_str`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::NetconfError;

/// A configuration datastore
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Datastore {
    #[default]
    Running,
    Candidate,
    Startup,
}

impl Datastore {
    pub fn as_str(&self) -> &'static str {
        match self {
            Datastore::Running => "running",
            Datastore::Candidate => "candidate",
            Datastore::Startup => "startup",
        }
    }

    /// `<running/>` etc., as used inside `<source>` and `<target>`
    pub fn element(&self) -> String {
        format!("<{}/>", self.as_str())
    }
}

impl fmt::Display for Datastore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Datastore {
    type Err = NetconfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Datastore::Running),
            "candidate" => Ok(Datastore::Candidate),
            "startup" => Ok(Datastore::Startup),
            other => Err(NetconfError::InvalidInput(format!(
                "invalid datastore: {}",
                other
            ))),
        }
    }
}

impl TryFrom<String> for Datastore {
    type Error = NetconfError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datastore_parse() {
        for name in ["running", "candidate", "startup"] {
            let ds: Datastore = name.parse().unwrap();
            assert_eq!(ds.to_string(), name);
            assert_eq!(ds.element(), format!("<{name}/>"));
        }
    }

    #[test]
    fn test_datastore_rejects_unknown() {
        for bad in ["foo", "", "Running", "running "] {
            let err = bad.parse::<Datastore>().unwrap_err();
            assert!(matches!(err, NetconfError::InvalidInput(_)), "{bad:?}");
        }
    }

    #[test]
    fn test_datastore_serde() {
        let ds: Datastore = serde_json::from_str("\"candidate\"").unwrap();
        assert_eq!(ds, Datastore::Candidate);
        assert_eq!(serde_json::to_string(&Datastore::Startup).unwrap(), "\"startup\"");
        let err = serde_json::from_str::<Datastore>("\"foo\"").unwrap_err();
        assert!(err.to_string().contains("invalid datastore: foo"));
    }
}
