//! Ordered list of the connections a run verifies.
//!
//! The built-in registry covers the three client roles of the streaming
//! topology against a local signalling server. A TOML file can replace it:
//!
//! ```toml
//! [[connection]]
//! role = "Streamer"
//! endpoint = "ws://127.0.0.1:8888/type=streamer&insid=1&projectid=P"
//! ```

use std::fmt;
use std::path::Path;

use serde::Deserialize;

use crate::endpoint::{Endpoint, RoleAttributes};
use crate::error::{Error, Result};

/// One connection to verify: a human-facing role label and its endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionDescriptor {
    role: String,
    endpoint: String,
}

impl ConnectionDescriptor {
    /// # Errors
    ///
    /// Returns the endpoint parse error if `endpoint` is not a `ws://` URI.
    pub fn new(role: impl Into<String>, endpoint: impl Into<String>) -> Result<Self> {
        let descriptor = Self::unchecked(role, endpoint);
        descriptor.parse_endpoint()?;
        Ok(descriptor)
    }

    fn unchecked(role: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            endpoint: endpoint.into(),
        }
    }

    #[must_use]
    pub fn role(&self) -> &str {
        &self.role
    }

    /// The endpoint exactly as configured.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// # Errors
    ///
    /// See [`Endpoint::parse`].
    pub fn parse_endpoint(&self) -> Result<Endpoint> {
        Endpoint::parse(&self.endpoint)
    }

    /// Role attributes carried in the endpoint path.
    ///
    /// # Errors
    ///
    /// Endpoint or attribute parse errors.
    pub fn attributes(&self) -> Result<RoleAttributes> {
        self.parse_endpoint()?.role_attributes()
    }
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.role, self.endpoint)
    }
}

const BUILTIN: [(&str, &str); 3] = [
    (
        "Streamer",
        "ws://127.0.0.1:8888/type=streamer&insid=675ba9d5b1796fc2539d3930&projectid=6821C61B48A925890040C3B3849B06C3",
    ),
    (
        "Player",
        "ws://127.0.0.1:8888/type=player&insid=123456&projectid=ABCDEF",
    ),
    (
        "SFU",
        "ws://127.0.0.1:8888/type=sfu&insid=sfu001&projectid=TESTPROJECT",
    ),
];

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RegistryFile {
    #[serde(default, rename = "connection")]
    connections: Vec<ConnectionDescriptor>,
}

/// Read-only, ordered sequence of [`ConnectionDescriptor`]s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registry {
    descriptors: Vec<ConnectionDescriptor>,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            descriptors: BUILTIN
                .iter()
                .map(|(role, endpoint)| ConnectionDescriptor::unchecked(*role, *endpoint))
                .collect(),
        }
    }
}

impl Registry {
    /// # Errors
    ///
    /// Returns `Error::Config` if `descriptors` is empty.
    pub fn new(descriptors: Vec<ConnectionDescriptor>) -> Result<Self> {
        if descriptors.is_empty() {
            return Err(Error::Config("registry has no connections".into()));
        }
        Ok(Self { descriptors })
    }

    /// Parse a registry from TOML text.
    ///
    /// # Errors
    ///
    /// `Error::Config` for malformed TOML or an empty list, endpoint errors
    /// for entries that are not `ws://` URIs.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let file: RegistryFile = toml::from_str(text)?;
        for descriptor in &file.connections {
            descriptor.parse_endpoint()?;
        }
        Self::new(file.connections)
    }

    /// Load a registry file.
    ///
    /// # Errors
    ///
    /// `Error::Config` if the file cannot be read, plus everything
    /// [`from_toml_str`](Self::from_toml_str) reports.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Point every descriptor at `host:port`, keeping roles and paths.
    ///
    /// # Errors
    ///
    /// Endpoint errors for unparsable entries or an invalid host.
    pub fn with_host(&self, host: &str, port: u16) -> Result<Self> {
        let descriptors = self
            .descriptors
            .iter()
            .map(|d| {
                let endpoint = d.parse_endpoint()?.with_authority(host, port)?;
                Ok(ConnectionDescriptor::unchecked(d.role.clone(), endpoint.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { descriptors })
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ConnectionDescriptor> {
        self.descriptors.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

impl<'a> IntoIterator for &'a Registry {
    type Item = &'a ConnectionDescriptor;
    type IntoIter = std::slice::Iter<'a, ConnectionDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
