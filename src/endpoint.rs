//! Signalling endpoint URIs and the role attributes carried in their path.
//!
//! Endpoints look like
//! `ws://127.0.0.1:8888/type=streamer&insid=675ba9d5&projectid=6821C61B`.
//! The path is opaque to the transport and is sent verbatim as the request
//! target; [`RoleAttributes`] only reads it for logging.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use url::{Position, Url};

use crate::error::{Error, Result};

/// Default port for `ws://` endpoints without an explicit port.
pub const DEFAULT_WS_PORT: u16 = 80;

/// A parsed `ws://` endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    url: Url,
}

impl Endpoint {
    /// Parse an endpoint URI.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidUri` if the string is not a URI or has no host
    /// - `Error::UnsupportedScheme` for anything but `ws`
    pub fn parse(uri: &str) -> Result<Self> {
        let url = Url::parse(uri).map_err(|e| Error::InvalidUri(format!("{uri}: {e}")))?;
        if url.scheme() != "ws" {
            return Err(Error::UnsupportedScheme(url.scheme().to_string()));
        }
        match url.host_str() {
            Some(host) if !host.is_empty() => {}
            _ => return Err(Error::InvalidUri(format!("{uri}: missing host"))),
        }
        Ok(Self { url })
    }

    #[must_use]
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.url.port_or_known_default().unwrap_or(DEFAULT_WS_PORT)
    }

    /// `host:port`, suitable both for the Host header and for resolving.
    #[must_use]
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host(), self.port())
    }

    /// Request target: path plus query, exactly as configured.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.url[Position::BeforePath..Position::AfterQuery]
    }

    /// Same endpoint with another host and port; the path is kept.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUri` if `host` is not a valid host.
    pub fn with_authority(&self, host: &str, port: u16) -> Result<Self> {
        let mut url = self.url.clone();
        url.set_host(Some(host))
            .map_err(|e| Error::InvalidUri(format!("{host}: {e}")))?;
        url.set_port(Some(port))
            .map_err(|()| Error::InvalidUri(format!("cannot set port {port}")))?;
        Ok(Self { url })
    }

    /// Role attributes encoded in the path.
    ///
    /// # Errors
    ///
    /// See [`RoleAttributes::parse`].
    pub fn role_attributes(&self) -> Result<RoleAttributes> {
        RoleAttributes::parse(self.path())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

/// Client role in the streaming topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleKind {
    Streamer,
    Player,
    /// Selective forwarding unit.
    Sfu,
}

impl RoleKind {
    /// Value used for the `type` path parameter.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            RoleKind::Streamer => "streamer",
            RoleKind::Player => "player",
            RoleKind::Sfu => "sfu",
        }
    }
}

impl FromStr for RoleKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "streamer" => Ok(RoleKind::Streamer),
            "player" => Ok(RoleKind::Player),
            "sfu" => Ok(RoleKind::Sfu),
            _ => Err(Error::InvalidRoleAttributes(format!(
                "unknown connection type: {s}"
            ))),
        }
    }
}

impl fmt::Display for RoleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attributes identifying a client, parsed from an endpoint path such as
/// `/type=player&insid=123456&projectid=ABCDEF`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleAttributes {
    pub kind: RoleKind,
    pub instance_id: Option<String>,
    pub project_id: Option<String>,
    /// Every parameter, including the well-known ones.
    pub attributes: BTreeMap<String, String>,
}

impl RoleAttributes {
    /// Parse role attributes from a path.
    ///
    /// Pairs are separated by `&` and split on the first `=`. Keys and values
    /// are percent-decoded and trimmed. A bare key maps to an empty value;
    /// empty keys are dropped.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoleAttributes` if the path is empty, `type` is
    /// missing or empty, or `type` names an unknown role.
    pub fn parse(path: &str) -> Result<Self> {
        let trimmed = path.strip_prefix('/').unwrap_or(path);
        if trimmed.is_empty() {
            return Err(Error::InvalidRoleAttributes("path is empty".into()));
        }

        let attributes: BTreeMap<String, String> = url::form_urlencoded::parse(trimmed.as_bytes())
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .filter(|(k, _)| !k.is_empty())
            .collect();

        let kind = match attributes.get("type") {
            Some(t) if !t.is_empty() => t.parse()?,
            _ => {
                return Err(Error::InvalidRoleAttributes(format!(
                    "missing required 'type' parameter in {trimmed}"
                )));
            }
        };

        Ok(Self {
            kind,
            instance_id: attributes.get("insid").cloned(),
            project_id: attributes.get("projectid").cloned(),
            attributes,
        })
    }
}
