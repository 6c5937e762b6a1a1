//! Deployment-wide protocol settings shared by both roles.

use serde::Deserialize;

/// Endpoint name used when none is configured.
pub const DEFAULT_ENDPOINT: &str = "tokens";

/// Which request payload layout a deployment uses.
///
/// The two layouts are alternate protocol versions. A deployment picks one
/// and every component in it reads and writes only that layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// Requests are a JSON object under the `requests` key.
    #[default]
    Json,
    /// A single request as flat `user` and `group` keys.
    Legacy,
}

impl WireFormat {
    /// Returns the configuration label for this format.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Legacy => "legacy",
        }
    }
}

impl std::fmt::Display for WireFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WireFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "legacy" => Ok(Self::Legacy),
            other => Err(format!("unknown wire format: {other}")),
        }
    }
}

/// Protocol settings for one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProtocolConfig {
    /// Name of the relation endpoint both roles bind to.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Request payload layout.
    #[serde(default)]
    pub wire_format: WireFormat,

    /// Whether readiness also waits for every requested identity to have a token.
    #[serde(default = "default_track_in_flight")]
    pub track_in_flight: bool,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_track_in_flight() -> bool {
    true
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            wire_format: WireFormat::default(),
            track_in_flight: default_track_in_flight(),
        }
    }
}

impl ProtocolConfig {
    /// Returns the default configuration bound to `endpoint`.
    pub fn for_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }
}
