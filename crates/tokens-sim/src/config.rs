//! Simulator configuration loading from file and environment variables.

use serde::Deserialize;
use thiserror::Error;
use tokens_types::ProtocolConfig;

/// Top-level simulator configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Protocol settings shared by both roles.
    #[serde(default)]
    pub protocol: ProtocolConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Units and requests taking part in the exchange.
    #[serde(default)]
    pub scenario: ScenarioConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "tokens_provider=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// One credential request made by a requirer unit.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RequestSpec {
    /// The requirer unit making the request.
    pub unit: String,
    /// The identity a token is requested for.
    pub identity: String,
    /// The group requested for the identity.
    pub group: String,
}

/// The relation topology and requests to simulate.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioConfig {
    /// The provider unit issuing tokens.
    #[serde(default = "default_provider_unit")]
    pub provider_unit: String,

    /// The requirer units related to the provider.
    #[serde(default = "default_requirer_units")]
    pub requirer_units: Vec<String>,

    /// Requests published before the provider runs.
    #[serde(default = "default_requests")]
    pub requests: Vec<RequestSpec>,

    /// Requirer units that leave the relation before stale tokens are pruned.
    #[serde(default)]
    pub depart: Vec<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_provider_unit() -> String {
    "vault/0".to_string()
}

fn default_requirer_units() -> Vec<String> {
    vec!["app/0".to_string(), "app/1".to_string()]
}

fn default_requests() -> Vec<RequestSpec> {
    vec![
        RequestSpec {
            unit: "app/0".to_string(),
            identity: "alice".to_string(),
            group: "admins".to_string(),
        },
        RequestSpec {
            unit: "app/1".to_string(),
            identity: "bob".to_string(),
            group: "readers".to_string(),
        },
    ]
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            provider_unit: default_provider_unit(),
            requirer_units: default_requirer_units(),
            requests: default_requests(),
            depart: Vec::new(),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// A request or departure names a unit that is not a requirer unit.
    #[error("scenario references unknown requirer unit: {0}")]
    UnknownUnit(String),
}

impl Config {
    /// Checks that the scenario only references declared requirer units.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnknownUnit` for the first undeclared unit.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let scenario = &self.scenario;
        let referenced = scenario
            .requests
            .iter()
            .map(|r| &r.unit)
            .chain(scenario.depart.iter());
        for unit in referenced {
            if !scenario.requirer_units.contains(unit) {
                return Err(ConfigError::UnknownUnit(unit.clone()));
            }
        }
        Ok(())
    }
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `TOKENS_ENDPOINT` overrides `protocol.endpoint`
/// - `TOKENS_WIRE_FORMAT` overrides `protocol.wire_format` ("json" or "legacy")
/// - `TOKENS_TRACK_IN_FLIGHT` overrides `protocol.track_in_flight`
/// - `TOKENS_LOG_LEVEL` overrides `logging.level`
/// - `TOKENS_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed,
/// or if the scenario references undeclared units.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

/// Applies environment overrides read through `lookup`.
///
/// Unparseable values are ignored and the configured value is kept.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(endpoint) = lookup("TOKENS_ENDPOINT") {
        if !endpoint.trim().is_empty() {
            config.protocol.endpoint = endpoint;
        }
    }
    if let Some(format) = lookup("TOKENS_WIRE_FORMAT") {
        if let Ok(parsed) = format.parse() {
            config.protocol.wire_format = parsed;
        }
    }
    if let Some(track) = lookup("TOKENS_TRACK_IN_FLIGHT") {
        config.protocol.track_in_flight = track == "true" || track == "1";
    }
    if let Some(level) = lookup("TOKENS_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("TOKENS_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
}
