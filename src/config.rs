use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::ResolutionCache;
use crate::handler::{DEFAULT_ANSWER_TTL, DEFAULT_LOOKUP_TIMEOUT};
use crate::Name;

pub const DEFAULT_CONFIG_FILE: &str = "dns-resolver.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    FileRead(String, String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Upper bound for one forward lookup, in milliseconds
    pub lookup_timeout_ms: u64,

    /// TTL put on every answer record
    pub answer_ttl: u32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            lookup_timeout_ms: DEFAULT_LOOKUP_TIMEOUT.as_millis() as u64,
            answer_ttl: DEFAULT_ANSWER_TTL,
        }
    }
}

impl ResolverConfig {
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub port: Option<u16>,
    pub bind_address: Option<String>,
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub resolver: ResolverConfig,
    pub logging: LoggingConfig,

    /// Static table, fully-qualified name to IPv4 address
    pub records: BTreeMap<String, String>,
}

impl Config {
    /// Load configuration from `path`, or from `dns-resolver.toml` in the
    /// working directory, or fall back to defaults. Overrides are applied last.
    pub fn load(path: Option<&str>, overrides: CliOverrides) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = path {
            Self::from_file(path)?
        } else if Path::new(DEFAULT_CONFIG_FILE).exists() {
            Self::from_file(DEFAULT_CONFIG_FILE)?
        } else {
            Self::default()
        };

        config.apply_cli_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.to_string(), e.to_string()))?;
        contents.parse()
    }

    fn apply_cli_overrides(&mut self, overrides: CliOverrides) {
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(bind) = overrides.bind_address {
            self.server.bind_address = bind;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation("DNS port cannot be 0".to_string()));
        }

        self.listen_addr()?;

        if self.resolver.lookup_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "Lookup timeout cannot be 0".to_string(),
            ));
        }

        self.cache().map(|_| ())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self.server.bind_address.parse().map_err(|_| {
            ConfigError::Validation(format!(
                "Invalid bind address '{}'",
                self.server.bind_address
            ))
        })?;

        Ok(SocketAddr::new(ip, self.server.port))
    }

    /// Builds the static table. Names must already be fully qualified; they
    /// are not normalised.
    pub fn cache(&self) -> Result<ResolutionCache, ConfigError> {
        self.records
            .iter()
            .map(|(name, addr)| -> Result<(String, Ipv4Addr), ConfigError> {
                Name::parse(name).map_err(|_| {
                    ConfigError::Validation(format!(
                        "Record '{}' is not a fully-qualified name",
                        name
                    ))
                })?;

                let addr: Ipv4Addr = addr.parse().map_err(|_| {
                    ConfigError::Validation(format!(
                        "Record '{}' has an invalid IPv4 address '{}'",
                        name, addr
                    ))
                })?;

                Ok((name.clone(), addr))
            })
            .collect()
    }
}

impl std::str::FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}
