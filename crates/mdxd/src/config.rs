//! Configuration management for mdxd.
//!
//! Loads settings from `--config`, then /etc/mdxd/config.toml, or uses
//! defaults. The gateway port and dictionary root always come from the CLI.

use crate::error::StartupError;
use mdx_common::{PortPolicy, ResourceOrder, ScanRules};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/mdxd/config.toml";

/// Gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Bind host for the gateway and every dictionary server
    #[serde(default = "default_host")]
    pub host: String,

    /// Directory holding a built client shell (index.html + assets).
    /// The built-in shell is served when unset.
    #[serde(default)]
    pub client_dir: Option<PathBuf>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            client_dir: None,
        }
    }
}

/// Dictionary discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default = "default_entry_extension")]
    pub entry_extension: String,

    #[serde(default = "default_resource_extension")]
    pub resource_extension: String,

    #[serde(default = "default_injection_extension")]
    pub injection_extension: String,

    /// "listing" keeps directory order, "name" sorts resource archives
    #[serde(default)]
    pub resource_order: ResourceOrder,
}

fn default_entry_extension() -> String {
    "mdx".to_string()
}

fn default_resource_extension() -> String {
    "mdd".to_string()
}

fn default_injection_extension() -> String {
    "html".to_string()
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            entry_extension: default_entry_extension(),
            resource_extension: default_resource_extension(),
            injection_extension: default_injection_extension(),
            resource_order: ResourceOrder::default(),
        }
    }
}

impl ScanConfig {
    pub fn rules(&self) -> ScanRules {
        ScanRules {
            entry_extension: self.entry_extension.trim_start_matches('.').to_string(),
            resource_extension: self.resource_extension.trim_start_matches('.').to_string(),
            injection_extension: self.injection_extension.trim_start_matches('.').to_string(),
            resource_order: self.resource_order,
        }
    }
}

/// Dictionary server port window. SUB_PORT_START/SUB_PORT_END override it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortsConfig {
    #[serde(default)]
    pub sub_port_start: Option<u16>,

    #[serde(default)]
    pub sub_port_end: Option<u16>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Full daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub scan: ScanConfig,

    #[serde(default)]
    pub ports: PortsConfig,

    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    /// Load config from `explicit`, else the default path, else defaults.
    ///
    /// An explicit path that cannot be read or parsed is an error; a missing
    /// default file is not.
    pub fn load(explicit: Option<&Path>) -> Result<Self, StartupError> {
        if let Some(path) = explicit {
            return Self::load_from_path(path);
        }

        let default_path = Path::new(CONFIG_PATH);
        if default_path.exists() {
            return Self::load_from_path(default_path);
        }

        debug!("No config at {}, using defaults", CONFIG_PATH);
        Ok(Config::default())
    }

    /// Load config from specific path
    pub fn load_from_path(path: &Path) -> Result<Self, StartupError> {
        let content = fs::read_to_string(path).map_err(|e| {
            StartupError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| StartupError::Config(format!("{}: {}", path.display(), e)))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn host(&self) -> Result<IpAddr, StartupError> {
        self.gateway.host.parse().map_err(|_| {
            StartupError::Config(format!("gateway.host: invalid address {:?}", self.gateway.host))
        })
    }

    /// Port policy for dictionary servers. `from_env` wins over the file.
    pub fn port_policy(&self, from_env: Option<PortPolicy>) -> Result<PortPolicy, StartupError> {
        if let Some(policy) = from_env {
            return Ok(policy);
        }
        match (self.ports.sub_port_start, self.ports.sub_port_end) {
            (Some(start), Some(end)) => Ok(PortPolicy::range(start, end)?),
            (None, None) => Ok(PortPolicy::Ephemeral),
            _ => Err(StartupError::Config(
                "ports: sub_port_start and sub_port_end must be set together".to_string(),
            )),
        }
    }
}
