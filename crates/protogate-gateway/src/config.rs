//! Gateway configuration loaded from TOML

use crate::annotation::DEFAULT_MARKER;
use crate::error::{GatewayError, GatewayResult};
use crate::model::CacheKeyPolicy;
use crate::rules::InvalidAttributePolicy;
use protogate_client::{ChannelConfig, Protocol};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

/// Top-level gateway settings. Every field has a default, so an empty file
/// is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Root of the descriptor tree. Relative paths are resolved against the
    /// directory of the config file.
    pub descriptors_dir: PathBuf,
    pub annotation_marker: String,
    /// Remove annotation lines from documentation shown in OpenAPI
    pub strip_documentation: bool,
    pub invalid_attributes: InvalidAttributePolicy,
    pub model_cache_key: CacheKeyPolicy,
    pub http: HttpConfig,
    pub rpc: RpcConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub listen: SocketAddr,
    pub base_path: String,
    pub title: String,
    pub version: String,
    pub description: Option<String>,
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    pub protocol: Protocol,
    pub request_timeout_ms: Option<u64>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            descriptors_dir: PathBuf::from("descriptors"),
            annotation_marker: DEFAULT_MARKER.to_string(),
            strip_documentation: true,
            invalid_attributes: InvalidAttributePolicy::default(),
            model_cache_key: CacheKeyPolicy::default(),
            http: HttpConfig::default(),
            rpc: RpcConfig::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8000)),
            base_path: "/api/v1".to_string(),
            title: "protogate".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: None,
            allowed_origins: vec!["*".to_string()],
        }
    }
}

impl RpcConfig {
    /// Channel settings for the upstream connector
    pub fn channel_config(&self) -> ChannelConfig {
        let config = ChannelConfig::default().protocol(self.protocol);
        match self.request_timeout_ms {
            Some(ms) => config.request_timeout(Duration::from_millis(ms)),
            None => config,
        }
    }
}

impl GatewayConfig {
    /// Load a config file; `descriptors_dir` is made relative to its directory
    pub fn from_file<P: AsRef<Path>>(path: P) -> GatewayResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| GatewayError::Config(format!("{}: {}", path.display(), e)))?;

        let mut config = Self::from_toml_str(&content)?;
        if config.descriptors_dir.is_relative() {
            if let Some(dir) = path.parent() {
                config.descriptors_dir = dir.join(&config.descriptors_dir);
            }
        }
        Ok(config)
    }

    /// Parse TOML, substituting `${VAR}` with environment values
    pub fn from_toml_str(content: &str) -> GatewayResult<Self> {
        let content = substitute_env_vars(content);
        let config: Self = toml::from_str(&content)
            .map_err(|e| GatewayError::Config(format!("TOML parsing error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> GatewayResult<()> {
        if self.annotation_marker.trim().is_empty() {
            return Err(GatewayError::Config(
                "annotation_marker must not be empty".to_string(),
            ));
        }
        if !self.http.base_path.is_empty() && !self.http.base_path.starts_with('/') {
            return Err(GatewayError::Config(format!(
                "http.base_path must start with '/': {}",
                self.http.base_path
            )));
        }
        if self.rpc.request_timeout_ms == Some(0) {
            return Err(GatewayError::Config(
                "rpc.request_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Unset variables are left as written
fn substitute_env_vars(content: &str) -> String {
    static VAR: OnceLock<Regex> = OnceLock::new();
    let re = VAR.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("is valid regex"));

    re.replace_all(content, |caps: &Captures| {
        let name = &caps[1];
        std::env::var(name).unwrap_or_else(|_| format!("${{{}}}", name))
    })
    .into_owned()
}
