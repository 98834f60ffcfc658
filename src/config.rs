//! Configuration system for the license gateway.
//!
//! Configuration is loaded from multiple sources with the following precedence:
//! 1. Environment variables (highest priority)
//! 2. `gateway.toml` file (or the file named by `LICENSE_GATEWAY_CONFIG`)
//! 3. Default values (lowest priority)
//!
//! # Environment Variables
//!
//! - `LICENSE_GATEWAY_HOST` - Server bind address
//! - `LICENSE_GATEWAY_PORT` - Server port
//! - `LICENSE_GATEWAY_REMOTE_URL` - Base URL of the remote license API
//! - `LICENSE_GATEWAY_REMOTE_TIMEOUT_SECS` - Timeout for each remote call
//! - `LICENSE_GATEWAY_STORAGE_BACKEND` - `file` or `memory`
//! - `LICENSE_GATEWAY_DATA_DIR` - Directory holding the record files
//! - `LICENSE_GATEWAY_CRYPTO_MODE` - `aes-gcm` or `marker`
//! - `LICENSE_GATEWAY_MACHINE_SECRET` - Overrides the derived machine secret
//! - `LICENSE_GATEWAY_FORCE_MODE` - `sentinel` or `activate`
//! - `LICENSE_GATEWAY_LOG_LEVEL` - Log level (trace, debug, info, warn, error)

use config::Config;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;

use crate::errors::{GatewayError, GatewayResult};

/// Global configuration singleton.
static CONFIG: OnceLock<GatewayConfig> = OnceLock::new();

/// Environment variable naming an alternative config file.
pub const CONFIG_PATH_ENV: &str = "LICENSE_GATEWAY_CONFIG";

/// Default remote license API.
pub const DEFAULT_REMOTE_URL: &str = "https://api.lemonsqueezy.com/v1/licenses";

/// Instance id sent on forced re-checks in `sentinel` mode.
pub const DEFAULT_SENTINEL_INSTANCE_ID: &str = "invalid-instance-id";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub remote: RemoteConfig,
    pub storage: StorageConfig,
    pub crypto: CryptoConfig,
    pub license: LicenseConfig,
    pub logging: LoggingConfig,
}

/// HTTP gateway configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8060,
        }
    }
}

/// Remote license API configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL; `/activate`, `/validate` and `/deactivate` are appended.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_REMOTE_URL.to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Memory,
}

/// Where the instance and license records live.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub data_dir: PathBuf,
    pub instance_file: String,
    pub license_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            data_dir: default_data_dir(),
            instance_file: "license_instance.json".to_string(),
            license_file: "license_key.json".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn instance_path(&self) -> PathBuf {
        self.data_dir.join(&self.instance_file)
    }

    pub fn license_path(&self) -> PathBuf {
        self.data_dir.join(&self.license_file)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CryptoMode {
    #[default]
    AesGcm,
    Marker,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    pub mode: CryptoMode,
    /// Explicit machine secret. Empty means derive it from the host.
    pub machine_secret: String,
}

/// Behavior of `check?force=true`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForceMode {
    /// Validate with a sentinel instance id; never touches local state.
    #[default]
    Sentinel,
    /// Ignore the stored instance and go straight to activation.
    Activate,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LicenseConfig {
    pub force_mode: ForceMode,
    pub sentinel_instance_id: String,
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            force_mode: ForceMode::Sentinel,
            sentinel_instance_id: DEFAULT_SENTINEL_INSTANCE_ID.to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|p| p.join("license-gateway"))
        .unwrap_or_else(|| PathBuf::from("/data"))
}

fn config_err(e: config::ConfigError) -> GatewayError {
    GatewayError::Config(e.to_string())
}

impl GatewayConfig {
    /// Load configuration from file and environment.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. config file (optional)
    /// 3. Environment variables
    pub fn load() -> GatewayResult<Self> {
        let defaults = GatewayConfig::default();
        let config_file = env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "gateway".to_string());

        let builder = Config::builder()
            .set_default("server.host", defaults.server.host)
            .map_err(config_err)?
            .set_default("server.port", i64::from(defaults.server.port))
            .map_err(config_err)?
            .set_default("remote.base_url", defaults.remote.base_url)
            .map_err(config_err)?
            .set_default("remote.timeout_secs", defaults.remote.timeout_secs)
            .map_err(config_err)?
            .set_default("storage.backend", "file")
            .map_err(config_err)?
            .set_default(
                "storage.data_dir",
                defaults.storage.data_dir.to_string_lossy().to_string(),
            )
            .map_err(config_err)?
            .set_default("storage.instance_file", defaults.storage.instance_file)
            .map_err(config_err)?
            .set_default("storage.license_file", defaults.storage.license_file)
            .map_err(config_err)?
            .set_default("crypto.mode", "aes-gcm")
            .map_err(config_err)?
            .set_default("crypto.machine_secret", "")
            .map_err(config_err)?
            .set_default("license.force_mode", "sentinel")
            .map_err(config_err)?
            .set_default(
                "license.sentinel_instance_id",
                defaults.license.sentinel_instance_id,
            )
            .map_err(config_err)?
            .set_default("logging.level", defaults.logging.level)
            .map_err(config_err)?
            .add_source(config::File::with_name(&config_file).required(false))
            .set_override_option("server.host", env::var("LICENSE_GATEWAY_HOST").ok())
            .map_err(config_err)?
            .set_override_option(
                "server.port",
                env::var("LICENSE_GATEWAY_PORT")
                    .ok()
                    .and_then(|v| v.parse::<i64>().ok()),
            )
            .map_err(config_err)?
            .set_override_option("remote.base_url", env::var("LICENSE_GATEWAY_REMOTE_URL").ok())
            .map_err(config_err)?
            .set_override_option(
                "remote.timeout_secs",
                env::var("LICENSE_GATEWAY_REMOTE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse::<i64>().ok()),
            )
            .map_err(config_err)?
            .set_override_option(
                "storage.backend",
                env::var("LICENSE_GATEWAY_STORAGE_BACKEND").ok(),
            )
            .map_err(config_err)?
            .set_override_option("storage.data_dir", env::var("LICENSE_GATEWAY_DATA_DIR").ok())
            .map_err(config_err)?
            .set_override_option("crypto.mode", env::var("LICENSE_GATEWAY_CRYPTO_MODE").ok())
            .map_err(config_err)?
            .set_override_option(
                "crypto.machine_secret",
                env::var("LICENSE_GATEWAY_MACHINE_SECRET").ok(),
            )
            .map_err(config_err)?
            .set_override_option(
                "license.force_mode",
                env::var("LICENSE_GATEWAY_FORCE_MODE").ok(),
            )
            .map_err(config_err)?
            .set_override_option("logging.level", env::var("LICENSE_GATEWAY_LOG_LEVEL").ok())
            .map_err(config_err)?;

        let settings = builder
            .build()
            .map_err(|e| GatewayError::Config(format!("failed to build config: {e}")))?;

        settings
            .try_deserialize()
            .map_err(|e| GatewayError::Config(format!("failed to deserialize config: {e}")))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> GatewayResult<()> {
        if self.server.port == 0 {
            return Err(GatewayError::Config(
                "server.port must be greater than 0".to_string(),
            ));
        }

        if !self.remote.base_url.starts_with("http://")
            && !self.remote.base_url.starts_with("https://")
        {
            return Err(GatewayError::Config(format!(
                "remote.base_url must be an http(s) URL, got '{}'",
                self.remote.base_url
            )));
        }

        if self.remote.timeout_secs == 0 {
            return Err(GatewayError::Config(
                "remote.timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.storage.instance_file.is_empty() || self.storage.license_file.is_empty() {
            return Err(GatewayError::Config(
                "storage.instance_file and storage.license_file cannot be empty".to_string(),
            ));
        }

        if self.storage.instance_file == self.storage.license_file {
            return Err(GatewayError::Config(
                "storage.instance_file and storage.license_file must differ".to_string(),
            ));
        }

        if self.license.force_mode == ForceMode::Sentinel
            && self.license.sentinel_instance_id.is_empty()
        {
            return Err(GatewayError::Config(
                "license.sentinel_instance_id cannot be empty in sentinel mode".to_string(),
            ));
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(GatewayError::Config(format!(
                    "logging.level must be one of: trace, debug, info, warn, error. Got '{other}'"
                )));
            }
        }

        Ok(())
    }
}

/// Get the global configuration.
///
/// Loads and validates on first access, then caches.
pub fn get_config() -> GatewayResult<&'static GatewayConfig> {
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }

    let config = GatewayConfig::load()?;
    config.validate()?;

    // Another thread may have won the race; either value is equivalent.
    let _ = CONFIG.set(config);

    CONFIG
        .get()
        .ok_or_else(|| GatewayError::Config("configuration not initialized".to_string()))
}
