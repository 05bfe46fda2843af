//! Configuration management for Flowsmith
//!
//! Loads and manages configuration from flowsmith.config.json (or .yaml/.yml).
//! Secrets never live here; integrations read them through the secrets provider.

use crate::constants;
use crate::{FlowsmithError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Complete Flowsmith configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Storage configuration (required)
    pub storage: StorageConfig,

    /// HTTP server configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpConfig>,

    /// Directory for the learning/automation snapshots and generated files
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,

    /// Text-generation backend
    #[serde(default)]
    pub llm: LlmConfig,

    /// External integration endpoints and timeouts
    #[serde(default)]
    pub integrations: IntegrationsConfig,

    /// Logging configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<LogConfig>,
}

/// Storage backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Driver name (sqlite)
    pub driver: String,

    /// Data source name / connection string
    pub dsn: String,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind to
    #[serde(default = "default_port")]
    pub port: u16,

    /// Allowed CORS origins. Defaults to localhost on the configured port.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_origins: Option<Vec<String>>,
}

/// Text-generation backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmConfig {
    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    #[serde(default = "default_llm_temperature")]
    pub temperature: f32,

    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Name of the secret holding the API key
    #[serde(default = "default_llm_api_key_env")]
    pub api_key_env: String,
}

/// Integration endpoints, cache and timeout settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationsConfig {
    #[serde(default = "default_bcb_base_url")]
    pub bcb_base_url: String,

    #[serde(default = "default_awesome_api_base_url")]
    pub awesome_api_base_url: String,

    #[serde(default = "default_telegram_base_url")]
    pub telegram_base_url: String,

    #[serde(default = "default_currency_cache_ttl")]
    pub currency_cache_ttl_secs: u64,

    #[serde(default = "default_currency_timeout")]
    pub currency_timeout_secs: u64,

    #[serde(default = "default_telegram_probe_timeout")]
    pub telegram_probe_timeout_secs: u64,

    #[serde(default = "default_telegram_send_timeout")]
    pub telegram_send_timeout_secs: u64,
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

fn default_host() -> String {
    constants::DEFAULT_HTTP_HOST.to_string()
}

fn default_port() -> u16 {
    constants::DEFAULT_HTTP_PORT
}

fn default_llm_model() -> String {
    constants::DEFAULT_LLM_MODEL.to_string()
}

fn default_llm_base_url() -> String {
    constants::DEFAULT_LLM_BASE_URL.to_string()
}

fn default_llm_temperature() -> f32 {
    constants::DEFAULT_LLM_TEMPERATURE
}

fn default_llm_timeout() -> u64 {
    constants::DEFAULT_LLM_TIMEOUT_SECS
}

fn default_llm_api_key_env() -> String {
    constants::DEFAULT_LLM_API_KEY_ENV.to_string()
}

fn default_bcb_base_url() -> String {
    constants::DEFAULT_BCB_BASE_URL.to_string()
}

fn default_awesome_api_base_url() -> String {
    constants::DEFAULT_AWESOME_API_BASE_URL.to_string()
}

fn default_telegram_base_url() -> String {
    constants::DEFAULT_TELEGRAM_BASE_URL.to_string()
}

fn default_currency_cache_ttl() -> u64 {
    constants::DEFAULT_CURRENCY_CACHE_TTL_SECS
}

fn default_currency_timeout() -> u64 {
    constants::DEFAULT_CURRENCY_TIMEOUT_SECS
}

fn default_telegram_probe_timeout() -> u64 {
    constants::DEFAULT_TELEGRAM_PROBE_TIMEOUT_SECS
}

fn default_telegram_send_timeout() -> u64 {
    constants::DEFAULT_TELEGRAM_SEND_TIMEOUT_SECS
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_llm_model(),
            base_url: default_llm_base_url(),
            temperature: default_llm_temperature(),
            timeout_secs: default_llm_timeout(),
            api_key_env: default_llm_api_key_env(),
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for IntegrationsConfig {
    fn default() -> Self {
        Self {
            bcb_base_url: default_bcb_base_url(),
            awesome_api_base_url: default_awesome_api_base_url(),
            telegram_base_url: default_telegram_base_url(),
            currency_cache_ttl_secs: default_currency_cache_ttl(),
            currency_timeout_secs: default_currency_timeout(),
            telegram_probe_timeout_secs: default_telegram_probe_timeout(),
            telegram_send_timeout_secs: default_telegram_send_timeout(),
        }
    }
}

impl Config {
    /// Load configuration from the first default file present in the
    /// working directory
    pub fn load() -> Result<Self> {
        let path = constants::CONFIG_FILE_CANDIDATES
            .iter()
            .find(|candidate| Path::new(candidate).exists())
            .copied()
            .unwrap_or(constants::CONFIG_FILE_NAME);
        Self::load_from_path(path)
    }

    /// Load configuration from specific path
    ///
    /// Supports both JSON and YAML formats based on file extension:
    /// - `.json` files are schema-checked and parsed as JSON
    /// - `.yaml` or `.yml` files are parsed as YAML
    /// - Files without extension default to JSON parsing
    ///
    /// A missing file yields the default configuration.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;

        let config: Config = match path.extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content).map_err(|e| {
                FlowsmithError::config(format!("Failed to parse YAML config: {}", e))
            })?,
            _ => {
                validate_config(content.as_bytes())?;
                serde_json::from_str(&content).map_err(|e| {
                    FlowsmithError::config(format!("Failed to parse JSON config: {}", e))
                })?
            }
        };

        config.validate()?;

        Ok(config)
    }

    /// Save configuration to specific path (JSON or YAML by extension)
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path_ref = path.as_ref();

        if let Some(parent) = path_ref.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = match path_ref.extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::to_string(self).map_err(|e| {
                FlowsmithError::config(format!("Failed to serialize to YAML: {}", e))
            })?,
            _ => serde_json::to_string_pretty(self)?,
        };

        std::fs::write(path_ref, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.storage.driver.is_empty() {
            return Err(FlowsmithError::config("storage.driver is required"));
        }

        if self.storage.dsn.is_empty() {
            return Err(FlowsmithError::config("storage.dsn is required"));
        }

        if self.storage.driver != constants::STORAGE_DRIVER_SQLITE {
            return Err(FlowsmithError::config(format!(
                "Unsupported storage driver: '{}'. Supported: sqlite",
                self.storage.driver
            )));
        }

        if let Some(ref http) = self.http {
            if http.port == 0 {
                return Err(FlowsmithError::config(
                    "http.port must be nonzero (1-65535)",
                ));
            }

            if http.host.is_empty() {
                return Err(FlowsmithError::config("http.host cannot be empty"));
            }

            if let Some(ref origins) = http.allowed_origins {
                for origin in origins {
                    if !origin.starts_with("http://") && !origin.starts_with("https://") {
                        return Err(FlowsmithError::config(format!(
                            "Invalid CORS origin '{}': must start with http:// or https://",
                            origin
                        )));
                    }
                }
            }
        }

        if let Some(level) = self.log.as_ref().and_then(|log| log.level.as_deref())
            && !LOG_LEVELS.contains(&level.trim().to_lowercase().as_str())
        {
            return Err(FlowsmithError::config(format!(
                "Invalid log.level '{}': expected one of {}",
                level,
                LOG_LEVELS.join(", ")
            )));
        }

        if self.llm.timeout_secs == 0 {
            return Err(FlowsmithError::config("llm.timeoutSecs must be greater than 0"));
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(FlowsmithError::config(
                "llm.temperature must be between 0.0 and 2.0",
            ));
        }

        let integrations = &self.integrations;
        for (name, value) in [
            ("currencyCacheTtlSecs", integrations.currency_cache_ttl_secs),
            ("currencyTimeoutSecs", integrations.currency_timeout_secs),
            (
                "telegramProbeTimeoutSecs",
                integrations.telegram_probe_timeout_secs,
            ),
            (
                "telegramSendTimeoutSecs",
                integrations.telegram_send_timeout_secs,
            ),
        ] {
            if value == 0 {
                return Err(FlowsmithError::config(format!(
                    "integrations.{} must be greater than 0",
                    name
                )));
            }
        }

        Ok(())
    }

    /// Host/port the HTTP server binds to
    pub fn http_config(&self) -> HttpConfig {
        self.http.clone().unwrap_or_else(|| HttpConfig {
            host: default_host(),
            port: default_port(),
            allowed_origins: None,
        })
    }

    /// Data directory (snapshots and generated files)
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(constants::default_data_dir()))
    }

    /// Learning store snapshot path
    pub fn learning_path(&self) -> PathBuf {
        self.data_dir().join(constants::LEARNING_FILE_NAME)
    }

    /// Automation store snapshot path
    pub fn automations_path(&self) -> PathBuf {
        self.data_dir().join(constants::AUTOMATIONS_FILE_NAME)
    }

    /// Default tracing filter when `RUST_LOG` is unset; `log.level` applies
    /// to this crate and to the HTTP trace layer
    pub fn log_filter(&self) -> String {
        let level = self
            .log
            .as_ref()
            .and_then(|log| log.level.as_deref())
            .map(str::trim)
            .filter(|level| !level.is_empty())
            .unwrap_or("info");
        format!("flowsmith={level},tower_http={level}")
    }

    /// Directory where synthesized output files are written
    pub fn outputs_dir(&self) -> PathBuf {
        self.data_dir().join(constants::OUTPUTS_DIR_NAME)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                driver: constants::STORAGE_DRIVER_SQLITE.to_string(),
                dsn: constants::default_sqlite_dsn().to_string(),
            },
            http: Some(HttpConfig {
                host: default_host(),
                port: default_port(),
                allowed_origins: None,
            }),
            data_dir: None,
            llm: LlmConfig::default(),
            integrations: IntegrationsConfig::default(),
            log: Some(LogConfig {
                level: Some("info".to_string()),
            }),
        }
    }
}

/// Validate a raw JSON configuration against the embedded schema
pub fn validate_config(raw: &[u8]) -> Result<()> {
    use once_cell::sync::Lazy;

    static CONFIG_SCHEMA: Lazy<std::result::Result<jsonschema::Validator, String>> =
        Lazy::new(|| {
            let schema_json = serde_json::json!({
                "type": "object",
                "required": ["storage"],
                "properties": {
                    "storage": {
                        "type": "object",
                        "required": ["driver", "dsn"],
                        "properties": {
                            "driver": {"type": "string", "minLength": 1},
                            "dsn": {"type": "string", "minLength": 1}
                        }
                    },
                    "http": {
                        "type": "object",
                        "properties": {
                            "host": {"type": "string"},
                            "port": {"type": "integer", "minimum": 1, "maximum": 65535},
                            "allowedOrigins": {"type": "array", "items": {"type": "string"}}
                        }
                    },
                    "dataDir": {"type": "string"},
                    "llm": {
                        "type": "object",
                        "properties": {
                            "model": {"type": "string"},
                            "baseUrl": {"type": "string"},
                            "temperature": {"type": "number"},
                            "timeoutSecs": {"type": "integer", "minimum": 1},
                            "apiKeyEnv": {"type": "string"}
                        }
                    },
                    "integrations": {"type": "object"},
                    "log": {"type": "object"}
                }
            });

            jsonschema::validator_for(&schema_json).map_err(|e| e.to_string())
        });

    let validator = CONFIG_SCHEMA
        .as_ref()
        .map_err(|e| FlowsmithError::config(format!("Invalid config schema: {}", e)))?;

    let config_value: Value = serde_json::from_slice(raw)?;

    if !validator.is_valid(&config_value) {
        let error_messages: Vec<String> = validator
            .iter_errors(&config_value)
            .map(|e| format!("{}: {}", e.instance_path, e))
            .collect();

        return Err(FlowsmithError::config(format!(
            "Config validation failed:\n  - {}",
            error_messages.join("\n  - ")
        )));
    }

    Ok(())
}

#[cfg(test)]
mod config_test;
