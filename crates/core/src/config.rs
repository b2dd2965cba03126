use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::CatalogEntry;
use crate::domain::notification::Channel;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub catalog: CatalogConfig,
    pub notifications: NotificationsConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
}

/// Merchant catalog listed in the config file. Empty means no catalog is
/// configured and items the extractor leaves unpriced stay unpriced.
#[derive(Clone, Debug, Default)]
pub struct CatalogConfig {
    pub entries: Vec<CatalogEntry>,
}

/// Notification policy. Loaded once per process and passed by reference into
/// the notifier; send paths never consult the environment directly.
#[derive(Clone, Debug)]
pub struct NotificationsConfig {
    pub hourly_cap: u32,
    pub sms_cooldown_minutes: u32,
    pub retry_max_attempts: u32,
    pub retry_delay_ms: u64,
    pub send_timeout_secs: u64,
    pub chat_webhook_url: Option<String>,
    pub email_gateway_url: Option<String>,
    pub sms_gateway_url: Option<String>,
    pub gateway_token: Option<SecretString>,
    pub merchant_recipient: Option<String>,
    /// Per-recipient channel allow-lists. A recipient absent from this map
    /// may be reached on every channel.
    pub preferences: HashMap<String, Vec<Channel>>,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://pedido.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                max_tokens: 512,
                temperature: 0.0,
                timeout_secs: 30,
            },
            catalog: CatalogConfig::default(),
            notifications: NotificationsConfig {
                hourly_cap: 10,
                sms_cooldown_minutes: 30,
                retry_max_attempts: 2,
                retry_delay_ms: 500,
                send_timeout_secs: 10,
                chat_webhook_url: None,
                email_gateway_url: None,
                sms_gateway_url: None,
                gateway_token: None,
                merchant_recipient: None,
                preferences: HashMap::new(),
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("pedido.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(llm_api_key_value.into());
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(max_tokens) = llm.max_tokens {
                self.llm.max_tokens = max_tokens;
            }
            if let Some(temperature) = llm.temperature {
                self.llm.temperature = temperature;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(catalog) = patch.catalog {
            if let Some(entries) = catalog.entries {
                self.catalog.entries = entries;
            }
        }

        if let Some(notifications) = patch.notifications {
            if let Some(hourly_cap) = notifications.hourly_cap {
                self.notifications.hourly_cap = hourly_cap;
            }
            if let Some(sms_cooldown_minutes) = notifications.sms_cooldown_minutes {
                self.notifications.sms_cooldown_minutes = sms_cooldown_minutes;
            }
            if let Some(retry_max_attempts) = notifications.retry_max_attempts {
                self.notifications.retry_max_attempts = retry_max_attempts;
            }
            if let Some(retry_delay_ms) = notifications.retry_delay_ms {
                self.notifications.retry_delay_ms = retry_delay_ms;
            }
            if let Some(send_timeout_secs) = notifications.send_timeout_secs {
                self.notifications.send_timeout_secs = send_timeout_secs;
            }
            if let Some(chat_webhook_url) = notifications.chat_webhook_url {
                self.notifications.chat_webhook_url = Some(chat_webhook_url);
            }
            if let Some(email_gateway_url) = notifications.email_gateway_url {
                self.notifications.email_gateway_url = Some(email_gateway_url);
            }
            if let Some(sms_gateway_url) = notifications.sms_gateway_url {
                self.notifications.sms_gateway_url = Some(sms_gateway_url);
            }
            if let Some(gateway_token_value) = notifications.gateway_token {
                self.notifications.gateway_token = Some(gateway_token_value.into());
            }
            if let Some(merchant_recipient) = notifications.merchant_recipient {
                self.notifications.merchant_recipient = Some(merchant_recipient);
            }
            if let Some(preferences) = notifications.preferences {
                self.notifications.preferences = parse_preferences(preferences)?;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(url) = read_env("PEDIDO_DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(level) = read_env("PEDIDO_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = read_env("PEDIDO_LOG_FORMAT") {
            self.logging.format = format.parse().map_err(|_| ConfigError::InvalidEnvOverride {
                key: "PEDIDO_LOG_FORMAT".to_owned(),
                value: format,
            })?;
        }
        if let Some(provider) = read_env("PEDIDO_LLM_PROVIDER") {
            self.llm.provider =
                provider.parse().map_err(|_| ConfigError::InvalidEnvOverride {
                    key: "PEDIDO_LLM_PROVIDER".to_owned(),
                    value: provider,
                })?;
        }
        if let Some(model) = read_env("PEDIDO_LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(api_key) = read_env("PEDIDO_LLM_API_KEY") {
            self.llm.api_key = Some(api_key.into());
        }
        if let Some(cap) = read_env("PEDIDO_NOTIFY_HOURLY_CAP") {
            self.notifications.hourly_cap =
                cap.parse().map_err(|_| ConfigError::InvalidEnvOverride {
                    key: "PEDIDO_NOTIFY_HOURLY_CAP".to_owned(),
                    value: cap,
                })?;
        }
        if let Some(cooldown) = read_env("PEDIDO_NOTIFY_SMS_COOLDOWN_MINUTES") {
            self.notifications.sms_cooldown_minutes =
                cooldown.parse().map_err(|_| ConfigError::InvalidEnvOverride {
                    key: "PEDIDO_NOTIFY_SMS_COOLDOWN_MINUTES".to_owned(),
                    value: cooldown,
                })?;
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(provider) = overrides.llm_provider {
            self.llm.provider = provider;
        }
        if let Some(model) = overrides.llm_model {
            self.llm.model = model;
        }
        if let Some(api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(api_key.into());
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Validation("database.url must not be empty".to_owned()));
        }
        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::Validation("llm.model must not be empty".to_owned()));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::Validation(
                "llm.temperature must be within 0.0..=2.0".to_owned(),
            ));
        }
        if self.notifications.hourly_cap == 0 {
            return Err(ConfigError::Validation(
                "notifications.hourly_cap must be at least 1".to_owned(),
            ));
        }
        if self.notifications.retry_max_attempts == 0 {
            return Err(ConfigError::Validation(
                "notifications.retry_max_attempts must be at least 1".to_owned(),
            ));
        }
        for entry in &self.catalog.entries {
            if entry.name.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "catalog entries must have a non-empty name".to_owned(),
                ));
            }
            if entry.unit_price < Decimal::ZERO {
                return Err(ConfigError::Validation(format!(
                    "catalog entry `{}` must not have a negative unit_price",
                    entry.name
                )));
            }
        }
        for (recipient, channels) in &self.notifications.preferences {
            if channels.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "notification preferences for `{recipient}` must list at least one channel"
                )));
            }
        }
        Ok(())
    }
}

fn parse_preferences(
    raw: HashMap<String, Vec<String>>,
) -> Result<HashMap<String, Vec<Channel>>, ConfigError> {
    let mut preferences = HashMap::with_capacity(raw.len());
    for (recipient, names) in raw {
        let mut channels = Vec::with_capacity(names.len());
        for name in names {
            let channel = Channel::parse(&name).ok_or_else(|| {
                ConfigError::Validation(format!(
                    "unknown notification channel `{name}` for `{recipient}` (expected chat|email|sms)"
                ))
            })?;
            if !channels.contains(&channel) {
                channels.push(channel);
            }
        }
        preferences.insert(recipient, channels);
    }
    Ok(preferences)
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }
    let default = PathBuf::from("pedido.toml");
    default.exists().then_some(default)
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
    toml::from_str(&raw)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    catalog: Option<CatalogPatch>,
    notifications: Option<NotificationsPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct CatalogPatch {
    entries: Option<Vec<CatalogEntry>>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct NotificationsPatch {
    hourly_cap: Option<u32>,
    sms_cooldown_minutes: Option<u32>,
    retry_max_attempts: Option<u32>,
    retry_delay_ms: Option<u64>,
    send_timeout_secs: Option<u64>,
    chat_webhook_url: Option<String>,
    email_gateway_url: Option<String>,
    sms_gateway_url: Option<String>,
    gateway_token: Option<String>,
    merchant_recipient: Option<String>,
    preferences: Option<HashMap<String, Vec<String>>>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
