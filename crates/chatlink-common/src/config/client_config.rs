//! Client configuration structs
//!
//! Loads configuration from `CHATLINK_*` environment variables, or from a
//! config file layered under `CHATLINK__*` overrides.

use chatlink_core::GatewayIntents;
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Main client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Bot token, sent as `Bot <token>` and in IDENTIFY
    pub token: String,
    #[serde(default)]
    pub env: Environment,
    /// Default log level when `RUST_LOG` is unset
    #[serde(default)]
    pub log_level: Option<String>,
    #[serde(default)]
    pub rest: RestConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }

    fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "production" => Some(Self::Production),
            "staging" => Some(Self::Staging),
            "development" => Some(Self::Development),
            _ => None,
        }
    }
}

/// REST client and request scheduler configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RestConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_version")]
    pub api_version: u8,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Attempts after a 5xx or transport failure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Attempts after a 429
    #[serde(default = "default_max_rate_limit_retries")]
    pub max_rate_limit_retries: u32,
    /// Bucket registry cap before LRU eviction
    #[serde(default = "default_max_buckets")]
    pub max_buckets: usize,
    #[serde(default = "default_global_requests_per_second")]
    pub global_requests_per_second: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Seconds a bucket worker waits for work before exiting
    #[serde(default = "default_worker_idle_secs")]
    pub worker_idle_secs: u64,
}

impl RestConfig {
    /// Versioned API root, e.g. `https://discord.com/api/v10`
    #[must_use]
    pub fn api_root(&self) -> String {
        format!("{}/v{}", self.base_url.trim_end_matches('/'), self.api_version)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    #[must_use]
    pub fn worker_idle(&self) -> Duration {
        Duration::from_secs(self.worker_idle_secs)
    }
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_version: default_api_version(),
            user_agent: default_user_agent(),
            max_retries: default_max_retries(),
            max_rate_limit_retries: default_max_rate_limit_retries(),
            max_buckets: default_max_buckets(),
            global_requests_per_second: default_global_requests_per_second(),
            request_timeout_secs: default_request_timeout_secs(),
            backoff_base_ms: default_backoff_base_ms(),
            worker_idle_secs: default_worker_idle_secs(),
        }
    }
}

/// Gateway session configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Fixed gateway URL; when unset the binary asks `GET /gateway/bot`
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_api_version")]
    pub version: u8,
    /// Request `zlib-stream` transport compression
    #[serde(default = "default_true")]
    pub compress: bool,
    #[serde(default = "default_intents")]
    pub intents: GatewayIntents,
    #[serde(default = "default_large_threshold")]
    pub large_threshold: u8,
    /// `[shard_id, shard_count]`
    #[serde(default)]
    pub shard: Option<[u32; 2]>,
    #[serde(default = "default_max_resume_attempts")]
    pub max_resume_attempts: u32,
    #[serde(default = "default_reconnect_base_ms")]
    pub reconnect_base_ms: u64,
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,
    /// Gateway send limit per 60 seconds
    #[serde(default = "default_outbound_per_minute")]
    pub outbound_per_minute: u32,
}

impl GatewayConfig {
    /// Connection URL with query parameters for the given base
    #[must_use]
    pub fn connect_url(&self, base: &str) -> String {
        let mut url = format!(
            "{}/?v={}&encoding=json",
            base.trim_end_matches('/'),
            self.version
        );
        if self.compress {
            url.push_str("&compress=zlib-stream");
        }
        url
    }

    #[must_use]
    pub fn reconnect_base(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_ms)
    }

    #[must_use]
    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_ms)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: None,
            version: default_api_version(),
            compress: true,
            intents: default_intents(),
            large_threshold: default_large_threshold(),
            shard: None,
            max_resume_attempts: default_max_resume_attempts(),
            reconnect_base_ms: default_reconnect_base_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
            outbound_per_minute: default_outbound_per_minute(),
        }
    }
}

/// In-memory cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub guilds: bool,
    #[serde(default = "default_true")]
    pub channels: bool,
    #[serde(default = "default_true")]
    pub users: bool,
    #[serde(default = "default_true")]
    pub members: bool,
    #[serde(default = "default_true")]
    pub messages: bool,
    /// Maximum cached messages; oldest are evicted first
    #[serde(default = "default_message_capacity")]
    pub message_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            guilds: true,
            channels: true,
            users: true,
            members: true,
            messages: true,
            message_capacity: default_message_capacity(),
        }
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_base_url() -> String {
    "https://discord.com/api".to_string()
}

fn default_api_version() -> u8 {
    10
}

fn default_user_agent() -> String {
    format!(
        "DiscordBot (https://github.com/chatlink/chatlink, {})",
        env!("CARGO_PKG_VERSION")
    )
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_rate_limit_retries() -> u32 {
    5
}

fn default_max_buckets() -> usize {
    1024
}

fn default_global_requests_per_second() -> u32 {
    50
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_worker_idle_secs() -> u64 {
    60
}

fn default_intents() -> GatewayIntents {
    GatewayIntents::non_privileged()
}

fn default_large_threshold() -> u8 {
    50
}

fn default_max_resume_attempts() -> u32 {
    5
}

fn default_reconnect_base_ms() -> u64 {
    1_000
}

fn default_reconnect_max_ms() -> u64 {
    60_000
}

fn default_outbound_per_minute() -> u32 {
    120
}

fn default_message_capacity() -> usize {
    1_000
}

/// Read and parse an optional variable, falling back to `default` when unset
fn var_or<T: FromStr>(key: &'static str, default: impl FnOnce() -> T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key, raw)),
        Err(_) => Ok(default()),
    }
}

impl ClientConfig {
    /// Build a configuration with defaults for everything but the token
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            env: Environment::default(),
            log_level: None,
            rest: RestConfig::default(),
            gateway: GatewayConfig::default(),
            cache: CacheConfig::default(),
        }
    }

    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if `CHATLINK_TOKEN` is missing or a variable fails to parse
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let token = env::var("CHATLINK_TOKEN").map_err(|_| ConfigError::MissingVar("CHATLINK_TOKEN"))?;
        if token.trim().is_empty() {
            return Err(ConfigError::MissingVar("CHATLINK_TOKEN"));
        }

        Ok(Self {
            token,
            env: env::var("CHATLINK_ENV")
                .ok()
                .and_then(|s| Environment::parse(&s))
                .unwrap_or_default(),
            log_level: env::var("CHATLINK_LOG_LEVEL").ok(),
            rest: RestConfig {
                base_url: env::var("CHATLINK_REST_BASE_URL").unwrap_or_else(|_| default_base_url()),
                api_version: var_or("CHATLINK_API_VERSION", default_api_version)?,
                user_agent: env::var("CHATLINK_USER_AGENT").unwrap_or_else(|_| default_user_agent()),
                max_retries: var_or("CHATLINK_REST_MAX_RETRIES", default_max_retries)?,
                max_rate_limit_retries: var_or(
                    "CHATLINK_REST_MAX_RATE_LIMIT_RETRIES",
                    default_max_rate_limit_retries,
                )?,
                max_buckets: var_or("CHATLINK_REST_MAX_BUCKETS", default_max_buckets)?,
                global_requests_per_second: var_or(
                    "CHATLINK_REST_GLOBAL_REQUESTS_PER_SECOND",
                    default_global_requests_per_second,
                )?,
                request_timeout_secs: var_or(
                    "CHATLINK_REST_REQUEST_TIMEOUT_SECS",
                    default_request_timeout_secs,
                )?,
                backoff_base_ms: var_or("CHATLINK_REST_BACKOFF_BASE_MS", default_backoff_base_ms)?,
                worker_idle_secs: var_or("CHATLINK_REST_WORKER_IDLE_SECS", default_worker_idle_secs)?,
            },
            gateway: GatewayConfig {
                url: env::var("CHATLINK_GATEWAY_URL").ok(),
                version: var_or("CHATLINK_API_VERSION", default_api_version)?,
                compress: var_or("CHATLINK_GATEWAY_COMPRESS", default_true)?,
                intents: var_or("CHATLINK_GATEWAY_INTENTS", || default_intents().bits())
                    .map(GatewayIntents::from_bits_truncate)?,
                large_threshold: var_or("CHATLINK_GATEWAY_LARGE_THRESHOLD", default_large_threshold)?,
                shard: parse_shard()?,
                max_resume_attempts: var_or(
                    "CHATLINK_GATEWAY_MAX_RESUME_ATTEMPTS",
                    default_max_resume_attempts,
                )?,
                reconnect_base_ms: var_or(
                    "CHATLINK_GATEWAY_RECONNECT_BASE_MS",
                    default_reconnect_base_ms,
                )?,
                reconnect_max_ms: var_or("CHATLINK_GATEWAY_RECONNECT_MAX_MS", default_reconnect_max_ms)?,
                outbound_per_minute: var_or(
                    "CHATLINK_GATEWAY_OUTBOUND_PER_MINUTE",
                    default_outbound_per_minute,
                )?,
            },
            cache: CacheConfig {
                enabled: var_or("CHATLINK_CACHE_ENABLED", default_true)?,
                guilds: var_or("CHATLINK_CACHE_GUILDS", default_true)?,
                channels: var_or("CHATLINK_CACHE_CHANNELS", default_true)?,
                users: var_or("CHATLINK_CACHE_USERS", default_true)?,
                members: var_or("CHATLINK_CACHE_MEMBERS", default_true)?,
                messages: var_or("CHATLINK_CACHE_MESSAGES", default_true)?,
                message_capacity: var_or(
                    "CHATLINK_CACHE_MESSAGE_CAPACITY",
                    default_message_capacity,
                )?,
            },
        })
    }

    /// Load configuration from a file, with `CHATLINK__SECTION__KEY` overrides
    ///
    /// The format is picked from the file extension (toml, json, yaml).
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or does not deserialize
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("CHATLINK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        settings.try_deserialize().map_err(ConfigError::from)
    }

    /// Load configuration from TOML text
    ///
    /// # Errors
    /// Returns an error if the text does not deserialize
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(contents, config::FileFormat::Toml))
            .build()?;
        settings.try_deserialize().map_err(ConfigError::from)
    }
}

fn parse_shard() -> Result<Option<[u32; 2]>, ConfigError> {
    let Ok(raw) = env::var("CHATLINK_GATEWAY_SHARD") else {
        return Ok(None);
    };
    let invalid = || ConfigError::InvalidValue("CHATLINK_GATEWAY_SHARD", raw.clone());
    let (id, count) = raw.split_once(',').ok_or_else(invalid)?;
    let id: u32 = id.trim().parse().map_err(|_| invalid())?;
    let count: u32 = count.trim().parse().map_err(|_| invalid())?;
    if count == 0 || id >= count {
        return Err(invalid());
    }
    Ok(Some([id, count]))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),

    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}
