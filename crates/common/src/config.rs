//! Application configuration.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Tuple store configuration.
    #[serde(default)]
    pub store: StoreConfig,
    /// Redis configuration.
    #[serde(default)]
    pub redis: RedisConfig,
    /// Mattermost integration configuration.
    #[serde(default)]
    pub mattermost: MattermostConfig,
    /// Poll behaviour.
    #[serde(default)]
    pub polls: PollsConfig,
    /// Log output configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Which tuple store backend holds the polls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Redis, through the fred client.
    #[default]
    Redis,
    /// In-process store. Polls are lost on restart.
    Memory,
}

/// Tuple store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Backend selection.
    #[serde(default)]
    pub backend: StoreBackend,
    /// Upper bound for a single store round-trip, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Fixed delay before the single retry of an unavailable store call.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

/// Redis configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL.
    #[serde(default = "default_redis_url")]
    pub url: String,
    /// Key prefix for all Redis keys.
    #[serde(default = "default_redis_prefix")]
    pub prefix: String,
}

/// Mattermost integration configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MattermostConfig {
    /// Tokens accepted from outgoing webhooks and slash commands.
    ///
    /// An empty list disables token verification.
    #[serde(default)]
    pub tokens: Vec<String>,
    /// Leading word stripped from command text.
    #[serde(default = "default_trigger")]
    pub trigger: String,
    /// The bot's own user id. Posts from it are ignored.
    #[serde(default)]
    pub bot_user_id: Option<String>,
    /// Only posts from this channel are handled, when set.
    #[serde(default)]
    pub channel_id: Option<String>,
}

/// Poll behaviour configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PollsConfig {
    /// How many active polls `list` and not-found replies show.
    #[serde(default = "default_list_limit")]
    pub list_limit: usize,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Log output configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    3000
}

const fn default_timeout_ms() -> u64 {
    1_000
}

const fn default_retry_delay_ms() -> u64 {
    100
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_redis_prefix() -> String {
    "votebot".to_string()
}

fn default_trigger() -> String {
    "/vote".to_string()
}

const fn default_list_limit() -> usize {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            timeout_ms: default_timeout_ms(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl StoreConfig {
    /// Per-call store timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Delay before retrying an unavailable store call.
    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            prefix: default_redis_prefix(),
        }
    }
}

impl Default for MattermostConfig {
    fn default() -> Self {
        Self {
            tokens: Vec::new(),
            trigger: default_trigger(),
            bot_user_id: None,
            channel_id: None,
        }
    }
}

impl Default for PollsConfig {
    fn default() -> Self {
        Self {
            list_limit: default_list_limit(),
        }
    }
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `.env` (via dotenvy, if present)
    /// 2. `config/default.toml`
    /// 3. `config/{environment}.toml` (based on `VOTEBOT_ENV`)
    /// 4. Environment variables with `VOTEBOT__` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        let env = std::env::var("VOTEBOT_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(Self::env_source())
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(Self::env_source())
            .build()?;

        config.try_deserialize()
    }

    fn env_source() -> config::Environment {
        config::Environment::with_prefix("VOTEBOT")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("mattermost.tokens")
            .try_parsing(true)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.store.backend, StoreBackend::Redis);
        assert_eq!(config.store.timeout(), Duration::from_secs(1));
        assert_eq!(config.mattermost.trigger, "/vote");
        assert_eq!(config.polls.list_limit, 10);
        assert!(config.mattermost.tokens.is_empty());
    }

    #[test]
    fn test_partial_source_fills_defaults() {
        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(
                "[store]\nbackend = \"memory\"\n[mattermost]\ntokens = [\"abc\"]\n",
                config::FileFormat::Toml,
            ))
            .build()
            .and_then(config::Config::try_deserialize)
            .unwrap();

        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.store.retry_delay_ms, 100);
        assert_eq!(config.mattermost.tokens, vec!["abc".to_string()]);
        assert_eq!(config.redis.prefix, "votebot");
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }
}
