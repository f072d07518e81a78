//! Application configuration structures.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Scheduler and runtime mode settings
    #[serde(default)]
    pub application: ApplicationConfig,

    /// The subreddit being archived
    #[serde(default)]
    pub subreddit: SubredditConfig,

    /// Listing API settings
    #[serde(default)]
    pub reddit: RedditConfig,

    /// Bulk-history API settings
    #[serde(default)]
    pub history: HistoryConfig,

    /// Index store settings
    #[serde(default)]
    pub redis: RedisConfig,

    /// Search term alias table and lock window
    #[serde(default)]
    pub search: SearchConfig,

    /// Reply message templates
    #[serde(default)]
    pub replies: ReplyTemplates,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.subreddit.name.trim().is_empty() {
            return Err(AppError::config("subreddit.name is empty"));
        }
        if self.subreddit.limit < 2 {
            return Err(AppError::config("subreddit.limit must be at least 2"));
        }
        if self.application.tick_speed_ms == 0 {
            return Err(AppError::config("application.tick_speed_ms must be > 0"));
        }
        if self.application.loop_delay_secs == 0 {
            return Err(AppError::config("application.loop_delay_secs must be > 0"));
        }
        if self.reddit.user_agent.trim().is_empty() {
            return Err(AppError::config("reddit.user_agent is empty"));
        }
        if self.reddit.username.trim().is_empty() {
            return Err(AppError::config("reddit.username is empty"));
        }
        if self.search.lock_days == 0 {
            return Err(AppError::config("search.lock_days must be > 0"));
        }
        for group in &self.search.aliases {
            if group.canonical.trim().is_empty() {
                return Err(AppError::config("search alias row without a canonical term"));
            }
        }
        Ok(())
    }
}

/// Scheduler and runtime mode settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Production mode logs malformed input instead of halting on it
    #[serde(default)]
    pub is_production: bool,

    /// Delay between full crawl passes, in seconds
    #[serde(default = "defaults::loop_delay_secs")]
    pub loop_delay_secs: u64,

    /// Scheduler tick interval, in milliseconds
    #[serde(default = "defaults::tick_speed_ms")]
    pub tick_speed_ms: u64,
}

impl ApplicationConfig {
    pub fn loop_delay(&self) -> Duration {
        Duration::from_secs(self.loop_delay_secs)
    }

    pub fn tick_speed(&self) -> Duration {
        Duration::from_millis(self.tick_speed_ms)
    }
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            is_production: false,
            loop_delay_secs: defaults::loop_delay_secs(),
            tick_speed_ms: defaults::tick_speed_ms(),
        }
    }
}

/// The subreddit being archived.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubredditConfig {
    /// Subreddit name, without the /r/ prefix
    #[serde(default)]
    pub name: String,

    /// Page/batch size for both the listing and the bulk-history API
    #[serde(default = "defaults::limit")]
    pub limit: u32,
}

impl Default for SubredditConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            limit: defaults::limit(),
        }
    }
}

/// Listing API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditConfig {
    /// Base URL of the listing API
    #[serde(default = "defaults::reddit_url")]
    pub url: String,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Bot account name, matched against inbox mentions
    #[serde(default)]
    pub username: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            url: defaults::reddit_url(),
            user_agent: defaults::user_agent(),
            username: String::new(),
            timeout_secs: defaults::timeout(),
        }
    }
}

/// Bulk-history API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Base URL of the bulk-history search endpoint
    #[serde(default = "defaults::history_url")]
    pub url: String,

    /// Delay between history batches, in milliseconds
    #[serde(default = "defaults::history_delay_ms")]
    pub delay_ms: u64,
}

impl HistoryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            url: defaults::history_url(),
            delay_ms: defaults::history_delay_ms(),
        }
    }
}

/// Index store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Connection URL
    #[serde(default = "defaults::redis_url")]
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: defaults::redis_url(),
        }
    }
}

/// Search term alias table and lock window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Days until a submission's metrics are assumed final
    #[serde(default = "defaults::lock_days")]
    pub lock_days: u64,

    /// Alias rows; a title matching any alias resolves to the canonical term
    #[serde(default)]
    pub aliases: Vec<AliasGroup>,
}

impl SearchConfig {
    pub fn lock_window(&self) -> Duration {
        Duration::from_secs(self.lock_days * 24 * 60 * 60)
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            lock_days: defaults::lock_days(),
            aliases: Vec::new(),
        }
    }
}

/// One alias row: a canonical search term and its alternative spellings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AliasGroup {
    /// Primary name, used as the index key
    pub canonical: String,

    /// Alternative spellings that resolve to the canonical term
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// Reply message templates. `{query}` is replaced with the user's argument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyTemplates {
    #[serde(default = "defaults::could_not_parse")]
    pub could_not_parse: String,
    #[serde(default = "defaults::help_start")]
    pub help_start: String,
    #[serde(default = "defaults::help_body")]
    pub help_body: String,
    #[serde(default = "defaults::no_results")]
    pub no_results: String,
    #[serde(default = "defaults::found_results")]
    pub found_results: String,
    #[serde(default = "defaults::footer")]
    pub footer: String,
}

impl Default for ReplyTemplates {
    fn default() -> Self {
        Self {
            could_not_parse: defaults::could_not_parse(),
            help_start: defaults::help_start(),
            help_body: defaults::help_body(),
            no_results: defaults::no_results(),
            found_results: defaults::found_results(),
            footer: defaults::footer(),
        }
    }
}

mod defaults {
    // Application defaults
    pub fn loop_delay_secs() -> u64 {
        600
    }
    pub fn tick_speed_ms() -> u64 {
        250
    }

    // Subreddit defaults
    pub fn limit() -> u32 {
        100
    }

    // Reddit defaults
    pub fn reddit_url() -> String {
        "https://www.reddit.com".into()
    }
    pub fn user_agent() -> String {
        "archivebot/0.1 (subreddit archive index)".into()
    }
    pub fn timeout() -> u64 {
        30
    }

    // Index store defaults
    pub fn redis_url() -> String {
        "redis://127.0.0.1:6379".into()
    }

    // History defaults
    pub fn history_url() -> String {
        "https://api.pushshift.io/reddit/search/submission".into()
    }
    pub fn history_delay_ms() -> u64 {
        1000
    }

    // Search defaults
    pub fn lock_days() -> u64 {
        60
    }

    // Reply defaults
    pub fn could_not_parse() -> String {
        "I couldn't parse that request.\n\n".into()
    }
    pub fn help_start() -> String {
        "Here's what I can do.\n\n".into()
    }
    pub fn help_body() -> String {
        "Use `search <term> [flair]` or `find <term> [flair]` to look up archived submissions.".into()
    }
    pub fn no_results() -> String {
        "No archived submissions matched `{query}`.".into()
    }
    pub fn found_results() -> String {
        "Here's what I found for `{query}`:".into()
    }
    pub fn footer() -> String {
        "\n\n---\n\n^(I am a bot archiving this subreddit.)".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.subreddit.name = "test".to_string();
        config.reddit.username = "archivebot".to_string();
        config
    }

    #[test]
    fn validate_accepts_filled_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_subreddit() {
        assert!(Config::default().validate().is_err());
    }

    #[test]
    fn validate_rejects_tiny_limit() {
        let mut config = valid_config();
        config.subreddit.limit = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_tick() {
        let mut config = valid_config();
        config.application.tick_speed_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_blank_canonical() {
        let mut config = valid_config();
        config.search.aliases.push(AliasGroup {
            canonical: " ".to_string(),
            aliases: vec!["x".to_string()],
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let config: Config = toml::from_str(
            r#"
            [subreddit]
            name = "speedrun"

            [[search.aliases]]
            canonical = "leaderboard"
            aliases = ["lb", "boards"]
            "#,
        )
        .unwrap();

        assert_eq!(config.subreddit.name, "speedrun");
        assert_eq!(config.subreddit.limit, 100);
        assert_eq!(config.search.lock_days, 60);
        assert_eq!(config.search.aliases[0].aliases.len(), 2);
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[subreddit]\nname = \"test\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.subreddit.name, "test");
    }
}
