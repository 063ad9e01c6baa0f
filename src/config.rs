use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::PortalError;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Refresh interval in minutes
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: u64,
    #[serde(default)]
    pub aggregator: AggregatorSettings,
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(default)]
    pub feeds: Vec<Source>,
}

fn default_refresh_interval() -> u64 {
    30
}

/// One feed to aggregate. Sources are grouped on the page by `category`.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Source {
    pub url: String,
    pub category: String,
    pub source_name: String,
    pub source_link: String,
    #[serde(default)]
    pub custom_image: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AggregatorSettings {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_articles_per_source")]
    pub articles_per_source: usize,
    /// Proxy URL templates, tried in order. `{url}` is replaced with the
    /// percent-encoded feed URL.
    #[serde(default = "default_proxies")]
    pub proxies: Vec<String>,
}

fn default_batch_size() -> usize {
    5
}

fn default_batch_delay_ms() -> u64 {
    50
}

fn default_fetch_timeout_secs() -> u64 {
    4
}

fn default_articles_per_source() -> usize {
    2
}

fn default_proxies() -> Vec<String> {
    vec![
        "https://api.codetabs.com/v1/proxy?quest={url}".to_string(),
        "https://corsproxy.io/?{url}".to_string(),
        "https://api.allorigins.win/raw?url={url}".to_string(),
    ]
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            articles_per_source: default_articles_per_source(),
            proxies: default_proxies(),
        }
    }
}

impl AggregatorSettings {
    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchSettings {
    /// Custom search engine ids; the first is primary, the rest are backups.
    #[serde(default = "default_cse_ids")]
    pub cse_ids: Vec<String>,
    #[serde(default = "default_init_timeout_secs")]
    pub init_timeout_secs: u64,
}

fn default_cse_ids() -> Vec<String> {
    vec![
        "c7967e2021dc3441d".to_string(),
        "31487ed7aad2c49ac".to_string(),
        "704b41ddf50d943fa".to_string(),
    ]
}

fn default_init_timeout_secs() -> u64 {
    5
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            cse_ids: default_cse_ids(),
            init_timeout_secs: default_init_timeout_secs(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PortalError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PortalError::ConfigMissing(path.display().to_string())
            } else {
                PortalError::Io(e)
            }
        })?;
        let config = Self::from_str(&content)?;
        if config.feeds.is_empty() {
            return Err(PortalError::ConfigMissing(format!(
                "{} defines no feeds",
                path.display()
            )));
        }
        Ok(config)
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> Result<Self, PortalError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }
}
