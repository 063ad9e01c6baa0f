use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use crate::article::{parse_articles, Article};
use crate::config::Source;
use crate::error::FetchError;
use crate::proxy::ProxyTransform;

#[async_trait]
pub trait FeedClient: Send + Sync {
    /// Fetch `url` and return its body, failing on timeout or non-2xx status.
    async fn get_text(&self, url: &str, timeout: Duration) -> Result<String, FetchError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestFeedClient {
    client: Client,
}

impl ReqwestFeedClient {
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent("NewsPortal/1.0 (Feed Aggregator)")
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl FeedClient for ReqwestFeedClient {
    async fn get_text(&self, url: &str, timeout: Duration) -> Result<String, FetchError> {
        let attempt = async {
            let response = self.client.get(url).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::HttpStatus(status.as_u16()));
            }
            Ok::<String, FetchError>(response.text().await?)
        };

        tokio::time::timeout(timeout, attempt)
            .await
            .map_err(|_| FetchError::Timeout)?
    }
}

/// How one source ended up after walking the proxy chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOutcome {
    Loaded(Vec<Article>),
    Failed,
}

/// Try each proxy in order, stopping at the first one that yields at least
/// one article. Failures are logged and absorbed.
pub async fn fetch_source<C: FeedClient + ?Sized>(
    client: &C,
    proxies: &[ProxyTransform],
    source: &Source,
    timeout: Duration,
    max_articles: usize,
) -> SourceOutcome {
    for (index, proxy) in proxies.iter().enumerate() {
        let proxied = proxy.apply(&source.url);
        let result = match client.get_text(&proxied, timeout).await {
            Ok(body) => parse_articles(&body, source, max_articles),
            Err(e) => Err(e),
        };

        match result {
            Ok(articles) if !articles.is_empty() => {
                debug!(
                    "Loaded {} articles for '{}' via proxy {}",
                    articles.len(),
                    source.source_name,
                    index + 1
                );
                return SourceOutcome::Loaded(articles);
            }
            Ok(_) => {
                debug!("Proxy {} returned no articles for '{}'", index + 1, source.source_name);
            }
            Err(e) => {
                debug!("Proxy {} failed for '{}': {}", index + 1, source.source_name, e);
            }
        }
    }

    warn!("All proxies failed for '{}' ({})", source.source_name, source.url);
    SourceOutcome::Failed
}
