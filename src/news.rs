use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone, Utc};
use feed_rs::parser;
use tracing::info;

use crate::error::FetchError;
use crate::fetcher::FeedClient;

pub const DEFAULT_TOPIC: &str = "technology";
pub const GOOGLE_NEWS_SEARCH: &str = "https://news.google.com/rss/search";
const MAX_RESULTS: usize = 10;
const THUMBNAIL_BASE: &str = "https://raw.githubusercontent.com/playerauth/Images/refs/heads/main";
const THUMBNAIL_COUNT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsItem {
    pub title: String,
    pub link: String,
    pub date: String,
    pub thumbnail: String,
}

/// Topic search over a news RSS search endpoint.
pub struct NewsSearch {
    client: Arc<dyn FeedClient>,
    base_url: String,
    timeout: Duration,
}

impl NewsSearch {
    pub fn new(client: Arc<dyn FeedClient>, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            timeout,
        }
    }

    pub fn search_url(&self, topic: &str) -> String {
        format!("{}?q={}", self.base_url, urlencoding::encode(topic))
    }

    /// Up to ten headlines for `topic`, each with a rotating thumbnail.
    pub async fn search(&self, topic: &str) -> Result<Vec<NewsItem>, FetchError> {
        let body = self.client.get_text(&self.search_url(topic), self.timeout).await?;
        let feed = parser::parse(body.as_bytes())?;

        let items: Vec<NewsItem> = feed
            .entries
            .iter()
            .take(MAX_RESULTS)
            .enumerate()
            .map(|(index, entry)| NewsItem {
                title: entry
                    .title
                    .as_ref()
                    .map(|t| t.content.trim().to_string())
                    .unwrap_or_default(),
                link: entry
                    .links
                    .first()
                    .map(|l| l.href.clone())
                    .unwrap_or_default(),
                date: format_day(entry.published.as_ref(), &Local),
                thumbnail: thumbnail(index),
            })
            .collect();

        info!("News search for '{}' returned {} items", topic, items.len());
        Ok(items)
    }
}

pub fn thumbnail(index: usize) -> String {
    format!("{}/rss{}.jpg", THUMBNAIL_BASE, index % THUMBNAIL_COUNT + 1)
}

pub fn format_day<Tz>(published: Option<&DateTime<Utc>>, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    published
        .map(|dt| dt.with_timezone(tz).format("%-m/%-d/%Y").to_string())
        .unwrap_or_default()
}
