use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::error::FetchError;
use crate::fetcher::FeedClient;

pub const GOOGLE_SUGGEST: &str = "https://suggestqueries.google.com/complete/search";
const MAX_SUGGESTIONS: usize = 10;

/// Search-as-you-type completions from a suggest endpoint that answers
/// `["query", ["completion", ...], ...]`.
pub struct Suggestions {
    client: Arc<dyn FeedClient>,
    base_url: String,
    timeout: Duration,
}

impl Suggestions {
    pub fn new(client: Arc<dyn FeedClient>, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            timeout,
        }
    }

    pub fn suggest_url(&self, query: &str) -> String {
        format!("{}?client=chrome&q={}", self.base_url, urlencoding::encode(query))
    }

    pub async fn suggest(&self, query: &str) -> Result<Vec<String>, FetchError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let body = self.client.get_text(&self.suggest_url(query), self.timeout).await?;
        let completions = parse_completions(&body)?;
        debug!("{} suggestions for '{}'", completions.len(), query);
        Ok(completions)
    }
}

fn parse_completions(body: &str) -> Result<Vec<String>, FetchError> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| FetchError::Parse(e.to_string()))?;

    Ok(value
        .get(1)
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(Value::as_str)
                .take(MAX_SUGGESTIONS)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default())
}
