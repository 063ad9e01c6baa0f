use chrono::{DateTime, Local, TimeZone, Utc};
use feed_rs::model::{Entry, Feed};
use feed_rs::parser;

use crate::config::Source;
use crate::error::FetchError;

pub const MAX_TITLE_CHARS: usize = 70;
pub const DEFAULT_TITLE: &str = "No title";
pub const DEFAULT_LINK: &str = "#";
pub const RECENT: &str = "Recent";
pub const PLACEHOLDER_IMAGE: &str =
    "https://raw.githubusercontent.com/playerauth/Images/refs/heads/main/news.jpg";

/// One rendered headline, derived from a single feed item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    pub title: String,
    pub link: String,
    pub date: String,
    pub img: String,
}

/// Parse a feed body and keep the first `max` items as articles.
///
/// A body that is not a recognizable feed, or a feed with no items, is an
/// error so the caller can try the next proxy.
pub fn parse_articles(body: &str, source: &Source, max: usize) -> Result<Vec<Article>, FetchError> {
    let feed: Feed = parser::parse(body.as_bytes())?;
    if feed.entries.is_empty() {
        return Err(FetchError::NoItems);
    }

    Ok(feed
        .entries
        .iter()
        .take(max)
        .map(|entry| extract_article(entry, source))
        .collect())
}

pub fn extract_article(entry: &Entry, source: &Source) -> Article {
    let raw_title = entry
        .title
        .as_ref()
        .map(|t| t.content.as_str())
        .unwrap_or_default();

    let link = entry
        .links
        .iter()
        .map(|l| l.href.trim())
        .find(|href| !href.is_empty())
        .unwrap_or(DEFAULT_LINK)
        .to_string();

    Article {
        title: clean_title(raw_title),
        link,
        date: format_date(entry.published.as_ref(), &Local),
        img: pick_image(entry, source),
    }
}

/// Strip CDATA markers, trim, default and truncate to
/// [`MAX_TITLE_CHARS`] characters plus an ellipsis.
pub fn clean_title(raw: &str) -> String {
    let title = raw.replace("<![CDATA[", "").replace("]]>", "");
    let title = title.trim();
    if title.is_empty() {
        return DEFAULT_TITLE.to_string();
    }

    if title.chars().count() > MAX_TITLE_CHARS {
        let mut truncated: String = title.chars().take(MAX_TITLE_CHARS).collect();
        truncated.push('…');
        truncated
    } else {
        title.to_string()
    }
}

/// Render a publish date as `M/D/YYYY HH:MM AM` in `tz`, or "Recent".
pub fn format_date<Tz>(published: Option<&DateTime<Utc>>, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    match published {
        Some(dt) => dt
            .with_timezone(tz)
            .format("%-m/%-d/%Y %I:%M %p")
            .to_string(),
        None => RECENT.to_string(),
    }
}

/// Image-typed media (enclosures included) wins over untyped media, then
/// thumbnails, then the source's own image, then the generic placeholder.
pub fn pick_image(entry: &Entry, source: &Source) -> String {
    let contents = entry.media.iter().flat_map(|m| m.content.iter());

    let typed = contents.clone().find_map(|c| {
        let is_image = c
            .content_type
            .as_ref()
            .is_some_and(|ct| ct.to_string().starts_with("image/"));
        if is_image {
            c.url.as_ref().map(|u| u.to_string())
        } else {
            None
        }
    });

    let untyped = || {
        contents
            .clone()
            .filter(|c| c.content_type.is_none())
            .find_map(|c| c.url.as_ref().map(|u| u.to_string()))
    };

    let thumbnail = || {
        entry
            .media
            .iter()
            .flat_map(|m| m.thumbnails.iter())
            .map(|t| t.image.uri.clone())
            .find(|uri| !uri.is_empty())
    };

    typed
        .or_else(untyped)
        .or_else(thumbnail)
        .or_else(|| source.custom_image.clone().filter(|img| !img.is_empty()))
        .unwrap_or_else(|| PLACEHOLDER_IMAGE.to_string())
}
