use thiserror::Error;

/// Why a single proxy attempt for a feed failed. Every variant is recovered
/// by moving on to the next proxy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("HTTP {0}")]
    HttpStatus(u16),

    #[error("feed parsing failed: {0}")]
    Parse(String),

    #[error("feed has no items")]
    NoItems,
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = err.status() {
            FetchError::HttpStatus(status.as_u16())
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

impl From<feed_rs::parser::ParseFeedError> for FetchError {
    fn from(err: feed_rs::parser::ParseFeedError) -> Self {
        FetchError::Parse(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum PortalError {
    #[error("feed configuration missing: {0}")]
    ConfigMissing(String),

    #[error("invalid feed configuration: {0}")]
    ConfigInvalid(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
