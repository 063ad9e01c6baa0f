//! CORS relay URL rewriting.

const URL_PLACEHOLDER: &str = "{url}";

/// Maps a feed URL onto a third-party relay that returns the feed body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyTransform {
    template: String,
}

impl ProxyTransform {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Build the relayed URL for `target`. Templates without a `{url}`
    /// placeholder get the encoded target appended.
    pub fn apply(&self, target: &str) -> String {
        let encoded = urlencoding::encode(target);
        if self.template.contains(URL_PLACEHOLDER) {
            self.template.replace(URL_PLACEHOLDER, &encoded)
        } else {
            format!("{}{}", self.template, encoded)
        }
    }
}

pub fn proxy_chain(templates: &[String]) -> Vec<ProxyTransform> {
    templates.iter().map(ProxyTransform::new).collect()
}
