//! Page model the aggregator renders into, and the seam it renders through.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::article::Article;
use crate::config::Source;

pub const PRIVATE_IMAGE: &str =
    "https://raw.githubusercontent.com/playerauth/Images/refs/heads/main/private.jpg";
pub const BROKEN_IMAGE_FALLBACK: &str = "https://placehold.co/600x400?text=News";
pub const PLACEHOLDER_MESSAGE: &str = "Secured News. If you want to see visit source.";

/// Where a run currently stands, as shown by the shared progress indicator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressStatus {
    Initializing,
    Loading {
        current_batch: usize,
        total_batches: usize,
        completed_feeds: usize,
        total_feeds: usize,
    },
    Complete {
        total_feeds: usize,
        updated_at: String,
    },
}

impl ProgressStatus {
    pub fn message(&self) -> String {
        match self {
            ProgressStatus::Initializing => "Initializing feeds...".to_string(),
            ProgressStatus::Loading {
                current_batch,
                total_batches,
                completed_feeds,
                total_feeds,
            } => format!(
                "Loading batch {}/{} ({}/{} feeds)...",
                current_batch, total_batches, completed_feeds, total_feeds
            ),
            ProgressStatus::Complete {
                total_feeds,
                updated_at,
            } => format!(
                "All {} feeds loaded. Last updated: {}",
                total_feeds, updated_at
            ),
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, ProgressStatus::Complete { .. })
    }
}

/// Everything the aggregator does to the page goes through here.
pub trait RenderTarget: Send + Sync {
    /// Drop all previous sections and cards, then create one empty section
    /// per category (in order) followed by the progress indicator.
    fn reset(&self, categories: &[String]);
    fn append_article(&self, source: &Source, article: &Article);
    fn append_error_placeholder(&self, source: &Source);
    /// Move the progress indicator to just after `category`'s section.
    fn relocate_progress_indicator(&self, category: &str);
    fn remove_spinner(&self);
    fn update_progress(&self, status: &ProgressStatus);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    pub source_name: String,
    pub source_link: String,
    /// `None` renders the "secured news" placeholder for a failed source.
    pub article: Option<Article>,
}

impl Card {
    pub fn is_placeholder(&self) -> bool {
        self.article.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub category: String,
    pub cards: Vec<Card>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressIndicator {
    pub status: ProgressStatus,
    /// Category the indicator follows; `None` means after every section.
    pub after: Option<String>,
}

impl ProgressIndicator {
    pub fn message(&self) -> String {
        self.status.message()
    }

    pub fn is_complete(&self) -> bool {
        self.status.is_complete()
    }

    pub fn follows(&self, category: &str) -> bool {
        self.after.as_deref() == Some(category)
    }

    pub fn at_end(&self) -> bool {
        self.after.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub sections: Vec<Section>,
    pub progress: Option<ProgressIndicator>,
    pub spinner: bool,
    pub error: Option<String>,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            sections: Vec::new(),
            progress: None,
            spinner: true,
            error: None,
        }
    }
}

impl Page {
    /// A page that only carries a blocking error.
    pub fn with_error(message: impl Into<String>) -> Self {
        Self {
            spinner: false,
            error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn section(&self, category: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.category == category)
    }

    fn section_mut(&mut self, category: &str) -> Option<&mut Section> {
        self.sections.iter_mut().find(|s| s.category == category)
    }

    pub fn card_count(&self) -> usize {
        self.sections.iter().map(|s| s.cards.len()).sum()
    }
}

/// Shared handle to the live page; clones observe the same page.
#[derive(Debug, Clone, Default)]
pub struct PageState {
    inner: Arc<RwLock<Page>>,
}

impl PageState {
    pub fn new(page: Page) -> Self {
        Self {
            inner: Arc::new(RwLock::new(page)),
        }
    }

    pub fn snapshot(&self) -> Page {
        self.read().clone()
    }

    fn read(&self) -> RwLockReadGuard<'_, Page> {
        // A panicking writer leaves the page usable; keep serving it.
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Page> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    fn push_card(&self, category: &str, card: Card) {
        if let Some(section) = self.write().section_mut(category) {
            section.cards.push(card);
        }
    }
}

impl RenderTarget for PageState {
    fn reset(&self, categories: &[String]) {
        let mut page = self.write();
        page.sections = categories
            .iter()
            .map(|category| Section {
                category: category.clone(),
                cards: Vec::new(),
            })
            .collect();
        page.progress = Some(ProgressIndicator {
            status: ProgressStatus::Initializing,
            after: None,
        });
        page.error = None;
    }

    fn append_article(&self, source: &Source, article: &Article) {
        self.push_card(
            &source.category,
            Card {
                source_name: source.source_name.clone(),
                source_link: source.source_link.clone(),
                article: Some(article.clone()),
            },
        );
    }

    fn append_error_placeholder(&self, source: &Source) {
        self.push_card(
            &source.category,
            Card {
                source_name: source.source_name.clone(),
                source_link: source.source_link.clone(),
                article: None,
            },
        );
    }

    fn relocate_progress_indicator(&self, category: &str) {
        let mut page = self.write();
        let known = page.section(category).is_some();
        if let Some(progress) = page.progress.as_mut() {
            if known {
                progress.after = Some(category.to_string());
            }
        }
    }

    fn remove_spinner(&self) {
        self.write().spinner = false;
    }

    fn update_progress(&self, status: &ProgressStatus) {
        let mut page = self.write();
        let progress = page.progress.get_or_insert_with(|| ProgressIndicator {
            status: ProgressStatus::Initializing,
            after: None,
        });
        progress.status = status.clone();
    }
}
