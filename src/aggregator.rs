use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use futures::future::join_all;
use tokio::sync::RwLock;
use tracing::{error, info};

use crate::config::{AggregatorSettings, Source};
use crate::fetcher::{fetch_source, FeedClient, SourceOutcome};
use crate::proxy::{proxy_chain, ProxyTransform};
use crate::render::{ProgressStatus, RenderTarget};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub completed: usize,
}

/// Per-run flags shared by the render continuations of one run.
#[derive(Debug, Default)]
struct RunState {
    first_rendered: AtomicBool,
    completed: AtomicUsize,
}

impl RunState {
    fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

pub struct Aggregator {
    client: Arc<dyn FeedClient>,
    proxies: Vec<ProxyTransform>,
    settings: AggregatorSettings,
}

impl Aggregator {
    pub fn new(client: Arc<dyn FeedClient>, settings: AggregatorSettings) -> Self {
        Self {
            client,
            proxies: proxy_chain(&settings.proxies),
            settings,
        }
    }

    /// Rebuild `target` from scratch and fill it from `sources`.
    ///
    /// Sources are fetched in fixed-size batches; batches run one after
    /// another, sources within a batch run concurrently. Each source is
    /// rendered by its own spawned task as soon as its fetch settles, so
    /// rendering never holds up the batch. Every source ends up as either
    /// its article cards or exactly one placeholder card.
    pub async fn run(&self, sources: &[Source], target: Arc<dyn RenderTarget>) -> RunSummary {
        target.reset(&group_categories(sources));

        let total = sources.len();
        let batch_size = self.settings.batch_size.max(1);
        let total_batches = total.div_ceil(batch_size);
        let run = Arc::new(RunState::default());
        let mut renders = Vec::with_capacity(total);
        let client = self.client.as_ref();
        let timeout = self.settings.fetch_timeout();
        let max_articles = self.settings.articles_per_source;

        info!("Loading {} feeds in {} batches", total, total_batches);

        for (index, batch) in sources.chunks(batch_size).enumerate() {
            target.update_progress(&ProgressStatus::Loading {
                current_batch: index + 1,
                total_batches,
                completed_feeds: run.completed(),
                total_feeds: total,
            });

            let handles = join_all(batch.iter().map(|source| {
                let target = target.clone();
                let run = run.clone();
                async move {
                    let outcome =
                        fetch_source(client, &self.proxies, source, timeout, max_articles).await;
                    let source = source.clone();
                    tokio::spawn(async move {
                        render_outcome(&source, outcome, target.as_ref(), &run)
                    })
                }
            }))
            .await;
            renders.extend(handles);

            tokio::time::sleep(self.settings.batch_delay()).await;
        }

        let mut succeeded = 0;
        for handle in renders {
            match handle.await {
                Ok(true) => succeeded += 1,
                Ok(false) => {}
                Err(e) => error!("Render task failed: {}", e),
            }
        }

        target.update_progress(&ProgressStatus::Complete {
            total_feeds: total,
            updated_at: Local::now().format("%I:%M:%S %p").to_string(),
        });

        let summary = RunSummary {
            total,
            succeeded,
            failed: total - succeeded,
            completed: run.completed(),
        };
        info!(
            "Feed run complete: {} loaded, {} failed",
            summary.succeeded, summary.failed
        );
        summary
    }
}

/// Returns true when the source rendered articles.
fn render_outcome(
    source: &Source,
    outcome: SourceOutcome,
    target: &dyn RenderTarget,
    run: &RunState,
) -> bool {
    let loaded = match outcome {
        SourceOutcome::Loaded(articles) if !articles.is_empty() => {
            for article in &articles {
                target.append_article(source, article);
            }
            true
        }
        _ => {
            target.append_error_placeholder(source);
            false
        }
    };

    if !run.first_rendered.swap(true, Ordering::SeqCst) {
        target.remove_spinner();
    }
    target.relocate_progress_indicator(&source.category);
    run.completed.fetch_add(1, Ordering::SeqCst);

    loaded
}

/// Distinct categories in first-seen order.
pub fn group_categories(sources: &[Source]) -> Vec<String> {
    let mut categories: Vec<String> = Vec::new();
    for source in sources {
        if !categories.contains(&source.category) {
            categories.push(source.category.clone());
        }
    }
    categories
}

/// Owns the configured sources and the page they render into, and keeps
/// runs from overlapping.
pub struct Refresher {
    aggregator: Aggregator,
    sources: Vec<Source>,
    target: Arc<dyn RenderTarget>,
    refreshing: Arc<RwLock<bool>>,
}

impl Refresher {
    pub fn new(aggregator: Aggregator, sources: Vec<Source>, target: Arc<dyn RenderTarget>) -> Self {
        Self {
            aggregator,
            sources,
            target,
            refreshing: Arc::new(RwLock::new(false)),
        }
    }

    pub async fn is_refreshing(&self) -> bool {
        *self.refreshing.read().await
    }

    /// Run the aggregator once. Returns `None` if a run is already going.
    pub async fn refresh_all_feeds(&self) -> Option<RunSummary> {
        {
            let mut refreshing = self.refreshing.write().await;
            if *refreshing {
                info!("Refresh already in progress, skipping");
                return None;
            }
            *refreshing = true;
        }

        let summary = self
            .aggregator
            .run(&self.sources, self.target.clone())
            .await;

        {
            let mut refreshing = self.refreshing.write().await;
            *refreshing = false;
        }

        Some(summary)
    }
}

pub async fn start_background_refresh(refresher: Arc<Refresher>, interval_minutes: u64) {
    let interval = Duration::from_secs(interval_minutes.max(1) * 60);

    info!("Starting initial feed run");
    refresher.refresh_all_feeds().await;

    loop {
        tokio::time::sleep(interval).await;
        info!("Auto-refreshing feeds");
        refresher.refresh_all_feeds().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article::Article;
    use crate::error::FetchError;
    use crate::render::PageState;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn rss_with(count: usize, name: &str) -> String {
        let items: String = (1..=count)
            .map(|i| {
                format!(
                    "<item><title>{name} story {i}</title><link>https://{name}.example/{i}</link></item>"
                )
            })
            .collect();
        format!(
            r#"<?xml version="1.0"?><rss version="2.0"><channel><title>{name}</title><link>https://{name}.example</link><description>d</description>{items}</channel></rss>"#
        )
    }

    fn source(category: &str, name: &str) -> Source {
        Source {
            url: format!("https://{}.example/rss", name),
            category: category.to_string(),
            source_name: name.to_string(),
            source_link: format!("https://{}.example", name),
            custom_image: None,
        }
    }

    fn settings() -> AggregatorSettings {
        AggregatorSettings {
            batch_delay_ms: 1,
            proxies: vec!["https://relay/{url}".to_string()],
            ..AggregatorSettings::default()
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Start(String),
        End(String),
    }

    /// Serves fixed bodies per feed URL, records start/end of each request.
    #[derive(Default)]
    struct FakeClient {
        bodies: HashMap<String, String>,
        delay: Duration,
        events: Mutex<Vec<Event>>,
    }

    impl FakeClient {
        fn with(bodies: Vec<(String, String)>) -> Self {
            Self {
                bodies: bodies.into_iter().collect(),
                ..Self::default()
            }
        }

        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl FeedClient for FakeClient {
        async fn get_text(&self, url: &str, _timeout: Duration) -> Result<String, FetchError> {
            let target = urlencoding::decode(url.trim_start_matches("https://relay/"))
                .map(|s| s.into_owned())
                .unwrap_or_default();
            self.events.lock().unwrap().push(Event::Start(target.clone()));
            tokio::time::sleep(self.delay).await;
            self.events.lock().unwrap().push(Event::End(target.clone()));
            self.bodies
                .get(&target)
                .cloned()
                .ok_or(FetchError::HttpStatus(404))
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Reset(Vec<String>),
        Article(String, String),
        Placeholder(String),
        Relocate(String),
        RemoveSpinner,
        Progress(ProgressStatus),
    }

    #[derive(Default)]
    struct RecordingTarget {
        calls: Mutex<Vec<Call>>,
    }

    impl RecordingTarget {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }
    }

    impl RenderTarget for RecordingTarget {
        fn reset(&self, categories: &[String]) {
            self.record(Call::Reset(categories.to_vec()));
        }

        fn append_article(&self, source: &Source, article: &Article) {
            self.record(Call::Article(source.source_name.clone(), article.title.clone()));
        }

        fn append_error_placeholder(&self, source: &Source) {
            self.record(Call::Placeholder(source.source_name.clone()));
        }

        fn relocate_progress_indicator(&self, category: &str) {
            self.record(Call::Relocate(category.to_string()));
        }

        fn remove_spinner(&self) {
            self.record(Call::RemoveSpinner);
        }

        fn update_progress(&self, status: &ProgressStatus) {
            self.record(Call::Progress(status.clone()));
        }
    }

    #[test]
    fn test_group_categories_first_seen_order() {
        let sources = vec![
            source("World", "a"),
            source("Tech", "b"),
            source("World", "c"),
            source("Sports", "d"),
        ];
        assert_eq!(group_categories(&sources), vec!["World", "Tech", "Sports"]);
    }

    #[tokio::test]
    async fn test_every_source_renders_exactly_once() {
        let sources: Vec<Source> = (0..7)
            .map(|i| source(if i % 2 == 0 { "World" } else { "Tech" }, &format!("s{}", i)))
            .collect();
        // Odd sources have no body and fail.
        let bodies = sources
            .iter()
            .enumerate()
            .filter(|(i, _)| i % 2 == 0)
            .map(|(i, s)| (s.url.clone(), rss_with(i % 3 + 1, &s.source_name)))
            .collect();
        let client = Arc::new(FakeClient::with(bodies));
        let target = Arc::new(RecordingTarget::default());

        let aggregator = Aggregator::new(client, settings());
        let summary = aggregator.run(&sources, target.clone()).await;

        assert_eq!(summary.total, 7);
        assert_eq!(summary.succeeded, 4);
        assert_eq!(summary.failed, 3);
        assert_eq!(summary.completed, 7);

        let calls = target.calls();
        for (i, s) in sources.iter().enumerate() {
            let articles = calls
                .iter()
                .filter(|c| matches!(c, Call::Article(name, _) if name == &s.source_name))
                .count();
            let placeholders = calls
                .iter()
                .filter(|c| matches!(c, Call::Placeholder(name) if name == &s.source_name))
                .count();
            if i % 2 == 0 {
                assert_eq!(articles, (i % 3 + 1).min(2), "source {}", s.source_name);
                assert_eq!(placeholders, 0);
            } else {
                assert_eq!(articles, 0);
                assert_eq!(placeholders, 1, "source {}", s.source_name);
            }
        }
    }

    #[tokio::test]
    async fn test_spinner_removed_once_and_reset_first() {
        let sources = vec![source("World", "a"), source("World", "b"), source("Tech", "c")];
        let client = Arc::new(FakeClient::default());
        let target = Arc::new(RecordingTarget::default());

        Aggregator::new(client, settings())
            .run(&sources, target.clone())
            .await;

        let calls = target.calls();
        assert_eq!(
            calls[0],
            Call::Reset(vec!["World".to_string(), "Tech".to_string()])
        );
        assert_eq!(calls.iter().filter(|c| **c == Call::RemoveSpinner).count(), 1);
        assert_eq!(
            calls.iter().filter(|c| matches!(c, Call::Relocate(_))).count(),
            3
        );
    }

    #[tokio::test]
    async fn test_progress_reports_batches_then_completion() {
        let sources: Vec<Source> = (0..11).map(|i| source("World", &format!("s{}", i))).collect();
        let client = Arc::new(FakeClient::default());
        let target = Arc::new(RecordingTarget::default());

        Aggregator::new(client, settings())
            .run(&sources, target.clone())
            .await;

        let progress: Vec<ProgressStatus> = target
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Progress(status) => Some(status),
                _ => None,
            })
            .collect();

        assert_eq!(progress.len(), 4);
        for (i, status) in progress.iter().take(3).enumerate() {
            match status {
                ProgressStatus::Loading {
                    current_batch,
                    total_batches,
                    total_feeds,
                    ..
                } => {
                    assert_eq!(*current_batch, i + 1);
                    assert_eq!(*total_batches, 3);
                    assert_eq!(*total_feeds, 11);
                }
                other => panic!("unexpected status {:?}", other),
            }
        }
        assert!(matches!(
            progress[3],
            ProgressStatus::Complete { total_feeds: 11, .. }
        ));
    }

    #[tokio::test]
    async fn test_batches_do_not_overlap() {
        let sources: Vec<Source> = (0..12).map(|i| source("World", &format!("s{}", i))).collect();
        let client = Arc::new(FakeClient {
            delay: Duration::from_millis(5),
            ..FakeClient::default()
        });
        let target = Arc::new(RecordingTarget::default());

        Aggregator::new(client.clone(), settings())
            .run(&sources, target)
            .await;

        let events = client.events();
        let batch_of = |url: &str| {
            sources
                .iter()
                .position(|s| s.url == url)
                .map(|i| i / 5)
                .unwrap()
        };

        for (i, event) in events.iter().enumerate() {
            if let Event::Start(url) = event {
                let batch = batch_of(url);
                // Every request from an earlier batch must have ended already.
                for earlier in &sources[..batch * 5] {
                    assert!(
                        events[..i].contains(&Event::End(earlier.url.clone())),
                        "{} started before {} ended",
                        url,
                        earlier.url
                    );
                }
            }
        }
    }

    #[tokio::test]
    async fn test_batch_members_run_concurrently() {
        let sources: Vec<Source> = (0..3).map(|i| source("World", &format!("s{}", i))).collect();
        let client = Arc::new(FakeClient {
            delay: Duration::from_millis(20),
            ..FakeClient::default()
        });
        let target = Arc::new(RecordingTarget::default());

        Aggregator::new(client.clone(), settings())
            .run(&sources, target)
            .await;

        let events = client.events();
        let starts_before_first_end = events
            .iter()
            .take_while(|e| matches!(e, Event::Start(_)))
            .count();
        assert_eq!(starts_before_first_end, 3);
    }

    #[tokio::test]
    async fn test_empty_source_list_completes() {
        let client = Arc::new(FakeClient::default());
        let target = Arc::new(RecordingTarget::default());

        let summary = Aggregator::new(client, settings())
            .run(&[], target.clone())
            .await;

        assert_eq!(summary, RunSummary::default());
        let calls = target.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(
            calls[1],
            Call::Progress(ProgressStatus::Complete { total_feeds: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_rerun_rebuilds_page_without_duplicates() {
        let sources = vec![source("World", "a"), source("Tech", "b")];
        let bodies = vec![(sources[0].url.clone(), rss_with(3, "a"))];
        let client = Arc::new(FakeClient::with(bodies));
        let page = PageState::default();

        let aggregator = Aggregator::new(client, settings());
        aggregator.run(&sources, Arc::new(page.clone())).await;
        let first = page.snapshot();
        aggregator.run(&sources, Arc::new(page.clone())).await;
        let second = page.snapshot();

        assert_eq!(first.card_count(), 3);
        assert_eq!(second.card_count(), 3);
        assert_eq!(second.section("World").unwrap().cards.len(), 2);
        assert!(second.section("Tech").unwrap().cards[0].is_placeholder());
        assert!(!second.spinner);
        assert!(second.progress.unwrap().is_complete());
    }

    #[tokio::test]
    async fn test_refresher_skips_overlapping_runs() {
        let sources = vec![source("World", "a")];
        let client = Arc::new(FakeClient {
            delay: Duration::from_millis(50),
            ..FakeClient::default()
        });
        let refresher = Arc::new(Refresher::new(
            Aggregator::new(client, settings()),
            sources,
            Arc::new(PageState::default()),
        ));

        let background = refresher.clone();
        let first = tokio::spawn(async move { background.refresh_all_feeds().await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(refresher.is_refreshing().await);
        assert!(refresher.refresh_all_feeds().await.is_none());

        let summary = first.await.unwrap().unwrap();
        assert_eq!(summary.completed, 1);
        assert!(!refresher.is_refreshing().await);
    }
}
