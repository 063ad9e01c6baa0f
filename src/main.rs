use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use news_portal::aggregator::{start_background_refresh, Aggregator, Refresher};
use news_portal::config::{Config, SearchSettings};
use news_portal::cse::CseFallback;
use news_portal::fetcher::{FeedClient, ReqwestFeedClient};
use news_portal::news::{NewsSearch, GOOGLE_NEWS_SEARCH};
use news_portal::render::{Page, PageState};
use news_portal::routes::{self, AppState};
use news_portal::suggest::{Suggestions, GOOGLE_SUGGEST};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "news_portal=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let client: Arc<dyn FeedClient> = Arc::new(ReqwestFeedClient::new()?);

    // Load configuration; without it the page shows an error and no feeds run
    let config_path = std::env::var("FEEDS_CONFIG").unwrap_or_else(|_| "feeds.toml".to_string());
    let (page, refresher, search) = match Config::load(&config_path) {
        Ok(config) => {
            info!("Loaded {} feeds from configuration", config.feeds.len());
            let page = PageState::default();
            let refresher = Arc::new(Refresher::new(
                Aggregator::new(client.clone(), config.aggregator.clone()),
                config.feeds.clone(),
                Arc::new(page.clone()),
            ));

            let bg_refresher = refresher.clone();
            let refresh_interval = config.refresh_interval;
            tokio::spawn(async move {
                start_background_refresh(bg_refresher, refresh_interval).await;
            });

            (page, Some(refresher), config.search)
        }
        Err(e) => {
            error!("Cannot start feed aggregation: {}", e);
            let page = PageState::new(Page::with_error(format!("Error: {}", e)));
            (page, None, SearchSettings::default())
        }
    };

    // Create app state
    let state = Arc::new(AppState {
        page,
        refresher,
        cse: Arc::new(RwLock::new(CseFallback::new(
            search.cse_ids,
            Duration::from_secs(search.init_timeout_secs),
        ))),
        news: Arc::new(NewsSearch::new(
            client.clone(),
            GOOGLE_NEWS_SEARCH,
            Duration::from_secs(10),
        )),
        suggest: Arc::new(Suggestions::new(client, GOOGLE_SUGGEST, Duration::from_secs(3))),
    });

    // Build router
    let app = routes::router(state)
        .nest_service("/static", ServeDir::new("static"))
        .layer(TraceLayer::new_for_http());

    // Start server
    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
    info!("Server starting on http://localhost:3000");

    axum::serve(listener, app).await?;

    Ok(())
}
