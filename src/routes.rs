use std::sync::Arc;

use askama::Template;
use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::warn;

use crate::aggregator::Refresher;
use crate::cse::CseFallback;
use crate::news::{NewsItem, NewsSearch, DEFAULT_TOPIC};
use crate::render::{Page, PageState, BROKEN_IMAGE_FALLBACK, PLACEHOLDER_MESSAGE, PRIVATE_IMAGE};
use crate::suggest::Suggestions;

pub const SERVICE_WORKER_JS: &str = r#"// No caching, only install prompt support.
self.addEventListener('install', (e) => {
  self.skipWaiting();
});

self.addEventListener('activate', (e) => {
  e.waitUntil(clients.claim());
});
"#;

pub struct AppState {
    pub page: PageState,
    /// `None` when the feed configuration could not be loaded.
    pub refresher: Option<Arc<Refresher>>,
    pub cse: Arc<RwLock<CseFallback>>,
    pub news: Arc<NewsSearch>,
    pub suggest: Arc<Suggestions>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/feeds", get(feeds))
        .route("/refresh", post(refresh))
        .route("/refresh/status", get(refresh_status))
        .route("/health", get(health))
        .route("/search", get(search))
        .route("/suggest", get(suggest))
        .route("/results", get(results))
        .route("/news", get(news))
        .route("/cse", get(cse_current))
        .route("/cse/loaded", post(cse_loaded))
        .route("/cse/ready", post(cse_ready))
        .route("/cse/timeout", post(cse_timeout))
        .route("/cse/failed", post(cse_failed))
        .route("/service-worker.js", get(service_worker))
        .with_state(state)
}

// Template structs
#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub feeds: FeedsTemplate,
}

/// The feed container. While a run is in flight it polls itself so cards
/// and the progress line show up as sources settle.
#[derive(Template)]
#[template(path = "feeds.html")]
pub struct FeedsTemplate {
    pub page: Page,
    pub polling: bool,
    pub fallback_image: &'static str,
    pub private_image: &'static str,
    pub placeholder_message: &'static str,
}

#[derive(Template)]
#[template(path = "progress.html")]
pub struct ProgressTemplate {
    pub message: String,
    pub complete: bool,
    pub refreshing: bool,
}

#[derive(Template)]
#[template(path = "results.html")]
pub struct ResultsTemplate {
    pub query: String,
    pub executed_query: String,
    pub ai_tab: bool,
    pub cx: String,
    pub script_url: String,
    pub init_timeout_ms: u64,
}

#[derive(Template)]
#[template(path = "news.html")]
pub struct NewsTemplate {
    pub topic: String,
    pub items: Vec<NewsItem>,
    pub failed: bool,
}

#[derive(Template)]
#[template(path = "suggestions.html")]
pub struct SuggestionsTemplate {
    pub suggestions: Vec<String>,
}

// Wrapper for HTML responses
struct HtmlTemplate<T>(T);

impl<T: Template> IntoResponse for HtmlTemplate<T> {
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(html) => Html(html).into_response(),
            Err(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to render template: {}", err),
            )
                .into_response(),
        }
    }
}

// Custom error type
pub struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Error: {}", self.0),
        )
            .into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(err: E) -> Self {
        AppError(err.into())
    }
}

async fn is_refreshing(state: &AppState) -> bool {
    match state.refresher.as_ref() {
        Some(refresher) => refresher.is_refreshing().await,
        None => false,
    }
}

fn feeds_fragment(page: Page, polling: bool) -> FeedsTemplate {
    FeedsTemplate {
        page,
        polling,
        fallback_image: BROKEN_IMAGE_FALLBACK,
        private_image: PRIVATE_IMAGE,
        placeholder_message: PLACEHOLDER_MESSAGE,
    }
}

/// Keep polling until the current run has finished, unless the page only
/// carries a configuration error.
async fn current_feeds(state: &AppState) -> FeedsTemplate {
    let page = state.page.snapshot();
    let running = is_refreshing(state).await
        || !page.progress.as_ref().is_some_and(|p| p.is_complete());
    let polling = page.error.is_none() && running;
    feeds_fragment(page, polling)
}

// Route handlers
pub async fn index(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    HtmlTemplate(IndexTemplate {
        feeds: current_feeds(&state).await,
    })
}

pub async fn feeds(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    HtmlTemplate(current_feeds(&state).await)
}

fn progress_fragment(page: &Page, refreshing: bool) -> ProgressTemplate {
    match page.progress.as_ref() {
        Some(progress) => ProgressTemplate {
            message: progress.message(),
            complete: progress.is_complete(),
            refreshing,
        },
        None => ProgressTemplate {
            message: page.error.clone().unwrap_or_default(),
            complete: false,
            refreshing,
        },
    }
}

/// htmx requests get the feed container back, already polling; plain form
/// posts are sent back to the home page.
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let refresher = state
        .refresher
        .clone()
        .ok_or_else(|| anyhow::anyhow!("feed configuration missing"))?;

    tokio::spawn(async move {
        refresher.refresh_all_feeds().await;
    });

    if headers.contains_key("hx-request") {
        Ok(HtmlTemplate(feeds_fragment(state.page.snapshot(), true)).into_response())
    } else {
        Ok(Redirect::to("/").into_response())
    }
}

pub async fn refresh_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let refreshing = is_refreshing(&state).await;
    HtmlTemplate(progress_fragment(&state.page.snapshot(), refreshing))
}

pub async fn health() -> impl IntoResponse {
    Html("OK")
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

/// Every search input (typed, suggested, spoken) lands here.
pub async fn search(Query(query): Query<SearchQuery>) -> Redirect {
    let q = query.q.trim();
    if q.is_empty() {
        Redirect::to("/")
    } else {
        Redirect::to(&format!("/results?q={}", urlencoding::encode(q)))
    }
}

/// `<option>` list for the search box's datalist. Upstream failures yield
/// an empty list.
pub async fn suggest(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> impl IntoResponse {
    let suggestions = state.suggest.suggest(&query.q).await.unwrap_or_else(|e| {
        warn!("Suggestions for '{}' failed: {}", query.q, e);
        Vec::new()
    });
    HtmlTemplate(SuggestionsTemplate { suggestions })
}

#[derive(Debug, Deserialize)]
pub struct ResultsQuery {
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub tab: Option<String>,
}

pub async fn results(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ResultsQuery>,
) -> impl IntoResponse {
    let cse = state.cse.read().await;

    let q = query.q.trim().to_string();
    let ai_tab = query.tab.as_deref() == Some("ai");
    let executed_query = if ai_tab && !q.is_empty() {
        format!("{} AI", q)
    } else {
        q.clone()
    };

    HtmlTemplate(ResultsTemplate {
        query: q,
        executed_query,
        ai_tab,
        cx: cse.current_cx().unwrap_or_default().to_string(),
        script_url: cse.current_script().unwrap_or_default(),
        init_timeout_ms: cse.init_timeout().as_millis() as u64,
    })
}

#[derive(Debug, Deserialize)]
pub struct NewsQuery {
    #[serde(default)]
    pub q: String,
}

pub async fn news(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NewsQuery>,
) -> impl IntoResponse {
    let topic = match query.q.trim() {
        "" => DEFAULT_TOPIC.to_string(),
        q => q.to_string(),
    };

    let (items, failed) = match state.news.search(&topic).await {
        Ok(items) => (items, false),
        Err(e) => {
            warn!("News search for '{}' failed: {}", topic, e);
            (Vec::new(), true)
        }
    };

    HtmlTemplate(NewsTemplate {
        topic,
        items,
        failed,
    })
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CseStatus {
    pub cx: Option<String>,
    pub all: Vec<String>,
    pub ready: bool,
    /// Script the page should load next, if any.
    pub script_url: Option<String>,
    pub init_timeout_ms: u64,
}

/// Which engine id a browser report is about.
#[derive(Debug, Deserialize)]
pub struct CseReport {
    #[serde(default)]
    pub cx: String,
}

fn cse_status(cse: &CseFallback, script_url: Option<String>) -> CseStatus {
    CseStatus {
        cx: cse.current_cx().map(str::to_string),
        all: cse.all_cx().to_vec(),
        ready: cse.is_ready(),
        script_url,
        init_timeout_ms: cse.init_timeout().as_millis() as u64,
    }
}

pub async fn cse_current(State(state): State<Arc<AppState>>) -> Json<CseStatus> {
    let cse = state.cse.read().await;
    Json(cse_status(&cse, cse.current_script()))
}

pub async fn cse_loaded(
    State(state): State<Arc<AppState>>,
    Query(report): Query<CseReport>,
) -> Json<CseStatus> {
    let mut cse = state.cse.write().await;
    cse.on_script_loaded(&report.cx);
    Json(cse_status(&cse, None))
}

pub async fn cse_ready(
    State(state): State<Arc<AppState>>,
    Query(report): Query<CseReport>,
) -> Json<CseStatus> {
    let mut cse = state.cse.write().await;
    cse.on_initialized(&report.cx);
    Json(cse_status(&cse, None))
}

pub async fn cse_timeout(
    State(state): State<Arc<AppState>>,
    Query(report): Query<CseReport>,
) -> Json<CseStatus> {
    let mut cse = state.cse.write().await;
    let next = cse.on_init_timeout(&report.cx);
    Json(cse_status(&cse, next))
}

/// The browser reports that `cx` did not load; the response carries the
/// next script to load, if any id is left.
pub async fn cse_failed(
    State(state): State<Arc<AppState>>,
    Query(report): Query<CseReport>,
) -> Json<CseStatus> {
    let mut cse = state.cse.write().await;
    let next = cse.on_load_error(&report.cx);
    Json(cse_status(&cse, next))
}

pub async fn service_worker() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript")],
        SERVICE_WORKER_JS,
    )
}
