//! News Portal - a category news front page fed by RSS/Atom sources
//!
//! Feeds are fetched through a chain of CORS relay proxies in small
//! concurrent batches and rendered into per-category sections as each
//! source settles. The crate also serves a search results page backed by
//! a custom search engine with id fallback, query suggestions, and a topic
//! news search.

pub mod aggregator;
pub mod article;
pub mod config;
pub mod cse;
pub mod error;
pub mod fetcher;
pub mod news;
pub mod proxy;
pub mod render;
pub mod routes;
pub mod suggest;
