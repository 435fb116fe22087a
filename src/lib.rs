//! Chart aggregation library - shared modules for scraping and playlist sync.

pub mod cache;
pub mod catalog;
pub mod compare;
pub mod fetch;
pub mod models;
pub mod normalize;
pub mod progress;
pub mod query;
pub mod scrape;
pub mod service;
pub mod store;
