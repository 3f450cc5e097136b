//! Caching RSS gateway.
//!
//! Feeds are fetched on demand, their item links rewritten to point back at the
//! gateway, and the rewritten document cached for a short freshness window.
//! Article fetches are only proxied for URLs that appeared in a recently
//! rewritten feed.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod util;
