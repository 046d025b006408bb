//! Core primitives for lookupd.
//!
//! This crate provides the two building blocks every lookup handler is
//! composed from:
//!
//! - **[`LruTtlCache`]**: a capacity-bounded LRU map whose entries carry an
//!   expiry instant. Stale entries read as misses.
//! - **[`SingleFlight`]**: a keyed coalescing group. Concurrent callers that
//!   ask for the same key share one execution of the underlying future.
//!
//! # Example
//!
//! ```ignore
//! use std::time::{Duration, Instant};
//! use lookupd_core::{LruTtlCache, SingleFlight};
//!
//! let cache: LruTtlCache<String> = LruTtlCache::new(10_000);
//! let flights: SingleFlight<String, MyError> = SingleFlight::new();
//!
//! if let Some(hit) = cache.get_not_stale("title:WhatsApp:IN") {
//!     return Ok(hit);
//! }
//!
//! let (result, shared) = flights
//!     .run("https://upstream/search?q=WhatsApp", fetch_upstream())
//!     .await;
//! let value = result?;
//! cache.set("title:WhatsApp:IN", value.clone(), Instant::now() + Duration::from_secs(3600));
//! ```

pub mod cache;
pub mod singleflight;

pub use cache::LruTtlCache;
pub use singleflight::SingleFlight;
