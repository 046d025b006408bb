//! Resolver configuration.

use std::time::Duration;

/// Configuration for [`Resolver`](super::Resolver).
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// How long backend answers stay in the DNS cache.
    ///
    /// A zero TTL disables caching.
    pub dns_ttl: Duration,

    /// Maximum number of cached names (CNAME links count as entries).
    pub cache_size: usize,

    /// Drop known pollution addresses from backend answers.
    pub filter_pollution: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            dns_ttl: Duration::from_secs(10 * 60),
            cache_size: 8 * 1024,
            filter_pollution: false,
        }
    }
}

impl ResolverConfig {
    /// Create a configuration with the default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the DNS cache TTL.
    pub fn dns_ttl(mut self, ttl: Duration) -> Self {
        self.dns_ttl = ttl;
        self
    }

    /// Set the DNS cache size.
    pub fn cache_size(mut self, size: usize) -> Self {
        self.cache_size = size;
        self
    }

    /// Enable or disable pollution filtering.
    pub fn filter_pollution(mut self, enabled: bool) -> Self {
        self.filter_pollution = enabled;
        self
    }
}
