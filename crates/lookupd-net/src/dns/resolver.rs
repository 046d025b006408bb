//! Caching resolver.

use std::collections::HashMap;
use std::io::{self, BufRead};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use lookupd_core::LruTtlCache;
use parking_lot::RwLock;

use super::backend::{HickoryLookup, NameLookup, normalize};
use super::config::ResolverConfig;
use super::hosts::parse_hosts_line;
use crate::error::{NetError, Result};
use crate::ip::is_pollution_ip;

/// Maximum number of cached CNAME links followed for one lookup.
pub const MAX_CNAME_HOPS: usize = 8;

/// A cached DNS answer.
#[derive(Debug, Clone)]
enum DnsEntry {
    Addrs(Vec<IpAddr>),
    Cname(String),
}

/// Resolver with static hosts, a TTL cache and a pluggable backend.
///
/// # Example
///
/// ```ignore
/// let resolver = Resolver::new(ResolverConfig::default());
/// resolver.add_static_record("upstream.test", vec!["127.0.0.1".parse()?]);
/// assert!(resolver.is_static("upstream.test"));
/// let addrs = resolver.lookup("example.com").await?;
/// ```
pub struct Resolver {
    backend: Arc<dyn NameLookup>,
    cache: LruTtlCache<DnsEntry>,
    statics: RwLock<HashMap<String, Vec<IpAddr>>>,
    config: ResolverConfig,
}

impl Resolver {
    /// Create a resolver using the system DNS configuration.
    pub fn new(config: ResolverConfig) -> Self {
        Self::with_backend(config, Arc::new(HickoryLookup::system()))
    }

    /// Create a resolver with an explicit backend.
    pub fn with_backend(config: ResolverConfig, backend: Arc<dyn NameLookup>) -> Self {
        Self {
            backend,
            cache: LruTtlCache::new(config.cache_size),
            statics: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// The resolver configuration.
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve `name` to an ordered, non-empty list of addresses.
    pub async fn lookup(&self, name: &str) -> Result<Vec<IpAddr>> {
        if let Some(addrs) = self.static_lookup(name) {
            return Ok(addrs);
        }

        let mut current = name.to_owned();
        let mut hops = 0;
        loop {
            match self.cache.get_not_stale(&current) {
                Some(DnsEntry::Addrs(addrs)) if addrs.is_empty() => {
                    return Err(NetError::InvariantViolation(format!(
                        "empty cached address list for {current}"
                    )));
                }
                Some(DnsEntry::Addrs(addrs)) => return Ok(addrs),
                Some(DnsEntry::Cname(target)) => {
                    hops += 1;
                    if hops > MAX_CNAME_HOPS {
                        return Err(NetError::resolve(name, "too many CNAME hops"));
                    }
                    current = target;
                }
                None => return self.resolve_uncached(&current).await,
            }
        }
    }

    /// Evict `name` from the DNS cache. Static hosts are untouched.
    pub fn forget(&self, name: &str) {
        self.cache.delete(name);
    }

    /// Load hosts(5)-style entries.
    ///
    /// Malformed, empty and comment lines are skipped; only read errors
    /// are reported. Each name maps to the address on its line.
    pub fn add_static_hosts(&self, reader: impl BufRead) -> io::Result<()> {
        let mut loaded = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if let Some((ip, names)) = parse_hosts_line(&line) {
                loaded.extend(names.into_iter().map(|name| (name.to_owned(), ip)));
            }
        }

        tracing::debug!(
            target: "lookupd_net::dns",
            count = loaded.len(),
            "loaded static hosts"
        );

        let mut statics = self.statics.write();
        for (name, ip) in loaded {
            statics.insert(name, vec![ip]);
        }
        Ok(())
    }

    /// Insert or replace one static entry.
    pub fn add_static_record(&self, name: impl Into<String>, ips: Vec<IpAddr>) {
        self.statics.write().insert(name.into(), ips);
    }

    /// Whether `name` has a static entry.
    pub fn is_static(&self, name: &str) -> bool {
        self.statics.read().contains_key(name)
    }

    fn static_lookup(&self, name: &str) -> Option<Vec<IpAddr>> {
        self.statics
            .read()
            .get(name)
            .filter(|ips| !ips.is_empty())
            .cloned()
    }

    async fn resolve_uncached(&self, name: &str) -> Result<Vec<IpAddr>> {
        if let Ok(ip) = name.parse::<IpAddr>() {
            return Ok(vec![ip]);
        }

        let answer = self.backend.lookup(name).await?;
        let mut addrs = answer.addrs;
        if self.config.filter_pollution {
            addrs.retain(|ip| !is_pollution_ip(*ip));
        }
        if addrs.is_empty() {
            return Err(NetError::resolve(name, "no usable addresses"));
        }

        if !self.config.dns_ttl.is_zero() {
            let expires_at = Instant::now() + self.config.dns_ttl;
            match answer.canonical {
                Some(target) if target != normalize(name) => {
                    self.cache.set(name, DnsEntry::Cname(target.clone()), expires_at);
                    self.cache.set(target, DnsEntry::Addrs(addrs.clone()), expires_at);
                }
                _ => self.cache.set(name, DnsEntry::Addrs(addrs.clone()), expires_at),
            }
        }

        tracing::debug!(
            target: "lookupd_net::dns",
            name,
            addrs = ?addrs,
            "resolved"
        );
        Ok(addrs)
    }

    #[cfg(test)]
    fn cache_cname(&self, name: &str, target: &str) {
        let expires_at = Instant::now() + self.config.dns_ttl;
        self.cache
            .set(name, DnsEntry::Cname(target.to_owned()), expires_at);
    }

    #[cfg(test)]
    fn cache_addrs(&self, name: &str, addrs: Vec<IpAddr>) {
        let expires_at = Instant::now() + self.config.dns_ttl;
        self.cache.set(name, DnsEntry::Addrs(addrs), expires_at);
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .field("statics", &self.statics.read().len())
            .finish()
    }
}
