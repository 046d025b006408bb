//! System name lookup backends.

use std::net::IpAddr;

use futures_util::future::BoxFuture;
use hickory_resolver::config::ResolverConfig as HickoryConfig;
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::proto::rr::RData;
use hickory_resolver::{Resolver, TokioResolver};

use crate::error::{NetError, Result};

/// A backend answer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Answer {
    /// The canonical name the addresses belong to, when the backend
    /// followed an alias to get there.
    pub canonical: Option<String>,
    /// The resolved addresses, in backend order.
    pub addrs: Vec<IpAddr>,
}

/// A source of uncached name lookups.
pub trait NameLookup: Send + Sync + 'static {
    /// Resolve `name` to its addresses.
    fn lookup<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Answer>>;
}

/// [`NameLookup`] backed by hickory, reading the system resolver
/// configuration.
pub struct HickoryLookup {
    resolver: TokioResolver,
}

impl HickoryLookup {
    /// Build from the system configuration (`/etc/resolv.conf` on Unix).
    ///
    /// Falls back to hickory's default upstreams when the system
    /// configuration cannot be read.
    pub fn system() -> Self {
        let builder = Resolver::builder_tokio().unwrap_or_else(|e| {
            tracing::warn!(
                target: "lookupd_net::dns",
                error = %e,
                "cannot read system resolver configuration, using defaults"
            );
            Resolver::builder_with_config(
                HickoryConfig::default(),
                TokioConnectionProvider::default(),
            )
        });

        Self {
            resolver: builder.build(),
        }
    }
}

impl std::fmt::Debug for HickoryLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HickoryLookup").finish_non_exhaustive()
    }
}

impl NameLookup for HickoryLookup {
    fn lookup<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Answer>> {
        Box::pin(async move {
            let response = self
                .resolver
                .lookup_ip(name)
                .await
                .map_err(|e| NetError::resolve(name, e))?;

            // The owner of the address records is the end of any alias chain.
            let canonical = response
                .as_lookup()
                .records()
                .iter()
                .find(|record| matches!(record.data(), RData::A(_) | RData::AAAA(_)))
                .map(|record| normalize(&record.name().to_utf8()))
                .filter(|owner| *owner != normalize(name));

            Ok(Answer {
                canonical,
                addrs: response.iter().collect(),
            })
        })
    }
}

/// Lowercase and strip the root label.
pub(crate) fn normalize(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("WWW.Example.COM."), "www.example.com");
        assert_eq!(normalize("example.com"), "example.com");
    }
}
