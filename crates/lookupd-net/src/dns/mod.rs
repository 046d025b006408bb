//! Name resolution with static overrides and positive caching.
//!
//! The [`Resolver`] answers in a fixed order:
//!
//! 1. **Static hosts**: entries loaded from a hosts(5)-style source or added
//!    programmatically are returned verbatim and never expire.
//! 2. **DNS cache**: fresh cached answers. A cached CNAME is followed to its
//!    target, up to a bounded number of hops.
//! 3. **Literal addresses**: a name that parses as an IP resolves to itself.
//! 4. **System backend**: everything else goes to a [`NameLookup`]
//!    implementation (hickory by default) and the answer is cached for the
//!    configured TTL.
//!
//! # Example
//!
//! ```ignore
//! use lookupd_net::dns::{Resolver, ResolverConfig};
//! use std::time::Duration;
//!
//! let resolver = Resolver::new(ResolverConfig::default().dns_ttl(Duration::from_secs(600)));
//! resolver.add_static_hosts("127.0.0.1 upstream.test\n".as_bytes())?;
//!
//! let addrs = resolver.lookup("upstream.test").await?;
//! assert_eq!(addrs, vec!["127.0.0.1".parse::<std::net::IpAddr>()?]);
//! ```

mod backend;
mod config;
mod hosts;
mod resolver;

pub use backend::{Answer, HickoryLookup, NameLookup};
pub use config::ResolverConfig;
pub use hosts::parse_hosts_line;
pub use resolver::{MAX_CNAME_HOPS, Resolver};
