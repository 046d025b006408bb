//! Networking layer for lookupd.
//!
//! Every upstream call made by the lookup service flows through this crate:
//!
//! - [`dns`]: a caching [`Resolver`] with static hosts and CNAME chaining
//! - [`dialer`]: a [`Dialer`] that orders candidates by family, rejects
//!   reserved addresses on request and races connects across candidates
//! - [`transport`]: a pooled hyper client whose connector is the dialer
//! - [`listener`]: a listener that tunes inbound sockets
//! - [`pool`]: reusable 32 KiB copy buffers
//! - [`ip`]: reserved and pollution address classification
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use lookupd_net::{Dialer, DialerConfig, Resolver, ResolverConfig, Transport, TransportConfig};
//!
//! let resolver = Arc::new(Resolver::new(ResolverConfig::default()));
//! let dialer = Arc::new(Dialer::new(resolver, DialerConfig::default())?);
//! let transport = Transport::new(dialer, TransportConfig::default());
//!
//! let response = transport.get("https://ipinfo.example/8.8.8.8", &[]).await?;
//! println!("{} {}", response.status, response.text());
//! ```

pub mod dialer;
pub mod dns;
mod error;
pub mod ip;
pub mod listener;
pub mod pool;
mod stream;
pub mod tls;
pub mod transport;

pub use dialer::{Dialer, DialerConfig, Network};
pub use dns::{Resolver, ResolverConfig};
pub use error::{NetError, Result};
pub use listener::TunedListener;
pub use pool::{BufferPool, copy_buffered};
pub use stream::MaybeTlsStream;
pub use transport::{Transport, TransportConfig, UpstreamResponse};
