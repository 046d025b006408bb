//! lookupd: an HTTP lookup service.
//!
//! Three routes answer questions by scraping configurable upstream pages:
//!
//! - `GET /ipinfo/{ip}`: location and ISP of an address
//! - `POST /lookup-title`: package name of an app, by exact title
//! - `POST /lookup-pkgname`: title of an app, by package name
//!
//! Each lookup goes through the same pipeline. A fresh cached answer is
//! returned directly; otherwise concurrent callers asking the same upstream
//! URL share one GET, the body is matched against the configured pattern and
//! the answer is cached for the configured TTL.
//!
//! # Example
//!
//! ```ignore
//! use lookupd::{AppState, Config, ServerHandle, router};
//!
//! let config = Config::load("production.toml".as_ref())?;
//! let state = AppState::from_config(&config)?;
//! let listener = lookupd_net::listener::bind(config.listen_addr()?).await?;
//! let server = ServerHandle::spawn(listener, router(state))?;
//! ```

pub mod config;
mod error;
pub mod googleplay;
pub mod graceful;
pub mod ipinfo;
pub mod pipeline;
pub mod server;

pub use config::Config;
pub use error::{Error, Result};
pub use googleplay::{GoogleplayHandler, LookupRequest, LookupResponse};
pub use graceful::{Quiesce, ServerHandle, shutdown_on, shutdown_signal};
pub use ipinfo::{IpInfo, IpinfoHandler, IpinfoResponse};
pub use pipeline::Pipeline;
pub use server::{AppState, router};
