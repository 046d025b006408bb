//! Service configuration.
//!
//! Configuration is a TOML file with one table per concern:
//!
//! ```toml
//! [default]
//! listen_addr = "127.0.0.1:8080"
//! graceful_timeout = 300
//! request_timeout = 30
//!
//! [ipinfo]
//! url = "https://ip.example/%s"
//! regex = 'Location:\s*([^<]+)<.*?ISP:\s*([^<]+)<'
//! cache_ttl = 3600
//!
//! [googleplay]
//! search_url = "https://play.example/store/search?q=%s&c=apps"
//! search_regex = 'id=([\w.]+)"[^>]*title="([^"]+)"'
//! search_ttl = 3600
//! ```
//!
//! `[resolver]` and `[dialer]` are optional. All durations are in seconds.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use lookupd_net::{DialerConfig, ResolverConfig};
use regex::Regex;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Environment variable naming the deployment environment.
///
/// With no explicit path the configuration is read from `<env>.toml`.
pub const ENV_VAR: &str = "LOOKUPD_ENV";

/// Environment assumed when [`ENV_VAR`] is unset.
pub const DEFAULT_ENV: &str = "development";

/// Placeholder substituted with the query in upstream URL templates.
pub const QUERY_PLACEHOLDER: &str = "%s";

const DEFAULT_GRACEFUL_TIMEOUT: u64 = 5 * 60;
const DEFAULT_REQUEST_TIMEOUT: u64 = 30;
const DEFAULT_LOOKUP_CACHE_SIZE: usize = 10_000;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Inbound server settings.
    #[serde(default)]
    pub default: ServerSection,
    /// IP information upstream.
    pub ipinfo: IpinfoSection,
    /// App store search upstream.
    pub googleplay: GoogleplaySection,
    /// DNS resolver settings.
    #[serde(default)]
    pub resolver: ResolverSection,
    /// Outbound dialer settings.
    #[serde(default)]
    pub dialer: DialerSection,
}

/// `[default]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    /// Address to listen on. A bare `:port` listens on every interface.
    pub listen_addr: String,
    /// Seconds to wait for in-flight requests after a shutdown signal.
    pub graceful_timeout: u64,
    /// Per-request deadline in seconds. Zero disables it.
    pub request_timeout: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            graceful_timeout: DEFAULT_GRACEFUL_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// `[ipinfo]`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IpinfoSection {
    /// URL template with one `%s` for the address.
    pub url: String,
    /// Pattern whose groups 1 and 2 are location and ISP.
    pub regex: String,
    /// Seconds a parsed answer stays cached.
    pub cache_ttl: u64,
    /// Maximum cached answers.
    #[serde(default = "default_lookup_cache_size")]
    pub cache_size: usize,
}

/// `[googleplay]`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GoogleplaySection {
    /// Search URL template with one `%s` for the query.
    pub search_url: String,
    /// Pattern whose groups 1 and 2 are package name and title.
    pub search_regex: String,
    /// Seconds a resolved answer stays cached.
    pub search_ttl: u64,
    /// Maximum cached answers.
    #[serde(default = "default_lookup_cache_size")]
    pub cache_size: usize,
}

/// `[resolver]`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverSection {
    /// Seconds resolved names stay cached. Zero disables caching.
    pub dns_ttl: Option<u64>,
    /// Maximum cached names.
    pub cache_size: Option<usize>,
    /// Hosts file loaded as static records at startup.
    pub hosts_file: Option<PathBuf>,
    /// Drop known poisoned answers.
    pub filter_pollution: bool,
}

/// `[dialer]`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DialerSection {
    /// Number of candidates raced per dial. 1 dials serially.
    pub level: Option<usize>,
    /// Dial deadline in seconds. Zero disables it.
    pub timeout: Option<u64>,
    /// TCP keep-alive period in seconds. Zero disables it.
    pub keep_alive: Option<u64>,
    /// Try IPv6 candidates first.
    pub prefer_ipv6: bool,
    /// Refuse to dial names that resolve to reserved addresses.
    pub reject_intranet: bool,
    /// Local address to bind outgoing sockets to.
    pub local_addr: Option<IpAddr>,
}

fn default_lookup_cache_size() -> usize {
    DEFAULT_LOOKUP_CACHE_SIZE
}

impl Config {
    /// Read and validate the configuration at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// The file read when no path is given on the command line.
    pub fn default_path() -> PathBuf {
        let env = std::env::var(ENV_VAR)
            .ok()
            .filter(|env| !env.is_empty())
            .unwrap_or_else(|| DEFAULT_ENV.to_string());
        PathBuf::from(format!("{env}.toml"))
    }

    /// Check every field that would otherwise fail at first use.
    pub fn validate(&self) -> Result<()> {
        self.listen_addr()?;

        validate_template("ipinfo.url", &self.ipinfo.url)?;
        compile_pattern("ipinfo.regex", &self.ipinfo.regex)?;
        validate_ttl("ipinfo.cache_ttl", self.ipinfo.cache_ttl)?;

        validate_template("googleplay.search_url", &self.googleplay.search_url)?;
        compile_pattern("googleplay.search_regex", &self.googleplay.search_regex)?;
        validate_ttl("googleplay.search_ttl", self.googleplay.search_ttl)?;

        if self.dialer.level == Some(0) {
            return Err(Error::config("dialer.level must be at least 1"));
        }
        Ok(())
    }

    /// The parsed listen address.
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        parse_listen_addr(&self.default.listen_addr)
    }

    /// How long shutdown waits for in-flight requests.
    pub fn graceful_timeout(&self) -> Duration {
        match self.default.graceful_timeout {
            0 => Duration::from_secs(DEFAULT_GRACEFUL_TIMEOUT),
            secs => Duration::from_secs(secs),
        }
    }

    /// Per-request deadline, if any.
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.default.request_timeout > 0).then(|| Duration::from_secs(self.default.request_timeout))
    }

    /// Resolver settings layered over the resolver defaults.
    pub fn resolver_config(&self) -> ResolverConfig {
        let section = &self.resolver;
        let mut config = ResolverConfig::default().filter_pollution(section.filter_pollution);
        if let Some(secs) = section.dns_ttl {
            config = config.dns_ttl(Duration::from_secs(secs));
        }
        if let Some(size) = section.cache_size {
            config = config.cache_size(size);
        }
        config
    }

    /// Dialer settings layered over the dialer defaults.
    pub fn dialer_config(&self) -> DialerConfig {
        let section = &self.dialer;
        let mut config = DialerConfig::default()
            .prefer_ipv6(section.prefer_ipv6)
            .reject_intranet(section.reject_intranet);
        if let Some(level) = section.level {
            config = config.level(level);
        }
        if let Some(secs) = section.timeout {
            config = config.timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = section.keep_alive {
            config = config.keep_alive(Duration::from_secs(secs));
        }
        if let Some(addr) = section.local_addr {
            config = config.local_addr(addr);
        }
        config
    }
}

/// Parse a listen address, accepting `:port` for every interface.
pub fn parse_listen_addr(addr: &str) -> Result<SocketAddr> {
    let addr = addr.trim();
    if addr.is_empty() {
        return Err(Error::config("default.listen_addr is empty"));
    }
    if let Some(port) = addr.strip_prefix(':') {
        let port: u16 = port
            .parse()
            .map_err(|e| Error::config(format!("default.listen_addr {addr:?}: {e}")))?;
        return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port));
    }
    addr.parse()
        .map_err(|e| Error::config(format!("default.listen_addr {addr:?}: {e}")))
}

/// Compile an extraction pattern, requiring capture groups 1 and 2.
pub fn compile_pattern(field: &str, pattern: &str) -> Result<Regex> {
    let regex = Regex::new(pattern).map_err(|e| Error::config(format!("{field}: {e}")))?;
    // captures_len counts the implicit whole-match group.
    if regex.captures_len() < 3 {
        return Err(Error::config(format!(
            "{field}: needs at least two capture groups"
        )));
    }
    Ok(regex)
}

fn validate_template(field: &str, template: &str) -> Result<()> {
    if !template.contains(QUERY_PLACEHOLDER) {
        return Err(Error::config(format!("{field}: missing {QUERY_PLACEHOLDER}")));
    }
    let url = url::Url::parse(&template.replacen(QUERY_PLACEHOLDER, "sample", 1))
        .map_err(|e| Error::config(format!("{field}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(Error::config(format!("{field}: unsupported scheme {other:?}"))),
    }
}

fn validate_ttl(field: &str, ttl: u64) -> Result<()> {
    if ttl == 0 {
        return Err(Error::config(format!("{field} must be positive")));
    }
    Ok(())
}
