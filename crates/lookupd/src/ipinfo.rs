//! IP geolocation lookups.

use std::net::IpAddr;
use std::time::{Duration, Instant};

use http::header::{HeaderValue, USER_AGENT};
use lookupd_core::LruTtlCache;
use lookupd_net::Transport;
use regex::Regex;
use serde::Serialize;

use crate::config::{IpinfoSection, compile_pattern};
use crate::error::{Error, Result};
use crate::pipeline::Pipeline;

/// User agent the IP information upstream expects.
pub const IPINFO_USER_AGENT: &str = "curl/7.56.0";

/// Location and network operator of an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpInfo {
    pub location: String,
    pub isp: String,
}

/// Body of `/ipinfo/{ip}` responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IpinfoResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isp: Option<String>,
}

impl From<Result<IpInfo>> for IpinfoResponse {
    fn from(result: Result<IpInfo>) -> Self {
        match result {
            Ok(info) => Self {
                error: None,
                location: Some(info.location),
                isp: Some(info.isp),
            },
            Err(e) => Self {
                error: Some(e.to_string()),
                ..Self::default()
            },
        }
    }
}

/// Answers "where is this address" from a configurable upstream page.
#[derive(Debug)]
pub struct IpinfoHandler {
    pipeline: Pipeline<IpInfo>,
    regex: Regex,
    cache: LruTtlCache<IpInfo>,
    ttl: Duration,
}

impl IpinfoHandler {
    /// Create a handler.
    ///
    /// `regex` must capture the location in group 1 and the ISP in group 2.
    pub fn new(
        transport: Transport,
        url_template: impl Into<String>,
        regex: Regex,
        ttl: Duration,
        cache_size: usize,
    ) -> Self {
        Self {
            pipeline: Pipeline::new("ipinfo", url_template, transport),
            regex,
            cache: LruTtlCache::new(cache_size),
            ttl,
        }
    }

    /// Create a handler from the `[ipinfo]` section.
    pub fn from_config(section: &IpinfoSection, transport: Transport) -> Result<Self> {
        Ok(Self::new(
            transport,
            section.url.clone(),
            compile_pattern("ipinfo.regex", &section.regex)?,
            Duration::from_secs(section.cache_ttl),
            section.cache_size,
        ))
    }

    /// Look up `ip`, serving fresh answers from the cache.
    ///
    /// Anything but a literal IPv4 or IPv6 address is rejected before it can
    /// reach the upstream URL.
    pub async fn lookup(&self, ip: &str) -> Result<IpInfo> {
        let addr: IpAddr = ip
            .parse()
            .map_err(|_| Error::BadRequest(format!("invalid address {ip:?}")))?;
        let ip = addr.to_string();
        let key = format!("ipinfo:{ip}");
        if let Some(info) = self.cache.get_not_stale(&key) {
            return Ok(info);
        }

        let headers = [(USER_AGENT, HeaderValue::from_static(IPINFO_USER_AGENT))];
        let info = self
            .pipeline
            .fetch(&ip, "", &headers, |body| self.parse(body))
            .await?;

        self.cache.set(key, info.clone(), Instant::now() + self.ttl);
        Ok(info)
    }

    fn parse(&self, body: &str) -> Result<IpInfo> {
        let caps = self.regex.captures(body).ok_or(Error::NotFound)?;
        let group = |i| caps.get(i).map_or("", |m| m.as_str()).to_string();
        Ok(IpInfo {
            location: group(1),
            isp: group(2),
        })
    }
}
