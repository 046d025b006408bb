//! App store title and package name lookups.
//!
//! Both directions share one search: the upstream search page is fetched for
//! the query, every `(package name, title)` pair is extracted, and the caller
//! keeps the pair whose title (or package name) equals what was asked.
//!
//! The query is escaped as a URI query component before it is substituted
//! into the search template, so titles like `Tom & Jerry` stay one parameter.

use std::sync::Arc;
use std::time::{Duration, Instant};

use http::header::{ACCEPT_LANGUAGE, HeaderValue};
use lookupd_core::LruTtlCache;
use lookupd_net::Transport;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::{GoogleplaySection, compile_pattern};
use crate::error::{Error, Result};
use crate::pipeline::Pipeline;

/// Characters left as-is when escaping a query component. Everything with
/// meaning inside a query string (`&`, `+`, `=`, `#`, ...) is escaped.
const QUERY_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Body of `/lookup-title` and `/lookup-pkgname` requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LookupRequest {
    pub pkg_name: String,
    pub title: String,
    pub geo: String,
}

/// Body of `/lookup-title` and `/lookup-pkgname` responses.
///
/// `status` is 200 when an answer was found and 204 otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LookupResponse {
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pkg_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl LookupResponse {
    /// A response carrying `pkg_name`, or 204 when there is none.
    pub fn package(pkg_name: Option<String>) -> Self {
        Self {
            status: status_for(&pkg_name),
            error: None,
            pkg_name,
            title: None,
        }
    }

    /// A response carrying `title`, or 204 when there is none.
    pub fn title(title: Option<String>) -> Self {
        Self {
            status: status_for(&title),
            error: None,
            pkg_name: None,
            title,
        }
    }

    /// A failed lookup.
    pub fn error(err: &Error) -> Self {
        Self {
            status: 204,
            error: Some(err.to_string()),
            pkg_name: None,
            title: None,
        }
    }
}

fn status_for(answer: &Option<String>) -> u16 {
    if answer.is_some() { 200 } else { 204 }
}

/// One search result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchItem {
    pub pkg_name: String,
    pub title: String,
}

/// Resolves titles to package names and back via the store's search page.
#[derive(Debug)]
pub struct GoogleplayHandler {
    pipeline: Pipeline<Arc<Vec<SearchItem>>>,
    regex: Regex,
    cache: LruTtlCache<String>,
    ttl: Duration,
}

impl GoogleplayHandler {
    /// Create a handler.
    ///
    /// `regex` must capture the package name in group 1 and the title in
    /// group 2.
    pub fn new(
        transport: Transport,
        search_template: impl Into<String>,
        regex: Regex,
        ttl: Duration,
        cache_size: usize,
    ) -> Self {
        Self {
            pipeline: Pipeline::new("googleplay", search_template, transport),
            regex,
            cache: LruTtlCache::new(cache_size),
            ttl,
        }
    }

    /// Create a handler from the `[googleplay]` section.
    pub fn from_config(section: &GoogleplaySection, transport: Transport) -> Result<Self> {
        Ok(Self::new(
            transport,
            section.search_url.clone(),
            compile_pattern("googleplay.search_regex", &section.search_regex)?,
            Duration::from_secs(section.search_ttl),
            section.cache_size,
        ))
    }

    /// Package name of the app titled exactly `title` in `geo`.
    pub async fn lookup_title(&self, title: &str, geo: &str) -> Result<Option<String>> {
        let key = format!("title:{title}:{geo}");
        self.resolve(key, title, geo, |item| {
            (item.title == title).then(|| item.pkg_name.clone())
        })
        .await
    }

    /// Title of the app whose package name is exactly `pkg_name` in `geo`.
    pub async fn lookup_pkgname(&self, pkg_name: &str, geo: &str) -> Result<Option<String>> {
        let key = format!("pkgname:{pkg_name}:{geo}");
        self.resolve(key, pkg_name, geo, |item| {
            (item.pkg_name == pkg_name).then(|| item.title.clone())
        })
        .await
    }

    /// Only found answers are cached; a miss is retried on the next call.
    async fn resolve<F>(&self, key: String, query: &str, geo: &str, pick: F) -> Result<Option<String>>
    where
        F: Fn(&SearchItem) -> Option<String>,
    {
        if let Some(answer) = self.cache.get_not_stale(&key) {
            return Ok(Some(answer));
        }

        let items = self.search(query, geo).await?;
        let answer = items.iter().find_map(pick);
        if let Some(answer) = &answer {
            self.cache.set(key, answer.clone(), Instant::now() + self.ttl);
        }
        Ok(answer)
    }

    async fn search(&self, query: &str, geo: &str) -> Result<Arc<Vec<SearchItem>>> {
        let lang = geo.to_lowercase();
        let accept = HeaderValue::from_str(&accept_language(&lang))
            .map_err(|e| Error::BadRequest(format!("geo {geo:?}: {e}")))?;
        let query = utf8_percent_encode(query, QUERY_COMPONENT).to_string();

        self.pipeline
            .fetch(&query, &lang, &[(ACCEPT_LANGUAGE, accept)], |body| {
                let items = self.parse(body);
                tracing::info!(
                    target: "lookupd::googleplay",
                    query = %query,
                    lang = %lang,
                    items = items.len(),
                    "search parsed"
                );
                Ok(Arc::new(items))
            })
            .await
    }

    fn parse(&self, body: &str) -> Vec<SearchItem> {
        self.regex
            .captures_iter(body)
            .map(|caps| {
                let group = |i| caps.get(i).map_or("", |m| m.as_str()).to_string();
                SearchItem {
                    pkg_name: group(1),
                    title: group(2),
                }
            })
            .collect()
    }
}

/// `Accept-Language` value preferring `lang`, then English.
pub fn accept_language(lang: &str) -> String {
    format!("{lang};q=0.9,en-US;q=0.8,en;q=0.7")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_language() {
        assert_eq!(
            accept_language(&"IN".to_lowercase()),
            "in;q=0.9,en-US;q=0.8,en;q=0.7"
        );
    }

    #[test]
    fn test_query_component_escaping() {
        let escape = |s: &str| utf8_percent_encode(s, QUERY_COMPONENT).to_string();
        assert_eq!(escape("WhatsApp Messenger/β?"), "WhatsApp%20Messenger%2F%CE%B2%3F");
        assert_eq!(escape("Tom & Jerry"), "Tom%20%26%20Jerry");
        assert_eq!(escape("Disney+"), "Disney%2B");
        assert_eq!(escape("a=b#c;d"), "a%3Db%23c%3Bd");
        assert_eq!(escape("com.whatsapp"), "com.whatsapp");
    }

    #[test]
    fn test_request_fields_default() {
        let req: LookupRequest = serde_json::from_str(r#"{"title":"Maps"}"#).unwrap();
        assert_eq!(req.title, "Maps");
        assert!(req.pkg_name.is_empty());
        assert!(req.geo.is_empty());
    }

    #[test]
    fn test_response_shape() {
        let found = LookupResponse::package(Some("com.whatsapp".into()));
        assert_eq!(
            serde_json::to_value(&found).unwrap(),
            serde_json::json!({"status": 200, "pkg_name": "com.whatsapp"})
        );

        let missing = LookupResponse::title(None);
        assert_eq!(
            serde_json::to_value(&missing).unwrap(),
            serde_json::json!({"status": 204})
        );

        let failed = LookupResponse::error(&Error::UpstreamHttp { status: 500 });
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            serde_json::json!({"status": 204, "error": "upstream returned HTTP 500"})
        );
    }
}
