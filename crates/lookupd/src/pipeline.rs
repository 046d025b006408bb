//! Coalesced upstream fetches.
//!
//! A [`Pipeline`] turns a query into one upstream GET, no matter how many
//! callers ask for it at once:
//!
//! 1. the query is substituted into the URL template (first `%s` only)
//! 2. the URL, plus a caller-chosen suffix such as a language, becomes the
//!    flight key
//! 3. the first caller for that key performs the GET and parses the body;
//!    everyone else waiting on the key receives a clone of the outcome
//!
//! Answer caching lives in the handlers, which decide what is worth keeping.

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use lookupd_core::SingleFlight;
use lookupd_net::Transport;

use crate::config::QUERY_PLACEHOLDER;
use crate::error::{Error, Result};

/// One upstream endpoint behind a single-flight group.
pub struct Pipeline<T> {
    name: &'static str,
    template: String,
    transport: Transport,
    flights: SingleFlight<T, Error>,
}

impl<T: Clone> Pipeline<T> {
    /// Create a pipeline fetching `template` through `transport`.
    ///
    /// `name` labels log records.
    pub fn new(name: &'static str, template: impl Into<String>, transport: Transport) -> Self {
        Self {
            name,
            template: template.into(),
            transport,
            flights: SingleFlight::new(),
        }
    }

    /// The upstream URL for `query`.
    pub fn url_for(&self, query: &str) -> Result<String> {
        let raw = self.template.replacen(QUERY_PLACEHOLDER, query, 1);
        Ok(url::Url::parse(&raw)?.into())
    }

    /// Fetch `query` and parse the body with `parse`.
    ///
    /// Concurrent calls whose URL and `vary` match share a single GET. The
    /// flight record is dropped as soon as the fetch finishes, successful or
    /// not, so the next miss always goes upstream again.
    pub async fn fetch<P>(
        &self,
        query: &str,
        vary: &str,
        headers: &[(HeaderName, HeaderValue)],
        parse: P,
    ) -> Result<T>
    where
        P: FnOnce(&str) -> Result<T>,
    {
        let url = self.url_for(query)?;
        let key = format!("{url}{vary}");

        let (result, shared) = self
            .flights
            .run(&key, async {
                let result = self.get(&url, headers).await.and_then(|body| {
                    parse(&String::from_utf8_lossy(&body))
                });
                self.flights.forget(&key);
                result
            })
            .await;

        match &result {
            Ok(_) => tracing::debug!(
                target: "lookupd::pipeline",
                pipeline = self.name,
                url = %url,
                shared,
                "fetch complete"
            ),
            Err(e) => tracing::info!(
                target: "lookupd::pipeline",
                pipeline = self.name,
                url = %url,
                shared,
                error = %e,
                "fetch failed"
            ),
        }
        result
    }

    /// Number of fetches currently in progress.
    pub fn in_flight(&self) -> usize {
        self.flights.len()
    }

    async fn get(&self, url: &str, headers: &[(HeaderName, HeaderValue)]) -> Result<Bytes> {
        let response = self.transport.get(url, headers).await?;
        if !response.status.is_success() {
            return Err(Error::UpstreamHttp {
                status: response.status.as_u16(),
            });
        }
        Ok(response.body)
    }
}

impl<T> std::fmt::Debug for Pipeline<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("template", &self.template)
            .finish_non_exhaustive()
    }
}
