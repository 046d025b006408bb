//! Pooled HTTP/1.1 transport for upstream fetches.
//!
//! [`Transport`] is a hyper client whose connector dials through the
//! [`Dialer`], so every upstream request benefits from static hosts, the DNS
//! cache, candidate racing and TLS session reuse. Idle connections are kept
//! per host and reused across requests.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{Method, Request, StatusCode, Uri};
use http_body_util::{BodyExt, Empty};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::{Connected, Connection};
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use tower::Service;

use crate::dialer::{Dialer, Network};
use crate::error::{NetError, Result};
use crate::stream::MaybeTlsStream;

/// Connection pool settings.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Maximum idle connections kept per host.
    pub max_idle_per_host: usize,
    /// How long an idle connection is kept before closing.
    pub idle_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: 100,
            idle_timeout: Duration::from_secs(90),
        }
    }
}

impl TransportConfig {
    /// Set the per-host idle connection limit.
    pub fn max_idle_per_host(mut self, max: usize) -> Self {
        self.max_idle_per_host = max;
        self
    }

    /// Set the idle connection timeout.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }
}

/// A fully read upstream response.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    /// Response status.
    pub status: StatusCode,
    /// Complete response body.
    pub body: Bytes,
}

impl UpstreamResponse {
    /// The body as text, replacing invalid UTF-8 sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// A dialed connection adapted to hyper's I/O traits.
pub struct UpstreamIo(TokioIo<MaybeTlsStream>);

impl UpstreamIo {
    /// The dialed stream.
    pub fn get_ref(&self) -> &MaybeTlsStream {
        self.0.inner()
    }
}

impl hyper::rt::Read for UpstreamIo {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: hyper::rt::ReadBufCursor<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().0).poll_read(cx, buf)
    }
}

impl hyper::rt::Write for UpstreamIo {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().0).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().0).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().0).poll_shutdown(cx)
    }
}

impl Connection for UpstreamIo {
    fn connected(&self) -> Connected {
        Connected::new()
    }
}

/// hyper connector that opens connections with a [`Dialer`].
#[derive(Clone)]
pub struct DialConnector {
    dialer: Arc<Dialer>,
}

impl DialConnector {
    /// Create a connector over `dialer`.
    pub fn new(dialer: Arc<Dialer>) -> Self {
        Self { dialer }
    }
}

impl Service<Uri> for DialConnector {
    type Response = UpstreamIo;
    type Error = NetError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, uri: Uri) -> Self::Future {
        let dialer = Arc::clone(&self.dialer);
        Box::pin(async move {
            let secure = match uri.scheme_str() {
                Some("https") => true,
                Some("http") | None => false,
                Some(other) => {
                    return Err(NetError::InvalidAddress(format!(
                        "unsupported scheme {other:?}"
                    )));
                }
            };

            let host = uri
                .host()
                .map(|host| host.trim_start_matches('[').trim_end_matches(']'))
                .ok_or_else(|| NetError::InvalidAddress(format!("missing host in {uri}")))?;
            let port = uri.port_u16().unwrap_or(if secure { 443 } else { 80 });
            let tls = secure.then(|| dialer.tls_config());

            let stream = dialer
                .dial_host(Network::Tcp, host, port, tls, None)
                .await?;
            Ok(UpstreamIo(TokioIo::new(stream)))
        })
    }
}

/// Pooled upstream HTTP client.
#[derive(Clone)]
pub struct Transport {
    client: Client<DialConnector, Empty<Bytes>>,
}

impl Transport {
    /// Create a transport dialing through `dialer`.
    pub fn new(dialer: Arc<Dialer>, config: TransportConfig) -> Self {
        let client = Client::builder(TokioExecutor::new())
            .pool_timer(TokioTimer::new())
            .pool_idle_timeout(config.idle_timeout)
            .pool_max_idle_per_host(config.max_idle_per_host)
            .build(DialConnector::new(dialer));

        Self { client }
    }

    /// Issue a GET for `url` with extra `headers` and read the whole body.
    pub async fn get(
        &self,
        url: &str,
        headers: &[(HeaderName, HeaderValue)],
    ) -> Result<UpstreamResponse> {
        let uri: Uri = url
            .parse()
            .map_err(|e| NetError::InvalidAddress(format!("{url}: {e}")))?;

        let mut builder = Request::builder().method(Method::GET).uri(uri);
        for (name, value) in headers {
            builder = builder.header(name, value);
        }
        let request = builder.body(Empty::<Bytes>::new())?;

        let response = self.client.request(request).await?;
        let status = response.status();
        let body = response.into_body().collect().await?.to_bytes();

        tracing::debug!(
            target: "lookupd_net::transport",
            url,
            status = status.as_u16(),
            bytes = body.len(),
            "upstream response"
        );

        Ok(UpstreamResponse { status, body })
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport").finish_non_exhaustive()
    }
}
