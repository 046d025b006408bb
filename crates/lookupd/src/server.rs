//! Inbound HTTP routes.
//!
//! Every lookup route answers `200 OK` with a JSON body; failures are
//! reported inside the body, never through the status line.

use std::fs::File;
use std::future::Future;
use std::io::BufReader;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Path, Request, State};
use axum::middleware::{self, Next};
use axum::response::{Json, Response};
use axum::routing::{get, post};
use axum::Router;
use bytes::Bytes;
use http::header::USER_AGENT;
use lookupd_net::{Dialer, Resolver, Transport, TransportConfig};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::googleplay::{GoogleplayHandler, LookupRequest, LookupResponse};
use crate::ipinfo::{IpinfoHandler, IpinfoResponse};

/// Text served on `/`.
pub const USAGE: &str = r#"Ipinfo lookup:

Usage:
    curl -v http://HOST/ipinfo/127.0.0.1
    curl -v -d '{"title": "WhatsApp Messenger", "geo": "IN"}' http://HOST/lookup-title
    curl -v -d '{"pkg_name": "com.whatsapp", "geo": "IN"}' http://HOST/lookup-pkgname
"#;

/// Handlers and limits shared by every route.
#[derive(Debug, Clone)]
pub struct AppState {
    pub ipinfo: Arc<IpinfoHandler>,
    pub googleplay: Arc<GoogleplayHandler>,
    /// Deadline applied to each lookup.
    pub request_timeout: Option<Duration>,
}

impl AppState {
    /// Create state from already built handlers.
    pub fn new(ipinfo: IpinfoHandler, googleplay: GoogleplayHandler) -> Self {
        Self {
            ipinfo: Arc::new(ipinfo),
            googleplay: Arc::new(googleplay),
            request_timeout: None,
        }
    }

    /// Set the per-lookup deadline.
    pub fn request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Build the resolver, dialer, transport and handlers described by
    /// `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let resolver = Arc::new(Resolver::new(config.resolver_config()));
        if let Some(path) = &config.resolver.hosts_file {
            let file = File::open(path)
                .map_err(|e| Error::config(format!("{}: {e}", path.display())))?;
            resolver
                .add_static_hosts(BufReader::new(file))
                .map_err(|e| Error::config(format!("{}: {e}", path.display())))?;
        }

        let dialer = Arc::new(Dialer::new(resolver, config.dialer_config())?);
        let transport = Transport::new(dialer, TransportConfig::default());

        let ipinfo = IpinfoHandler::from_config(&config.ipinfo, transport.clone())?;
        let googleplay = GoogleplayHandler::from_config(&config.googleplay, transport)?;

        Ok(Self::new(ipinfo, googleplay).request_timeout(config.request_timeout()))
    }

    async fn bounded<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match self.request_timeout {
            Some(limit) => tokio::time::timeout(limit, fut).await?,
            None => fut.await,
        }
    }
}

/// Build the router.
///
/// Serve it with `into_make_service_with_connect_info::<SocketAddr>()` so
/// handlers can see the caller's address.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ipinfo/", get(ipinfo_remote))
        .route("/ipinfo/{ip}", get(ipinfo))
        .route("/lookup-title", post(lookup_title))
        .route("/lookup-pkgname", post(lookup_pkgname))
        .layer(middleware::from_fn(access_log))
        .with_state(state)
}

async fn index() -> &'static str {
    USAGE
}

async fn ipinfo(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    Path(ip): Path<String>,
) -> Json<IpinfoResponse> {
    ipinfo_for(&state, remote, ip).await
}

async fn ipinfo_remote(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
) -> Json<IpinfoResponse> {
    ipinfo_for(&state, remote, String::new()).await
}

async fn ipinfo_for(state: &AppState, remote: SocketAddr, ip: String) -> Json<IpinfoResponse> {
    let ip = if ip.is_empty() {
        remote.ip().to_string()
    } else {
        ip
    };
    let result = state.bounded(state.ipinfo.lookup(&ip)).await;
    Json(IpinfoResponse::from(result))
}

async fn lookup_title(State(state): State<AppState>, body: Bytes) -> Json<LookupResponse> {
    let response = match decode(&body) {
        Ok(req) => state
            .bounded(state.googleplay.lookup_title(&req.title, &req.geo))
            .await
            .map(LookupResponse::package),
        Err(e) => Err(e),
    };
    Json(response.unwrap_or_else(|e| LookupResponse::error(&e)))
}

async fn lookup_pkgname(State(state): State<AppState>, body: Bytes) -> Json<LookupResponse> {
    let response = match decode(&body) {
        Ok(req) => state
            .bounded(state.googleplay.lookup_pkgname(&req.pkg_name, &req.geo))
            .await
            .map(LookupResponse::title),
        Err(e) => Err(e),
    };
    Json(response.unwrap_or_else(|e| LookupResponse::error(&e)))
}

fn decode(body: &[u8]) -> Result<LookupRequest> {
    Ok(serde_json::from_slice(body)?)
}

async fn access_log(
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let agent = request
        .headers()
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_owned();
    let started = Instant::now();

    let response = next.run(request).await;

    tracing::debug!(
        target: "lookupd::server",
        %remote,
        %method,
        %uri,
        user_agent = %agent,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request"
    );
    response
}
