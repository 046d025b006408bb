//! TCP and TLS dialing over resolved candidates.
//!
//! The [`Dialer`] resolves the target host through a [`Resolver`], orders the
//! candidates by address family, and then connects either serially or by
//! racing several candidates at once:
//!
//! - **Serial** (`level <= 1`): candidates are tried in order and a failed
//!   connect or handshake falls through to the next one.
//! - **Racing** (`level >= 2`): up to `level` candidates are dialed
//!   concurrently and the first success wins. Late successes are closed in
//!   the background.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use lookupd_net::{Dialer, DialerConfig, Network, Resolver, ResolverConfig};
//!
//! let resolver = Arc::new(Resolver::new(ResolverConfig::default()));
//! let dialer = Dialer::new(resolver, DialerConfig::default().level(2))?;
//!
//! let plain = dialer.dial(Network::Tcp, "example.com:80").await?;
//! let secure = dialer.dial_tls(Network::Tcp, "example.com:443").await?;
//! ```

mod config;

pub use config::{DialerConfig, Network};

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use rustls::ClientConfig;
use socket2::SockRef;
use tokio::net::{TcpSocket, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};
use tokio_rustls::TlsConnector;

use crate::dns::Resolver;
use crate::error::{NetError, Result};
use crate::ip::{is_ipv4_like, is_reserved_ip};
use crate::listener::keepalive;
use crate::stream::MaybeTlsStream;
use crate::tls;

/// Connects to hosts by name through a [`Resolver`].
pub struct Dialer {
    resolver: Arc<Resolver>,
    config: DialerConfig,
    tls: Arc<ClientConfig>,
}

impl Dialer {
    /// Create a dialer. TLS connections share one session store.
    pub fn new(resolver: Arc<Resolver>, config: DialerConfig) -> Result<Self> {
        let tls = tls::insecure_client_config(tls::session_store(config.session_cache_size))?;
        Ok(Self {
            resolver,
            config,
            tls,
        })
    }

    /// The resolver used for candidate lookup.
    pub fn resolver(&self) -> &Arc<Resolver> {
        &self.resolver
    }

    /// The dialer configuration.
    pub fn config(&self) -> &DialerConfig {
        &self.config
    }

    /// The TLS configuration used by [`dial_tls`](Self::dial_tls).
    pub fn tls_config(&self) -> Arc<ClientConfig> {
        Arc::clone(&self.tls)
    }

    /// Open a plain TCP connection to `address` (`host:port`).
    pub async fn dial(&self, network: Network, address: &str) -> Result<MaybeTlsStream> {
        let (host, port) = split_host_port(address)?;
        self.dial_host(network, &host, port, None, None).await
    }

    /// Open a TLS connection to `address` (`host:port`) using the dialer's
    /// TLS configuration.
    pub async fn dial_tls(&self, network: Network, address: &str) -> Result<MaybeTlsStream> {
        let (host, port) = split_host_port(address)?;
        self.dial_host(network, &host, port, Some(self.tls_config()), None)
            .await
    }

    /// Connect to `host:port`, optionally wrapping the connection in TLS,
    /// before `deadline` (combined with the configured timeout).
    pub async fn dial_host(
        &self,
        network: Network,
        host: &str,
        port: u16,
        tls: Option<Arc<ClientConfig>>,
        deadline: Option<Instant>,
    ) -> Result<MaybeTlsStream> {
        let deadline = self.deadline(deadline);
        let dial = self.dial_candidates(network, host, port, tls, deadline);
        match deadline {
            Some(deadline) => timeout_at(deadline, dial).await?,
            None => dial.await,
        }
    }

    fn deadline(&self, caller: Option<Instant>) -> Option<Instant> {
        let own = (!self.config.timeout.is_zero()).then(|| Instant::now() + self.config.timeout);
        match (own, caller) {
            (Some(own), Some(caller)) => Some(own.min(caller)),
            (own, caller) => own.or(caller),
        }
    }

    async fn dial_candidates(
        &self,
        network: Network,
        host: &str,
        port: u16,
        tls: Option<Arc<ClientConfig>>,
        deadline: Option<Instant>,
    ) -> Result<MaybeTlsStream> {
        let mut ips = self.resolver.lookup(host).await?;
        if ips.is_empty() {
            return Err(NetError::InvalidAddress(format!(
                "empty DNS record for {host}"
            )));
        }

        prefer_family(&mut ips, self.config.prefer_ipv6);

        if self.config.reject_intranet && is_reserved_ip(ips[0]) {
            return Err(NetError::InvalidAddress(format!(
                "intranet address rejected: {}",
                ips[0]
            )));
        }

        let attempt = Attempt {
            network,
            host: Arc::from(host),
            port,
            tls,
            keep_alive: self.config.keep_alive,
            local_addr: self.config.local_addr,
        };

        if self.config.level <= 1 {
            attempt.serial(ips).await
        } else {
            if ips.len() == 1 {
                ips.push(ips[0]);
            }
            attempt.race(ips, self.config.level, deadline).await
        }
    }
}

impl std::fmt::Debug for Dialer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dialer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Move a preferred-family address to the front.
///
/// With more than one candidate, when the first is not of the preferred
/// family and the last one is, the two swap places. Nothing else moves.
pub fn prefer_family(ips: &mut [IpAddr], prefer_ipv6: bool) {
    let Some(last) = ips.len().checked_sub(1).filter(|&last| last > 0) else {
        return;
    };

    let preferred = |ip: IpAddr| is_ipv4_like(ip) != prefer_ipv6;
    if !preferred(ips[0]) && preferred(ips[last]) {
        ips.swap(0, last);
    }
}

/// Split `host:port`, accepting bracketed IPv6 hosts.
pub fn split_host_port(address: &str) -> Result<(String, u16)> {
    let missing_port = || NetError::InvalidAddress(format!("missing port in address {address:?}"));

    let (host, port) = match address.strip_prefix('[') {
        Some(rest) => {
            let (host, rest) = rest.split_once(']').ok_or_else(missing_port)?;
            (host, rest.strip_prefix(':').ok_or_else(missing_port)?)
        }
        None => {
            let (host, port) = address.rsplit_once(':').ok_or_else(missing_port)?;
            if host.contains(':') {
                return Err(NetError::InvalidAddress(format!(
                    "too many colons in address {address:?}"
                )));
            }
            (host, port)
        }
    };

    let port = port
        .parse::<u16>()
        .map_err(|_| NetError::InvalidAddress(format!("invalid port in address {address:?}")))?;
    Ok((host.to_owned(), port))
}

/// Everything needed to dial one candidate, detached from the dialer so
/// that racing workers can own it.
#[derive(Clone)]
struct Attempt {
    network: Network,
    host: Arc<str>,
    port: u16,
    tls: Option<Arc<ClientConfig>>,
    keep_alive: Duration,
    local_addr: Option<IpAddr>,
}

impl Attempt {
    async fn connect(&self, ip: IpAddr) -> Result<MaybeTlsStream> {
        let target = SocketAddr::new(ip, self.port);
        if !self.network.permits(ip) {
            return Err(NetError::dial(
                target,
                format!("address family not usable on {}", self.network),
            ));
        }

        let socket = match ip {
            IpAddr::V4(_) => TcpSocket::new_v4(),
            IpAddr::V6(_) => TcpSocket::new_v6(),
        }
        .map_err(|e| NetError::dial(target, e))?;

        if let Some(local) = self.local_addr {
            socket
                .bind(SocketAddr::new(local, 0))
                .map_err(|e| NetError::dial(target, e))?;
        }

        let stream = socket
            .connect(target)
            .await
            .map_err(|e| NetError::dial(target, e))?;
        self.tune(&stream);

        let Some(config) = &self.tls else {
            return Ok(MaybeTlsStream::Plain(stream));
        };

        let server_name = tls::server_name(&self.host)?;
        let stream = TlsConnector::from(Arc::clone(config))
            .connect(server_name, stream)
            .await
            .map_err(|e| NetError::HandshakeFailed(format!("{} ({target}): {e}", self.host)))?;
        Ok(MaybeTlsStream::Tls(Box::new(stream)))
    }

    fn tune(&self, stream: &TcpStream) {
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(target: "lookupd_net::dialer", error = %e, "set_nodelay failed");
        }

        if !self.keep_alive.is_zero() {
            if let Err(e) = SockRef::from(stream).set_tcp_keepalive(&keepalive(self.keep_alive)) {
                tracing::debug!(target: "lookupd_net::dialer", error = %e, "set keepalive failed");
            }
        }
    }

    async fn serial(&self, ips: Vec<IpAddr>) -> Result<MaybeTlsStream> {
        let mut last = None;
        for ip in ips {
            match self.connect(ip).await {
                Ok(conn) => return Ok(conn),
                Err(e) => {
                    tracing::debug!(
                        target: "lookupd_net::dialer",
                        host = %self.host,
                        %ip,
                        error = %e,
                        "candidate failed"
                    );
                    last = Some(e);
                }
            }
        }
        Err(last.unwrap_or_else(|| NetError::InvalidAddress(format!("no candidates for {}", self.host))))
    }

    async fn race(
        &self,
        mut ips: Vec<IpAddr>,
        level: usize,
        deadline: Option<Instant>,
    ) -> Result<MaybeTlsStream> {
        ips.truncate(level);
        let level = ips.len();

        let (tx, mut rx) = mpsc::channel(level);
        let mut workers = Workers(Vec::with_capacity(level));
        for ip in ips {
            let tx = tx.clone();
            let attempt = self.clone();
            workers.0.push(tokio::spawn(async move {
                let _ = tx.send(attempt.connect(ip).await).await;
            }));
        }
        drop(tx);

        let mut last = None;
        let mut received = 0;
        while let Some(result) = rx.recv().await {
            received += 1;
            match result {
                Ok(conn) => {
                    let pending = level - received;
                    if pending > 0 {
                        tokio::spawn(drain(rx, workers, pending, deadline));
                    }
                    return Ok(conn);
                }
                Err(e) => {
                    tracing::debug!(
                        target: "lookupd_net::dialer",
                        host = %self.host,
                        error = %e,
                        "racing candidate failed"
                    );
                    last = Some(e);
                }
            }
        }

        Err(last.unwrap_or(NetError::Canceled))
    }
}

/// Aborts racing workers that are still running when dropped.
struct Workers(Vec<JoinHandle<()>>);

impl Drop for Workers {
    fn drop(&mut self) {
        for worker in &self.0 {
            worker.abort();
        }
    }
}

/// Close the connections of candidates that lost the race.
async fn drain(
    mut rx: mpsc::Receiver<Result<MaybeTlsStream>>,
    workers: Workers,
    pending: usize,
    deadline: Option<Instant>,
) {
    let closing = async {
        for _ in 0..pending {
            match rx.recv().await {
                Some(Ok(conn)) => {
                    tracing::trace!(
                        target: "lookupd_net::dialer",
                        peer = ?conn.peer_addr().ok(),
                        "closing surplus connection"
                    );
                    drop(conn);
                }
                Some(Err(_)) => {}
                None => break,
            }
        }
    };

    match deadline {
        Some(deadline) => {
            let _ = timeout_at(deadline, closing).await;
        }
        None => closing.await,
    }
    drop(workers);
}
