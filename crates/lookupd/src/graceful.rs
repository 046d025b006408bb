//! Serving and graceful shutdown.
//!
//! Shutdown happens in two steps, expressed by [`Quiesce`]: stop taking new
//! connections, then wait a bounded time for requests already running.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use axum::serve::Listener;
use lookupd_net::TunedListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// A server that can be wound down.
pub trait Quiesce {
    /// Stop accepting new inbound connections.
    fn begin_quiesce(&self);

    /// Wait for in-flight requests to finish, at most `timeout`.
    ///
    /// Resolves to `true` when everything finished in time.
    fn await_drain(&mut self, timeout: Duration) -> impl Future<Output = bool> + Send;
}

/// A router being served on a background task.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    stop: watch::Sender<bool>,
    task: Option<JoinHandle<io::Result<()>>>,
}

impl ServerHandle {
    /// Serve `router` on `listener` until quiesced.
    pub fn spawn(listener: TunedListener, router: Router) -> io::Result<Self> {
        let local_addr = Listener::local_addr(&listener)?;
        let (stop, mut stopped) = watch::channel(false);
        let app = router.into_make_service_with_connect_info::<SocketAddr>();

        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = stopped.wait_for(|stop| *stop).await;
                })
                .await
        });

        Ok(Self {
            local_addr,
            stop,
            task: Some(task),
        })
    }

    /// The address being served.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Quiesce for ServerHandle {
    fn begin_quiesce(&self) {
        self.stop.send_replace(true);
    }

    async fn await_drain(&mut self, timeout: Duration) -> bool {
        let Some(task) = self.task.as_mut() else {
            return true;
        };

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(Ok(()))) => {
                self.task = None;
                true
            }
            Ok(Ok(Err(e))) => {
                tracing::error!(target: "lookupd::graceful", error = %e, "server stopped with error");
                self.task = None;
                true
            }
            Ok(Err(e)) => {
                tracing::error!(target: "lookupd::graceful", error = %e, "server task failed");
                self.task = None;
                true
            }
            Err(_) => false,
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Wait for a shutdown signal and return its name.
///
/// SIGHUP, SIGTERM and Ctrl-C are honored on Unix; Ctrl-C elsewhere.
pub async fn shutdown_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let (Ok(mut hup), Ok(mut term)) = (
            signal(SignalKind::hangup()),
            signal(SignalKind::terminate()),
        ) else {
            tracing::warn!(target: "lookupd::graceful", "cannot install signal handlers, falling back to ctrl-c");
            let _ = tokio::signal::ctrl_c().await;
            return "SIGINT";
        };

        tokio::select! {
            _ = hup.recv() => "SIGHUP",
            _ = term.recv() => "SIGTERM",
            _ = tokio::signal::ctrl_c() => "SIGINT",
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        "SIGINT"
    }
}

/// Quiesce `server` once `signal` fires and give it `timeout` to drain.
pub async fn shutdown_on<Q, S>(server: &mut Q, signal: S, timeout: Duration) -> bool
where
    Q: Quiesce,
    S: Future<Output = &'static str>,
{
    let name = signal.await;
    tracing::warn!(
        target: "lookupd::graceful",
        signal = name,
        timeout_secs = timeout.as_secs(),
        "starting graceful shutdown"
    );

    server.begin_quiesce();
    let drained = server.await_drain(timeout).await;
    if drained {
        tracing::info!(target: "lookupd::graceful", "server shut down");
    } else {
        tracing::warn!(target: "lookupd::graceful", "drain timed out, abandoning in-flight requests");
    }
    drained
}
