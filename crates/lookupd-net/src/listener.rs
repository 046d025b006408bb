//! Accept-side TCP tuning.
//!
//! Inbound sockets are tuned through axum's `tap_io` hook, so the result is
//! still an ordinary [`axum::serve::Listener`] and keeps axum's accept loop
//! and connect-info support.

use std::io;
use std::time::Duration;

use axum::serve::{ListenerExt, TapIo};
use socket2::{SockRef, TcpKeepalive};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};

/// Keep-alive period applied to accepted connections.
pub const ACCEPT_KEEP_ALIVE: Duration = Duration::from_secs(3 * 60);

/// Socket buffer size applied to accepted connections.
pub const ACCEPT_BUFFER_SIZE: usize = 32 * 1024;

/// A TCP listener that enables keep-alive and sizes socket buffers on every
/// accepted connection. Hand it straight to `axum::serve`.
pub type TunedListener = TapIo<TcpListener, fn(&mut TcpStream)>;

/// Bind to `addr` and tune every accepted connection.
pub async fn bind(addr: impl ToSocketAddrs) -> io::Result<TunedListener> {
    Ok(tuned(TcpListener::bind(addr).await?))
}

/// Wrap an already bound listener.
pub fn tuned(listener: TcpListener) -> TunedListener {
    listener.tap_io(tune_accepted as fn(&mut TcpStream))
}

/// Keep-alive parameters probing every `period`, after `period` of idleness.
pub(crate) fn keepalive(period: Duration) -> TcpKeepalive {
    let params = TcpKeepalive::new().with_time(period);
    #[cfg(any(
        target_os = "linux",
        target_os = "android",
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd",
        target_os = "netbsd",
        target_os = "windows",
    ))]
    let params = params.with_interval(period);
    params
}

fn tune_accepted(stream: &mut TcpStream) {
    let socket = SockRef::from(&*stream);
    let tuned = socket
        .set_tcp_keepalive(&keepalive(ACCEPT_KEEP_ALIVE))
        .and_then(|()| socket.set_recv_buffer_size(ACCEPT_BUFFER_SIZE))
        .and_then(|()| socket.set_send_buffer_size(ACCEPT_BUFFER_SIZE));

    if let Err(e) = tuned {
        tracing::debug!(
            target: "lookupd_net::listener",
            peer = ?stream.peer_addr().ok(),
            error = %e,
            "socket tuning failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::serve::Listener;

    #[tokio::test]
    async fn test_accepted_sockets_are_tuned() {
        let mut listener = bind("127.0.0.1:0").await.unwrap();
        let addr = Listener::local_addr(&listener).unwrap();

        let client = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });
        let (stream, peer) = Listener::accept(&mut listener).await;
        let client = client.await.unwrap();

        assert_eq!(peer, client.local_addr().unwrap());
        let socket = SockRef::from(&stream);
        assert!(socket.keepalive().unwrap());
        assert!(socket.recv_buffer_size().unwrap() >= ACCEPT_BUFFER_SIZE);
        assert!(socket.send_buffer_size().unwrap() >= ACCEPT_BUFFER_SIZE);

        #[cfg(target_os = "linux")]
        {
            assert_eq!(socket.keepalive_time().unwrap(), ACCEPT_KEEP_ALIVE);
            assert_eq!(socket.keepalive_interval().unwrap(), ACCEPT_KEEP_ALIVE);
        }
    }
}
