//! Dialer configuration.

use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::error::NetError;

/// Address family restriction for a dial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Network {
    /// Any family.
    #[default]
    Tcp,
    /// IPv4 only.
    Tcp4,
    /// IPv6 only.
    Tcp6,
}

impl Network {
    /// Whether `ip` may be dialed on this network.
    pub fn permits(self, ip: IpAddr) -> bool {
        match self {
            Network::Tcp => true,
            Network::Tcp4 => ip.is_ipv4(),
            Network::Tcp6 => ip.is_ipv6(),
        }
    }
}

impl FromStr for Network {
    type Err = NetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(Network::Tcp),
            "tcp4" => Ok(Network::Tcp4),
            "tcp6" => Ok(Network::Tcp6),
            other => Err(NetError::InvalidAddress(format!("unknown network {other:?}"))),
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Network::Tcp => "tcp",
            Network::Tcp4 => "tcp4",
            Network::Tcp6 => "tcp6",
        })
    }
}

/// Configuration for the [`Dialer`](super::Dialer).
#[derive(Debug, Clone)]
pub struct DialerConfig {
    /// Local address to bind before connecting.
    pub local_addr: Option<IpAddr>,

    /// TCP keep-alive period on established sockets. Zero disables it.
    pub keep_alive: Duration,

    /// Overall dial timeout, covering resolution, connect and handshake.
    /// Zero means no dialer-imposed deadline.
    pub timeout: Duration,

    /// Number of candidates raced in parallel. 0 and 1 dial serially.
    pub level: usize,

    /// Refuse to dial when the first candidate is a reserved address.
    pub reject_intranet: bool,

    /// Prefer IPv6 candidates over IPv4 ones.
    pub prefer_ipv6: bool,

    /// Number of TLS sessions kept for resumption.
    pub session_cache_size: usize,
}

impl Default for DialerConfig {
    fn default() -> Self {
        Self {
            local_addr: None,
            keep_alive: Duration::from_secs(30),
            timeout: Duration::from_secs(30),
            level: 1,
            reject_intranet: false,
            prefer_ipv6: false,
            session_cache_size: crate::tls::DEFAULT_SESSION_CACHE_SIZE,
        }
    }
}

impl DialerConfig {
    /// Create a configuration with the default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind outgoing sockets to `addr`.
    pub fn local_addr(mut self, addr: IpAddr) -> Self {
        self.local_addr = Some(addr);
        self
    }

    /// Set the keep-alive period.
    pub fn keep_alive(mut self, period: Duration) -> Self {
        self.keep_alive = period;
        self
    }

    /// Set the dial timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the race level.
    pub fn level(mut self, level: usize) -> Self {
        self.level = level;
        self
    }

    /// Enable or disable reserved-address rejection.
    pub fn reject_intranet(mut self, reject: bool) -> Self {
        self.reject_intranet = reject;
        self
    }

    /// Prefer IPv6 candidates.
    pub fn prefer_ipv6(mut self, prefer: bool) -> Self {
        self.prefer_ipv6 = prefer;
        self
    }

    /// Set the TLS session cache size.
    pub fn session_cache_size(mut self, size: usize) -> Self {
        self.session_cache_size = size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_parse() {
        assert_eq!("tcp".parse::<Network>().unwrap(), Network::Tcp);
        assert_eq!("tcp4".parse::<Network>().unwrap(), Network::Tcp4);
        assert_eq!("tcp6".parse::<Network>().unwrap(), Network::Tcp6);
        assert!("udp".parse::<Network>().is_err());
    }

    #[test]
    fn test_network_permits() {
        let v4: IpAddr = "192.0.2.1".parse().unwrap();
        let v6: IpAddr = "2001:db8::1".parse().unwrap();
        assert!(Network::Tcp.permits(v4) && Network::Tcp.permits(v6));
        assert!(Network::Tcp4.permits(v4) && !Network::Tcp4.permits(v6));
        assert!(!Network::Tcp6.permits(v4) && Network::Tcp6.permits(v6));
    }

    #[test]
    fn test_builder() {
        let config = DialerConfig::new().level(3).prefer_ipv6(true);
        assert_eq!(config.level, 3);
        assert!(config.prefer_ipv6);
        assert_eq!(config.timeout, Duration::from_secs(30));
    }
}
