//! Address classification.
//!
//! [`is_reserved_ip`] decides whether an address belongs to a private,
//! loopback, link-local, documentation or otherwise non-routable block.
//! [`is_pollution_ip`] recognises addresses commonly injected by tampering
//! DNS middleboxes.

use std::net::{IpAddr, Ipv4Addr};

/// Reserved IPv4 blocks as `(network, prefix length)`.
const RESERVED_V4: &[(Ipv4Addr, u8)] = &[
    (Ipv4Addr::new(10, 0, 0, 0), 8),
    (Ipv4Addr::new(100, 64, 0, 0), 10),
    (Ipv4Addr::new(127, 0, 0, 0), 8),
    (Ipv4Addr::new(169, 254, 0, 0), 16),
    (Ipv4Addr::new(172, 16, 0, 0), 12),
    (Ipv4Addr::new(192, 0, 0, 0), 24),
    (Ipv4Addr::new(192, 0, 2, 0), 24),
    (Ipv4Addr::new(192, 18, 0, 0), 15),
    (Ipv4Addr::new(192, 51, 100, 0), 24),
    (Ipv4Addr::new(192, 88, 99, 0), 24),
    (Ipv4Addr::new(192, 168, 0, 0), 16),
    (Ipv4Addr::new(203, 0, 113, 0), 24),
    (Ipv4Addr::new(224, 0, 0, 0), 4),
    (Ipv4Addr::new(240, 0, 0, 0), 4),
];

/// Known bogus answers, sorted ascending for binary search.
const POLLUTION_IPS: &[Ipv4Addr] = &[
    Ipv4Addr::new(1, 1, 1, 1),
    Ipv4Addr::new(1, 2, 3, 4),
    Ipv4Addr::new(2, 1, 1, 2),
    Ipv4Addr::new(4, 36, 66, 178),
    Ipv4Addr::new(8, 7, 198, 45),
    Ipv4Addr::new(10, 10, 10, 10),
    Ipv4Addr::new(20, 20, 20, 20),
    Ipv4Addr::new(23, 89, 5, 60),
    Ipv4Addr::new(31, 13, 66, 1),
    Ipv4Addr::new(31, 13, 68, 22),
    Ipv4Addr::new(31, 13, 69, 86),
    Ipv4Addr::new(31, 13, 74, 40),
    Ipv4Addr::new(37, 61, 54, 158),
    Ipv4Addr::new(42, 123, 125, 237),
    Ipv4Addr::new(46, 82, 174, 68),
    Ipv4Addr::new(49, 2, 123, 56),
    Ipv4Addr::new(54, 76, 135, 1),
    Ipv4Addr::new(59, 24, 3, 173),
    Ipv4Addr::new(60, 19, 29, 22),
    Ipv4Addr::new(61, 131, 208, 210),
    Ipv4Addr::new(61, 131, 208, 211),
    Ipv4Addr::new(64, 33, 88, 161),
    Ipv4Addr::new(64, 33, 99, 47),
    Ipv4Addr::new(64, 66, 163, 251),
    Ipv4Addr::new(65, 104, 202, 252),
    Ipv4Addr::new(65, 160, 219, 113),
    Ipv4Addr::new(66, 45, 252, 237),
    Ipv4Addr::new(69, 171, 247, 20),
    Ipv4Addr::new(72, 14, 205, 99),
    Ipv4Addr::new(72, 14, 205, 104),
    Ipv4Addr::new(74, 125, 31, 113),
    Ipv4Addr::new(74, 125, 39, 102),
    Ipv4Addr::new(74, 125, 39, 113),
    Ipv4Addr::new(74, 125, 127, 102),
    Ipv4Addr::new(74, 125, 127, 113),
    Ipv4Addr::new(74, 125, 130, 47),
    Ipv4Addr::new(74, 125, 155, 102),
    Ipv4Addr::new(77, 4, 7, 92),
    Ipv4Addr::new(78, 16, 49, 15),
    Ipv4Addr::new(92, 242, 144, 2),
    Ipv4Addr::new(93, 46, 8, 89),
    Ipv4Addr::new(108, 160, 166, 92),
    Ipv4Addr::new(110, 249, 209, 42),
    Ipv4Addr::new(118, 5, 49, 6),
    Ipv4Addr::new(120, 192, 83, 163),
    Ipv4Addr::new(123, 129, 254, 12),
    Ipv4Addr::new(123, 129, 254, 13),
    Ipv4Addr::new(123, 129, 254, 14),
    Ipv4Addr::new(123, 129, 254, 15),
    Ipv4Addr::new(125, 211, 213, 132),
    Ipv4Addr::new(128, 121, 126, 139),
    Ipv4Addr::new(159, 106, 121, 75),
    Ipv4Addr::new(169, 132, 13, 103),
    Ipv4Addr::new(183, 221, 250, 11),
    Ipv4Addr::new(185, 85, 13, 155),
    Ipv4Addr::new(188, 5, 4, 96),
    Ipv4Addr::new(189, 163, 17, 5),
    Ipv4Addr::new(192, 67, 198, 6),
    Ipv4Addr::new(197, 4, 4, 12),
    Ipv4Addr::new(202, 98, 24, 122),
    Ipv4Addr::new(202, 98, 24, 124),
    Ipv4Addr::new(202, 98, 24, 125),
    Ipv4Addr::new(202, 106, 1, 2),
    Ipv4Addr::new(202, 181, 7, 85),
    Ipv4Addr::new(203, 98, 7, 65),
    Ipv4Addr::new(203, 161, 230, 171),
    Ipv4Addr::new(207, 12, 88, 98),
    Ipv4Addr::new(208, 56, 31, 43),
    Ipv4Addr::new(209, 36, 73, 33),
    Ipv4Addr::new(209, 85, 229, 138),
    Ipv4Addr::new(209, 145, 54, 50),
    Ipv4Addr::new(209, 220, 30, 174),
    Ipv4Addr::new(210, 242, 125, 20),
    Ipv4Addr::new(211, 94, 66, 147),
    Ipv4Addr::new(211, 98, 70, 195),
    Ipv4Addr::new(211, 98, 70, 226),
    Ipv4Addr::new(211, 98, 70, 227),
    Ipv4Addr::new(211, 98, 71, 195),
    Ipv4Addr::new(211, 138, 34, 204),
    Ipv4Addr::new(211, 138, 74, 132),
    Ipv4Addr::new(213, 169, 251, 35),
    Ipv4Addr::new(216, 221, 188, 182),
    Ipv4Addr::new(216, 234, 179, 13),
    Ipv4Addr::new(218, 93, 250, 18),
    Ipv4Addr::new(220, 165, 8, 172),
    Ipv4Addr::new(220, 165, 8, 174),
    Ipv4Addr::new(220, 250, 64, 20),
    Ipv4Addr::new(221, 179, 46, 190),
    Ipv4Addr::new(243, 185, 187, 39),
    Ipv4Addr::new(249, 129, 46, 48),
    Ipv4Addr::new(253, 157, 14, 165),
    Ipv4Addr::new(255, 255, 255, 255),
];

/// The IPv4 view of `ip`: IPv4 itself, or the embedded address of an
/// IPv4-mapped IPv6 address.
fn as_v4(ip: IpAddr) -> Option<Ipv4Addr> {
    match ip {
        IpAddr::V4(v4) => Some(v4),
        IpAddr::V6(v6) => v6.to_ipv4_mapped(),
    }
}

fn in_block(ip: Ipv4Addr, network: Ipv4Addr, prefix: u8) -> bool {
    let mask = u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0);
    u32::from(ip) & mask == u32::from(network) & mask
}

/// Whether `ip` lies in a reserved IPv4 block.
///
/// Native IPv6 addresses are never reserved.
pub fn is_reserved_ip(ip: IpAddr) -> bool {
    as_v4(ip).is_some_and(|v4| {
        RESERVED_V4
            .iter()
            .any(|&(network, prefix)| in_block(v4, network, prefix))
    })
}

/// Whether `ip` is a known DNS pollution answer.
pub fn is_pollution_ip(ip: IpAddr) -> bool {
    as_v4(ip).is_some_and(|v4| POLLUTION_IPS.binary_search(&v4).is_ok())
}

/// Whether `ip` should be treated as IPv4 for family preference.
pub fn is_ipv4_like(ip: IpAddr) -> bool {
    as_v4(ip).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_reserved_examples() {
        assert!(is_reserved_ip(ip("10.1.2.3")));
        assert!(is_reserved_ip(ip("100.64.0.1")));
        assert!(is_reserved_ip(ip("100.127.255.255")));
        assert!(!is_reserved_ip(ip("100.128.0.1")));
        assert!(is_reserved_ip(ip("127.0.0.1")));
        assert!(is_reserved_ip(ip("172.16.0.1")));
        assert!(is_reserved_ip(ip("172.31.255.1")));
        assert!(!is_reserved_ip(ip("172.32.0.1")));
        assert!(is_reserved_ip(ip("192.168.1.1")));
        assert!(is_reserved_ip(ip("192.19.0.1")));
        assert!(!is_reserved_ip(ip("192.20.0.1")));
        assert!(is_reserved_ip(ip("203.0.113.5")));
        assert!(is_reserved_ip(ip("224.0.0.1")));
        assert!(is_reserved_ip(ip("239.255.255.250")));
        assert!(is_reserved_ip(ip("255.255.255.255")));
        assert!(!is_reserved_ip(ip("8.8.8.8")));
        assert!(!is_reserved_ip(ip("2001:db8::1")));
        assert!(!is_reserved_ip(ip("::1")));
    }

    #[test]
    fn test_mapped_ipv6_uses_ipv4_rules() {
        assert!(is_reserved_ip(ip("::ffff:10.0.0.1")));
        assert!(!is_reserved_ip(ip("::ffff:8.8.8.8")));
        assert!(is_pollution_ip(ip("::ffff:1.2.3.4")));
    }

    #[test]
    fn test_pollution_table_is_sorted() {
        assert!(POLLUTION_IPS.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_pollution_lookup() {
        assert!(is_pollution_ip(ip("1.2.3.4")));
        assert!(is_pollution_ip(ip("74.125.127.102")));
        assert!(is_pollution_ip(ip("255.255.255.255")));
        assert!(!is_pollution_ip(ip("1.2.3.5")));
        assert!(!is_pollution_ip(ip("2001:db8::1")));
    }

    #[test]
    fn test_ipv4_like() {
        assert!(is_ipv4_like(ip("1.2.3.4")));
        assert!(is_ipv4_like(ip("::ffff:1.2.3.4")));
        assert!(!is_ipv4_like(ip("2001:db8::1")));
    }
}
