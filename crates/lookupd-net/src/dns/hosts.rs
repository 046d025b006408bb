//! hosts(5)-style line parsing.

use std::net::IpAddr;

/// Parse one hosts line into its address and names.
///
/// Everything after `#` is a comment. Lines with fewer than two fields or
/// whose first field is not an IP address yield `None`.
pub fn parse_hosts_line(line: &str) -> Option<(IpAddr, Vec<&str>)> {
    let line = match line.find('#') {
        Some(pos) => &line[..pos],
        None => line,
    };

    let mut fields = line.split_whitespace();
    let ip = fields.next()?.parse::<IpAddr>().ok()?;
    let names: Vec<&str> = fields.collect();
    if names.is_empty() {
        return None;
    }

    Some((ip, names))
}
