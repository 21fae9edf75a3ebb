//! Local address discovery

use std::net::UdpSocket;
use tracing::debug;

/// Best-effort detection of the machine's outbound IPv4 address.
///
/// Connecting a UDP socket performs no I/O; it only asks the OS which local
/// address would route toward the target. Returns `None` on hosts with no
/// usable route, in which case callers pick their own fallback.
pub fn local_ip() -> Option<String> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    let address = socket.local_addr().ok()?;
    debug!(%address, "detected local address");
    Some(address.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_ip_is_a_parsable_address_when_present() {
        if let Some(ip) = local_ip() {
            assert!(ip.parse::<std::net::IpAddr>().is_ok());
            assert_ne!(ip, "0.0.0.0");
        }
    }
}
