//! Public address resolver
//!
//! The resolved address is injected into the DHT bootstrap set and into the
//! `x.pe` hint of published magnet links.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use tracing::{debug, info};

use crate::error::{P2pError, Result};

/// Any routable address works; connecting a UDP socket sends no packet.
const ROUTE_PROBE: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)), 80);

/// Parse `explicit` if given, otherwise use the default-route interface address
pub fn resolve_public_ip(explicit: Option<&str>) -> Result<IpAddr> {
    match explicit.map(str::trim).filter(|ip| !ip.is_empty()) {
        Some(ip) => {
            let parsed = ip.parse::<IpAddr>().map_err(|_| P2pError::invalid_address(ip))?;
            debug!("Using configured public ip {}", parsed);
            Ok(parsed)
        }
        None => {
            let ip = default_route_ip()?;
            info!("Detected default public ip: {}", ip);
            Ok(ip)
        }
    }
}

/// Address of the interface the kernel would route outbound traffic through
pub fn default_route_ip() -> Result<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .map_err(|e| P2pError::resource("Failed to bind socket for IP detection", e.to_string()))?;
    socket
        .connect(ROUTE_PROBE)
        .map_err(|e| P2pError::resource("No default route for IP detection", e.to_string()))?;
    let local = socket
        .local_addr()
        .map_err(|e| P2pError::resource("Failed to read local address", e.to_string()))?;

    Ok(local.ip())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_ipv4() {
        let ip = resolve_public_ip(Some("10.1.2.3")).unwrap();
        assert_eq!(ip, "10.1.2.3".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_explicit_ipv6() {
        let ip = resolve_public_ip(Some("::1")).unwrap();
        assert!(ip.is_ipv6());
    }

    #[test]
    fn test_malformed_ip() {
        let err = resolve_public_ip(Some("300.1.1.1")).unwrap_err();
        assert!(matches!(err, P2pError::InvalidAddress { .. }));
        let err = resolve_public_ip(Some("not-an-ip")).unwrap_err();
        assert!(matches!(err, P2pError::InvalidAddress { .. }));
    }

    #[test]
    fn test_blank_means_detect() {
        // Sandboxes without a default route legitimately fail detection
        match resolve_public_ip(Some("  ")) {
            Ok(ip) => assert!(!ip.is_unspecified()),
            Err(err) => assert!(matches!(err, P2pError::ResourceAcquisition { .. })),
        }
    }
}
