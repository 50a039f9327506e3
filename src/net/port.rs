//! Port allocator
//!
//! Scans an inclusive port range for a port that is currently free for both
//! UDP and TCP. The probe binds and immediately closes, so another process
//! may still grab the port before the engine does.

use std::net::{Ipv4Addr, SocketAddrV4, TcpListener, UdpSocket};
use std::ops::RangeInclusive;
use tracing::{debug, info};

use crate::error::{P2pError, Result};

/// Parse an inclusive `"min-max"` range
pub fn parse_port_range(range: &str) -> Result<RangeInclusive<u16>> {
    let (min, max) = range
        .trim()
        .split_once('-')
        .ok_or_else(|| P2pError::port_range_invalid(range))?;

    let min: u16 = min.trim().parse().map_err(|_| P2pError::port_range_invalid(range))?;
    let max: u16 = max.trim().parse().map_err(|_| P2pError::port_range_invalid(range))?;
    if min > max {
        return Err(P2pError::port_range_invalid(range));
    }

    Ok(min..=max)
}

/// Return the first port in `range` that can be bound for both UDP and TCP
pub fn get_available_port(range: &str) -> Result<u16> {
    let ports = parse_port_range(range)?;
    debug!("Probing ports {}..={}", ports.start(), ports.end());

    for port in ports {
        if is_port_available(port) {
            info!("Selected listen port {}", port);
            return Ok(port);
        }
    }

    Err(P2pError::no_port_available(range))
}

/// Probe a single port with a UDP bind followed by a TCP bind
pub fn is_port_available(port: u16) -> bool {
    let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);

    match UdpSocket::bind(addr) {
        Ok(socket) => drop(socket),
        Err(e) => {
            debug!("UDP port {} is not available: {}", port, e);
            return false;
        }
    }

    match TcpListener::bind(addr) {
        Ok(listener) => drop(listener),
        Err(e) => {
            debug!("TCP port {} is not available: {}", port, e);
            return false;
        }
    }

    true
}
