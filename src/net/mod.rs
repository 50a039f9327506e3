//! Local network helpers
//!
//! Port allocation and public address detection used before a session opens.

pub mod port;
pub mod address;

pub use port::{get_available_port, is_port_available, parse_port_range};
pub use address::{default_route_ip, resolve_public_ip};
