//! DHT bootstrap composer
//!
//! Builds the starting contact set for a private swarm: every configured
//! peer, resolved, followed by this node itself. Public routers are never
//! added, so a node with no configured peers still has exactly one routing
//! entry (itself) and can act as a single-node swarm others bootstrap from.

use std::net::{IpAddr, SocketAddr, ToSocketAddrs};

use tracing::{debug, info};

use crate::error::{P2pError, Result};

/// Starting contacts handed to the engine's DHT
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapConfig {
    /// Configured peers first, self last
    pub bootstrap_nodes: Vec<SocketAddr>,
}

impl BootstrapConfig {
    /// Resolve `peers` and append `(public_ip, port)`
    pub fn compose(peers: &[String], public_ip: IpAddr, port: u16) -> Result<Self> {
        let mut bootstrap_nodes = Vec::with_capacity(peers.len() + 1);

        for peer in peers {
            let addr = resolve_peer(peer)?;
            debug!("Bootstrap peer {} resolved to {}", peer, addr);
            bootstrap_nodes.push(addr);
        }

        let own = SocketAddr::new(public_ip, port);
        bootstrap_nodes.push(own);

        info!(
            "DHT bootstrap set: {} configured peer(s) plus self {}",
            peers.len(),
            own
        );
        Ok(Self { bootstrap_nodes })
    }

    /// This node's own address (always the last entry)
    pub fn own_node(&self) -> Option<SocketAddr> {
        self.bootstrap_nodes.last().copied()
    }
}

fn resolve_peer(peer: &str) -> Result<SocketAddr> {
    let peer = peer.trim();
    let mut addrs = peer
        .to_socket_addrs()
        .map_err(|e| P2pError::peer_unresolved(peer, e.to_string()))?;

    addrs
        .next()
        .ok_or_else(|| P2pError::peer_unresolved(peer, "no addresses returned"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local() -> IpAddr {
        "192.168.1.10".parse().unwrap()
    }

    #[test]
    fn test_compose_without_peers_is_self_only() {
        let config = BootstrapConfig::compose(&[], local(), 42070).unwrap();
        assert_eq!(config.bootstrap_nodes, vec!["192.168.1.10:42070".parse().unwrap()]);
        assert_eq!(config.own_node(), Some("192.168.1.10:42070".parse().unwrap()));
    }

    #[test]
    fn test_compose_keeps_peer_order_and_appends_self() {
        let peers = vec!["10.1.1.1:2233".to_string(), "10.2.2.2:4567".to_string()];
        let config = BootstrapConfig::compose(&peers, local(), 42071).unwrap();
        let expected: Vec<SocketAddr> = vec![
            "10.1.1.1:2233".parse().unwrap(),
            "10.2.2.2:4567".parse().unwrap(),
            "192.168.1.10:42071".parse().unwrap(),
        ];
        assert_eq!(config.bootstrap_nodes, expected);
    }

    #[test]
    fn test_compose_resolves_hostnames() {
        let peers = vec!["localhost:6881".to_string()];
        let config = BootstrapConfig::compose(&peers, local(), 1).unwrap();
        assert_eq!(config.bootstrap_nodes.len(), 2);
        assert_eq!(config.bootstrap_nodes[0].port(), 6881);
    }

    #[test]
    fn test_unresolvable_peer_is_named() {
        let peers = vec!["10.1.1.1:2233".to_string(), "no-port-here".to_string()];
        let err = BootstrapConfig::compose(&peers, local(), 1).unwrap_err();
        match err {
            P2pError::PeerAddressUnresolved { peer, .. } => assert_eq!(peer, "no-port-here"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
