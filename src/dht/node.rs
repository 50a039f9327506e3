//! DHT node module
//!
//! Identity and address of a DHT contact.

use std::net::SocketAddr;
use std::time::Instant;

use sha1::{Digest, Sha1};

/// DHT node identifier (20 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub [u8; 20]);

impl NodeId {
    /// Create a new NodeId from bytes
    pub fn new(id: [u8; 20]) -> Self {
        Self(id)
    }

    /// Generate a random NodeId
    pub fn random() -> Self {
        use rand::Rng;
        let mut id = [0u8; 20];
        rand::thread_rng().fill(&mut id);
        Self(id)
    }

    /// Deterministic placeholder ID for a contact we only know by address.
    ///
    /// The real ID is learned on the first ping reply.
    pub fn for_addr(addr: &SocketAddr) -> Self {
        let digest = Sha1::digest(addr.to_string().as_bytes());
        Self(digest.into())
    }

    /// Get the NodeId as a hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// A DHT contact
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub addr: SocketAddr,
    /// When the node was last contacted
    pub last_seen: Instant,
}

impl Node {
    pub fn new(id: NodeId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
        }
    }

    /// Contact known only by address, as produced by the bootstrap composer
    pub fn from_addr(addr: SocketAddr) -> Self {
        Self::new(NodeId::for_addr(&addr), addr)
    }

    pub fn update_last_seen(&mut self) {
        self.last_seen = Instant::now();
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Node {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_random() {
        assert_ne!(NodeId::random(), NodeId::random());
    }

    #[test]
    fn test_node_id_for_addr_is_stable() {
        let addr: SocketAddr = "127.0.0.1:6881".parse().unwrap();
        assert_eq!(NodeId::for_addr(&addr), NodeId::for_addr(&addr));

        let other: SocketAddr = "127.0.0.1:6882".parse().unwrap();
        assert_ne!(NodeId::for_addr(&addr), NodeId::for_addr(&other));
    }

    #[test]
    fn test_to_hex() {
        let hex_str = NodeId::new([0xABu8; 20]).to_hex();
        assert_eq!(hex_str, "ab".repeat(20));
    }
}
