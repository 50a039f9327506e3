//! DHT routing table module
//!
//! Kademlia routing table. Engines seed it from the bootstrap set handed
//! over in the session config.

use crate::dht::node::{Node, NodeId};
use std::net::SocketAddr;
use std::time::Instant;

const K: usize = 8; // Kademlia constant - number of nodes per bucket

/// A bucket in the routing table
#[derive(Debug, Clone)]
pub struct KBucket {
    pub nodes: Vec<Node>,
    pub last_changed: Instant,
}

impl KBucket {
    pub fn new() -> Self {
        Self {
            nodes: Vec::with_capacity(K),
            last_changed: Instant::now(),
        }
    }

    /// Add a node to the bucket; false if the bucket is full
    pub fn add_node(&mut self, node: Node) -> bool {
        if let Some(pos) = self.nodes.iter().position(|n| n.id == node.id) {
            self.nodes[pos].update_last_seen();
            self.last_changed = Instant::now();
            return true;
        }

        if self.nodes.len() >= K {
            return false;
        }

        self.nodes.push(node);
        self.last_changed = Instant::now();
        true
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl Default for KBucket {
    fn default() -> Self {
        Self::new()
    }
}

/// Kademlia routing table
#[derive(Debug)]
pub struct RoutingTable {
    pub our_id: NodeId,
    /// 160 buckets for 160-bit IDs
    pub buckets: Vec<KBucket>,
}

impl RoutingTable {
    pub fn new(our_id: NodeId) -> Self {
        Self {
            our_id,
            buckets: vec![KBucket::new(); 160],
        }
    }

    /// Routing table pre-populated with the given starting contacts
    pub fn seeded(our_id: NodeId, contacts: &[SocketAddr]) -> Self {
        let mut table = Self::new(our_id);
        for addr in contacts {
            if !table.add_node(Node::from_addr(*addr)) {
                tracing::debug!("Bucket full, dropping starting node {}", addr);
            }
        }
        table
    }

    pub fn add_node(&mut self, node: Node) -> bool {
        let bucket_index = self.bucket_index(&node.id);
        self.buckets[bucket_index].add_node(node)
    }

    pub fn node_count(&self) -> usize {
        self.buckets.iter().map(KBucket::len).sum()
    }

    pub fn get_nodes(&self) -> Vec<Node> {
        self.buckets.iter().flat_map(|b| b.nodes.clone()).collect()
    }

    /// Index of the first bit where `id` differs from our ID
    fn bucket_index(&self, id: &NodeId) -> usize {
        for i in 0..160 {
            let byte_index = i / 8;
            let bit_index = 7 - (i % 8);
            let our_bit = (self.our_id.0[byte_index] >> bit_index) & 1;
            let their_bit = (id.0[byte_index] >> bit_index) & 1;
            if our_bit != their_bit {
                return i;
            }
        }
        159
    }
}
