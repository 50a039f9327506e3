//! DHT (Distributed Hash Table) module
//!
//! Starting-contact composition and the routing table engines seed from it.

pub mod node;
pub mod routing;
pub mod bootstrap;

pub use node::{Node, NodeId};
pub use routing::{KBucket, RoutingTable};
pub use bootstrap::BootstrapConfig;
