//! p2pfile
//!
//! Peer-to-peer file distribution with a private DHT bootstrap, resumable
//! transfers and policy-driven seeding. The wire protocol lives behind the
//! [`engine`] traits; [`session::SessionController`] owns each transfer.

pub mod cli;
pub mod dht;
pub mod engine;
pub mod error;
pub mod net;
pub mod session;
pub mod storage;
pub mod torrent;

pub use error::{ErrorCategory, P2pError, Result};

pub use cli::{CliArgs, Command, Config};
pub use dht::{BootstrapConfig, Node, NodeId, RoutingTable};
pub use engine::{Engine, MemoryEngine, RateLimiter, RateLimiters, Session, TorrentHandle, TorrentStats};
pub use net::{get_available_port, resolve_public_ip};
pub use session::{
    ControllerState, ProgressDisplay, RunOutcome, SeedingPolicy, SessionController, StopReason, TransferConfig,
    TransferMode,
};
pub use storage::{ResumeCleanup, ResumeData, ResumeManager};
pub use torrent::{magnet_link, CreatedTorrent, InfoHash, MagnetParser, TorrentBuilder, TorrentInfo, TorrentParser};
