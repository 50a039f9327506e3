//! Protocol engine boundary
//!
//! The peer-wire protocol, piece storage and DHT live behind these traits.
//! The session controller only ever talks to an engine through them, which
//! keeps it testable against [`memory::MemoryEngine`].

pub mod limiter;
pub mod memory;

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::watch;

use crate::torrent::InfoHash;

pub use limiter::{RateLimiter, RateLimiters};
pub use memory::{MemoryEngine, MemorySession, MemoryTorrent};

/// Value published on a torrent's stop channel: `Ok` for a clean stop,
/// `Err` with the engine's message otherwise.
pub type StopResult = std::result::Result<(), String>;

/// Receiver side of a torrent's stop channel. `None` while running.
pub type StopNotifier = watch::Receiver<Option<StopResult>>;

/// Engine-defined torrent states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TorrentStatus {
    #[default]
    Downloading,
    Seeding,
    Stopped,
    Error,
}

impl std::fmt::Display for TorrentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TorrentStatus::Downloading => "Downloading",
            TorrentStatus::Seeding => "Seeding",
            TorrentStatus::Stopped => "Stopped",
            TorrentStatus::Error => "Error",
        };
        f.write_str(s)
    }
}

/// Peer connection counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeerCounts {
    pub total: usize,
    pub incoming: usize,
    pub outgoing: usize,
}

/// Snapshot of a torrent's transfer state
#[derive(Debug, Clone, Default)]
pub struct TorrentStats {
    pub bytes_completed: u64,
    /// Zero until metadata is known
    pub bytes_total: u64,
    pub peers: PeerCounts,
    /// Bytes per second
    pub speed_download: u64,
    /// Bytes per second
    pub speed_upload: u64,
    pub eta: Option<Duration>,
    pub status: TorrentStatus,
    /// Time spent in the Seeding state
    pub seeded_for: Duration,
}

impl TorrentStats {
    /// True once every byte of known metadata is present
    pub fn is_complete(&self) -> bool {
        self.bytes_total > 0 && self.bytes_completed >= self.bytes_total
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackerStatus {
    #[default]
    NotContacted,
    Connecting,
    Working,
    NotWorking,
}

/// What a tracker last told the engine about the swarm
#[derive(Debug, Clone)]
pub struct TrackerObservation {
    pub url: String,
    pub status: TrackerStatus,
    pub leechers: u32,
    pub seeders: u32,
    pub last_announce: Option<SystemTime>,
}

/// Connection and request tuning handed to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionLimits {
    pub unchoked_peers: u32,
    pub optimistic_unchoked_peers: u32,
    pub max_requests_in: u32,
    pub max_requests_out: u32,
    pub default_requests_out: u32,
    pub endgame_max_duplicate_downloads: u32,
    pub max_peer_dial: u32,
    pub max_peer_accept: u32,
    pub max_peer_addresses: u32,
}

impl ConnectionLimits {
    /// Large limits for a dedicated publisher
    pub fn serve() -> Self {
        Self {
            unchoked_peers: 100,
            optimistic_unchoked_peers: 10,
            max_requests_in: 2000,
            max_requests_out: 2000,
            default_requests_out: 1000,
            endgame_max_duplicate_downloads: 20,
            max_peer_dial: 1000,
            max_peer_accept: 500,
            max_peer_addresses: 20000,
        }
    }
}

impl Default for ConnectionLimits {
    fn default() -> Self {
        Self {
            unchoked_peers: 3,
            optimistic_unchoked_peers: 1,
            max_requests_in: 250,
            max_requests_out: 250,
            default_requests_out: 50,
            endgame_max_duplicate_downloads: 3,
            max_peer_dial: 80,
            max_peer_accept: 20,
            max_peer_addresses: 2000,
        }
    }
}

/// Everything an engine needs to open a session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub data_dir: PathBuf,
    /// Where the engine keeps its resume record
    pub resume_path: PathBuf,
    pub listen_addr: SocketAddr,
    /// Address advertised to the swarm
    pub external_ip: IpAddr,
    /// Starting DHT contacts; public routers are never added
    pub dht_nodes: Vec<SocketAddr>,
    pub limits: ConnectionLimits,
    pub rate_limiters: RateLimiters,
    pub debug: bool,
}

/// Options for adding a new torrent
#[derive(Debug, Clone, Copy, Default)]
pub struct AddOptions {
    /// Stop instead of seeding once the download completes
    pub stop_after_download: bool,
}

/// Factory for engine sessions
#[async_trait]
pub trait Engine: Send + Sync {
    type Session: Session;

    async fn new_session(&self, config: SessionConfig) -> Result<Self::Session>;

    /// Whether sessions move data over the network
    fn is_networked(&self) -> bool {
        true
    }
}

/// An open engine session
#[async_trait]
pub trait Session: Send + Sync {
    type Torrent: TorrentHandle;

    /// Torrents restored from the session's resume record
    async fn list_torrents(&self) -> Vec<Self::Torrent>;

    /// Add by magnet link or HTTP(S) URL
    async fn add_uri(&self, uri: &str, options: AddOptions) -> Result<Self::Torrent>;

    /// Add from bencoded metainfo
    async fn add_file(&self, metainfo: Bytes, options: AddOptions) -> Result<Self::Torrent>;

    async fn add_info_hash(&self, info_hash: InfoHash, options: AddOptions) -> Result<Self::Torrent>;

    async fn close(&self) -> Result<()>;
}

/// One transfer inside a session
#[async_trait]
pub trait TorrentHandle: Clone + Send + Sync + 'static {
    fn info_hash(&self) -> InfoHash;

    async fn start(&self) -> Result<()>;

    /// Request a stop; completion is published on [`TorrentHandle::notify_stop`]
    async fn stop(&self) -> Result<()>;

    async fn stats(&self) -> TorrentStats;

    async fn trackers(&self) -> Vec<TrackerObservation>;

    /// Subscribe to the stop channel
    fn notify_stop(&self) -> StopNotifier;
}
