//! In-memory engine
//!
//! Stands in for a native protocol engine. Transfers progress by a fixed
//! number of pieces on every stats poll instead of talking to a swarm, but
//! everything the controller can observe is real: the resume record on
//! disk, the DHT routing table seeded from the session config, the stop
//! channel and the shared rate limiters.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{
    AddOptions, Engine, PeerCounts, RateLimiters, Session, SessionConfig, StopNotifier, StopResult,
    TorrentHandle, TorrentStats, TorrentStatus, TrackerObservation,
};
use crate::dht::{NodeId, RoutingTable};
use crate::storage::ResumeData;
use crate::torrent::{InfoHash, MagnetParser, TorrentParser};

/// Piece size used for the completion bitfield
pub const PIECE_SIZE: u64 = 256 * 1024;

/// Pieces completed per stats poll
const PIECES_PER_POLL: u64 = 4;

/// Call counts, for tests and diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineCounters {
    pub sessions_opened: usize,
    pub sessions_closed: usize,
    pub adds: usize,
    pub starts: usize,
    pub stops: usize,
}

#[derive(Default)]
struct Knobs {
    /// Sizes for torrents added without metadata
    payloads: HashMap<InfoHash, u64>,
    trackers: Vec<TrackerObservation>,
    fail_add: Option<String>,
    fail_stop: Option<String>,
}

#[derive(Default)]
struct EngineState {
    knobs: Knobs,
    counters: EngineCounters,
    last_session: Option<MemorySession>,
    torrents: HashMap<InfoHash, MemoryTorrent>,
}

type SharedState = Arc<Mutex<EngineState>>;

fn lock(state: &Mutex<EngineState>) -> MutexGuard<'_, EngineState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Engine that keeps every transfer in memory
#[derive(Clone, Default)]
pub struct MemoryEngine {
    state: SharedState,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payload size for a torrent whose metadata the engine cannot see
    pub fn set_payload(&self, info_hash: InfoHash, size: u64) {
        lock(&self.state).knobs.payloads.insert(info_hash, size);
    }

    /// Tracker observations reported by every torrent
    pub fn set_trackers(&self, trackers: Vec<TrackerObservation>) {
        lock(&self.state).knobs.trackers = trackers;
    }

    /// Make every following add fail with `message`
    pub fn fail_add(&self, message: impl Into<String>) {
        lock(&self.state).knobs.fail_add = Some(message.into());
    }

    /// Make every following stop request fail with `message`
    pub fn fail_stop(&self, message: impl Into<String>) {
        lock(&self.state).knobs.fail_stop = Some(message.into());
    }

    pub fn counters(&self) -> EngineCounters {
        lock(&self.state).counters
    }

    /// Most recently opened session
    pub fn last_session(&self) -> Option<MemorySession> {
        lock(&self.state).last_session.clone()
    }

    pub fn torrent(&self, info_hash: &InfoHash) -> Option<MemoryTorrent> {
        lock(&self.state).torrents.get(info_hash).cloned()
    }
}

#[async_trait]
impl Engine for MemoryEngine {
    type Session = MemorySession;

    async fn new_session(&self, config: SessionConfig) -> Result<MemorySession> {
        tokio::fs::create_dir_all(&config.data_dir).await?;

        let node_id = NodeId::random();
        let dht = RoutingTable::seeded(node_id, &config.dht_nodes);
        debug!(
            "DHT node {} seeded with {} contact(s)",
            node_id.to_hex(),
            dht.node_count()
        );

        let session = MemorySession {
            inner: Arc::new(SessionInner {
                engine: Arc::clone(&self.state),
                dht: Mutex::new(dht),
                torrents: AsyncMutex::new(Vec::new()),
                closed: AtomicBool::new(false),
                config,
            }),
        };

        match ResumeData::load(&session.inner.config.resume_path).await {
            Ok(Some(record)) => match record.info_hash() {
                Some(info_hash) => {
                    debug!(
                        "Restoring {} from resume record ({} pieces done)",
                        info_hash,
                        record.downloaded_count()
                    );
                    let torrent = MemoryTorrent::new(&session.inner, info_hash, record, TorrentStatus::Stopped);
                    session.register(torrent).await;
                }
                None => warn!("Ignoring resume record with bad info hash {:?}", record.info_hash),
            },
            Ok(None) => {}
            Err(e) => warn!("Ignoring unreadable resume record: {}", e),
        }

        let mut state = lock(&self.state);
        state.counters.sessions_opened += 1;
        state.last_session = Some(session.clone());
        Ok(session)
    }

    fn is_networked(&self) -> bool {
        false
    }
}

struct SessionInner {
    config: SessionConfig,
    engine: SharedState,
    dht: Mutex<RoutingTable>,
    torrents: AsyncMutex<Vec<MemoryTorrent>>,
    closed: AtomicBool,
}

/// Session of a [`MemoryEngine`]
#[derive(Clone)]
pub struct MemorySession {
    inner: Arc<SessionInner>,
}

impl MemorySession {
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Contacts currently in the DHT routing table
    pub fn dht_nodes(&self) -> Vec<SocketAddr> {
        let table = self.inner.dht.lock().unwrap_or_else(PoisonError::into_inner);
        table.get_nodes().into_iter().map(|n| n.addr).collect()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    async fn register(&self, torrent: MemoryTorrent) {
        lock(&self.inner.engine)
            .torrents
            .insert(torrent.inner.info_hash, torrent.clone());
        self.inner.torrents.lock().await.push(torrent);
    }

    async fn add(&self, info_hash: InfoHash, name: String, total: Option<u64>, options: AddOptions) -> Result<MemoryTorrent> {
        if self.is_closed() {
            bail!("session is closed");
        }

        let known_size = {
            let mut state = lock(&self.inner.engine);
            if let Some(message) = state.knobs.fail_add.clone() {
                bail!(message);
            }
            state.counters.adds += 1;
            state.knobs.payloads.get(&info_hash).copied()
        };

        if let Some(existing) = self
            .inner
            .torrents
            .lock()
            .await
            .iter()
            .find(|t| t.inner.info_hash == info_hash)
        {
            return Ok(existing.clone());
        }

        let total = total.or(known_size).unwrap_or(0);
        let piece_count = total.div_ceil(PIECE_SIZE) as usize;
        let mut record = ResumeData::new(&info_hash, name, piece_count);
        record.bytes_total = total;
        record.stop_after_download = options.stop_after_download;

        info!("Added torrent {} ({} bytes)", info_hash, total);
        let torrent = MemoryTorrent::new(&self.inner, info_hash, record, TorrentStatus::Downloading);
        torrent.persist(&*torrent.inner.state.lock().await).await;
        self.register(torrent.clone()).await;
        Ok(torrent)
    }
}

#[async_trait]
impl Session for MemorySession {
    type Torrent = MemoryTorrent;

    async fn list_torrents(&self) -> Vec<MemoryTorrent> {
        self.inner.torrents.lock().await.clone()
    }

    async fn add_uri(&self, uri: &str, options: AddOptions) -> Result<MemoryTorrent> {
        if !MagnetParser::is_magnet_link(uri) {
            bail!("memory engine cannot fetch {}", uri);
        }
        let magnet = MagnetParser::parse(uri)?;
        self.add(magnet.info_hash, magnet.name(), None, options).await
    }

    async fn add_file(&self, metainfo: Bytes, options: AddOptions) -> Result<MemoryTorrent> {
        let info = TorrentParser::parse_bytes(&metainfo)?;
        let total = info.total_size();
        self.add(info.info_hash, info.name, Some(total), options).await
    }

    async fn add_info_hash(&self, info_hash: InfoHash, options: AddOptions) -> Result<MemoryTorrent> {
        self.add(info_hash, info_hash.to_hex(), None, options).await
    }

    async fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            bail!("session already closed");
        }
        lock(&self.inner.engine).counters.sessions_closed += 1;
        debug!("Memory session closed");
        Ok(())
    }
}

struct TorrentState {
    status: TorrentStatus,
    record: ResumeData,
    seeding_since: Option<Instant>,
}

struct TorrentInner {
    info_hash: InfoHash,
    resume_path: PathBuf,
    limiters: RateLimiters,
    engine: SharedState,
    state: AsyncMutex<TorrentState>,
    stop_tx: watch::Sender<Option<StopResult>>,
}

/// Torrent handle of a [`MemoryEngine`]
#[derive(Clone)]
pub struct MemoryTorrent {
    inner: Arc<TorrentInner>,
}

impl MemoryTorrent {
    fn new(session: &SessionInner, info_hash: InfoHash, record: ResumeData, status: TorrentStatus) -> Self {
        let (stop_tx, _) = watch::channel(None);
        Self {
            inner: Arc::new(TorrentInner {
                info_hash,
                resume_path: session.config.resume_path.clone(),
                limiters: session.config.rate_limiters.clone(),
                engine: Arc::clone(&session.engine),
                state: AsyncMutex::new(TorrentState {
                    status,
                    record,
                    seeding_since: None,
                }),
                stop_tx,
            }),
        }
    }

    /// Stop with an error, the way an engine reports a failed disk or tracker
    pub async fn fail(&self, message: impl Into<String>) {
        let message = message.into();
        warn!("Torrent {} failed: {}", self.inner.info_hash, message);
        self.inner.state.lock().await.status = TorrentStatus::Error;
        self.inner.stop_tx.send_replace(Some(Err(message)));
    }

    pub async fn status(&self) -> TorrentStatus {
        self.inner.state.lock().await.status
    }

    async fn persist(&self, state: &TorrentState) {
        if let Err(e) = state.record.save(&self.inner.resume_path).await {
            warn!("Failed to write resume record {}: {}", self.inner.resume_path.display(), e);
        }
    }

    fn finish_download(&self, state: &mut TorrentState) {
        let piece_count = state.record.downloaded_pieces.len() * 8;
        for index in 0..piece_count {
            state.record.set_piece_downloaded(index);
        }

        if state.record.stop_after_download {
            info!("Torrent {} downloaded, stopping", self.inner.info_hash);
            state.status = TorrentStatus::Stopped;
            self.inner.stop_tx.send_replace(Some(Ok(())));
        } else {
            info!("Torrent {} downloaded, seeding", self.inner.info_hash);
            state.status = TorrentStatus::Seeding;
            state.seeding_since = Some(Instant::now());
        }
    }
}

#[async_trait]
impl TorrentHandle for MemoryTorrent {
    fn info_hash(&self) -> InfoHash {
        self.inner.info_hash
    }

    async fn start(&self) -> Result<()> {
        lock(&self.inner.engine).counters.starts += 1;

        let mut state = self.inner.state.lock().await;
        self.inner.stop_tx.send_replace(None);
        let complete = state.record.bytes_total > 0 && state.record.bytes_completed >= state.record.bytes_total;
        if complete {
            self.finish_download(&mut state);
        } else {
            state.status = TorrentStatus::Downloading;
        }
        debug!("Started {} in state {}", self.inner.info_hash, state.status);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let fail_stop = {
            let mut engine = lock(&self.inner.engine);
            engine.counters.stops += 1;
            engine.knobs.fail_stop.clone()
        };
        if let Some(message) = fail_stop {
            return Err(anyhow!(message));
        }

        let mut state = self.inner.state.lock().await;
        state.status = TorrentStatus::Stopped;
        state.seeding_since = None;
        self.persist(&state).await;
        self.inner.stop_tx.send_replace(Some(Ok(())));
        Ok(())
    }

    async fn stats(&self) -> TorrentStats {
        let mut state = self.inner.state.lock().await;
        let total = state.record.bytes_total;
        let mut downloaded = 0;

        if state.status == TorrentStatus::Downloading && total > 0 {
            let remaining = total.saturating_sub(state.record.bytes_completed);
            let budget = remaining
                .min(PIECES_PER_POLL * PIECE_SIZE)
                .min(self.inner.limiters.download.available().await);
            self.inner.limiters.download.acquire(budget).await;

            state.record.bytes_completed += budget;
            downloaded = budget;
            for index in 0..(state.record.bytes_completed / PIECE_SIZE) as usize {
                state.record.set_piece_downloaded(index);
            }
            if state.record.bytes_completed >= total {
                self.finish_download(&mut state);
            }
            self.persist(&state).await;
        }

        let remaining = total.saturating_sub(state.record.bytes_completed);
        let eta = if downloaded > 0 && remaining > 0 {
            Some(Duration::from_secs(remaining.div_ceil(downloaded)))
        } else {
            None
        };

        TorrentStats {
            bytes_completed: state.record.bytes_completed,
            bytes_total: total,
            peers: PeerCounts::default(),
            speed_download: downloaded,
            speed_upload: 0,
            eta,
            status: state.status,
            seeded_for: state.seeding_since.map(|t| t.elapsed()).unwrap_or_default(),
        }
    }

    async fn trackers(&self) -> Vec<TrackerObservation> {
        lock(&self.inner.engine).knobs.trackers.clone()
    }

    fn notify_stop(&self) -> StopNotifier {
        self.inner.stop_tx.subscribe()
    }
}
