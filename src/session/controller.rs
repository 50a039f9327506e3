//! Session controller
//!
//! Owns one transfer from start to finish. Opening resolves the listen
//! port, public address and DHT bootstrap set, prepares the resume file and
//! adds (or resumes) the torrent in a fresh engine session. Running drives
//! a one-second control loop until cancellation, the seeding policy or the
//! engine itself ends the transfer. Finishing settles the resume file and
//! closes the session exactly once.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::{Duration, SystemTime};

use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dht::BootstrapConfig;
use crate::engine::{
    AddOptions, Engine, RateLimiters, Session, SessionConfig, StopResult, TorrentHandle, TorrentStatus,
};
use crate::error::{P2pError, Result};
use crate::net::{get_available_port, resolve_public_ip};
use crate::session::config::TransferConfig;
use crate::session::policy::{self, SeedingDecision, StopReason};
use crate::session::progress::ProgressDisplay;
use crate::storage::resume::{self, ResumeManager};
use crate::torrent::{magnet_link, InfoHash, ResolvedTarget, TargetSource};

const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivePhase {
    Downloading,
    Seeding,
}

/// Lifecycle of a controller. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Created,
    Opening,
    Active(ActivePhase),
    Stopping,
    Stopped,
}

/// How a completed run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    pub reason: StopReason,
    pub resume_deleted: bool,
}

type TorrentOf<E> = <<E as Engine>::Session as Session>::Torrent;

/// Drives one transfer through an [`Engine`]
pub struct SessionController<E: Engine> {
    config: TransferConfig,
    engine: E,
    limiters: RateLimiters,
    progress: ProgressDisplay,
    state: ControllerState,
    target: Option<ResolvedTarget>,
    resume: Option<ResumeManager>,
    bootstrap: Option<BootstrapConfig>,
    listen_port: Option<u16>,
    session: Option<E::Session>,
    torrent: Option<TorrentOf<E>>,
    stop_issued: bool,
    stop_reason: Option<StopReason>,
    session_closed: bool,
    outcome: Option<RunOutcome>,
}

impl<E: Engine> SessionController<E> {
    /// Validate `config` and build a controller. Nothing is opened yet.
    pub fn new(config: TransferConfig, engine: E) -> Result<Self> {
        config.validate()?;
        let limiters = RateLimiters::new(config.upload_limit, config.download_limit);
        debug!(
            "Rate limits: upload {} B/s, download {} B/s (0 = unlimited)",
            config.upload_limit, config.download_limit
        );

        Ok(Self {
            config,
            engine,
            limiters,
            progress: ProgressDisplay::default(),
            state: ControllerState::Created,
            target: None,
            resume: None,
            bootstrap: None,
            listen_port: None,
            session: None,
            torrent: None,
            stop_issued: false,
            stop_reason: None,
            session_closed: false,
            outcome: None,
        })
    }

    /// Replace the stdout status writer
    pub fn with_progress(mut self, progress: ProgressDisplay) -> Self {
        self.progress = progress;
        self
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    pub fn rate_limiters(&self) -> &RateLimiters {
        &self.limiters
    }

    /// Known once the target has been resolved
    pub fn info_hash(&self) -> Option<InfoHash> {
        self.target.as_ref().map(|t| t.info_hash)
    }

    pub fn resume_path(&self) -> Option<&Path> {
        self.resume.as_ref().map(ResumeManager::path)
    }

    /// DHT contacts handed to the engine, own node last
    pub fn dht_nodes(&self) -> &[SocketAddr] {
        self.bootstrap
            .as_ref()
            .map(|b| b.bootstrap_nodes.as_slice())
            .unwrap_or(&[])
    }

    pub fn listen_port(&self) -> Option<u16> {
        self.listen_port
    }

    /// Magnet link for the open transfer with a direct-connect hint to this node
    pub fn magnet(&self, trackers: &[String]) -> Option<String> {
        let target = self.target.as_ref()?;
        let hint = self.bootstrap.as_ref().and_then(BootstrapConfig::own_node);
        Some(magnet_link(&target.info_hash, &target.name, trackers, hint))
    }

    /// Acquire everything and add or resume the torrent.
    ///
    /// On failure the session, if one was opened, is closed and the
    /// controller ends up `Stopped`.
    pub async fn open(&mut self) -> Result<()> {
        match self.state {
            ControllerState::Created => {}
            ControllerState::Stopped => {
                return Err(P2pError::resource("Cannot open transfer", "controller already stopped"));
            }
            _ => return Ok(()),
        }

        self.state = ControllerState::Opening;
        if !self.engine.is_networked() {
            warn!("No network engine available, {} will not transfer any data", self.config.target);
        }
        if let Err(e) = self.acquire().await {
            error!("Failed to open transfer: {}", e);
            self.force_close().await;
            self.state = ControllerState::Stopped;
            return Err(e);
        }

        self.state = ControllerState::Active(ActivePhase::Downloading);
        Ok(())
    }

    async fn acquire(&mut self) -> Result<()> {
        let prepared = resume::prepare(
            &self.config.target,
            &self.config.data_dir,
            self.config.resume,
            self.config.resume_cleanup,
        )
        .await?;
        info!("Transfer {} ({})", prepared.target.name, prepared.target.info_hash);

        let port = match self.config.listen.port {
            Some(port) if port != 0 => port,
            _ => get_available_port(&self.config.listen.port_range)?,
        };
        let ip = resolve_public_ip(self.config.listen.ip.as_deref())?;
        let bootstrap = BootstrapConfig::compose(&self.config.peers, ip, port)?;
        info!("Listening on port {}, advertising {}", port, ip);
        debug!("DHT bootstrap nodes: {:?}", bootstrap.bootstrap_nodes);

        let session_config = SessionConfig {
            data_dir: self.config.data_dir.clone(),
            resume_path: prepared.manager.path().to_path_buf(),
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
            external_ip: ip,
            dht_nodes: bootstrap.bootstrap_nodes.clone(),
            limits: self.config.connection_limits(),
            rate_limiters: self.limiters.clone(),
            debug: self.config.debug,
        };

        self.listen_port = Some(port);
        self.bootstrap = Some(bootstrap);
        self.resume = Some(prepared.manager);
        let target = self.target.insert(prepared.target);

        let session = self
            .engine
            .new_session(session_config)
            .await
            .map_err(|e| P2pError::resource("Failed to open engine session", e.to_string()))?;
        let session = self.session.insert(session);

        let options = AddOptions {
            stop_after_download: !self.config.seeding_enabled(),
        };
        let torrent = add_or_resume(session, target, options).await?;
        self.torrent = Some(torrent);
        Ok(())
    }

    /// Open if needed, then drive the control loop until the transfer stops
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<RunOutcome> {
        if let Some(outcome) = self.outcome {
            return Ok(outcome);
        }
        self.open().await?;

        let torrent = match self.torrent.clone() {
            Some(torrent) if matches!(self.state, ControllerState::Active(_)) => torrent,
            _ => return Err(P2pError::resource("Cannot run transfer", "no active torrent")),
        };

        let mut stop_rx = torrent.notify_stop();
        let mut ticker = interval_at(Instant::now() + TICK, TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let notification = loop {
            tokio::select! {
                changed = stop_rx.wait_for(Option::is_some) => {
                    break stop_result(changed);
                }
                _ = cancel.cancelled(), if !self.stop_issued => {
                    info!("Cancellation requested, stopping torrent");
                    if let Err(e) = self.request_stop(&torrent, StopReason::Cancelled).await {
                        return Err(self.abort(e).await);
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.tick(&torrent).await {
                        return Err(self.abort(e).await);
                    }
                }
            }
        };

        self.finish(&torrent, notification).await
    }

    /// Stop the transfer and wait for the engine to confirm. Idempotent.
    pub async fn stop(&mut self) -> Result<()> {
        match self.state {
            ControllerState::Stopped | ControllerState::Stopping => return Ok(()),
            ControllerState::Created | ControllerState::Opening => {
                self.state = ControllerState::Stopped;
                return self.close_session().await;
            }
            ControllerState::Active(_) => {}
        }

        let Some(torrent) = self.torrent.clone() else {
            self.state = ControllerState::Stopped;
            return self.close_session().await;
        };

        let mut stop_rx = torrent.notify_stop();
        if let Err(e) = self.request_stop(&torrent, StopReason::Cancelled).await {
            return Err(self.abort(e).await);
        }
        let notification = stop_result(stop_rx.wait_for(Option::is_some).await);
        self.finish(&torrent, notification).await.map(|_| ())
    }

    /// Close the engine session. Stops an active transfer first. Idempotent.
    pub async fn close(&mut self) -> Result<()> {
        if matches!(self.state, ControllerState::Active(_)) {
            return self.stop().await;
        }
        self.close_session().await
    }

    async fn tick(&mut self, torrent: &TorrentOf<E>) -> Result<()> {
        let stats = torrent.stats().await;
        if !self.stop_issued {
            self.state = ControllerState::Active(match stats.status {
                TorrentStatus::Seeding => ActivePhase::Seeding,
                _ => ActivePhase::Downloading,
            });
        }

        if let Err(e) = self.progress.update(&stats) {
            warn!("Failed to write status line: {}", e);
        }

        if self.stop_issued {
            return Ok(());
        }

        let trackers = if self.config.seeding.stop_when_no_leechers && stats.status == TorrentStatus::Seeding {
            torrent.trackers().await
        } else {
            Vec::new()
        };

        match policy::evaluate(&stats, &trackers, &self.config.seeding, SystemTime::now()) {
            SeedingDecision::Continue => Ok(()),
            SeedingDecision::Stop(reason) => {
                info!("Seeding policy says stop: {}", reason);
                self.request_stop(torrent, reason).await
            }
        }
    }

    async fn request_stop(&mut self, torrent: &TorrentOf<E>, reason: StopReason) -> Result<()> {
        if self.stop_issued {
            debug!("Stop already issued");
            return Ok(());
        }
        self.stop_issued = true;
        self.stop_reason = Some(reason);
        self.state = ControllerState::Stopping;

        torrent
            .stop()
            .await
            .map_err(|e| P2pError::stop_failure("Failed to stop torrent", e.to_string()))
    }

    async fn finish(&mut self, torrent: &TorrentOf<E>, notification: StopResult) -> Result<RunOutcome> {
        self.state = ControllerState::Stopping;

        if let Err(message) = notification {
            warn!("Torrent stopped: {}", message);
            return Err(self.abort(P2pError::async_stop(message)).await);
        }

        let reason = self.stop_reason.unwrap_or(StopReason::EngineStopped);
        info!("Torrent stopped normally ({})", reason);

        let completed = torrent.stats().await.is_complete();
        let resume_deleted = match self.resume.as_mut() {
            Some(resume) => match resume.finalize(true, completed).await {
                Ok(deleted) => deleted,
                Err(e) => return Err(self.abort(e).await),
            },
            None => false,
        };

        let closed = self.close_session().await;
        self.state = ControllerState::Stopped;
        closed?;

        let outcome = RunOutcome { reason, resume_deleted };
        self.outcome = Some(outcome);
        Ok(outcome)
    }

    /// Error path: keep the resume file, close regardless, report `err`
    async fn abort(&mut self, err: P2pError) -> P2pError {
        error!("Transfer failed ({:?}): {}", err.category(), err);
        self.state = ControllerState::Stopping;
        if let Some(resume) = self.resume.as_mut() {
            if let Err(e) = resume.finalize(false, false).await {
                warn!("Failed to settle resume file: {}", e);
            }
        }
        self.force_close().await;
        self.state = ControllerState::Stopped;
        err
    }

    async fn force_close(&mut self) {
        if let Err(e) = self.close_session().await {
            error!("Failed to close session: {}", e);
        }
    }

    async fn close_session(&mut self) -> Result<()> {
        if self.session_closed || self.session.is_none() {
            return Ok(());
        }
        self.session_closed = true;

        if let Some(session) = &self.session {
            info!("Closing session");
            session
                .close()
                .await
                .map_err(|e| P2pError::stop_failure("Failed to close session", e.to_string()))?;
        }
        Ok(())
    }
}

async fn add_or_resume<S: Session>(session: &S, target: &ResolvedTarget, options: AddOptions) -> Result<S::Torrent> {
    let existing = session
        .list_torrents()
        .await
        .into_iter()
        .find(|t| t.info_hash() == target.info_hash);

    if let Some(torrent) = existing {
        info!("Resuming torrent {}", target.info_hash);
        torrent
            .start()
            .await
            .map_err(|e| P2pError::transfer("Failed to resume torrent", e.to_string()))?;
        return Ok(torrent);
    }

    info!(
        "Adding torrent {} (stop after download: {})",
        target.info_hash, options.stop_after_download
    );
    let added = match &target.source {
        TargetSource::Magnet(uri) => session.add_uri(uri, options).await,
        TargetSource::TorrentFile { metainfo, .. } | TargetSource::Url { metainfo, .. } => {
            session.add_file(metainfo.clone(), options).await
        }
        TargetSource::InfoHash(info_hash) => session.add_info_hash(*info_hash, options).await,
    };
    added.map_err(|e| P2pError::transfer("Failed to add torrent", e.to_string()))
}

fn stop_result(
    changed: std::result::Result<watch::Ref<'_, Option<StopResult>>, watch::error::RecvError>,
) -> StopResult {
    match changed {
        Ok(value) => (*value).clone().unwrap_or(Ok(())),
        Err(_) => Err("engine dropped the stop channel".to_string()),
    }
}
