//! Transfer configuration
//!
//! A [`TransferConfig`] is everything one controller needs, fully resolved
//! by the caller. It is checked once at controller construction and never
//! changes afterwards.

use std::path::PathBuf;
use std::time::Duration;

use crate::engine::ConnectionLimits;
use crate::error::{P2pError, Result};
use crate::storage::ResumeCleanup;

/// Port range probed when no explicit port is configured
pub const DEFAULT_PORT_RANGE: &str = "42070-42099";

/// Tracker data older than this is treated as unavailable
pub const DEFAULT_TRACKER_STALE_AFTER: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferMode {
    /// Fetch a target, optionally seeding afterwards
    #[default]
    Download,
    /// Publish local content indefinitely
    Serve,
}

/// When seeding ends on its own
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedingPolicy {
    /// 0 disables the cap
    pub max_seeding_seconds: u64,
    /// Stop once every tracker reports no leechers
    pub stop_when_no_leechers: bool,
    pub tracker_stale_after: Duration,
}

impl Default for SeedingPolicy {
    fn default() -> Self {
        Self {
            max_seeding_seconds: 0,
            stop_when_no_leechers: false,
            tracker_stale_after: DEFAULT_TRACKER_STALE_AFTER,
        }
    }
}

/// Where the node listens and how it advertises itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenConfig {
    /// Explicit public IP; detected from the default route when unset
    pub ip: Option<String>,
    /// Explicit port; skips the range scan
    pub port: Option<u16>,
    pub port_range: String,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            ip: None,
            port: None,
            port_range: DEFAULT_PORT_RANGE.to_string(),
        }
    }
}

/// Fully resolved settings for one transfer
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Magnet link, `.torrent` path, hex info-hash or HTTP(S) URL
    pub target: String,
    pub data_dir: PathBuf,
    pub resume: bool,
    pub mode: TransferMode,
    pub seeding: SeedingPolicy,
    /// Bytes per second, 0 = unlimited
    pub upload_limit: u64,
    /// Bytes per second, 0 = unlimited
    pub download_limit: u64,
    pub listen: ListenConfig,
    /// Bootstrap peers as `host:port`
    pub peers: Vec<String>,
    pub resume_cleanup: ResumeCleanup,
    pub debug: bool,
}

impl TransferConfig {
    pub fn new(target: impl Into<String>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
            data_dir: data_dir.into(),
            resume: false,
            mode: TransferMode::Download,
            seeding: SeedingPolicy::default(),
            upload_limit: 0,
            download_limit: 0,
            listen: ListenConfig::default(),
            peers: Vec::new(),
            resume_cleanup: ResumeCleanup::default(),
            debug: false,
        }
    }

    /// Reject setting combinations that cannot work together
    pub fn validate(&self) -> Result<()> {
        if self.target.trim().is_empty() {
            return Err(P2pError::config_conflict("no target given"));
        }
        if self.mode == TransferMode::Serve && self.seeding.stop_when_no_leechers {
            return Err(P2pError::config_conflict(
                "serve mode cannot be combined with automatic seeding stop",
            ));
        }
        Ok(())
    }

    /// Whether the transfer keeps running after the download completes
    pub fn seeding_enabled(&self) -> bool {
        self.mode == TransferMode::Serve
            || self.seeding.max_seeding_seconds > 0
            || self.seeding.stop_when_no_leechers
    }

    /// Connection tuning profile for the engine
    pub fn connection_limits(&self) -> ConnectionLimits {
        match self.mode {
            TransferMode::Serve => ConnectionLimits::serve(),
            TransferMode::Download => ConnectionLimits::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;

    #[test]
    fn test_defaults() {
        let config = TransferConfig::new("abc", "/tmp/data");
        assert_eq!(config.listen.port_range, "42070-42099");
        assert_eq!(config.seeding.tracker_stale_after, Duration::from_secs(1800));
        assert!(!config.seeding_enabled());
        assert!(config.validate().is_ok());
        assert_eq!(config.connection_limits(), ConnectionLimits::default());
    }

    #[test]
    fn test_serve_with_auto_stop_conflicts() {
        let mut config = TransferConfig::new("abc", "/tmp/data");
        config.mode = TransferMode::Serve;
        config.seeding.stop_when_no_leechers = true;
        let err = config.validate().unwrap_err();
        assert_eq!(err.category(), ErrorCategory::ConfigConflict);
    }

    #[test]
    fn test_empty_target_rejected() {
        let config = TransferConfig::new("  ", "/tmp/data");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_seeding_enabled() {
        let mut config = TransferConfig::new("abc", "/tmp/data");
        config.seeding.max_seeding_seconds = 60;
        assert!(config.seeding_enabled());

        let mut config = TransferConfig::new("abc", "/tmp/data");
        config.seeding.stop_when_no_leechers = true;
        assert!(config.seeding_enabled());

        let mut config = TransferConfig::new("abc", "/tmp/data");
        config.mode = TransferMode::Serve;
        assert!(config.seeding_enabled());
        assert_eq!(config.connection_limits().unchoked_peers, 100);
        assert_eq!(config.connection_limits().max_peer_addresses, 20000);
    }
}
