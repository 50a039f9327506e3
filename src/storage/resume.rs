//! Resume data module
//!
//! Two halves live here. [`ResumeData`] is the record an engine persists
//! while a transfer is active. [`ResumeManager`] owns the file's lifecycle
//! from the controller's side: where it lives, when a stale one is thrown
//! away, and when a finished transfer's record is deleted.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info};

use crate::error::{P2pError, Result};
use crate::torrent::{InfoHash, ResolvedTarget};

/// Extension of resume files inside the data directory
pub const RESUME_EXTENSION: &str = "resume";

/// Persisted completion state of one torrent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeData {
    /// Info hash as hex string
    pub info_hash: String,
    pub name: String,
    /// Which pieces are downloaded (bitfield)
    pub downloaded_pieces: Vec<u8>,
    pub bytes_completed: u64,
    pub bytes_total: u64,
    /// Add option the torrent was created with
    #[serde(default)]
    pub stop_after_download: bool,
}

impl ResumeData {
    pub fn new(info_hash: &InfoHash, name: impl Into<String>, piece_count: usize) -> Self {
        Self {
            info_hash: info_hash.to_hex(),
            name: name.into(),
            downloaded_pieces: vec![0u8; (piece_count + 7) / 8],
            bytes_completed: 0,
            bytes_total: 0,
            stop_after_download: false,
        }
    }

    /// Parsed info-hash, `None` if the record is corrupt
    pub fn info_hash(&self) -> Option<InfoHash> {
        InfoHash::from_hex(&self.info_hash)
    }

    /// Set a piece as downloaded in the bitfield
    pub fn set_piece_downloaded(&mut self, piece_index: usize) {
        if piece_index < self.downloaded_pieces.len() * 8 {
            let byte_index = piece_index / 8;
            let bit_index = 7 - (piece_index % 8);
            self.downloaded_pieces[byte_index] |= 1 << bit_index;
        }
    }

    pub fn downloaded_count(&self) -> usize {
        self.downloaded_pieces.iter().map(|b| b.count_ones() as usize).sum()
    }

    pub fn serialize(&self) -> anyhow::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn deserialize(data: &[u8]) -> anyhow::Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Save to file
    pub async fn save(&self, path: &Path) -> anyhow::Result<()> {
        let data = self.serialize()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, data).await?;
        Ok(())
    }

    /// Load from file, `None` when there is no record
    pub async fn load(path: &Path) -> anyhow::Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read(path).await?;
        Ok(Some(Self::deserialize(&data)?))
    }
}

/// When a clean stop removes the resume file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResumeCleanup {
    /// Any clean stop deletes it
    #[default]
    OnCleanStop,
    /// Only a clean stop of a fully downloaded transfer deletes it
    OnCompletion,
}

impl std::str::FromStr for ResumeCleanup {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "clean-stop" | "on-clean-stop" => Ok(ResumeCleanup::OnCleanStop),
            "completion" | "on-completion" => Ok(ResumeCleanup::OnCompletion),
            other => Err(format!("unknown resume cleanup policy: {}", other)),
        }
    }
}

/// Resume file path for a torrent name inside `data_dir`
pub fn resume_file_path(data_dir: &Path, name: &str) -> PathBuf {
    // Names come from remote metadata; keep them inside data_dir
    let safe: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    let safe = if safe.is_empty() || safe == "." || safe == ".." {
        "torrent".to_string()
    } else {
        safe
    };
    data_dir.join(format!("{}.{}", safe, RESUME_EXTENSION))
}

/// Target identity plus the manager of its resume file
#[derive(Debug)]
pub struct PreparedResume {
    pub target: ResolvedTarget,
    pub manager: ResumeManager,
}

/// Resolve `target` and work out its resume file without opening a session.
///
/// With resume disabled a stale file is deleted here, before any engine
/// gets a chance to pick it up.
pub async fn prepare(
    target: &str,
    data_dir: &Path,
    resume_enabled: bool,
    cleanup: ResumeCleanup,
) -> Result<PreparedResume> {
    let target = ResolvedTarget::resolve(target).await?;
    let manager = ResumeManager::new(resume_file_path(data_dir, &target.name), cleanup);
    debug!("Resume file for {} is {}", target.info_hash, manager.path().display());

    if !resume_enabled {
        manager.discard_stale().await?;
    }

    Ok(PreparedResume { target, manager })
}

/// Controller-side owner of one resume file
#[derive(Debug)]
pub struct ResumeManager {
    path: PathBuf,
    cleanup: ResumeCleanup,
    finalized: bool,
}

impl ResumeManager {
    pub fn new(path: PathBuf, cleanup: ResumeCleanup) -> Self {
        Self {
            path,
            cleanup,
            finalized: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete a leftover resume file. Returns whether one was removed.
    pub async fn discard_stale(&self) -> Result<bool> {
        match fs::metadata(&self.path).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(P2pError::resume_delete(self.path.display().to_string(), e.to_string())),
        }

        info!("Resume disabled, removing stale resume file {}", self.path.display());
        fs::remove_file(&self.path)
            .await
            .map_err(|e| P2pError::resume_delete(self.path.display().to_string(), e.to_string()))?;
        Ok(true)
    }

    /// Settle the resume file once the transfer is over.
    ///
    /// A clean stop deletes it according to the cleanup policy; an error
    /// stop keeps it. Only the first call does anything. Returns whether
    /// the file was deleted.
    pub async fn finalize(&mut self, clean: bool, completed: bool) -> Result<bool> {
        if self.finalized {
            debug!("Resume file already finalized");
            return Ok(false);
        }
        self.finalized = true;

        if !clean {
            info!("Keeping resume file {}", self.path.display());
            return Ok(false);
        }

        if self.cleanup == ResumeCleanup::OnCompletion && !completed {
            info!("Transfer incomplete, keeping resume file {}", self.path.display());
            return Ok(false);
        }

        match fs::remove_file(&self.path).await {
            Ok(()) => {
                info!("Removed resume file {}", self.path.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(P2pError::resume_delete(self.path.display().to_string(), e.to_string())),
        }
    }
}
