//! Transfer targets
//!
//! A target is whatever the user asked to fetch: a magnet link, a local
//! `.torrent` file, a bare hex info-hash, or an HTTP(S) URL serving a
//! `.torrent`. Resolving one yields the info-hash and the name used for
//! on-disk artifacts, without touching an engine session.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::debug;

use crate::error::{P2pError, Result};
use crate::torrent::info::InfoHash;
use crate::torrent::magnet::MagnetParser;
use crate::torrent::parser::TorrentParser;

/// How the engine should be asked to add the target
#[derive(Debug, Clone)]
pub enum TargetSource {
    Magnet(String),
    TorrentFile { path: PathBuf, metainfo: Bytes },
    InfoHash(InfoHash),
    Url { url: String, metainfo: Bytes },
}

/// A target with its identity worked out
#[derive(Debug, Clone)]
pub struct ResolvedTarget {
    pub source: TargetSource,
    pub info_hash: InfoHash,
    pub name: String,
}

impl ResolvedTarget {
    /// Classify and resolve a target string
    pub async fn resolve(target: &str) -> Result<Self> {
        let trimmed = target.trim();

        if MagnetParser::is_magnet_link(trimmed) {
            let magnet = MagnetParser::parse(trimmed)?;
            return Ok(Self {
                info_hash: magnet.info_hash,
                name: magnet.name(),
                source: TargetSource::Magnet(trimmed.to_string()),
            });
        }

        if is_http_url(trimmed) {
            let metainfo = fetch_metainfo(trimmed).await?;
            let info = TorrentParser::parse_bytes(&metainfo)
                .map_err(|e| P2pError::target_invalid(trimmed, e.to_string()))?;
            return Ok(Self {
                info_hash: info.info_hash,
                name: info.name,
                source: TargetSource::Url {
                    url: trimmed.to_string(),
                    metainfo,
                },
            });
        }

        let path = Path::new(trimmed);
        if !path.exists() {
            if let Some(info_hash) = InfoHash::from_hex(trimmed) {
                return Ok(Self {
                    info_hash,
                    name: info_hash.to_hex(),
                    source: TargetSource::InfoHash(info_hash),
                });
            }
        }

        let metainfo = tokio::fs::read(path)
            .await
            .map_err(|e| P2pError::target_unreadable(trimmed, e.to_string()))?;
        let info = TorrentParser::parse_bytes(&metainfo).map_err(|e| P2pError::target_invalid(trimmed, e.to_string()))?;
        debug!("Target {} is a torrent file named {}", trimmed, info.name);

        Ok(Self {
            info_hash: info.info_hash,
            name: info.name,
            source: TargetSource::TorrentFile {
                path: path.to_path_buf(),
                metainfo: Bytes::from(metainfo),
            },
        })
    }
}

fn is_http_url(target: &str) -> bool {
    target.starts_with("http://") || target.starts_with("https://")
}

#[cfg(feature = "download")]
async fn fetch_metainfo(url: &str) -> Result<Bytes> {
    debug!("Fetching torrent from {}", url);
    let response = reqwest::get(url)
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| P2pError::target_unreadable(url, e.to_string()))?;
    response
        .bytes()
        .await
        .map_err(|e| P2pError::target_unreadable(url, e.to_string()))
}

#[cfg(not(feature = "download"))]
async fn fetch_metainfo(url: &str) -> Result<Bytes> {
    Err(P2pError::target_invalid(url, "HTTP targets require the `download` feature"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "dd8255ecdc7ca55fb0bbf81323d87062db1f6d1c";

    #[tokio::test]
    async fn test_resolve_magnet() {
        let target = format!("magnet:?xt=urn:btih:{}&dn=movie", HASH);
        let resolved = ResolvedTarget::resolve(&target).await.unwrap();
        assert_eq!(resolved.info_hash.to_hex(), HASH);
        assert_eq!(resolved.name, "movie");
        assert!(matches!(resolved.source, TargetSource::Magnet(_)));
    }

    #[tokio::test]
    async fn test_resolve_bare_info_hash() {
        let resolved = ResolvedTarget::resolve(HASH).await.unwrap();
        assert_eq!(resolved.name, HASH);
        assert!(matches!(resolved.source, TargetSource::InfoHash(_)));
    }

    #[tokio::test]
    async fn test_resolve_torrent_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.torrent");
        std::fs::write(
            &path,
            b"d4:infod6:lengthi5e4:name5:a.txt12:piece lengthi16384e6:pieces20:aaaaaaaaaaaaaaaaaaaaee",
        )
        .unwrap();

        let resolved = ResolvedTarget::resolve(path.to_str().unwrap()).await.unwrap();
        assert_eq!(resolved.name, "a.txt");
        assert!(matches!(resolved.source, TargetSource::TorrentFile { .. }));
    }

    #[tokio::test]
    async fn test_missing_file_is_unreadable() {
        let err = ResolvedTarget::resolve("/definitely/missing/file.torrent").await.unwrap_err();
        assert!(matches!(err, P2pError::TargetUnreadable { .. }));
    }

    #[tokio::test]
    async fn test_garbage_file_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.torrent");
        std::fs::write(&path, b"junk").unwrap();
        let err = ResolvedTarget::resolve(path.to_str().unwrap()).await.unwrap_err();
        assert!(matches!(err, P2pError::TargetInvalid { .. }));
    }
}
