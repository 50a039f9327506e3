//! Torrent metadata builder
//!
//! Walks input paths, hashes pieces with SHA-1, and writes a bencoded
//! `.torrent` file. The returned magnet link identifies the new torrent.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_bencode::value::Value;
use sha1::{Digest, Sha1};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{P2pError, Result};
use crate::torrent::info::InfoHash;
use crate::torrent::magnet::magnet_link;

const MIN_PIECE_LENGTH: u64 = 16 * 1024;
const MAX_PIECE_LENGTH: u64 = 16 * 1024 * 1024;
const TARGET_PIECE_COUNT: u64 = 1500;
const CREATED_BY: &str = concat!("p2pfile/", env!("CARGO_PKG_VERSION"));

/// Result of writing a new torrent
#[derive(Debug, Clone)]
pub struct CreatedTorrent {
    pub path: PathBuf,
    pub info_hash: InfoHash,
    pub name: String,
    pub piece_length: u64,
    pub total_size: u64,
    /// Serialized size of the `.torrent` document
    pub metainfo_size: usize,
    pub magnet: String,
}

/// One file of the torrent, in hashing order
#[derive(Debug, Clone)]
struct SourceFile {
    disk_path: PathBuf,
    torrent_path: Vec<String>,
    length: u64,
}

/// Builder for new `.torrent` files
#[derive(Debug, Clone, Default)]
pub struct TorrentBuilder {
    paths: Vec<PathBuf>,
    root: Option<PathBuf>,
    name: Option<String>,
    private: bool,
    piece_length_kib: Option<u32>,
    comment: Option<String>,
    trackers: Vec<String>,
    webseeds: Vec<String>,
}

impl TorrentBuilder {
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Make file paths relative to `root`
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Torrent name; required with more than one input path
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn private(mut self, private: bool) -> Self {
        self.private = private;
        self
    }

    /// Piece length in KiB, must be a multiple of 16
    pub fn piece_length_kib(mut self, kib: u32) -> Self {
        self.piece_length_kib = Some(kib);
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// One tracker per tier, in order
    pub fn trackers(mut self, trackers: Vec<String>) -> Self {
        self.trackers = trackers;
        self
    }

    pub fn webseeds(mut self, webseeds: Vec<String>) -> Self {
        self.webseeds = webseeds;
        self
    }

    /// Hash the inputs and write the torrent to `out`
    pub fn write_to(&self, out: &Path) -> Result<CreatedTorrent> {
        let (metainfo, info_hash, name, piece_length, total_size) = self.build()?;

        std::fs::write(out, &metainfo)
            .map_err(|e| P2pError::metainfo_full("Failed to write torrent", out.display().to_string(), e.to_string()))?;
        info!("Created torrent size: {} bytes", metainfo.len());

        let magnet = magnet_link(&info_hash, &name, &self.trackers, None);
        Ok(CreatedTorrent {
            path: out.to_path_buf(),
            info_hash,
            name,
            piece_length,
            total_size,
            metainfo_size: metainfo.len(),
            magnet,
        })
    }

    /// Serialize the metainfo document without writing it
    pub fn build(&self) -> Result<(Vec<u8>, InfoHash, String, u64, u64)> {
        if self.paths.is_empty() {
            return Err(P2pError::metainfo("No input paths given"));
        }
        let name = self.resolve_name()?;
        let (files, single_file) = self.collect_files()?;
        let total_size: u64 = files.iter().map(|f| f.length).sum();
        if files.is_empty() {
            return Err(P2pError::metainfo("Inputs contain no files"));
        }

        let piece_length = match self.piece_length_kib {
            Some(kib) if kib > 0 && kib % 16 == 0 => u64::from(kib) << 10,
            Some(kib) => {
                return Err(P2pError::metainfo(format!(
                    "Piece length must be a positive multiple of 16 KiB, got {}",
                    kib
                )))
            }
            None => auto_piece_length(total_size),
        };
        debug!(
            "Hashing {} file(s), {} bytes, piece length {}",
            files.len(),
            total_size,
            piece_length
        );

        let pieces = hash_pieces(&files, piece_length)?;

        let mut info = HashMap::new();
        info.insert(b"name".to_vec(), Value::Bytes(name.clone().into_bytes()));
        info.insert(b"piece length".to_vec(), Value::Int(piece_length as i64));
        info.insert(b"pieces".to_vec(), Value::Bytes(pieces));
        if self.private {
            info.insert(b"private".to_vec(), Value::Int(1));
        }
        if single_file {
            info.insert(b"length".to_vec(), Value::Int(total_size as i64));
        } else {
            let entries = files
                .iter()
                .map(|f| {
                    let mut entry = HashMap::new();
                    entry.insert(b"length".to_vec(), Value::Int(f.length as i64));
                    entry.insert(
                        b"path".to_vec(),
                        Value::List(f.torrent_path.iter().map(|p| Value::Bytes(p.clone().into_bytes())).collect()),
                    );
                    Value::Dict(entry)
                })
                .collect();
            info.insert(b"files".to_vec(), Value::List(entries));
        }
        let info = Value::Dict(info);
        let info_hash = InfoHash::from_info_bytes(&serde_bencode::to_bytes(&info)?);

        let mut root = HashMap::new();
        root.insert(b"info".to_vec(), info);
        if let Some(first) = self.trackers.first() {
            root.insert(b"announce".to_vec(), Value::Bytes(first.clone().into_bytes()));
            let tiers = self
                .trackers
                .iter()
                .map(|t| Value::List(vec![Value::Bytes(t.clone().into_bytes())]))
                .collect();
            root.insert(b"announce-list".to_vec(), Value::List(tiers));
        }
        if !self.webseeds.is_empty() {
            let seeds = self.webseeds.iter().map(|w| Value::Bytes(w.clone().into_bytes())).collect();
            root.insert(b"url-list".to_vec(), Value::List(seeds));
        }
        if let Some(comment) = &self.comment {
            root.insert(b"comment".to_vec(), Value::Bytes(comment.clone().into_bytes()));
        }
        root.insert(b"created by".to_vec(), Value::Bytes(CREATED_BY.as_bytes().to_vec()));
        let now = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
        root.insert(b"creation date".to_vec(), Value::Int(now as i64));

        let metainfo = serde_bencode::to_bytes(&Value::Dict(root))?;
        Ok((metainfo, info_hash, name, piece_length, total_size))
    }

    fn resolve_name(&self) -> Result<String> {
        if let Some(name) = self.name.as_ref().filter(|n| !n.trim().is_empty()) {
            return Ok(name.clone());
        }
        if self.paths.len() > 1 {
            return Err(P2pError::metainfo("A name is required when more than one path is given"));
        }
        self.paths[0]
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| P2pError::metainfo(format!("Cannot derive a name from {}", self.paths[0].display())))
    }

    /// Files in deterministic order; the flag marks single-file mode
    fn collect_files(&self) -> Result<(Vec<SourceFile>, bool)> {
        let single = self.paths.len() == 1 && self.root.is_none() && self.paths[0].is_file();
        if single {
            let path = &self.paths[0];
            let length = std::fs::metadata(path)
                .map_err(|e| P2pError::metainfo_full("Cannot stat input", path.display().to_string(), e.to_string()))?
                .len();
            return Ok((
                vec![SourceFile {
                    disk_path: path.clone(),
                    torrent_path: vec![],
                    length,
                }],
                true,
            ));
        }

        let mut files = Vec::new();
        for input in &self.paths {
            let base = match &self.root {
                Some(root) => root.clone(),
                None if self.paths.len() == 1 => input.clone(),
                None => input.parent().map(Path::to_path_buf).unwrap_or_default(),
            };

            for entry in WalkDir::new(input).sort_by_file_name() {
                let entry = entry.map_err(|e| {
                    P2pError::metainfo_full("Cannot walk input", input.display().to_string(), e.to_string())
                })?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let relative = entry.path().strip_prefix(&base).map_err(|_| {
                    P2pError::metainfo_full(
                        "Input is outside the root",
                        entry.path().display().to_string(),
                        base.display().to_string(),
                    )
                })?;
                let torrent_path: Vec<String> = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                let length = entry
                    .metadata()
                    .map_err(|e| P2pError::metainfo_full("Cannot stat input", entry.path().display().to_string(), e.to_string()))?
                    .len();
                files.push(SourceFile {
                    disk_path: entry.path().to_path_buf(),
                    torrent_path,
                    length,
                });
            }
        }
        Ok((files, false))
    }
}

/// Roughly `TARGET_PIECE_COUNT` pieces, power of two, within bounds
pub fn auto_piece_length(total_size: u64) -> u64 {
    (total_size / TARGET_PIECE_COUNT)
        .next_power_of_two()
        .clamp(MIN_PIECE_LENGTH, MAX_PIECE_LENGTH)
}

/// Concatenated SHA-1 digests of each piece across file boundaries
fn hash_pieces(files: &[SourceFile], piece_length: u64) -> Result<Vec<u8>> {
    let mut pieces = Vec::new();
    let mut hasher = Sha1::new();
    let mut filled: u64 = 0;
    let mut buf = vec![0u8; 64 * 1024];

    for file in files {
        let mut reader = File::open(&file.disk_path)
            .map_err(|e| P2pError::metainfo_full("Cannot open input", file.disk_path.display().to_string(), e.to_string()))?;
        loop {
            let want = buf.len().min((piece_length - filled) as usize);
            let n = reader
                .read(&mut buf[..want])
                .map_err(|e| P2pError::metainfo_full("Cannot read input", file.disk_path.display().to_string(), e.to_string()))?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            filled += n as u64;
            if filled == piece_length {
                pieces.extend_from_slice(&hasher.finalize_reset());
                filled = 0;
            }
        }
    }
    if filled > 0 {
        pieces.extend_from_slice(&hasher.finalize());
    }
    Ok(pieces)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::torrent::magnet::MagnetParser;
    use crate::torrent::parser::TorrentParser;

    #[test]
    fn test_auto_piece_length_bounds() {
        assert_eq!(auto_piece_length(0), MIN_PIECE_LENGTH);
        assert_eq!(auto_piece_length(1024), MIN_PIECE_LENGTH);
        assert_eq!(auto_piece_length(u64::MAX / 2), MAX_PIECE_LENGTH);
        let len = auto_piece_length(1500 * 300 * 1024);
        assert_eq!(len, 512 * 1024);
        assert!(len.is_power_of_two());
    }

    #[test]
    fn test_single_file_torrent() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("hello.txt");
        std::fs::write(&input, vec![7u8; 40 * 1024]).unwrap();
        let out = dir.path().join("hello.torrent");

        let created = TorrentBuilder::new([&input])
            .piece_length_kib(16)
            .trackers(vec!["http://10.0.0.1:6969/announce".to_string()])
            .write_to(&out)
            .unwrap();

        assert_eq!(created.name, "hello.txt");
        assert_eq!(created.total_size, 40 * 1024);

        let parsed = TorrentParser::parse_bytes(&std::fs::read(&out).unwrap()).unwrap();
        assert_eq!(parsed.info_hash, created.info_hash);
        assert_eq!(parsed.piece_count, 3);
        assert_eq!(parsed.length, Some(40 * 1024));
        assert_eq!(parsed.announce_list, vec!["http://10.0.0.1:6969/announce".to_string()]);

        let magnet = MagnetParser::parse(&created.magnet).unwrap();
        assert_eq!(magnet.info_hash, created.info_hash);
        assert_eq!(magnet.name(), "hello.txt");
        assert_eq!(magnet.trackers.len(), 1);
    }

    #[test]
    fn test_piece_hash_matches_content() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("a.bin");
        std::fs::write(&input, b"abc").unwrap();
        let (metainfo, ..) = TorrentBuilder::new([&input]).build().unwrap();

        let expected: [u8; 20] = Sha1::digest(b"abc").into();
        let needle = [b"6:pieces20:".as_slice(), expected.as_slice()].concat();
        assert!(metainfo.windows(needle.len()).any(|w| w == needle.as_slice()));
    }

    #[test]
    fn test_directory_torrent() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("dataset");
        std::fs::create_dir_all(data.join("sub")).unwrap();
        std::fs::write(data.join("b.txt"), b"bbbb").unwrap();
        std::fs::write(data.join("sub").join("a.txt"), b"aa").unwrap();

        let out = dir.path().join("dataset.torrent");
        let created = TorrentBuilder::new([&data]).private(true).write_to(&out).unwrap();
        assert_eq!(created.name, "dataset");

        let parsed = TorrentParser::parse_bytes(&std::fs::read(&out).unwrap()).unwrap();
        assert!(parsed.private);
        let files = parsed.files.unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, vec!["b.txt"]);
        assert_eq!(files[1].path, vec!["sub", "a.txt"]);
        assert_eq!(parsed.length, None);
    }

    #[test]
    fn test_multiple_paths_need_name() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        std::fs::write(&a, b"1").unwrap();
        std::fs::write(&b, b"2").unwrap();

        assert!(TorrentBuilder::new([&a, &b]).build().is_err());

        let (metainfo, _, name, ..) = TorrentBuilder::new([&a, &b]).name("pair").build().unwrap();
        assert_eq!(name, "pair");
        let parsed = TorrentParser::parse_bytes(&metainfo).unwrap();
        assert_eq!(parsed.total_size(), 2);
        assert_eq!(parsed.files.unwrap()[1].path, vec!["b"]);
    }

    #[test]
    fn test_piece_length_must_be_multiple_of_16() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("x");
        std::fs::write(&input, b"x").unwrap();
        assert!(TorrentBuilder::new([&input]).piece_length_kib(20).build().is_err());
        assert!(TorrentBuilder::new([&input]).piece_length_kib(0).build().is_err());
        assert!(TorrentBuilder::new([&input]).piece_length_kib(32).build().is_ok());
    }
}
