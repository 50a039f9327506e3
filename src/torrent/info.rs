//! Torrent information structures
//!
//! Info-hash identity and the metadata fields the controller needs.

use std::fmt;

use sha1::{Digest, Sha1};

/// SHA-1 of the bencoded info dictionary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InfoHash(pub [u8; 20]);

impl InfoHash {
    /// Hash bencoded info dictionary bytes
    pub fn from_info_bytes(info_dict_bytes: &[u8]) -> Self {
        Self(Sha1::digest(info_dict_bytes).into())
    }

    /// Parse a 40 character hex string
    pub fn from_hex(hex_str: &str) -> Option<Self> {
        let bytes = hex::decode(hex_str.trim()).ok()?;
        let bytes: [u8; 20] = bytes.try_into().ok()?;
        Some(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Represents a file in a multi-file torrent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentFile {
    /// Path components relative to the torrent root
    pub path: Vec<String>,
    pub length: u64,
}

/// Metadata extracted from a `.torrent` document
#[derive(Debug, Clone)]
pub struct TorrentInfo {
    /// All tracker URLs, primary first
    pub announce_list: Vec<String>,
    pub info_hash: InfoHash,
    pub piece_length: u64,
    pub piece_count: usize,
    pub name: String,
    /// Single file size (None for multi-file torrents)
    pub length: Option<u64>,
    /// Files in multi-file torrents (None for single-file torrents)
    pub files: Option<Vec<TorrentFile>>,
    pub private: bool,
}

impl TorrentInfo {
    /// Calculate total size of all files in torrent
    pub fn total_size(&self) -> u64 {
        if let Some(length) = self.length {
            length
        } else if let Some(files) = &self.files {
            files.iter().map(|f| f.length).sum()
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_hash_hex_round_trip() {
        let hex_str = "dd8255ecdc7ca55fb0bbf81323d87062db1f6d1c";
        let hash = InfoHash::from_hex(hex_str).unwrap();
        assert_eq!(hash.to_string(), hex_str);
    }

    #[test]
    fn test_info_hash_from_hex_rejects_bad_input() {
        assert!(InfoHash::from_hex("abc").is_none());
        assert!(InfoHash::from_hex(&"zz".repeat(20)).is_none());
        assert!(InfoHash::from_hex(&"ab".repeat(21)).is_none());
    }

    #[test]
    fn test_from_info_bytes() {
        // sha1("") is well known
        let hash = InfoHash::from_info_bytes(b"");
        assert_eq!(hash.to_hex(), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
    }

    #[test]
    fn test_total_size_multi_file() {
        let info = TorrentInfo {
            announce_list: vec![],
            info_hash: InfoHash([1u8; 20]),
            piece_length: 16384,
            piece_count: 1,
            name: "multi".to_string(),
            length: None,
            files: Some(vec![
                TorrentFile { path: vec!["a".to_string()], length: 500 },
                TorrentFile { path: vec!["b".to_string()], length: 524 },
            ]),
            private: false,
        };
        assert_eq!(info.total_size(), 1024);
        assert!(info.files.is_some());
    }
}
