//! Magnet link parsing and formatting
//!
//! Handles `magnet:?` URIs: extracting the info-hash and display name of a
//! download target, and building the link published for a seeded torrent.

use std::net::SocketAddr;

use tracing::debug;
use url::Url;

use crate::error::{P2pError, Result};
use crate::torrent::info::InfoHash;

/// Parsed magnet link information
#[derive(Debug, Clone)]
pub struct MagnetInfo {
    pub info_hash: InfoHash,
    /// Display name (dn parameter)
    pub display_name: Option<String>,
    /// Tracker URLs (tr parameters)
    pub trackers: Vec<String>,
    /// Direct peer hints (x.pe parameters)
    pub peers: Vec<String>,
}

impl MagnetInfo {
    /// Name used for on-disk artifacts such as the resume file
    pub fn name(&self) -> String {
        self.display_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| self.info_hash.to_hex())
    }
}

/// Parser for magnet links
pub struct MagnetParser;

impl MagnetParser {
    /// Parse a magnet link string
    ///
    /// # Example
    /// ```ignore
    /// let magnet = "magnet:?xt=urn:btih:dd8255ecdc7ca55fb0bbf81323d87062db1f6d1c&dn=Big+Buck+Bunny";
    /// let info = MagnetParser::parse(magnet)?;
    /// ```
    pub fn parse(magnet_uri: &str) -> Result<MagnetInfo> {
        let invalid = |msg: String| P2pError::target_invalid(magnet_uri, msg);

        let url = Url::parse(magnet_uri.trim()).map_err(|e| invalid(format!("Invalid magnet URL format: {}", e)))?;
        if url.scheme() != "magnet" {
            return Err(invalid(format!("URL scheme is '{}', not magnet", url.scheme())));
        }

        let mut info_hash = None;
        let mut display_name = None;
        let mut trackers = Vec::new();
        let mut peers = Vec::new();

        for (key, value) in url.query_pairs().into_owned() {
            match key.as_str() {
                "xt" => {
                    if let Some(hash) = Self::extract_info_hash(&value).map_err(invalid)? {
                        info_hash = Some(hash);
                    }
                }
                "dn" => display_name = Some(value),
                "tr" => trackers.push(value),
                "x.pe" => peers.push(value),
                _ => debug!("Ignoring magnet parameter: {}", key),
            }
        }

        let info_hash = info_hash
            .ok_or_else(|| invalid("Magnet link must contain an info hash (xt=urn:btih:<hash>)".to_string()))?;

        Ok(MagnetInfo {
            info_hash,
            display_name,
            trackers,
            peers,
        })
    }

    /// Extract the info-hash from an `xt` value of the form `urn:btih:<hex>`
    fn extract_info_hash(xt_value: &str) -> std::result::Result<Option<InfoHash>, String> {
        let Some(hash_str) = xt_value.strip_prefix("urn:btih:") else {
            debug!("xt parameter is not a BitTorrent info hash: {}", xt_value);
            return Ok(None);
        };

        match hash_str.len() {
            40 => InfoHash::from_hex(hash_str)
                .map(Some)
                .ok_or_else(|| format!("Info hash is not valid hex: {}", hash_str)),
            32 => Err("Base32-encoded info hashes are not supported, use a hex-encoded magnet link".to_string()),
            len => Err(format!("Info hash has invalid length: {} (expected 40 for hex)", len)),
        }
    }

    /// Check if a string looks like a magnet link
    pub fn is_magnet_link(input: &str) -> bool {
        input.trim().starts_with("magnet:")
    }
}

/// Format `magnet:?xt=urn:btih:<hash>&dn=<name>[&tr=<tracker>...][&x.pe=<peer>]`
pub fn magnet_link(info_hash: &InfoHash, name: &str, trackers: &[String], peer_hint: Option<SocketAddr>) -> String {
    let mut link = format!("magnet:?xt=urn:btih:{}&dn={}", info_hash, urlencoding::encode(name));
    for tracker in trackers {
        link.push_str("&tr=");
        link.push_str(&urlencoding::encode(tracker));
    }
    if let Some(peer) = peer_hint {
        link.push_str("&x.pe=");
        link.push_str(&urlencoding::encode(&peer.to_string()));
    }
    link
}

#[cfg(test)]
mod tests {
    use super::*;

    const BIG_BUCK_BUNNY_MAGNET: &str = "magnet:?xt=urn:btih:dd8255ecdc7ca55fb0bbf81323d87062db1f6d1c&dn=Big+Buck+Bunny&tr=udp%3A%2F%2Fexplodie.org%3A6969&tr=udp%3A%2F%2Ftracker.opentrackr.org%3A1337&ws=https%3A%2F%2Fwebtorrent.io%2Ftorrents%2F";

    #[test]
    fn test_parse_big_buck_bunny_magnet() {
        let info = MagnetParser::parse(BIG_BUCK_BUNNY_MAGNET).unwrap();
        assert_eq!(info.info_hash.to_hex(), "dd8255ecdc7ca55fb0bbf81323d87062db1f6d1c");
        assert_eq!(info.display_name, Some("Big Buck Bunny".to_string()));
        assert_eq!(info.name(), "Big Buck Bunny");
        assert_eq!(info.trackers.len(), 2);
    }

    #[test]
    fn test_name_falls_back_to_hash() {
        let info = MagnetParser::parse("magnet:?xt=urn:btih:dd8255ecdc7ca55fb0bbf81323d87062db1f6d1c").unwrap();
        assert!(info.display_name.is_none());
        assert_eq!(info.name(), "dd8255ecdc7ca55fb0bbf81323d87062db1f6d1c");
    }

    #[test]
    fn test_parse_invalid_magnet_no_info_hash() {
        let err = MagnetParser::parse("magnet:?dn=Test+Torrent&tr=http://tracker.com").unwrap_err();
        assert!(matches!(err, P2pError::TargetInvalid { .. }));
    }

    #[test]
    fn test_parse_invalid_scheme() {
        assert!(MagnetParser::parse("http:?xt=urn:btih:dd8255ecdc7ca55fb0bbf81323d87062db1f6d1c").is_err());
        assert!(MagnetParser::parse("not-a-magnet-link").is_err());
    }

    #[test]
    fn test_parse_bad_hash_lengths() {
        assert!(MagnetParser::parse("magnet:?xt=urn:btih:dd8255ecdc7ca55fb0bbf81323d87062db1f6d").is_err());
        assert!(MagnetParser::parse("magnet:?xt=urn:btih:ABCDEFGHIJKLMNOPQRSTUVWXYZ234567").is_err());
    }

    #[test]
    fn test_is_magnet_link() {
        assert!(MagnetParser::is_magnet_link("  magnet:?xt=urn:btih:abc"));
        assert!(!MagnetParser::is_magnet_link("http://example.com"));
        assert!(!MagnetParser::is_magnet_link("example.torrent"));
    }

    #[test]
    fn test_magnet_link_format() {
        let hash = InfoHash([0xABu8; 20]);
        let trackers = vec!["http://10.0.0.1:6969/announce".to_string()];
        let link = magnet_link(&hash, "my file", &trackers, None);
        assert_eq!(
            link,
            format!(
                "magnet:?xt=urn:btih:{}&dn=my%20file&tr=http%3A%2F%2F10.0.0.1%3A6969%2Fannounce",
                "ab".repeat(20)
            )
        );
    }

    #[test]
    fn test_magnet_link_round_trips_through_parser() {
        let hash = InfoHash([7u8; 20]);
        let peer: SocketAddr = "192.168.1.10:42070".parse().unwrap();
        let link = magnet_link(&hash, "data set", &["udp://t:1".to_string()], Some(peer));
        let info = MagnetParser::parse(&link).unwrap();
        assert_eq!(info.info_hash, hash);
        assert_eq!(info.name(), "data set");
        assert_eq!(info.trackers, vec!["udp://t:1".to_string()]);
        assert_eq!(info.peers, vec!["192.168.1.10:42070".to_string()]);
    }
}
