//! Torrent file parser
//!
//! Decodes `.torrent` documents with `serde_bencode`. The info-hash is
//! taken over the `info` dictionary exactly as it appears in the file.

use std::collections::HashMap;

use serde_bencode::value::Value;
use tracing::{debug, info};

use crate::error::{P2pError, Result};
use crate::torrent::info::{InfoHash, TorrentFile, TorrentInfo};

type Dict = HashMap<Vec<u8>, Value>;

/// Parser for .torrent files
pub struct TorrentParser;

impl TorrentParser {
    /// Parse a .torrent document from bytes
    pub fn parse_bytes(data: &[u8]) -> Result<TorrentInfo> {
        debug!("Parsing torrent file from {} bytes", data.len());

        let root: Value = serde_bencode::from_bytes(data)
            .map_err(|e| P2pError::metainfo_full("Failed to decode bencode", "<bytes>", e.to_string()))?;
        let root = as_dict(&root).ok_or_else(|| P2pError::metainfo("Root must be a dictionary"))?;

        let info_value = root
            .get(b"info".as_slice())
            .ok_or_else(|| P2pError::metainfo("Missing info dictionary"))?;
        let info_dict = as_dict(info_value).ok_or_else(|| P2pError::metainfo("info must be a dictionary"))?;
        let info_hash = InfoHash::from_info_bytes(extract_info_dict(data)?);

        let name = get_string(info_dict, b"name").ok_or_else(|| P2pError::metainfo("Missing name field"))?;
        let piece_length = get_int(info_dict, b"piece length")
            .filter(|len| *len > 0)
            .ok_or_else(|| P2pError::metainfo("Missing piece length"))? as u64;
        let pieces = get_bytes(info_dict, b"pieces").ok_or_else(|| P2pError::metainfo("Missing pieces field"))?;
        if pieces.len() % 20 != 0 {
            return Err(P2pError::metainfo(format!(
                "Pieces field length must be a multiple of 20, got {}",
                pieces.len()
            )));
        }

        let (length, files) = if let Some(len) = get_int(info_dict, b"length") {
            (Some(len.max(0) as u64), None)
        } else if let Some(Value::List(entries)) = info_dict.get(b"files".as_slice()) {
            (None, Some(parse_files(entries)?))
        } else {
            return Err(P2pError::metainfo("Neither length nor files found in info dict"));
        };

        let mut announce_list = Vec::new();
        if let Some(announce) = get_string(root, b"announce") {
            announce_list.push(announce);
        }
        if let Some(Value::List(tiers)) = root.get(b"announce-list".as_slice()) {
            for tier in tiers {
                if let Value::List(urls) = tier {
                    for url in urls.iter().filter_map(value_string) {
                        if !announce_list.contains(&url) {
                            announce_list.push(url);
                        }
                    }
                }
            }
        }

        let private = get_int(info_dict, b"private") == Some(1);

        info!("Parsed torrent {} ({})", name, info_hash);
        Ok(TorrentInfo {
            announce_list,
            info_hash,
            piece_length,
            piece_count: pieces.len() / 20,
            name,
            length,
            files,
            private,
        })
    }
}

/// Raw bytes of the root dictionary's `info` value
fn extract_info_dict(data: &[u8]) -> Result<&[u8]> {
    if data.first() != Some(&b'd') {
        return Err(P2pError::metainfo("Root must be a dictionary"));
    }
    let mut idx = 1;
    while data.get(idx).is_some_and(|&b| b != b'e') {
        let key_end = skip_value(data, idx)?;
        let key = string_payload(&data[idx..key_end])
            .ok_or_else(|| P2pError::metainfo("Dictionary key must be a string"))?;
        let value_end = skip_value(data, key_end)?;
        if key == b"info" {
            return Ok(&data[key_end..value_end]);
        }
        idx = value_end;
    }
    Err(P2pError::metainfo("Missing info dictionary"))
}

/// Index just past the bencoded value starting at `start`
fn skip_value(data: &[u8], start: usize) -> Result<usize> {
    let truncated = || P2pError::metainfo("Truncated bencode");
    match data.get(start) {
        Some(b'i') => {
            let end = data[start..].iter().position(|&b| b == b'e').ok_or_else(truncated)?;
            Ok(start + end + 1)
        }
        Some(b'l') | Some(b'd') => {
            let mut idx = start + 1;
            while data.get(idx).ok_or_else(truncated)? != &b'e' {
                idx = skip_value(data, idx)?;
            }
            Ok(idx + 1)
        }
        Some(b'0'..=b'9') => {
            let colon = data[start..].iter().position(|&b| b == b':').ok_or_else(truncated)?;
            let len: usize = std::str::from_utf8(&data[start..start + colon])
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| P2pError::metainfo("Bad string length"))?;
            let end = start + colon + 1 + len;
            if end > data.len() {
                return Err(truncated());
            }
            Ok(end)
        }
        Some(other) => Err(P2pError::metainfo(format!("Unexpected byte 0x{:02x} in bencode", other))),
        None => Err(truncated()),
    }
}

/// Payload of an encoded byte string such as `4:info`
fn string_payload(encoded: &[u8]) -> Option<&[u8]> {
    let colon = encoded.iter().position(|&b| b == b':')?;
    encoded[..colon].iter().all(u8::is_ascii_digit).then(|| &encoded[colon + 1..])
}

fn parse_files(entries: &[Value]) -> Result<Vec<TorrentFile>> {
    let mut files = Vec::with_capacity(entries.len());
    for entry in entries {
        let dict = as_dict(entry).ok_or_else(|| P2pError::metainfo("File entry must be a dictionary"))?;
        let length = get_int(dict, b"length").ok_or_else(|| P2pError::metainfo("Missing file length"))?;
        let path = match dict.get(b"path".as_slice()) {
            Some(Value::List(parts)) => parts.iter().filter_map(value_string).collect(),
            _ => return Err(P2pError::metainfo("Missing file path")),
        };
        files.push(TorrentFile {
            path,
            length: length.max(0) as u64,
        });
    }
    Ok(files)
}

fn as_dict(value: &Value) -> Option<&Dict> {
    match value {
        Value::Dict(d) => Some(d),
        _ => None,
    }
}

fn get_int(dict: &Dict, key: &[u8]) -> Option<i64> {
    match dict.get(key) {
        Some(Value::Int(i)) => Some(*i),
        _ => None,
    }
}

fn get_bytes<'a>(dict: &'a Dict, key: &[u8]) -> Option<&'a [u8]> {
    match dict.get(key) {
        Some(Value::Bytes(b)) => Some(b),
        _ => None,
    }
}

fn get_string(dict: &Dict, key: &[u8]) -> Option<String> {
    get_bytes(dict, key).map(|b| String::from_utf8_lossy(b).into_owned())
}

fn value_string(value: &Value) -> Option<String> {
    match value {
        Value::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SINGLE: &[u8] = b"d8:announce21:http://t.example/anno4:infod6:lengthi5e4:name5:a.txt12:piece lengthi16384e6:pieces20:aaaaaaaaaaaaaaaaaaaaee";

    #[test]
    fn test_parse_single_file() {
        let info = TorrentParser::parse_bytes(SINGLE).unwrap();
        assert_eq!(info.name, "a.txt");
        assert_eq!(info.total_size(), 5);
        assert_eq!(info.piece_length, 16384);
        assert_eq!(info.piece_count, 1);
        assert_eq!(info.announce_list, vec!["http://t.example/anno".to_string()]);
        assert!(!info.private);
    }

    #[test]
    fn test_info_hash_covers_info_dict_only() {
        let info = TorrentParser::parse_bytes(SINGLE).unwrap();
        let info_dict: &[u8] = b"d6:lengthi5e4:name5:a.txt12:piece lengthi16384e6:pieces20:aaaaaaaaaaaaaaaaaaaae";
        assert_eq!(info.info_hash, InfoHash::from_info_bytes(info_dict));
    }

    #[test]
    fn test_info_hash_keeps_file_key_order() {
        // Keys out of canonical order must not be re-sorted before hashing
        let info_dict: &[u8] = b"d4:name5:a.txt6:lengthi5e12:piece lengthi16384e6:pieces20:aaaaaaaaaaaaaaaaaaaae";
        let mut data = b"d4:info".to_vec();
        data.extend_from_slice(info_dict);
        data.push(b'e');

        let info = TorrentParser::parse_bytes(&data).unwrap();
        assert_eq!(info.info_hash, InfoHash::from_info_bytes(info_dict));
        assert_eq!(info.info_hash.to_hex(), "3c354a83db57d7a51a464b9c72256937d0c13c61");
        assert_eq!(info.total_size(), 5);
    }

    #[test]
    fn test_extract_info_dict_skips_nested_values() {
        let data = b"d8:announce3:abc4:listl1:xi-3ed1:ai1eee4:infod4:name1:ye3:zzzi0ee";
        assert_eq!(extract_info_dict(data).unwrap(), b"d4:name1:ye");
    }

    #[test]
    fn test_extract_info_dict_truncated() {
        assert!(extract_info_dict(b"d4:infod4:name5:abc").is_err());
        assert!(extract_info_dict(b"d3:foo3:bare").is_err());
    }

    #[test]
    fn test_parse_multi_file() {
        let data = b"d4:infod5:filesld6:lengthi3e4:pathl1:x5:a.binee\
d6:lengthi4e4:pathl5:b.bineee4:name3:dir12:piece lengthi16384e6:pieces20:bbbbbbbbbbbbbbbbbbbb7:privatei1eee";
        let info = TorrentParser::parse_bytes(data).unwrap();
        assert!(info.files.is_some());
        assert_eq!(info.total_size(), 7);
        assert_eq!(info.files.as_ref().unwrap()[0].path, vec!["x", "a.bin"]);
        assert!(info.private);
        assert!(info.announce_list.is_empty());
    }

    #[test]
    fn test_missing_info() {
        let err = TorrentParser::parse_bytes(b"d8:announce3:abce").unwrap_err();
        assert!(err.to_string().contains("Missing info dictionary"));
    }

    #[test]
    fn test_not_bencode() {
        assert!(TorrentParser::parse_bytes(b"definitely not bencode").is_err());
    }
}
