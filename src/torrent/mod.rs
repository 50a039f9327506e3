//! Torrent metadata module
//!
//! Parsing of `.torrent` files and magnet links, target resolution, and
//! creation of new torrents.

pub mod info;
pub mod parser;
pub mod magnet;
pub mod target;
pub mod builder;

pub use info::{InfoHash, TorrentFile, TorrentInfo};
pub use parser::TorrentParser;
pub use magnet::{magnet_link, MagnetInfo, MagnetParser};
pub use target::{ResolvedTarget, TargetSource};
pub use builder::{CreatedTorrent, TorrentBuilder};
