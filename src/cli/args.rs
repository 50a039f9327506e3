//! CLI arguments module
//!
//! Defines command-line argument parsing using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::session::DEFAULT_PORT_RANGE;
use crate::storage::ResumeCleanup;

/// CLI arguments for p2pfile
#[derive(Debug, Parser)]
#[command(name = "p2pfile")]
#[command(about = "Peer-to-peer file distribution over a private DHT", long_about = None)]
pub struct CliArgs {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Settings shared by every subcommand
#[derive(Debug, Clone, Args)]
pub struct GlobalArgs {
    /// Public IP to advertise (detected from the default route if omitted)
    #[arg(long, global = true)]
    pub ip: Option<String>,

    /// Listening port (skips the port range scan)
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Port range scanned for a free port
    #[arg(long, global = true, default_value = DEFAULT_PORT_RANGE)]
    pub port_range: String,

    /// Bootstrap peers, comma separated host:port list
    #[arg(long, global = true, value_delimiter = ',')]
    pub peers: Vec<String>,

    /// Upload limit in MiB/s (0 = unlimited)
    #[arg(long, global = true, default_value_t = 0.0)]
    pub upload_limit: f64,

    /// Download limit in MiB/s (0 = unlimited)
    #[arg(long, global = true, default_value_t = 0.0)]
    pub download_limit: f64,

    /// Debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Quiet mode (no status lines, errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Download one or more targets, one after another
    Download(DownloadArgs),
    /// Publish local files and seed them
    Serve(ServeArgs),
    /// Write a .torrent file without transferring anything
    Create(CreateArgs),
    /// Print the version
    Version,
}

#[derive(Debug, Clone, Args)]
pub struct DownloadArgs {
    /// Magnet links, .torrent paths, hex info-hashes or HTTP(S) URLs
    #[arg(value_name = "TARGET", required = true)]
    pub targets: Vec<String>,

    /// Download directory
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    pub data_dir: PathBuf,

    /// Resume from an existing resume file
    #[arg(long)]
    pub resume: bool,

    /// Seed for this many seconds after downloading (0 = don't seed)
    #[arg(long, value_name = "SECS", default_value_t = 0)]
    pub seed_time: u64,

    /// Seed until trackers report no leechers
    #[arg(long)]
    pub seed_auto_stop: bool,

    /// When a clean stop deletes the resume file: clean-stop or completion
    #[arg(long, default_value = "clean-stop")]
    pub resume_cleanup: ResumeCleanup,
}

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    /// Files or directories to publish
    #[arg(value_name = "PATH", required = true)]
    pub paths: Vec<PathBuf>,

    /// Torrent name (required for more than one path)
    #[arg(long)]
    pub name: Option<String>,

    /// Tracker URL, one tier each
    #[arg(long = "tracker", value_name = "URL")]
    pub trackers: Vec<String>,

    /// Where to write the generated .torrent
    #[arg(long, value_name = "FILE")]
    pub torrent_out: Option<PathBuf>,

    /// Stop seeding after this many seconds (0 = never)
    #[arg(long, value_name = "SECS", default_value_t = 0)]
    pub seed_time: u64,
}

#[derive(Debug, Clone, Args)]
pub struct CreateArgs {
    /// Files or directories to include
    #[arg(value_name = "PATH", required = true)]
    pub paths: Vec<PathBuf>,

    /// Output .torrent file
    #[arg(short, long, value_name = "FILE")]
    pub out: PathBuf,

    /// Directory the torrent paths are relative to
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Torrent name (required for more than one path)
    #[arg(long)]
    pub name: Option<String>,

    /// Piece length in KiB, a multiple of 16 (computed if omitted)
    #[arg(long, value_name = "KIB")]
    pub piece_length: Option<u32>,

    /// Mark the torrent private
    #[arg(long)]
    pub private: bool,

    #[arg(long)]
    pub comment: Option<String>,

    /// Tracker URL, one tier each
    #[arg(long = "tracker", value_name = "URL")]
    pub trackers: Vec<String>,

    /// Web seed URL
    #[arg(long = "webseed", value_name = "URL")]
    pub webseeds: Vec<String>,
}

impl CliArgs {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the log level based on verbosity settings
    pub fn log_level(&self) -> tracing::Level {
        if self.global.debug {
            tracing::Level::DEBUG
        } else if self.global.quiet {
            tracing::Level::ERROR
        } else {
            tracing::Level::INFO
        }
    }
}
