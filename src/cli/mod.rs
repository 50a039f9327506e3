//! CLI module
//!
//! Command-line interface for p2pfile.

pub mod args;
pub mod config;

pub use args::{CliArgs, Command, CreateArgs, DownloadArgs, GlobalArgs, ServeArgs};
pub use config::{mib_to_bytes, serve_data_dir, Config};
