//! CLI configuration module
//!
//! Turns parsed arguments into [`TransferConfig`] values for the controller.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::cli::args::{CliArgs, DownloadArgs, ServeArgs};
use crate::net::parse_port_range;
use crate::session::{ListenConfig, SeedingPolicy, TransferConfig, TransferMode};

const MIB: f64 = 1024.0 * 1024.0;

/// Convert a MiB/s limit to bytes per second. Non-positive means unlimited.
pub fn mib_to_bytes(mib_per_sec: f64) -> u64 {
    if mib_per_sec.is_finite() && mib_per_sec > 0.0 {
        (mib_per_sec * MIB) as u64
    } else {
        0
    }
}

/// Settings shared by every transfer of one invocation
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: ListenConfig,
    pub peers: Vec<String>,
    /// Bytes per second
    pub upload_limit: u64,
    /// Bytes per second
    pub download_limit: u64,
    pub debug: bool,
    pub quiet: bool,
}

impl Config {
    /// Create configuration from CLI arguments
    pub fn from_args(args: &CliArgs) -> Self {
        let global = &args.global;
        Self {
            listen: ListenConfig {
                ip: global.ip.clone().filter(|ip| !ip.trim().is_empty()),
                port: global.port,
                port_range: global.port_range.clone(),
            },
            peers: global.peers.iter().map(|p| p.trim().to_string()).filter(|p| !p.is_empty()).collect(),
            upload_limit: mib_to_bytes(global.upload_limit),
            download_limit: mib_to_bytes(global.download_limit),
            debug: global.debug,
            quiet: global.quiet,
        }
    }

    /// Check settings that would otherwise only fail once a transfer opens
    pub fn validate(&self) -> Result<()> {
        if self.listen.port.is_none() {
            parse_port_range(&self.listen.port_range).context("Invalid --port-range")?;
        }
        Ok(())
    }

    /// One transfer per download target, in the order given
    pub fn download_transfers(&self, args: &DownloadArgs) -> Result<Vec<TransferConfig>> {
        args.targets
            .iter()
            .map(|target| {
                let mut transfer = self.transfer(target, &args.data_dir);
                transfer.resume = args.resume;
                transfer.seeding = SeedingPolicy {
                    max_seeding_seconds: args.seed_time,
                    stop_when_no_leechers: args.seed_auto_stop,
                    ..SeedingPolicy::default()
                };
                transfer.resume_cleanup = args.resume_cleanup;
                transfer
                    .validate()
                    .with_context(|| format!("Invalid settings for {}", target))?;
                Ok(transfer)
            })
            .collect()
    }

    /// Transfer publishing `torrent`, whose content lives in `data_dir`
    pub fn serve_transfer(&self, args: &ServeArgs, torrent: &Path, data_dir: &Path) -> Result<TransferConfig> {
        let mut transfer = self.transfer(&torrent.to_string_lossy(), data_dir);
        transfer.mode = TransferMode::Serve;
        transfer.resume = true;
        transfer.seeding.max_seeding_seconds = args.seed_time;
        transfer.validate().context("Invalid serve settings")?;
        Ok(transfer)
    }

    fn transfer(&self, target: &str, data_dir: &Path) -> TransferConfig {
        let mut transfer = TransferConfig::new(target, data_dir);
        transfer.listen = self.listen.clone();
        transfer.peers = self.peers.clone();
        transfer.upload_limit = self.upload_limit;
        transfer.download_limit = self.download_limit;
        transfer.debug = self.debug;
        transfer
    }
}

/// Directory a served path's content is found under
pub fn serve_data_dir(paths: &[PathBuf]) -> PathBuf {
    paths
        .first()
        .and_then(|p| p.parent())
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::args::Command;
    use crate::storage::ResumeCleanup;
    use clap::Parser;

    fn parse(argv: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_mib_to_bytes() {
        assert_eq!(mib_to_bytes(0.0), 0);
        assert_eq!(mib_to_bytes(-3.0), 0);
        assert_eq!(mib_to_bytes(f64::NAN), 0);
        assert_eq!(mib_to_bytes(1.0), 1_048_576);
        assert_eq!(mib_to_bytes(0.5), 524_288);
    }

    #[test]
    fn test_download_transfers() {
        let args = parse(&[
            "p2pfile",
            "download",
            "aaa",
            "bbb",
            "--data-dir",
            "/tmp/dl",
            "--resume",
            "--seed-time",
            "600",
            "--ip",
            "10.0.0.5",
            "--port",
            "42071",
            "--download-limit",
            "2",
            "--resume-cleanup",
            "completion",
        ]);
        let config = Config::from_args(&args);
        let Command::Download(download) = &args.command else {
            panic!("expected download");
        };

        let transfers = config.download_transfers(download).unwrap();
        assert_eq!(transfers.len(), 2);
        assert_eq!(transfers[0].target, "aaa");
        assert_eq!(transfers[1].target, "bbb");

        let first = &transfers[0];
        assert_eq!(first.data_dir, PathBuf::from("/tmp/dl"));
        assert!(first.resume);
        assert_eq!(first.seeding.max_seeding_seconds, 600);
        assert_eq!(first.listen.ip.as_deref(), Some("10.0.0.5"));
        assert_eq!(first.listen.port, Some(42071));
        assert_eq!(first.download_limit, 2 * 1_048_576);
        assert_eq!(first.upload_limit, 0);
        assert_eq!(first.resume_cleanup, ResumeCleanup::OnCompletion);
        assert_eq!(first.mode, TransferMode::Download);
    }

    #[test]
    fn test_serve_transfer() {
        let args = parse(&["p2pfile", "serve", "/srv/files/movie.mkv", "--peers", "10.0.0.1:42070"]);
        let config = Config::from_args(&args);
        let Command::Serve(serve) = &args.command else {
            panic!("expected serve");
        };

        let data_dir = serve_data_dir(&serve.paths);
        assert_eq!(data_dir, PathBuf::from("/srv/files"));

        let transfer = config
            .serve_transfer(serve, Path::new("/tmp/movie.torrent"), &data_dir)
            .unwrap();
        assert_eq!(transfer.mode, TransferMode::Serve);
        assert_eq!(transfer.target, "/tmp/movie.torrent");
        assert_eq!(transfer.peers, vec!["10.0.0.1:42070".to_string()]);
        assert!(transfer.seeding_enabled());
    }

    #[test]
    fn test_serve_data_dir_relative() {
        assert_eq!(serve_data_dir(&[PathBuf::from("movie.mkv")]), PathBuf::from("."));
    }

    #[test]
    fn test_validate_port_range() {
        let config = Config::from_args(&parse(&["p2pfile", "--port-range", "9-1", "version"]));
        assert!(config.validate().is_err());

        // An explicit port skips the range
        let config = Config::from_args(&parse(&["p2pfile", "--port-range", "9-1", "--port", "5", "version"]));
        assert!(config.validate().is_ok());
    }
}
