//! p2pfile - Main entry point
//!
//! Peer-to-peer file distribution with resumable transfers and
//! policy-driven seeding.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use p2pfile::cli::{serve_data_dir, CreateArgs, DownloadArgs, ServeArgs};
use p2pfile::engine::Engine;
use p2pfile::session::outcome_line;
use p2pfile::{CliArgs, Command, Config, MemoryEngine, ProgressDisplay, SessionController, TorrentBuilder};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Set up panic handler for unexpected errors
fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|panic_info| {
        let backtrace = std::backtrace::Backtrace::capture();
        match panic_info.location() {
            Some(location) => error!(
                "PANIC occurred at {}:{}:{}",
                location.file(),
                location.line(),
                location.column()
            ),
            None => error!("PANIC occurred at unknown location"),
        }
        let payload = panic_info.payload();
        if let Some(s) = payload.downcast_ref::<&str>() {
            error!("Panic message: {}", s);
        } else if let Some(s) = payload.downcast_ref::<String>() {
            error!("Panic message: {}", s);
        } else {
            error!("Panic message: unknown");
        }
        error!("Backtrace:\n{:?}", backtrace);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_panic_handler();

    let args = CliArgs::parse_args();
    init_logging(&args);
    debug!("CLI arguments: {:?}", args);

    let config = Config::from_args(&args);
    config.validate().context("Invalid configuration")?;

    match &args.command {
        Command::Version => {
            println!("p2pfile {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Command::Create(create) => run_create(create),
        Command::Download(download) => run_download(&config, download).await,
        Command::Serve(serve) => run_serve(&config, serve).await,
    }
}

/// Initialize logging based on verbosity settings
fn init_logging(args: &CliArgs) {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(args.log_level())
        .with_target(false)
        .with_thread_ids(false);

    if args.global.debug {
        subscriber.with_file(true).with_line_number(true).init();
    } else {
        subscriber.with_file(false).with_line_number(false).compact().init();
    }
    debug!("Logging initialized");
}

/// Cancellation token fired by Ctrl-C
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl-C, stopping");
                trigger.cancel();
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });
    token
}

fn engine() -> MemoryEngine {
    warn!("No network engine is built in, transfers run against the in-memory engine and move no data");
    MemoryEngine::new()
}

fn run_create(args: &CreateArgs) -> Result<()> {
    let mut builder = TorrentBuilder::new(args.paths.clone())
        .private(args.private)
        .trackers(args.trackers.clone())
        .webseeds(args.webseeds.clone());
    if let Some(root) = &args.root {
        builder = builder.root(root.clone());
    }
    if let Some(name) = &args.name {
        builder = builder.name(name.clone());
    }
    if let Some(kib) = args.piece_length {
        builder = builder.piece_length_kib(kib);
    }
    if let Some(comment) = &args.comment {
        builder = builder.comment(comment.clone());
    }

    let created = builder
        .write_to(&args.out)
        .with_context(|| format!("Failed to create {}", args.out.display()))?;
    info!(
        "Created {} ({} bytes in {} byte pieces)",
        created.path.display(),
        created.total_size,
        created.piece_length
    );
    println!("{}", created.magnet);
    Ok(())
}

async fn run_download(config: &Config, args: &DownloadArgs) -> Result<()> {
    let transfers = config.download_transfers(args)?;
    let cancel = shutdown_token();
    let engine = engine();

    for transfer in transfers {
        if cancel.is_cancelled() {
            info!("Cancelled, skipping remaining targets");
            break;
        }

        let target = transfer.target.clone();
        let mut controller = SessionController::new(transfer, engine.clone())
            .with_context(|| format!("Invalid settings for {}", target))?
            .with_progress(ProgressDisplay::new(config.quiet));

        let outcome = controller
            .run(cancel.clone())
            .await
            .with_context(|| format!("Transfer of {} failed", target))?;
        println!("{}", outcome_line(&target, &outcome, engine.is_networked()));
    }

    Ok(())
}

async fn run_serve(config: &Config, args: &ServeArgs) -> Result<()> {
    let mut builder = TorrentBuilder::new(args.paths.clone()).trackers(args.trackers.clone());
    if let Some(name) = &args.name {
        builder = builder.name(name.clone());
    }
    let out = args.torrent_out.clone().unwrap_or_else(|| default_torrent_path(args));
    let created = builder
        .write_to(&out)
        .with_context(|| format!("Failed to create {}", out.display()))?;
    info!("Serving {} ({})", created.name, created.info_hash);

    let data_dir = serve_data_dir(&args.paths);
    let transfer = config.serve_transfer(args, &created.path, &data_dir)?;
    let engine = engine();
    let networked = engine.is_networked();
    let target = transfer.target.clone();
    let mut controller = SessionController::new(transfer, engine)?.with_progress(ProgressDisplay::new(config.quiet));

    controller.open().await.context("Failed to start serving")?;
    if let Some(magnet) = controller.magnet(&args.trackers) {
        println!("{}", magnet);
    }

    let outcome = controller.run(shutdown_token()).await.context("Serving failed")?;
    println!("{}", outcome_line(&target, &outcome, networked));
    Ok(())
}

fn default_torrent_path(args: &ServeArgs) -> PathBuf {
    let stem = args
        .name
        .clone()
        .or_else(|| {
            args.paths
                .first()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "p2pfile".to_string());
    Path::new(&format!("{}.torrent", stem)).to_path_buf()
}
