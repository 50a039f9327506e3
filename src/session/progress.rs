//! Progress display module
//!
//! One status line per controller tick.

use std::io::{self, Write};
use std::time::Duration;

use crate::engine::TorrentStats;
use crate::session::RunOutcome;

/// Whole-percent progress, 0 while the size is unknown
pub fn progress_percent(completed: u64, total: u64) -> u64 {
    if total == 0 {
        return 0;
    }
    ((completed as u128 * 100) / total as u128) as u64
}

/// Format duration as `1h2m3s`, `2m0s` or `45s`
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{}h{}m{}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Render the status line for a stats snapshot
pub fn status_line(stats: &TorrentStats) -> String {
    let eta = stats.eta.map_or_else(|| "?".to_string(), format_duration);
    format!(
        "Status: {}, Progress: {}%, Peers: {}({}in/{}out), Download: {}K/s, Upload: {}K/s, ETA: {}, Seeding: {}",
        stats.status,
        progress_percent(stats.bytes_completed, stats.bytes_total),
        stats.peers.total,
        stats.peers.incoming,
        stats.peers.outgoing,
        stats.speed_download / 1024,
        stats.speed_upload / 1024,
        eta,
        format_duration(stats.seeded_for),
    )
}

/// Final line printed for a finished transfer
pub fn outcome_line(target: &str, outcome: &RunOutcome, networked: bool) -> String {
    let mut line = format!("{}: {}", target, outcome.reason);
    if outcome.resume_deleted {
        line.push_str(", resume file removed");
    }
    if !networked {
        line.push_str(" (no network engine available, nothing was transferred)");
    }
    line
}

/// Writes status lines to stdout or any other sink
pub struct ProgressDisplay {
    out: Box<dyn Write + Send>,
    /// Quiet mode (no progress output)
    quiet: bool,
}

impl ProgressDisplay {
    pub fn new(quiet: bool) -> Self {
        Self::with_writer(quiet, Box::new(io::stdout()))
    }

    pub fn with_writer(quiet: bool, out: Box<dyn Write + Send>) -> Self {
        Self { out, quiet }
    }

    pub fn update(&mut self, stats: &TorrentStats) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        writeln!(self.out, "{}", status_line(stats))?;
        self.out.flush()
    }
}

impl Default for ProgressDisplay {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{PeerCounts, TorrentStatus};
    use crate::session::StopReason;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_progress_percent() {
        assert_eq!(progress_percent(0, 0), 0);
        assert_eq!(progress_percent(50, 200), 25);
        assert_eq!(progress_percent(199, 200), 99);
        assert_eq!(progress_percent(200, 200), 100);
        assert_eq!(progress_percent(u64::MAX, u64::MAX), 100);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(0)), "0s");
        assert_eq!(format_duration(Duration::from_millis(45_900)), "45s");
        assert_eq!(format_duration(Duration::from_secs(120)), "2m0s");
        assert_eq!(format_duration(Duration::from_secs(3723)), "1h2m3s");
    }

    #[test]
    fn test_status_line() {
        let stats = TorrentStats {
            bytes_completed: 50,
            bytes_total: 200,
            peers: PeerCounts {
                total: 3,
                incoming: 1,
                outgoing: 2,
            },
            speed_download: 2048,
            speed_upload: 1023,
            eta: None,
            status: TorrentStatus::Downloading,
            seeded_for: Duration::ZERO,
        };
        assert_eq!(
            status_line(&stats),
            "Status: Downloading, Progress: 25%, Peers: 3(1in/2out), Download: 2K/s, Upload: 0K/s, ETA: ?, Seeding: 0s"
        );

        let stats = TorrentStats {
            eta: Some(Duration::from_secs(90)),
            ..stats
        };
        assert!(status_line(&stats).contains("ETA: 1m30s"));
    }

    #[test]
    fn test_outcome_line() {
        let outcome = RunOutcome {
            reason: StopReason::EngineStopped,
            resume_deleted: true,
        };
        assert_eq!(
            outcome_line("abc", &outcome, true),
            "abc: stopped by engine, resume file removed"
        );

        let outcome = RunOutcome {
            reason: StopReason::Cancelled,
            resume_deleted: false,
        };
        let line = outcome_line("abc", &outcome, false);
        assert_eq!(
            line,
            "abc: cancelled (no network engine available, nothing was transferred)"
        );
    }

    #[test]
    fn test_update_writes_one_line() {
        let capture = Capture::default();
        let mut display = ProgressDisplay::with_writer(false, Box::new(capture.clone()));
        display.update(&TorrentStats::default()).unwrap();
        display.update(&TorrentStats::default()).unwrap();
        let text = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.starts_with("Status: Downloading, Progress: 0%"));
    }

    #[test]
    fn test_quiet_writes_nothing() {
        let capture = Capture::default();
        let mut display = ProgressDisplay::with_writer(true, Box::new(capture.clone()));
        display.update(&TorrentStats::default()).unwrap();
        assert!(capture.0.lock().unwrap().is_empty());
    }
}
