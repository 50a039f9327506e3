//! Seeding policy
//!
//! Pure decision over a stats snapshot and tracker observations. Nothing
//! here talks to the engine.

use std::fmt;
use std::time::SystemTime;

use tracing::debug;

use crate::engine::{TorrentStats, TorrentStatus, TrackerObservation, TrackerStatus};
use crate::session::config::SeedingPolicy;

/// Why a transfer ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// External cancellation (Ctrl-C or caller)
    Cancelled,
    /// Seeded longer than the configured cap
    SeedingTimeLimit,
    /// Every tracker reports zero leechers
    NoLeechers,
    /// The engine stopped on its own, e.g. after a download-only transfer
    EngineStopped,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::Cancelled => "cancelled",
            StopReason::SeedingTimeLimit => "seeding time limit reached",
            StopReason::NoLeechers => "no leechers left",
            StopReason::EngineStopped => "stopped by engine",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedingDecision {
    Continue,
    Stop(StopReason),
}

/// Decide whether seeding should go on
pub fn evaluate(
    stats: &TorrentStats,
    trackers: &[TrackerObservation],
    policy: &SeedingPolicy,
    now: SystemTime,
) -> SeedingDecision {
    if stats.status != TorrentStatus::Seeding {
        return SeedingDecision::Continue;
    }

    if policy.max_seeding_seconds > 0 && stats.seeded_for.as_secs_f64() > policy.max_seeding_seconds as f64 {
        return SeedingDecision::Stop(StopReason::SeedingTimeLimit);
    }

    if policy.stop_when_no_leechers && swarm_is_drained(trackers, policy, now) {
        return SeedingDecision::Stop(StopReason::NoLeechers);
    }

    SeedingDecision::Continue
}

/// True only when every tracker is fresh and reports no leechers
fn swarm_is_drained(trackers: &[TrackerObservation], policy: &SeedingPolicy, now: SystemTime) -> bool {
    if trackers.is_empty() {
        return false;
    }

    trackers.iter().all(|tracker| {
        debug!(
            "tracker: {} status:{:?} leechers:{} seeders:{} last announce:{:?}",
            tracker.url, tracker.status, tracker.leechers, tracker.seeders, tracker.last_announce
        );
        is_fresh(tracker, policy, now) && tracker.leechers == 0
    })
}

fn is_fresh(tracker: &TrackerObservation, policy: &SeedingPolicy, now: SystemTime) -> bool {
    if tracker.status != TrackerStatus::Working {
        return false;
    }
    match tracker.last_announce {
        // An announce stamped in the future counts as fresh
        Some(at) => now.duration_since(at).map_or(true, |age| age <= policy.tracker_stale_after),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn seeding_for(secs: u64) -> TorrentStats {
        TorrentStats {
            status: TorrentStatus::Seeding,
            seeded_for: Duration::from_secs(secs),
            ..Default::default()
        }
    }

    fn tracker(leechers: u32, now: SystemTime) -> TrackerObservation {
        TrackerObservation {
            url: "http://tracker.example/announce".to_string(),
            status: TrackerStatus::Working,
            leechers,
            seeders: 1,
            last_announce: Some(now - Duration::from_secs(60)),
        }
    }

    fn cap(secs: u64) -> SeedingPolicy {
        SeedingPolicy {
            max_seeding_seconds: secs,
            ..Default::default()
        }
    }

    fn auto_stop() -> SeedingPolicy {
        SeedingPolicy {
            stop_when_no_leechers: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_duration_cap_is_strict() {
        let now = SystemTime::now();
        assert_eq!(evaluate(&seeding_for(599), &[], &cap(600), now), SeedingDecision::Continue);
        assert_eq!(evaluate(&seeding_for(600), &[], &cap(600), now), SeedingDecision::Continue);
        assert_eq!(
            evaluate(&seeding_for(601), &[], &cap(600), now),
            SeedingDecision::Stop(StopReason::SeedingTimeLimit)
        );
    }

    #[test]
    fn test_zero_cap_disables() {
        let now = SystemTime::now();
        assert_eq!(evaluate(&seeding_for(100_000), &[], &cap(0), now), SeedingDecision::Continue);
    }

    #[test]
    fn test_only_applies_while_seeding() {
        let now = SystemTime::now();
        let stats = TorrentStats {
            status: TorrentStatus::Downloading,
            seeded_for: Duration::from_secs(10_000),
            ..Default::default()
        };
        assert_eq!(evaluate(&stats, &[tracker(0, now)], &auto_stop(), now), SeedingDecision::Continue);
        assert_eq!(evaluate(&stats, &[], &cap(1), now), SeedingDecision::Continue);
    }

    #[test]
    fn test_all_trackers_empty_stops() {
        let now = SystemTime::now();
        let trackers = [tracker(0, now), tracker(0, now)];
        assert_eq!(
            evaluate(&seeding_for(1), &trackers, &auto_stop(), now),
            SeedingDecision::Stop(StopReason::NoLeechers)
        );
    }

    #[test]
    fn test_any_leecher_continues() {
        let now = SystemTime::now();
        let trackers = [tracker(0, now), tracker(3, now)];
        assert_eq!(evaluate(&seeding_for(1), &trackers, &auto_stop(), now), SeedingDecision::Continue);
    }

    #[test]
    fn test_no_trackers_continues() {
        let now = SystemTime::now();
        assert_eq!(evaluate(&seeding_for(1), &[], &auto_stop(), now), SeedingDecision::Continue);
    }

    #[test]
    fn test_stale_or_failed_tracker_continues() {
        let now = SystemTime::now();

        let mut stale = tracker(0, now);
        stale.last_announce = Some(now - Duration::from_secs(31 * 60));
        assert_eq!(evaluate(&seeding_for(1), &[stale], &auto_stop(), now), SeedingDecision::Continue);

        let mut failed = tracker(0, now);
        failed.status = TrackerStatus::NotWorking;
        assert_eq!(evaluate(&seeding_for(1), &[failed], &auto_stop(), now), SeedingDecision::Continue);

        let mut never = tracker(0, now);
        never.last_announce = None;
        assert_eq!(
            evaluate(&seeding_for(1), &[tracker(0, now), never], &auto_stop(), now),
            SeedingDecision::Continue
        );
    }

    #[test]
    fn test_either_rule_suffices() {
        let now = SystemTime::now();
        let policy = SeedingPolicy {
            max_seeding_seconds: 600,
            stop_when_no_leechers: true,
            ..Default::default()
        };
        assert_eq!(
            evaluate(&seeding_for(601), &[tracker(5, now)], &policy, now),
            SeedingDecision::Stop(StopReason::SeedingTimeLimit)
        );
        assert_eq!(
            evaluate(&seeding_for(10), &[tracker(0, now)], &policy, now),
            SeedingDecision::Stop(StopReason::NoLeechers)
        );
    }
}
