//! Progress and time-remaining estimates from byte counters

use std::time::{Duration, Instant};

/// Shown until enough data has been sent to measure a rate
pub const ETA_CALCULATING: &str = "calculating...";

/// Highest percentage reported before the provider confirms the upload
pub const MAX_IN_FLIGHT_PERCENT: u8 = 99;

/// Point-in-time view of one file's progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub percent: u8,
    pub eta: String,
}

/// Tracks bytes sent for a single file
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    total_bytes: u64,
    started: Instant,
}

impl ProgressTracker {
    pub fn new(total_bytes: u64) -> Self {
        Self::starting_at(total_bytes, Instant::now())
    }

    pub fn starting_at(total_bytes: u64, started: Instant) -> Self {
        Self {
            total_bytes,
            started,
        }
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Snapshot for `sent` bytes as of now
    pub fn observe(&self, sent: u64) -> ProgressSnapshot {
        self.observe_at(sent, Instant::now())
    }

    /// Snapshot for `sent` bytes as of `now`
    ///
    /// The percentage never exceeds [`MAX_IN_FLIGHT_PERCENT`]: a file is only
    /// at 100 once the upload has succeeded.
    pub fn observe_at(&self, sent: u64, now: Instant) -> ProgressSnapshot {
        let sent = sent.min(self.total_bytes);
        ProgressSnapshot {
            percent: percent_of(sent, self.total_bytes),
            eta: self.eta(sent, now.saturating_duration_since(self.started)),
        }
    }

    fn eta(&self, sent: u64, elapsed: Duration) -> String {
        let secs = elapsed.as_secs_f64();
        if sent == 0 || secs <= 0.0 {
            return ETA_CALCULATING.to_string();
        }
        let rate = sent as f64 / secs;
        let remaining = (self.total_bytes - sent) as f64 / rate;
        format_eta(Duration::from_secs_f64(remaining.max(0.0)))
    }
}

fn percent_of(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (sent as u128 * 100 / total as u128) as u8;
    pct.min(MAX_IN_FLIGHT_PERCENT)
}

/// Render a remaining duration as `42s`, `3m 07s` or `1h 05m`
pub fn format_eta(remaining: Duration) -> String {
    let secs = remaining.as_secs_f64().ceil() as u64;
    match secs {
        0..=59 => format!("{}s", secs),
        60..=3599 => format!("{}m {:02}s", secs / 60, secs % 60),
        _ => format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60),
    }
}
