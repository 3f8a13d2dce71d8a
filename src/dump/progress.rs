//! Progress and throughput estimation for a running dump.
//!
//! Workers announce how many messages they will send (`dump.forecast`); the
//! estimator compares that with what has actually been delivered and derives
//! a remaining count, an ETA and a percentage from it.

use std::time::Duration;
use tokio::time::Instant;

/// Lowest throughput ever reported, keeps ETA math away from zero.
pub const MIN_REPORTED_THROUGHPUT: f64 = 0.01;

/// Minimum spacing between two throughput samples.
const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

const ONE_MINUTE_IN_SECONDS: u64 = 60;
const ONE_HOUR_IN_SECONDS: u64 = ONE_MINUTE_IN_SECONDS * 60;

#[derive(Debug, Clone)]
pub struct ProgressEstimator {
    forecasted: u64,
    received: u64,
    target_rate: u32,
    started_at: Instant,
    last_sample_at: Instant,
    last_sample_received: u64,
    last_rate: f64,
}

/// Point-in-time view of a dump's progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressReport {
    pub forecasted: u64,
    pub received: u64,
    pub remaining: u64,
    pub percent: u8,
    pub throughput: f64,
    pub eta_seconds: f64,
}

impl ProgressReport {
    pub fn formatted_eta(&self) -> String {
        format_hms(self.eta_seconds)
    }
}

impl ProgressEstimator {
    /// `target_rate` is the requested messages per second, clamped to at least 1.
    pub fn new(target_rate: u32) -> Self {
        let now = Instant::now();
        Self {
            forecasted: 0,
            received: 0,
            target_rate: target_rate.max(1),
            started_at: now,
            last_sample_at: now,
            last_sample_received: 0,
            last_rate: 0.0,
        }
    }

    /// Add a worker's forecast. Negative forecasts count as zero.
    pub fn record_forecast(&mut self, n_messages: i64) {
        let n = u64::try_from(n_messages).unwrap_or(0);
        self.forecasted = self.forecasted.saturating_add(n);
    }

    /// Count one translated table, column or record message.
    pub fn record_delivery(&mut self) {
        self.received += 1;
    }

    pub fn forecasted(&self) -> u64 {
        self.forecasted
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }

    /// Messages per second, resampled at most once per second.
    pub fn throughput(&mut self) -> f64 {
        self.throughput_at(Instant::now())
    }

    fn throughput_at(&mut self, now: Instant) -> f64 {
        if now.saturating_duration_since(self.last_sample_at) >= SAMPLE_INTERVAL {
            let n_messages = self.received.saturating_sub(self.last_sample_received);
            let elapsed = now.saturating_duration_since(self.started_at).as_secs_f64();
            self.last_rate = if elapsed > 0.0 {
                n_messages as f64 / elapsed
            } else {
                0.0
            };
            self.last_sample_at = now;
            self.last_sample_received = self.received;
        }
        self.last_rate.max(MIN_REPORTED_THROUGHPUT)
    }

    pub fn remaining(&self) -> u64 {
        self.forecasted.saturating_sub(self.received)
    }

    /// Seconds left, never assuming a rate above the requested one.
    pub fn eta_seconds(&mut self) -> f64 {
        let throughput = self.throughput();
        self.eta_at(throughput)
    }

    fn eta_at(&self, throughput: f64) -> f64 {
        self.remaining() as f64 / throughput.min(f64::from(self.target_rate))
    }

    /// Whole percent done, 0 without a forecast and never above 100.
    pub fn percent_complete(&self) -> u8 {
        if self.forecasted == 0 {
            return 0;
        }
        let percent = u128::from(self.received) * 100 / u128::from(self.forecasted);
        percent.min(100) as u8
    }

    pub fn formatted_remaining_time(&mut self) -> String {
        format_hms(self.eta_seconds())
    }

    /// Snapshot built from a single throughput sample.
    pub fn report(&mut self) -> ProgressReport {
        let throughput = self.throughput();
        ProgressReport {
            forecasted: self.forecasted,
            received: self.received,
            remaining: self.remaining(),
            percent: self.percent_complete(),
            throughput,
            eta_seconds: self.eta_at(throughput),
        }
    }
}

/// Render seconds as `HH:MM:SS`, truncating fractions.
pub fn format_hms(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    let hours = total / ONE_HOUR_IN_SECONDS;
    let minutes = (total % ONE_HOUR_IN_SECONDS) / ONE_MINUTE_IN_SECONDS;
    let secs = total % ONE_MINUTE_IN_SECONDS;
    format!("{:02}:{:02}:{:02}", hours, minutes, secs)
}
