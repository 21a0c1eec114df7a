use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fairsched_core::BackpressureConfig;

/// Sliding-window dispatch rate limiter.
///
/// Keeps the timestamps of recent dispatches and, when the measured rate
/// exceeds `throughput_factor` dispatches per second, returns a delay
/// proportional to the overshoot. This is not a token bucket: one large
/// burst yields one long delay, after which the window drains naturally.
#[derive(Debug, Clone)]
pub struct BackpressureController {
    window_seconds: u64,
    throughput_factor: f64,
    window: VecDeque<DateTime<Utc>>,
}

impl BackpressureController {
    pub fn new(config: &BackpressureConfig) -> Self {
        Self {
            window_seconds: config.window_seconds,
            throughput_factor: config.throughput_factor,
            window: VecDeque::new(),
        }
    }

    /// Record a dispatch at `at`. Timestamps are expected in non-decreasing order.
    pub fn record(&mut self, at: DateTime<Utc>) {
        self.window.push_back(at);
    }

    /// Drop every timestamp older than `now - window`.
    ///
    /// A window reaching past the representable time range keeps everything.
    pub fn prune(&mut self, now: DateTime<Utc>) {
        let Some(cutoff) = i64::try_from(self.window_seconds)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .and_then(|window| now.checked_sub_signed(window))
        else {
            return;
        };
        while let Some(front) = self.window.front() {
            if *front < cutoff {
                self.window.pop_front();
            } else {
                break;
            }
        }
    }

    /// Dispatches per second over the current window contents.
    pub fn rate(&self) -> f64 {
        if self.window_seconds == 0 {
            return 0.0;
        }
        self.window.len() as f64 / self.window_seconds as f64
    }

    /// Prune, then compute how long to wait before the next dispatch.
    pub fn delay(&mut self, now: DateTime<Utc>) -> Duration {
        self.prune(now);

        let rate = self.rate();
        if rate <= self.throughput_factor {
            return Duration::ZERO;
        }

        let window_ms = self.window_seconds as f64 * 1000.0;
        let excess = rate / self.throughput_factor - 1.0;
        let delay_ms = (excess * window_ms).min(window_ms).round();
        Duration::from_millis(delay_ms as u64)
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }
}
