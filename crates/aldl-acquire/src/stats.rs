//! Statistics Aggregator
//!
//! Counters are written one at a time by the acquisition loop. Readers take
//! a snapshot under the same lock so related fields are consistent with
//! each other.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Acquisition counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    /// Requests that got no response
    pub packet_recv_timeout: u64,
    /// Responses from the wrong address
    pub packet_header_fail: u64,
    /// Responses failing the checksum
    pub packet_checksum_fail: u64,
    /// Consecutive failures across all packets
    pub fail_counter: u32,
    /// Valid packets per second over the last throughput window
    pub packets_per_second: f64,
    /// Valid packets received
    pub packets_ok: u64,
    /// Reconnects performed
    pub reconnects: u64,
}

impl Statistics {
    /// Total failed packets of any kind
    pub fn total_failures(&self) -> u64 {
        self.packet_recv_timeout + self.packet_header_fail + self.packet_checksum_fail
    }
}

/// Guarded statistics shared between the loop and observers
#[derive(Debug, Default)]
pub struct StatsAggregator {
    inner: Mutex<Statistics>,
}

impl StatsAggregator {
    /// Create zeroed statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Consistent copy of every counter
    pub fn snapshot(&self) -> Statistics {
        self.inner.lock().clone()
    }

    pub(crate) fn record_timeout(&self) {
        self.inner.lock().packet_recv_timeout += 1;
        metrics::counter!("aldl_packet_timeouts_total").increment(1);
    }

    pub(crate) fn record_header_fail(&self) {
        self.inner.lock().packet_header_fail += 1;
        metrics::counter!("aldl_header_failures_total").increment(1);
    }

    pub(crate) fn record_checksum_fail(&self) {
        self.inner.lock().packet_checksum_fail += 1;
        metrics::counter!("aldl_checksum_failures_total").increment(1);
    }

    /// Extend the failure streak, returning its new length
    pub(crate) fn record_failure(&self) -> u32 {
        let mut stats = self.inner.lock();
        stats.fail_counter = stats.fail_counter.saturating_add(1);
        let streak = stats.fail_counter;
        drop(stats);
        metrics::gauge!("aldl_fail_streak").set(streak as f64);
        streak
    }

    pub(crate) fn record_success(&self) {
        let mut stats = self.inner.lock();
        stats.fail_counter = 0;
        stats.packets_ok += 1;
        drop(stats);
        metrics::counter!("aldl_packets_ok_total").increment(1);
        metrics::gauge!("aldl_fail_streak").set(0.0);
    }

    pub(crate) fn record_reconnect(&self) {
        self.inner.lock().reconnects += 1;
        metrics::counter!("aldl_reconnects_total").increment(1);
    }

    pub(crate) fn set_packets_per_second(&self, rate: f64) {
        self.inner.lock().packets_per_second = rate;
        metrics::gauge!("aldl_packets_per_second").set(rate);
    }
}

/// Valid-packet rate over fixed windows
#[derive(Debug)]
pub(crate) struct Throughput {
    window: Duration,
    started: Instant,
    count: u64,
}

impl Throughput {
    pub(crate) fn new(window: Duration) -> Self {
        Self {
            window,
            started: Instant::now(),
            count: 0,
        }
    }

    pub(crate) fn count(&mut self) {
        self.count += 1;
    }

    /// Publish the rate once the window has elapsed
    pub(crate) fn tick(&mut self, stats: &StatsAggregator) {
        let elapsed = self.started.elapsed();
        if elapsed < self.window {
            return;
        }
        stats.set_packets_per_second(self.count as f64 / elapsed.as_secs_f64());
        self.started = Instant::now();
        self.count = 0;
    }
}
