//! Fixed-interval cycle scheduler for the telemetry poller.
//!
//! Cycles never overlap: the poller awaits [`CycleScheduler::wait_for_cycle`],
//! runs the cycle to completion, then calls
//! [`CycleScheduler::record_cycle_end`]. A cycle that runs past its
//! interval makes the next one fire immediately, and any further missed
//! deadlines are skipped rather than replayed.
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         biased;
//!         _ = stop.changed() => break,
//!         info = scheduler.wait_for_cycle() => {
//!             let ok = poll(info.cycle).await.is_ok();
//!             scheduler.record_cycle_end(ok);
//!         }
//!     }
//! }
//! ```

use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

/// Information about a cycle that is due, returned by
/// [`CycleScheduler::wait_for_cycle`].
#[derive(Debug, Clone)]
pub struct CycleInfo {
    /// Monotonically increasing cycle number (starts at 1).
    pub cycle: u64,
    /// `true` if this cycle fired noticeably late.
    pub overrun: bool,
    /// How many whole intervals were skipped because of the overrun.
    pub cycles_skipped: u64,
}

/// Runtime metrics for the cycle scheduler.
#[derive(Debug, Clone, Default)]
pub struct CycleMetrics {
    /// Cycles started.
    pub total_cycles: u64,
    /// Cycles reported as failed via `record_cycle_end(false)`.
    pub failed_cycles: u64,
    /// Cycles that fired late.
    pub total_overruns: u64,
    /// Intervals skipped after overruns.
    pub total_skipped: u64,
    /// Exponential moving average of cycle time (α = 0.1).
    pub avg_cycle_time: Duration,
    /// Longest cycle observed.
    pub max_cycle_time: Duration,
    /// Last cycle's time as a fraction of the interval. >1.0 means overrun.
    pub budget_utilization: f64,
}

/// Paces polling cycles at a fixed interval.
pub struct CycleScheduler {
    interval: Duration,
    cycle_count: u64,
    next_cycle: Instant,
    /// Set by `wait_for_cycle`, consumed by `record_cycle_end`.
    cycle_start: Option<Instant>,
    metrics: CycleMetrics,
}

impl CycleScheduler {
    /// Shortest interval accepted.
    pub const MIN_INTERVAL: Duration = Duration::from_millis(10);

    /// Fraction of the interval a cycle may use before a warning is logged.
    pub const BUDGET_WARN_THRESHOLD: f64 = 0.80;

    /// Creates a scheduler whose first cycle is due immediately.
    pub fn new(interval: Duration) -> Self {
        let interval = if interval < Self::MIN_INTERVAL {
            warn!(
                requested_ms = interval.as_secs_f64() * 1000.0,
                "poll interval below minimum; clamping to 10ms"
            );
            Self::MIN_INTERVAL
        } else {
            interval
        };
        debug!(interval_ms = interval.as_millis() as u64, "cycle scheduler created");

        Self {
            interval,
            cycle_count: 0,
            next_cycle: Instant::now(),
            cycle_start: None,
            metrics: CycleMetrics::default(),
        }
    }

    /// Waits until the next cycle is due.
    pub async fn wait_for_cycle(&mut self) -> CycleInfo {
        let due = self.next_cycle;
        time::sleep_until(due).await;

        let now = Instant::now();
        self.cycle_count += 1;
        self.cycle_start = Some(now);

        let late_by = now.saturating_duration_since(due);
        let overrun = late_by > self.interval / 10;
        let mut cycles_skipped = 0;
        if overrun {
            cycles_skipped = (late_by.as_nanos() / self.interval.as_nanos()) as u64;
            if cycles_skipped > 0 {
                warn!(
                    cycle = self.cycle_count,
                    skipped = cycles_skipped,
                    late_ms = late_by.as_secs_f64() * 1000.0,
                    "poll cycle overrun; skipping ahead"
                );
            }
            self.metrics.total_overruns += 1;
        }
        self.next_cycle = now + self.interval;

        self.metrics.total_skipped += cycles_skipped;
        self.metrics.total_cycles += 1;

        trace!(cycle = self.cycle_count, overrun, "cycle due");

        CycleInfo { cycle: self.cycle_count, overrun, cycles_skipped }
    }

    /// Records that the current cycle finished, successfully or not.
    ///
    /// Without a preceding `wait_for_cycle` this does nothing.
    pub fn record_cycle_end(&mut self, ok: bool) {
        let Some(start) = self.cycle_start.take() else {
            return;
        };
        let elapsed = start.elapsed();

        if !ok {
            self.metrics.failed_cycles += 1;
        }

        let utilization = elapsed.as_secs_f64() / self.interval.as_secs_f64();
        self.metrics.budget_utilization = utilization;
        if utilization >= Self::BUDGET_WARN_THRESHOLD {
            warn!(
                cycle = self.cycle_count,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                interval_ms = self.interval.as_secs_f64() * 1000.0,
                utilization_pct = format!("{:.1}", utilization * 100.0),
                "poll cycle approaching its interval"
            );
        }

        if elapsed > self.metrics.max_cycle_time {
            self.metrics.max_cycle_time = elapsed;
        }
        let alpha = 0.1;
        let prev = self.metrics.avg_cycle_time.as_secs_f64();
        self.metrics.avg_cycle_time =
            Duration::from_secs_f64(prev * (1.0 - alpha) + elapsed.as_secs_f64() * alpha);
    }

    /// Cycles started so far.
    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn metrics(&self) -> &CycleMetrics {
        &self.metrics
    }
}
