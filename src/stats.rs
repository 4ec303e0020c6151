//! Run statistics for one processor instance.
//!
//! The only mutable state shared across processing calls. Every
//! `process_transcript` return path records exactly one entry here, including
//! batch runs completing concurrently, so all updates go through one mutex.

use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug, Default)]
pub struct RunStatistics {
    totals: Mutex<Totals>,
}

#[derive(Debug, Default, Clone)]
struct Totals {
    processed: u64,
    successful: u64,
    failed: u64,
    cumulative_processing_time: Duration,
}

/// Read-only view returned by `get_statistics`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsSnapshot {
    pub total_processed: u64,
    pub successful: u64,
    pub failed: u64,
    /// Percentage of successful runs, one-decimal precision. `0.0` when
    /// nothing has been processed yet.
    pub success_rate: f64,
    /// Mean wall-clock seconds per run, same zero-guard.
    pub average_processing_time: f64,
}

impl RunStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one finished `process_transcript` call.
    pub fn record(&self, success: bool, elapsed: Duration) {
        let mut totals = self.totals.lock();
        totals.processed += 1;
        if success {
            totals.successful += 1;
        } else {
            totals.failed += 1;
        }
        totals.cumulative_processing_time += elapsed;
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        let totals = self.totals.lock().clone();

        let (success_rate, average_processing_time) = if totals.processed == 0 {
            (0.0, 0.0)
        } else {
            let rate = totals.successful as f64 / totals.processed as f64 * 100.0;
            let avg =
                totals.cumulative_processing_time.as_secs_f64() / totals.processed as f64;
            ((rate * 10.0).round() / 10.0, avg)
        };

        StatisticsSnapshot {
            total_processed: totals.processed,
            successful: totals.successful,
            failed: totals.failed,
            success_rate,
            average_processing_time,
        }
    }
}
