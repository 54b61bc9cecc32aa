//! Batch computation statistics, logged periodically.

use std::time::Duration;

use tracing::info;

/// Counters accumulated between statistics log lines.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchStats {
    calls: u64,
    min_extracts: Option<usize>,
    max_extracts: usize,
    total_extracts: usize,
    total_time: Duration,
    station_results: usize,
}

impl BatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one computed batch.
    pub fn record(&mut self, extracts: usize, elapsed: Duration, station_results: usize) {
        self.calls += 1;
        self.min_extracts = Some(self.min_extracts.map_or(extracts, |min| min.min(extracts)));
        self.max_extracts = self.max_extracts.max(extracts);
        self.total_extracts += extracts;
        self.total_time += elapsed;
        self.station_results += station_results;
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }

    pub fn average_extracts(&self) -> Option<f64> {
        (self.calls > 0).then(|| self.total_extracts as f64 / self.calls as f64)
    }

    pub fn average_time(&self) -> Option<Duration> {
        u32::try_from(self.calls)
            .ok()
            .filter(|calls| *calls > 0)
            .map(|calls| self.total_time / calls)
    }

    /// Log the counters and start a new period.
    pub fn log_and_reset(&mut self) {
        if self.calls > 0 {
            info!(
                calls = self.calls,
                min_extracts = self.min_extracts.unwrap_or_default(),
                avg_extracts = self.average_extracts().unwrap_or_default(),
                max_extracts = self.max_extracts,
                total_time = ?self.total_time,
                avg_time = ?self.average_time().unwrap_or_default(),
                station_results = self.station_results,
                "batch statistics"
            );
        } else {
            info!("batch statistics: no batches computed");
        }
        *self = Self::default();
    }
}
