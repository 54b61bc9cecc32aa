//! Source of historical data used to restore engine state at startup.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use soh_types::AcquiredStationSohExtract;

use crate::error::SohError;
use crate::window::Span;

/// Read access to previously acquired data.
///
/// Implementations sit in front of whatever stores extracts: a repository,
/// a directory of files, or an in-memory fixture in tests.
pub trait SohHistory: Send + Sync {
    /// Extracts for `station` whose payload ends within `range`.
    fn extracts(&self, station: &str, range: Span) -> Result<Vec<AcquiredStationSohExtract>, SohError>;

    /// Latest known sample end time for each of `channels` that has one.
    fn latest_sample_times(&self, channels: &[String]) -> Result<HashMap<String, DateTime<Utc>>, SohError>;
}
