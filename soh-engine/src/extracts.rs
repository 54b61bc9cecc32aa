//! Rolling per-station cache of received extracts.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use soh_types::{AcquiredStationSohExtract, StationSohDefinition};
use tracing::debug;

#[derive(Debug)]
struct StationExtracts {
    retention: Duration,
    by_end_time: BTreeMap<DateTime<Utc>, Vec<Arc<AcquiredStationSohExtract>>>,
}

/// Keeps each station's extracts for as long as its widest calculation window
/// can still see them, so every batch is computed over the full window rather
/// than only the newest arrivals.
#[derive(Debug)]
pub struct ExtractCache {
    stations: HashMap<String, StationExtracts>,
}

impl ExtractCache {
    /// Create a cache for the given stations. Extracts for any other station
    /// are dropped on insert.
    pub fn new(definitions: &[StationSohDefinition]) -> Self {
        let stations = definitions
            .iter()
            .map(|definition| {
                (
                    definition.station_name.clone(),
                    StationExtracts {
                        retention: definition.cache_duration(),
                        by_end_time: BTreeMap::new(),
                    },
                )
            })
            .collect();
        Self { stations }
    }

    /// Add an extract received at `now`.
    ///
    /// Returns `false` if the extract was dropped: no frames, an unknown
    /// station, already expired, or a duplicate of one already cached.
    pub fn insert(&mut self, extract: AcquiredStationSohExtract, now: DateTime<Utc>) -> bool {
        let (Some(station), Some(end_time)) = (extract.station_name(), extract.payload_end_time()) else {
            debug!("extract has no acquisition metadata, dropping");
            return false;
        };

        let Some(cached) = self.stations.get_mut(station) else {
            debug!(station, "no definition for station, dropping extract");
            return false;
        };

        if end_time <= now - cached.retention {
            return false;
        }

        let bucket = cached.by_end_time.entry(end_time).or_default();
        if bucket.iter().any(|existing| **existing == extract) {
            return false;
        }
        bucket.push(Arc::new(extract));
        true
    }

    /// Drop extracts whose payload ended at or before their station's
    /// retention horizon.
    pub fn evict(&mut self, now: DateTime<Utc>) {
        for cached in self.stations.values_mut() {
            let horizon = now - cached.retention;
            cached.by_end_time = cached.by_end_time.split_off(&horizon);
            cached.by_end_time.remove(&horizon);
        }
    }

    /// Every cached extract.
    pub fn snapshot(&self) -> Vec<Arc<AcquiredStationSohExtract>> {
        self.stations
            .values()
            .flat_map(|cached| cached.by_end_time.values().flatten().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.stations
            .values()
            .map(|cached| cached.by_end_time.values().map(Vec::len).sum::<usize>())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
