//! The per-batch orchestrator.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use soh_types::{AcquiredStationSohExtract, StationSoh, StationSohDefinition};
use tracing::{debug, error, info, warn};

use crate::aggregate::station_aggregates;
use crate::batch::{BatchData, ReceptionTracker};
use crate::cache::TimelinessCache;
use crate::channel::channel_sohs;
use crate::error::{CalculationError, SohError};
use crate::history::SohHistory;
use crate::monitors::StationContext;
use crate::station::{station_monitor_values, station_status};
use crate::window::Span;

/// Computes `StationSoh` records for every configured station, one batch at
/// a time.
///
/// Stations are computed in parallel on a dedicated worker pool. The
/// timeliness cache is the only state carried between batches.
///
/// # Example
///
/// ```rust,no_run
/// use soh_engine::SohEngine;
///
/// let engine = SohEngine::builder()
///     .definitions(Vec::new())
///     .worker_threads(4)
///     .build()
///     .unwrap();
///
/// let results = engine.process_batch(std::iter::empty(), chrono::Utc::now());
/// assert!(results.is_empty());
/// ```
#[derive(Debug)]
pub struct SohEngine {
    definitions: Vec<StationSohDefinition>,
    cache: Arc<TimelinessCache>,
    pool: rayon::ThreadPool,
    receptions: ReceptionTracker,
}

impl SohEngine {
    /// Create a builder for configuring the engine.
    pub fn builder() -> SohEngineBuilder {
        SohEngineBuilder::new()
    }

    pub fn definitions(&self) -> &[StationSohDefinition] {
        &self.definitions
    }

    pub fn cache(&self) -> &Arc<TimelinessCache> {
        &self.cache
    }

    /// Compute one batch.
    ///
    /// Stations whose computation fails or panics are logged and left out;
    /// the rest of the batch is unaffected. Results follow definition order.
    pub fn process_batch<'a, I>(&self, extracts: I, now: DateTime<Utc>) -> Vec<StationSoh>
    where
        I: IntoIterator<Item = &'a AcquiredStationSohExtract>,
    {
        if self.definitions.is_empty() {
            warn!("no station definitions configured, batch produces no results");
            return Vec::new();
        }

        let batch = BatchData::build(extracts, &self.cache);
        let earliest = self.receptions.earliest_new_receptions(&batch);

        self.pool.install(|| {
            self.definitions
                .par_iter()
                .filter_map(|definition| {
                    let station = definition.station_name.as_str();
                    let started = Instant::now();
                    let outcome =
                        catch_panic(|| compute_station(definition, &batch, &self.cache, now));
                    match outcome {
                        Err(message) => {
                            error!(station, panic = %message, "station computation panicked, omitting station");
                            None
                        }
                        Ok(Ok(Some(soh))) => {
                            debug!(
                                station,
                                status = %soh.status,
                                earliest_reception = ?earliest.get(station),
                                elapsed = ?started.elapsed(),
                                "computed station state of health"
                            );
                            Some(soh)
                        }
                        Ok(Ok(None)) => {
                            debug!(station, "no rollup monitor values for station, skipping");
                            None
                        }
                        Ok(Err(err)) => {
                            warn!(station, error = %err, "station computation failed, omitting station");
                            None
                        }
                    }
                })
                .collect()
        })
    }

    /// Restore state from history before the first batch.
    ///
    /// Loads every station's extracts over its cache duration, advances the
    /// timeliness cache from them, then seeds the cache for configured
    /// channels the extracts did not cover. Returns the loaded extracts so the
    /// caller can prime its extract cache.
    pub fn restore(
        &self,
        history: &dyn SohHistory,
        now: DateTime<Utc>,
    ) -> Result<Vec<AcquiredStationSohExtract>, SohError> {
        let mut extracts = Vec::new();
        for definition in &self.definitions {
            let range = Span::new(now - definition.cache_duration(), now);
            let found = history.extracts(&definition.station_name, range)?;
            debug!(station = %definition.station_name, extracts = found.len(), "restored extracts");
            extracts.extend(found);
        }

        self.cache.seed(
            extracts
                .iter()
                .flat_map(|extract| extract.waveforms())
                .map(|(summary, _)| (summary.channel_name.as_str(), summary.end_time)),
        );

        let uncovered: Vec<String> = self
            .definitions
            .iter()
            .flat_map(|definition| &definition.channel_definitions)
            .map(|channel| channel.channel_name.clone())
            .filter(|channel| !self.cache.contains(channel))
            .collect();

        if !uncovered.is_empty() {
            let latest = history.latest_sample_times(&uncovered)?;
            self.cache.seed(latest);
        }

        info!(
            extracts = extracts.len(),
            channels = self.cache.len(),
            queried = uncovered.len(),
            "restored state from history"
        );
        Ok(extracts)
    }
}

/// Run `f`, turning a panic into its message.
fn catch_panic<T>(f: impl FnOnce() -> T) -> Result<T, String> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        payload
            .downcast_ref::<&str>()
            .map(|message| message.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string())
    })
}

/// Compute one station: the four monitor families, then channel rollup, then
/// station rollup alongside the station aggregates.
///
/// Returns `None` when none of the station's rollup monitor types produced a
/// value.
pub fn compute_station(
    definition: &StationSohDefinition,
    batch: &BatchData,
    cache: &TimelinessCache,
    now: DateTime<Utc>,
) -> Result<Option<StationSoh>, CalculationError> {
    let ctx = StationContext::new(definition, batch, cache, now);

    let ((timeliness, lag), (missing, environment)) = rayon::join(
        || rayon::join(|| ctx.timeliness_by_channel(), || ctx.lag_by_channel()),
        || rayon::join(|| ctx.missing_by_channel(), || ctx.environment_by_channel()),
    );
    let channel_sohs = channel_sohs(definition, [timeliness?, lag?, missing?, environment?]);

    let (aggregates, monitor_values) = rayon::join(
        || station_aggregates(&ctx, &channel_sohs),
        || station_monitor_values(definition, &channel_sohs),
    );
    let aggregates = aggregates?;

    let Some(status) = station_status(definition, &monitor_values) else {
        return Ok(None);
    };

    Ok(Some(StationSoh {
        station_name: definition.station_name.clone(),
        time: now,
        status,
        monitor_values,
        channel_sohs,
        aggregates,
    }))
}

/// Builder for configuring a [`SohEngine`].
#[derive(Debug, Default)]
pub struct SohEngineBuilder {
    definitions: Vec<StationSohDefinition>,
    cache: Option<Arc<TimelinessCache>>,
    worker_threads: Option<usize>,
}

impl SohEngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Station definitions to compute each batch.
    pub fn definitions(mut self, definitions: Vec<StationSohDefinition>) -> Self {
        self.definitions = definitions;
        self
    }

    /// Share an existing timeliness cache. A fresh one is created otherwise.
    pub fn cache(mut self, cache: Arc<TimelinessCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Size of the worker pool. Zero or unset uses one thread per CPU.
    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = Some(threads);
        self
    }

    /// Validate the definitions and build the engine.
    pub fn build(self) -> Result<SohEngine, SohError> {
        for definition in &self.definitions {
            definition.validate()?;
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.worker_threads.unwrap_or(0))
            .thread_name(|i| format!("soh-worker-{i}"))
            .build()
            .map_err(|e| SohError::WorkerPool(e.to_string()))?;

        Ok(SohEngine {
            definitions: self.definitions,
            cache: self.cache.unwrap_or_default(),
            pool,
            receptions: ReceptionTracker::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet, HashMap};

    use chrono::{Duration, TimeZone};
    use parking_lot::Mutex;
    use soh_types::{
        AcquisitionMetadata, ChannelSohDefinition, SohMonitorType, SohStatus, StationAggregate,
        StationAggregateType, ThresholdDefinition, TimeWindowDefinition, WaveformSummary,
    };

    use super::*;

    fn t(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_600_000_000_000 + millis).unwrap()
    }

    fn ms(millis: i64) -> Duration {
        Duration::milliseconds(millis)
    }

    fn channel(name: &str) -> ChannelSohDefinition {
        ChannelSohDefinition {
            channel_name: name.to_string(),
            monitor_types_for_rollup: [
                SohMonitorType::Lag,
                SohMonitorType::Missing,
                SohMonitorType::Timeliness,
            ]
            .into(),
            thresholds_by_monitor_type: [
                (SohMonitorType::Lag, ThresholdDefinition::duration(ms(1_000), ms(5_000))),
                (SohMonitorType::Missing, ThresholdDefinition::percent(10.0, 30.0)),
                (SohMonitorType::Timeliness, ThresholdDefinition::duration(ms(2_000), ms(10_000))),
            ]
            .into(),
            nominal_sample_rate_hz: 0.0,
        }
    }

    fn station(name: &str) -> StationSohDefinition {
        let channels: BTreeSet<String> = [format!("{name}.BHZ"), format!("{name}.BHN")].into();
        let window = TimeWindowDefinition::new(ms(10_000), ms(0));
        StationSohDefinition {
            station_name: name.to_string(),
            monitor_types_for_rollup: [
                SohMonitorType::Lag,
                SohMonitorType::Missing,
                SohMonitorType::Timeliness,
            ]
            .into(),
            channels_by_monitor_type: [
                (SohMonitorType::Lag, channels.clone()),
                (SohMonitorType::Missing, channels.clone()),
                (SohMonitorType::Timeliness, channels),
            ]
            .into(),
            channel_definitions: vec![channel(&format!("{name}.BHZ")), channel(&format!("{name}.BHN"))],
            time_windows_by_monitor_type: [
                (SohMonitorType::Lag, window),
                (SohMonitorType::Missing, window),
                (SohMonitorType::Timeliness, window),
            ]
            .into(),
        }
    }

    fn extract(station: &str, channels: &[&str], start: i64, end: i64, received: i64) -> AcquiredStationSohExtract {
        AcquiredStationSohExtract {
            acquisition_metadata: vec![AcquisitionMetadata {
                station_name: station.to_string(),
                reception_time: t(received),
                payload_start_time: t(start),
                payload_end_time: t(end),
                waveform_summaries: channels
                    .iter()
                    .map(|c| (c.to_string(), WaveformSummary::new(*c, t(start), t(end))))
                    .collect(),
            }],
            environment_issues: Vec::new(),
        }
    }

    fn engine(definitions: Vec<StationSohDefinition>) -> SohEngine {
        SohEngine::builder()
            .definitions(definitions)
            .worker_threads(2)
            .build()
            .unwrap()
    }

    #[test]
    fn healthy_station_is_good() {
        let engine = engine(vec![station("STA")]);
        let extracts = [extract("STA", &["STA.BHZ", "STA.BHN"], 0, 10_000, 10_100)];

        let results = engine.process_batch(&extracts, t(10_500));

        assert_eq!(results.len(), 1);
        let soh = &results[0];
        assert_eq!(soh.station_name, "STA");
        assert_eq!(soh.time, t(10_500));
        assert_eq!(soh.status, SohStatus::Good);
        assert_eq!(soh.channel_sohs.len(), 2);
        assert_eq!(soh.monitor_values.len(), 3);
        assert_eq!(soh.aggregates.len(), 4);
        assert_eq!(
            soh.aggregate(StationAggregateType::Lag),
            Some(&StationAggregate::Lag(Some(ms(100))))
        );
    }

    #[test]
    fn silent_channel_drags_station_to_bad() {
        let engine = engine(vec![station("STA")]);
        let extracts = [extract("STA", &["STA.BHZ"], 0, 10_000, 10_100)];

        let results = engine.process_batch(&extracts, t(10_500));

        let soh = &results[0];
        assert_eq!(soh.status, SohStatus::Bad);
        let bhn = soh.channel_soh("STA.BHN").unwrap();
        assert_eq!(bhn.status, SohStatus::Bad);
        assert_eq!(
            bhn.monitor_value(SohMonitorType::Missing).unwrap().value.as_percent(),
            Some(100.0)
        );
    }

    #[test]
    fn failing_station_is_omitted_without_affecting_others() {
        let mut broken = station("BAD");
        broken.channel_definitions[0]
            .thresholds_by_monitor_type
            .insert(SohMonitorType::Lag, ThresholdDefinition::percent(1.0, 2.0));
        let definitions = vec![station("AAA"), broken, station("ZZZ")];
        // bypass load-time validation to exercise runtime isolation
        let engine = SohEngine {
            definitions,
            cache: Arc::default(),
            pool: rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap(),
            receptions: ReceptionTracker::new(),
        };

        let results = engine.process_batch(std::iter::empty(), t(0));

        let names: Vec<_> = results.iter().map(|s| s.station_name.as_str()).collect();
        assert_eq!(names, vec!["AAA", "ZZZ"]);
    }

    #[test]
    fn vanishing_sample_rate_does_not_disturb_the_batch() {
        let mut slow = station("SLO");
        for channel in &mut slow.channel_definitions {
            channel.nominal_sample_rate_hz = 1e-17;
        }
        let engine = engine(vec![station("AAA"), slow]);
        let extracts = [
            extract("AAA", &["AAA.BHZ", "AAA.BHN"], 0, 5_000, 5_100),
            extract("SLO", &["SLO.BHZ", "SLO.BHN"], 0, 5_000, 5_100),
        ];

        let results = engine.process_batch(&extracts, t(10_000));

        let names: Vec<_> = results.iter().map(|s| s.station_name.as_str()).collect();
        assert_eq!(names, vec!["AAA", "SLO"]);
        let missing = results[1]
            .channel_soh("SLO.BHZ")
            .and_then(|soh| soh.monitor_value(SohMonitorType::Missing))
            .and_then(|value| value.value.as_percent())
            .unwrap();
        assert!((0.0..=100.0).contains(&missing), "got {missing}");
    }

    #[test]
    fn catch_panic_reports_the_message() {
        assert_eq!(catch_panic(|| 7), Ok(7));
        assert_eq!(
            catch_panic(|| -> i32 { panic!("station blew up") }),
            Err("station blew up".to_string())
        );
        let station = "STA";
        assert_eq!(
            catch_panic(|| -> i32 { panic!("{station} blew up") }),
            Err("STA blew up".to_string())
        );
    }

    #[test]
    fn build_rejects_invalid_definitions() {
        let mut broken = station("STA");
        broken.time_windows_by_monitor_type.clear();
        let err = SohEngine::builder().definitions(vec![broken]).build().unwrap_err();
        assert!(matches!(err, SohError::Config(_)));
    }

    #[test]
    fn empty_definitions_produce_empty_batch() {
        let engine = engine(Vec::new());
        let extracts = [extract("STA", &["STA.BHZ"], 0, 10_000, 10_100)];
        assert!(engine.process_batch(&extracts, t(10_500)).is_empty());
    }

    #[test]
    fn station_without_rollup_values_is_skipped() {
        let mut definition = station("STA");
        definition.monitor_types_for_rollup.clear();
        let engine = engine(vec![definition]);
        assert!(engine.process_batch(std::iter::empty(), t(0)).is_empty());
    }

    #[test]
    fn rerunning_a_batch_is_idempotent() {
        let engine = engine(vec![station("STA"), station("STB")]);
        let extracts = [
            extract("STA", &["STA.BHZ", "STA.BHN"], 0, 5_000, 5_200),
            extract("STA", &["STA.BHZ"], 5_000, 10_000, 10_300),
            extract("STB", &["STB.BHZ"], 2_000, 9_000, 9_050),
        ];

        let first = engine.process_batch(&extracts, t(10_500));
        let second = engine.process_batch(&extracts, t(10_500));

        assert_eq!(first, second);
    }

    #[test]
    fn timeliness_sees_data_from_earlier_batches() {
        let engine = engine(vec![station("STA")]);
        engine.process_batch(&[extract("STA", &["STA.BHZ", "STA.BHN"], 0, 10_000, 10_100)], t(10_500));

        let results = engine.process_batch(std::iter::empty(), t(15_000));

        let bhz = results[0].channel_soh("STA.BHZ").unwrap();
        let timeliness = bhz.monitor_value(SohMonitorType::Timeliness).unwrap();
        assert_eq!(timeliness.value.as_duration(), Some(ms(5_000)));
        assert_eq!(timeliness.status, SohStatus::Marginal);
    }

    #[test]
    fn builder_shares_the_given_cache() {
        let cache = Arc::new(TimelinessCache::new());
        let engine = SohEngine::builder()
            .definitions(vec![station("STA")])
            .cache(cache.clone())
            .build()
            .unwrap();

        engine.process_batch(&[extract("STA", &["STA.BHZ"], 0, 10_000, 10_100)], t(10_500));

        assert_eq!(cache.get("STA.BHZ"), Some(t(10_000)));
    }

    #[derive(Default)]
    struct FakeHistory {
        extracts: BTreeMap<String, Vec<AcquiredStationSohExtract>>,
        latest: HashMap<String, DateTime<Utc>>,
        queried: Mutex<Vec<String>>,
    }

    impl SohHistory for FakeHistory {
        fn extracts(&self, station: &str, range: Span) -> Result<Vec<AcquiredStationSohExtract>, SohError> {
            Ok(self
                .extracts
                .get(station)
                .into_iter()
                .flatten()
                .filter(|e| e.payload_end_time().is_some_and(|end| end >= range.start && end < range.end))
                .cloned()
                .collect())
        }

        fn latest_sample_times(&self, channels: &[String]) -> Result<HashMap<String, DateTime<Utc>>, SohError> {
            self.queried.lock().extend(channels.iter().cloned());
            Ok(channels
                .iter()
                .filter_map(|c| self.latest.get(c).map(|t| (c.clone(), *t)))
                .collect())
        }
    }

    #[test]
    fn restore_seeds_cache_from_extracts_then_latest_times() {
        let engine = engine(vec![station("STA")]);
        let history = FakeHistory {
            extracts: [(
                "STA".to_string(),
                vec![
                    extract("STA", &["STA.BHZ"], 0, 10_000, 10_100),
                    // older than the cache duration
                    extract("STA", &["STA.BHZ"], -500_000, -400_000, -400_000),
                ],
            )]
            .into(),
            latest: [("STA.BHN".to_string(), t(3_000))].into(),
            ..Default::default()
        };

        let restored = engine.restore(&history, t(20_000)).unwrap();

        assert_eq!(restored.len(), 1);
        assert_eq!(engine.cache().get("STA.BHZ"), Some(t(10_000)));
        assert_eq!(engine.cache().get("STA.BHN"), Some(t(3_000)));
        assert_eq!(*history.queried.lock(), vec!["STA.BHN".to_string()]);
    }
}
