//! The batch pipeline: receive batches, compute, fan results out.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use soh_types::{AcquiredStationSohExtract, CapabilitySohRollup, StationSoh};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::SohEngine;
use crate::error::SohError;
use crate::extracts::ExtractCache;
use crate::output::Output;
use crate::rollup::CapabilityRollup;
use crate::stats::BatchStats;

const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(60);

/// Extracts received since the previous batch, stamped with the batch time.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub time: DateTime<Utc>,
    pub extracts: Vec<AcquiredStationSohExtract>,
}

impl Batch {
    pub fn new(time: DateTime<Utc>, extracts: Vec<AcquiredStationSohExtract>) -> Self {
        Self { time, extracts }
    }
}

/// Runs the engine and the capability stage for every batch it receives.
///
/// Station results go to every station output before the capability stage
/// starts; each output receives the same shared slice.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use soh_engine::{Batch, Output, SohEngine, SohPipeline};
///
/// #[tokio::main]
/// async fn main() {
///     let engine = SohEngine::builder().build().unwrap();
///     let (stations, mut results) = Output::channel(16);
///
///     let pipeline = SohPipeline::builder(Arc::new(engine))
///         .station_output(stations)
///         .build();
///
///     let (tx, rx) = tokio::sync::mpsc::channel(4);
///     let handle = pipeline.start(rx);
///
///     tx.send(Batch::new(chrono::Utc::now(), Vec::new())).await.unwrap();
///     let station_sohs = results.recv().await.unwrap();
///     println!("{} stations", station_sohs.len());
///
///     handle.shutdown().await.unwrap();
/// }
/// ```
#[derive(Debug)]
pub struct SohPipeline {
    engine: Arc<SohEngine>,
    capability: CapabilityRollup,
    station_outputs: Vec<Output<StationSoh>>,
    capability_outputs: Vec<Output<CapabilitySohRollup>>,
    stats_interval: Duration,
    extracts: Option<Arc<Mutex<ExtractCache>>>,
}

impl SohPipeline {
    pub fn builder(engine: Arc<SohEngine>) -> SohPipelineBuilder {
        SohPipelineBuilder::new(engine)
    }

    /// Spawn the pipeline task, reading batches from `input`.
    ///
    /// The task ends when `input` closes, when `stop()` is called, or when
    /// the handle is dropped.
    pub fn start(self, mut input: mpsc::Receiver<Batch>) -> PipelineHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut stats = BatchStats::new();
            let mut stats_timer = tokio::time::interval_at(
                tokio::time::Instant::now() + self.stats_interval,
                self.stats_interval,
            );

            loop {
                tokio::select! {
                    batch = input.recv() => {
                        let Some(batch) = batch else {
                            debug!("batch input closed, stopping pipeline");
                            break;
                        };
                        if let Err(err) = self.run_batch(batch, &mut stats).await {
                            warn!(error = %err, "batch failed");
                        }
                    }
                    _ = stats_timer.tick() => {
                        stats.log_and_reset();
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("pipeline stopped");
        });

        PipelineHandle { stop_tx, task }
    }

    async fn run_batch(&self, batch: Batch, stats: &mut BatchStats) -> Result<(), SohError> {
        let time = batch.time;
        let engine = self.engine.clone();
        let extracts = self.extracts.clone();

        let (station_sohs, extract_count, elapsed) = tokio::task::spawn_blocking(move || {
            let started = Instant::now();
            let (station_sohs, count) = match extracts {
                Some(cache) => {
                    let mut cache = cache.lock();
                    for extract in batch.extracts {
                        cache.insert(extract, time);
                    }
                    cache.evict(time);
                    let snapshot = cache.snapshot();
                    let sohs = engine.process_batch(snapshot.iter().map(|extract| &**extract), time);
                    (sohs, snapshot.len())
                }
                None => (
                    engine.process_batch(&batch.extracts, time),
                    batch.extracts.len(),
                ),
            };
            (station_sohs, count, started.elapsed())
        })
        .await
        .map_err(|err| SohError::Task(err.to_string()))?;

        stats.record(extract_count, elapsed, station_sohs.len());

        let station_sohs: Arc<[StationSoh]> = station_sohs.into();
        for output in &self.station_outputs {
            if let Err(err) = output.emit(&station_sohs).await {
                warn!(error = %err, "failed to emit station results");
            }
        }

        if self.capability.definitions().is_empty() {
            return Ok(());
        }
        let rollups: Arc<[CapabilitySohRollup]> = self.capability.evaluate(&station_sohs, time).into();
        for output in &self.capability_outputs {
            if let Err(err) = output.emit(&rollups).await {
                warn!(error = %err, "failed to emit capability rollups");
            }
        }
        Ok(())
    }
}

/// Builder for configuring a pipeline.
#[derive(Debug)]
pub struct SohPipelineBuilder {
    engine: Arc<SohEngine>,
    capability: CapabilityRollup,
    station_outputs: Vec<Output<StationSoh>>,
    capability_outputs: Vec<Output<CapabilitySohRollup>>,
    stats_interval: Option<Duration>,
    extracts: Option<ExtractCache>,
}

impl SohPipelineBuilder {
    pub fn new(engine: Arc<SohEngine>) -> Self {
        Self {
            engine,
            capability: CapabilityRollup::default(),
            station_outputs: Vec::new(),
            capability_outputs: Vec::new(),
            stats_interval: None,
            extracts: None,
        }
    }

    /// Set the capability rollup stage run after each batch.
    pub fn capability(mut self, capability: CapabilityRollup) -> Self {
        self.capability = capability;
        self
    }

    /// Add a destination for station results.
    pub fn station_output(mut self, output: Output<StationSoh>) -> Self {
        self.station_outputs.push(output);
        self
    }

    /// Add a destination for capability rollups.
    pub fn capability_output(mut self, output: Output<CapabilitySohRollup>) -> Self {
        self.capability_outputs.push(output);
        self
    }

    /// How often batch statistics are logged. Defaults to 60 seconds.
    pub fn stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = Some(interval);
        self
    }

    /// Retain extracts across batches so each computation sees every
    /// extract still inside its station's windows.
    pub fn extract_cache(mut self, cache: ExtractCache) -> Self {
        self.extracts = Some(cache);
        self
    }

    pub fn build(self) -> SohPipeline {
        SohPipeline {
            engine: self.engine,
            capability: self.capability,
            station_outputs: self.station_outputs,
            capability_outputs: self.capability_outputs,
            stats_interval: self
                .stats_interval
                .filter(|interval| !interval.is_zero())
                .unwrap_or(DEFAULT_STATS_INTERVAL),
            extracts: self.extracts.map(|cache| Arc::new(Mutex::new(cache))),
        }
    }
}

/// Handle for controlling a running pipeline.
///
/// Drop this handle to stop the pipeline, or call `stop()` explicitly.
#[derive(Debug)]
pub struct PipelineHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PipelineHandle {
    /// Signal the pipeline to stop after the batch in progress.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Wait for the pipeline task to finish.
    pub async fn join(self) -> Result<(), SohError> {
        let PipelineHandle { stop_tx, task } = self;
        let result = task.await.map_err(|err| SohError::Task(err.to_string()));
        drop(stop_tx);
        result
    }

    /// Stop the pipeline and wait for it to finish.
    pub async fn shutdown(self) -> Result<(), SohError> {
        self.stop();
        self.join().await
    }
}
