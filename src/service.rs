//! Wiring: definitions from disk, engine and pipeline, file outputs.

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use soh_engine::rollup::CapabilitySohRollupDefinition;
use soh_engine::{Batch, CapabilityRollup, ExtractCache, Output, SohEngine, SohPipeline};
use soh_types::StationSohDefinition;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::files::{load_capability_definitions, load_station_definitions, ExtractTail, FileHistory};
use crate::settings::Settings;

/// File name of the station results written under the output directory.
pub const STATION_OUTPUT: &str = "station-soh.ndjson";

/// File name of the capability rollups written under the output directory.
pub const CAPABILITY_OUTPUT: &str = "capability-soh.ndjson";

/// How `run` drives batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Read new extracts and compute a batch every reprocessing period until
    /// shutdown.
    Follow,
    /// Compute a single batch over everything in the extract file, as of
    /// `at` (default: now), then exit.
    Once { at: Option<DateTime<Utc>> },
}

/// Counts reported by `check`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub stations: usize,
    pub channels: usize,
    pub station_groups: usize,
}

/// Loaded configuration, ready to run.
#[derive(Debug)]
pub struct Service {
    settings: Settings,
    definitions: Vec<StationSohDefinition>,
    capability: Vec<CapabilitySohRollupDefinition>,
}

impl Service {
    /// Load and validate every definition the settings point at.
    pub fn load(settings: Settings) -> Result<Self> {
        let definitions = load_station_definitions(&settings.station_definitions)?;
        let capability = match &settings.capability_definitions {
            Some(path) => load_capability_definitions(path)?,
            None => Vec::new(),
        };
        Ok(Self {
            settings,
            definitions,
            capability,
        })
    }

    pub fn summary(&self) -> Summary {
        Summary {
            stations: self.definitions.len(),
            channels: self
                .definitions
                .iter()
                .map(|definition| definition.channel_definitions.len())
                .sum(),
            station_groups: self.capability.len(),
        }
    }

    /// Run until `shutdown` resolves, or for one batch in `RunMode::Once`.
    pub async fn run<F>(self, mode: RunMode, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let settings = self.settings;
        let engine = SohEngine::builder()
            .definitions(self.definitions.clone())
            .worker_threads(settings.worker_threads)
            .build()
            .context("failed to build engine")?;

        let start = match mode {
            RunMode::Once { at: Some(at) } => at,
            _ => Utc::now(),
        };

        let mut extracts = ExtractCache::new(&self.definitions);
        if let Some(path) = &settings.history {
            let history = FileHistory::load(path)?;
            let restored = engine.restore(&history, start).context("failed to restore from history")?;
            let cached = restored
                .into_iter()
                .map(|extract| extracts.insert(extract, start))
                .filter(|kept| *kept)
                .count();
            info!(path = %path.display(), cached, "restored extracts from history");
        }

        tokio::fs::create_dir_all(&settings.output_dir)
            .await
            .with_context(|| format!("failed to create {}", settings.output_dir.display()))?;

        let pipeline = SohPipeline::builder(Arc::new(engine))
            .capability(CapabilityRollup::new(self.capability))
            .station_output(Output::file(settings.output_dir.join(STATION_OUTPUT)))
            .capability_output(Output::file(settings.output_dir.join(CAPABILITY_OUTPUT)))
            .stats_interval(settings.stats_interval()?)
            .extract_cache(extracts)
            .build();

        let (tx, rx) = mpsc::channel(4);
        let handle = pipeline.start(rx);
        let mut tail = ExtractTail::new(&settings.extracts);

        match mode {
            RunMode::Once { .. } => {
                let extracts = tail.poll().await?;
                info!(extracts = extracts.len(), time = %start, "computing single batch");
                tx.send(Batch::new(start, extracts))
                    .await
                    .map_err(|_| anyhow::anyhow!("pipeline stopped before the batch was sent"))?;
            }
            RunMode::Follow => {
                let mut timer = tokio::time::interval(settings.reprocessing_interval()?);
                tokio::pin!(shutdown);
                info!(path = %tail.path().display(), "following extracts");

                loop {
                    tokio::select! {
                        _ = timer.tick() => {
                            let extracts = tail.poll().await.unwrap_or_else(|err| {
                                warn!(error = %err, "failed to read extracts");
                                Vec::new()
                            });
                            if tx.send(Batch::new(Utc::now(), extracts)).await.is_err() {
                                warn!("pipeline stopped unexpectedly");
                                break;
                            }
                        }
                        _ = &mut shutdown => {
                            info!("shutdown requested");
                            break;
                        }
                    }
                }
            }
        }

        drop(tx);
        handle.join().await?;
        Ok(())
    }
}
