//! # soh-engine
//!
//! State-of-health calculation for monitoring station networks.
//!
//! Each batch of acquired extracts is turned into one [`StationSoh`] per
//! configured station: per-channel monitor values (lag, missing, timeliness,
//! environmental issues) classified against thresholds, rolled up to channel
//! and station statuses, plus station-wide aggregates. A capability stage
//! then rolls station results up into station-group statuses through a
//! configurable operator tree.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use soh_engine::{Batch, CapabilityRollup, Output, SohEngine, SohPipeline};
//!
//! #[tokio::main]
//! async fn main() {
//!     // Station definitions usually come from configuration
//!     let engine = SohEngine::builder()
//!         .definitions(Vec::new())
//!         .build()
//!         .unwrap();
//!
//!     // Write station results to a file, capability rollups to a channel
//!     let (groups, mut rollups) = Output::channel(16);
//!     let pipeline = SohPipeline::builder(Arc::new(engine))
//!         .capability(CapabilityRollup::new(Vec::new()))
//!         .station_output(Output::file("station-soh.ndjson"))
//!         .capability_output(groups)
//!         .build();
//!
//!     let (batches, input) = tokio::sync::mpsc::channel(4);
//!     let _handle = pipeline.start(input);
//!
//!     batches.send(Batch::new(chrono::Utc::now(), Vec::new())).await.unwrap();
//!     while let Some(rollups) = rollups.recv().await {
//!         println!("{} station groups", rollups.len());
//!     }
//! }
//! ```
//!
//! ## Features
//!
//! - **Parallel**: stations are computed concurrently on a rayon pool
//! - **Isolated failures**: a station that fails to compute is logged and
//!   left out of its batch
//! - **Shared results**: every output receives the same `Arc` slice
//! - `tokio` (default): the async batch pipeline and its outputs

pub mod aggregate;
pub mod batch;
mod cache;
pub mod channel;
pub mod classify;
mod engine;
mod error;
mod extracts;
mod history;
pub mod monitors;
pub mod rollup;
pub mod station;
mod stats;
pub mod window;

#[cfg(feature = "tokio")]
mod output;
#[cfg(feature = "tokio")]
mod pipeline;

pub use cache::TimelinessCache;
pub use classify::{classify, classify_duration, classify_percent};
pub use engine::{compute_station, SohEngine, SohEngineBuilder};
pub use error::{CalculationError, ConfigError, SohError};
pub use extracts::ExtractCache;
pub use history::SohHistory;
pub use rollup::{CapabilityRollup, CapabilityRollupConfig, CapabilitySohRollupDefinition, RollupOperator};
pub use stats::BatchStats;
pub use window::Span;

#[cfg(feature = "tokio")]
pub use output::Output;
#[cfg(feature = "tokio")]
pub use pipeline::{Batch, PipelineHandle, SohPipeline, SohPipelineBuilder};

// Re-export types for convenience
pub use soh_types::{
    AcquiredStationSohExtract, CapabilitySohRollup, ChannelSoh, SohMonitorType, SohStatus, StationSoh,
    StationSohDefinition,
};
