//! # soh-control
//!
//! Service wrapper around [`soh_engine`]: loads station and capability
//! definitions from JSON, follows a newline-delimited JSON file of acquired
//! extracts, and writes station results and capability rollups as
//! newline-delimited JSON.
//!
//! ## Architecture
//!
//! ```text
//!  extracts.ndjson ──▶ ExtractTail ──▶ Batch ──▶ SohPipeline ──▶ station-soh.ndjson
//!                                                     │
//!  history.ndjson ──▶ FileHistory ──▶ restore         └──────▶ capability-soh.ndjson
//! ```
//!
//! - **[`settings`]**: layered configuration (`config` crate, `SOH_*` env vars)
//! - **[`files`]**: definition loading, extract tailing, file-backed history
//! - **[`service`]**: wires the engine, pipeline and outputs together
//! - **[`logging`]**: `tracing-subscriber` setup
//!
//! ## Usage
//!
//! ```bash
//! # Validate definitions
//! soh-control --config soh.toml check
//!
//! # Compute one batch over a captured extract file
//! soh-control run --once --extracts captured.ndjson --at 2024-03-01T12:00:00Z
//!
//! # Follow an extract file, computing every reprocessing period
//! soh-control --config soh.toml run
//! ```
//!
//! ### As a library
//!
//! ```no_run
//! use soh_control::{RunMode, Service, Settings};
//!
//! # tokio_test::block_on(async {
//! let settings = Settings::load(None).unwrap();
//! let service = Service::load(settings).unwrap();
//! service
//!     .run(RunMode::Once { at: None }, std::future::pending())
//!     .await
//!     .unwrap();
//! # });
//! ```

pub mod files;
pub mod logging;
pub mod service;
pub mod settings;

pub use files::{ExtractTail, FileHistory};
pub use service::{RunMode, Service, Summary};
pub use settings::Settings;
