//! # soh-types
//!
//! Core types for station and channel state-of-health (SOH) calculation.
//! This crate defines the vocabulary shared by the engine, the control
//! binary and anything that consumes their results.
//!
//! ## Overview
//!
//! - **Statuses**: [`SohStatus`], ordered worst first (`Bad < Marginal < Good`)
//! - **Monitor types**: [`SohMonitorType`] (`LAG`, `MISSING`, `TIMELINESS`, `ENV_*`)
//! - **Definitions**: [`StationSohDefinition`], [`ChannelSohDefinition`],
//!   [`TimeWindowDefinition`], [`ThresholdDefinition`]
//! - **Input**: [`AcquiredStationSohExtract`] with frame metadata and
//!   [`EnvironmentIssue`] observations
//! - **Results**: [`ChannelSoh`], [`StationSoh`], [`StationAggregate`],
//!   [`CapabilitySohRollup`]
//!
//! ## Features
//!
//! - `serde`: JSON/etc. serialization via serde. Durations are written as
//!   text (`"20s"`, `"150ms"`), see [`parse_duration`].
//!
//! ## Example
//!
//! ```rust
//! use soh_types::{SohMonitorType, SohStatus, EnvironmentIssueType};
//!
//! let clipped: SohMonitorType = "ENV_CLIPPED".parse().unwrap();
//! assert_eq!(clipped, EnvironmentIssueType::Clipped.monitor_type());
//!
//! let worst = SohStatus::worst([SohStatus::Good, SohStatus::Bad]);
//! assert_eq!(worst, Some(SohStatus::Bad));
//! ```

pub mod duration;
mod definition;
mod extract;
mod monitor;
mod soh;
mod status;

pub use definition::*;
pub use duration::{format_duration, parse_duration, DurationParseError};
pub use extract::*;
pub use monitor::*;
pub use soh::*;
pub use status::*;
