//! Acquired telemetry extracts, the engine's batch input.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::EnvironmentIssueType;

/// Time span of waveform data acquired for one channel in one frame.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct WaveformSummary {
    pub channel_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl WaveformSummary {
    pub fn new(
        channel_name: impl Into<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        Self {
            channel_name: channel_name.into(),
            start_time,
            end_time,
        }
    }
}

/// Metadata of one received data frame.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct AcquisitionMetadata {
    pub station_name: String,
    /// When the frame arrived.
    pub reception_time: DateTime<Utc>,
    pub payload_start_time: DateTime<Utc>,
    pub payload_end_time: DateTime<Utc>,
    /// Waveform spans in the frame, keyed by channel name.
    #[cfg_attr(feature = "serde", serde(default))]
    pub waveform_summaries: BTreeMap<String, WaveformSummary>,
}

/// A boolean environmental issue observation for a channel.
///
/// `status == true` means the issue was present over `[start_time, end_time)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct EnvironmentIssue {
    pub channel_name: String,
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub issue_type: EnvironmentIssueType,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: bool,
}

/// One unit of acquired data: frame metadata plus environmental issues.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct AcquiredStationSohExtract {
    #[cfg_attr(feature = "serde", serde(default))]
    pub acquisition_metadata: Vec<AcquisitionMetadata>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub environment_issues: Vec<EnvironmentIssue>,
}

impl AcquiredStationSohExtract {
    /// Station of the extract, taken from its first frame.
    pub fn station_name(&self) -> Option<&str> {
        self.acquisition_metadata
            .first()
            .map(|metadata| metadata.station_name.as_str())
    }

    /// Payload end time of the extract, taken from its first frame.
    pub fn payload_end_time(&self) -> Option<DateTime<Utc>> {
        self.acquisition_metadata
            .first()
            .map(|metadata| metadata.payload_end_time)
    }

    /// Every waveform summary in the extract paired with its frame's reception time.
    pub fn waveforms(&self) -> impl Iterator<Item = (&WaveformSummary, DateTime<Utc>)> {
        self.acquisition_metadata.iter().flat_map(|metadata| {
            metadata
                .waveform_summaries
                .values()
                .map(move |summary| (summary, metadata.reception_time))
        })
    }
}
