//! Per-batch state-of-health results.
//!
//! Every record here is a fresh snapshot built once per batch and never
//! mutated afterwards, so it can be shared read-only between consumers.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};

use crate::{SohMonitorType, SohStatus, StationAggregateType, ValueKind};

/// A computed monitor value. `None` means the value could not be computed.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(tag = "kind", content = "value", rename_all = "SCREAMING_SNAKE_CASE")
)]
pub enum MonitorValue {
    Duration(
        #[cfg_attr(feature = "serde", serde(with = "crate::duration::option_text"))]
        Option<Duration>,
    ),
    Percent(Option<f64>),
}

impl MonitorValue {
    /// An absent value of the kind the monitor type produces.
    pub fn absent(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Duration => MonitorValue::Duration(None),
            ValueKind::Percent => MonitorValue::Percent(None),
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, MonitorValue::Duration(None) | MonitorValue::Percent(None))
    }

    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            MonitorValue::Duration(d) => *d,
            MonitorValue::Percent(_) => None,
        }
    }

    pub fn as_percent(&self) -> Option<f64> {
        match self {
            MonitorValue::Percent(p) => *p,
            MonitorValue::Duration(_) => None,
        }
    }

    /// Order values by magnitude with absent values first.
    ///
    /// Durations sort before percents, which only matters for malformed input
    /// mixing kinds under one monitor type.
    pub fn magnitude_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (MonitorValue::Duration(a), MonitorValue::Duration(b)) => a.cmp(b),
            (MonitorValue::Percent(a), MonitorValue::Percent(b)) => match (a, b) {
                (Some(a), Some(b)) => a.total_cmp(b),
                (a, b) => a.is_some().cmp(&b.is_some()),
            },
            (MonitorValue::Duration(_), MonitorValue::Percent(_)) => Ordering::Less,
            (MonitorValue::Percent(_), MonitorValue::Duration(_)) => Ordering::Greater,
        }
    }
}

/// A monitor's value and the status it was classified as.
///
/// An absent value is only ever paired with `Marginal`, except for the
/// missing monitor which reports a concrete 100% when no data arrived.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct MonitorValueAndStatus {
    pub monitor_type: SohMonitorType,
    pub value: MonitorValue,
    pub status: SohStatus,
}

impl MonitorValueAndStatus {
    pub fn duration(monitor_type: SohMonitorType, value: Option<Duration>, status: SohStatus) -> Self {
        Self {
            monitor_type,
            value: MonitorValue::Duration(value),
            status,
        }
    }

    pub fn percent(monitor_type: SohMonitorType, value: Option<f64>, status: SohStatus) -> Self {
        Self {
            monitor_type,
            value: MonitorValue::Percent(value),
            status,
        }
    }

    /// The "could not compute" result: absent value, `Marginal` status.
    pub fn unavailable(monitor_type: SohMonitorType) -> Self {
        Self {
            monitor_type,
            value: MonitorValue::absent(monitor_type.value_kind()),
            status: SohStatus::Marginal,
        }
    }
}

/// State of health of one channel for one batch.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct ChannelSoh {
    pub channel_name: String,
    pub status: SohStatus,
    pub monitor_values: BTreeMap<SohMonitorType, MonitorValueAndStatus>,
}

impl ChannelSoh {
    pub fn monitor_value(&self, monitor_type: SohMonitorType) -> Option<&MonitorValueAndStatus> {
        self.monitor_values.get(&monitor_type)
    }
}

/// A station-wide summary value.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(tag = "type", content = "value", rename_all = "SCREAMING_SNAKE_CASE")
)]
pub enum StationAggregate {
    /// Average lag over every qualifying sample of the station.
    Lag(
        #[cfg_attr(feature = "serde", serde(with = "crate::duration::option_text"))]
        Option<Duration>,
    ),
    /// Average missing percentage over the station's missing-monitored channels.
    Missing(Option<f64>),
    /// Staleness of the least recently updated channel.
    Timeliness(
        #[cfg_attr(feature = "serde", serde(with = "crate::duration::option_text"))]
        Option<Duration>,
    ),
    /// Percentage of qualifying environmental observations that were true.
    EnvironmentalIssues(Option<f64>),
}

impl StationAggregate {
    pub fn aggregate_type(&self) -> StationAggregateType {
        match self {
            StationAggregate::Lag(_) => StationAggregateType::Lag,
            StationAggregate::Missing(_) => StationAggregateType::Missing,
            StationAggregate::Timeliness(_) => StationAggregateType::Timeliness,
            StationAggregate::EnvironmentalIssues(_) => StationAggregateType::EnvironmentalIssues,
        }
    }

    pub fn is_absent(&self) -> bool {
        match self {
            StationAggregate::Lag(v) | StationAggregate::Timeliness(v) => v.is_none(),
            StationAggregate::Missing(v) | StationAggregate::EnvironmentalIssues(v) => v.is_none(),
        }
    }
}

/// State of health of one station for one batch.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct StationSoh {
    pub station_name: String,
    pub time: DateTime<Utc>,
    pub status: SohStatus,
    /// The worst channel result for each monitor type the station assigns channels to.
    pub monitor_values: BTreeMap<SohMonitorType, MonitorValueAndStatus>,
    /// Channel results, sorted by channel name.
    pub channel_sohs: Vec<ChannelSoh>,
    /// One aggregate per [`StationAggregateType`], in declaration order.
    pub aggregates: Vec<StationAggregate>,
}

impl StationSoh {
    pub fn channel_soh(&self, channel_name: &str) -> Option<&ChannelSoh> {
        self.channel_sohs
            .iter()
            .find(|channel| channel.channel_name == channel_name)
    }

    pub fn monitor_value(&self, monitor_type: SohMonitorType) -> Option<&MonitorValueAndStatus> {
        self.monitor_values.get(&monitor_type)
    }

    pub fn aggregate(&self, aggregate_type: StationAggregateType) -> Option<&StationAggregate> {
        self.aggregates
            .iter()
            .find(|aggregate| aggregate.aggregate_type() == aggregate_type)
    }
}

/// Group-level capability verdict for one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct CapabilitySohRollup {
    pub station_group: String,
    pub time: DateTime<Utc>,
    pub status: SohStatus,
    /// Status used for each station operand of the group operator.
    pub station_statuses: BTreeMap<String, SohStatus>,
    /// Stations of the group that had a result this batch.
    pub contributing_stations: BTreeSet<String>,
}
