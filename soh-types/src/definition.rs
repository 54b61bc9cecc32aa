//! Station and channel state-of-health definitions.
//!
//! Definitions are loaded once per configuration epoch and reused, unmodified,
//! for every batch.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Duration;

use crate::{SohMonitorType, ValueKind};

/// Extra time kept beyond the widest calculation window when caching data for a station.
pub const CACHE_MARGIN_SECS: i64 = 60;

/// Errors found while validating a definition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DefinitionError {
    /// A monitor type has assigned channels but no time window.
    #[error("station {station} assigns channels to {monitor_type} but has no time window for it")]
    MissingTimeWindow {
        station: String,
        monitor_type: SohMonitorType,
    },

    /// A time window has a negative interval or back-off.
    #[error("station {station} has a negative time window for {monitor_type}")]
    NegativeTimeWindow {
        station: String,
        monitor_type: SohMonitorType,
    },

    /// A threshold does not match the kind of value its monitor produces.
    #[error("channel {channel} has a {found:?} threshold for {monitor_type}")]
    ThresholdKind {
        channel: String,
        monitor_type: SohMonitorType,
        found: ValueKind,
    },

    /// A channel is defined more than once for the same station.
    #[error("station {station} defines channel {channel} more than once")]
    DuplicateChannel { station: String, channel: String },
}

/// The span of time a monitor looks at.
///
/// The active window is `[now - back_off - interval, now - back_off)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct TimeWindowDefinition {
    #[cfg_attr(feature = "serde", serde(with = "crate::duration::text"))]
    pub calculation_interval: Duration,
    #[cfg_attr(feature = "serde", serde(with = "crate::duration::text"))]
    pub back_off_duration: Duration,
}

impl TimeWindowDefinition {
    pub fn new(calculation_interval: Duration, back_off_duration: Duration) -> Self {
        Self {
            calculation_interval,
            back_off_duration,
        }
    }

    /// True when neither duration is negative.
    pub fn is_valid(&self) -> bool {
        self.calculation_interval >= Duration::zero() && self.back_off_duration >= Duration::zero()
    }
}

/// Good/marginal threshold pair. Higher values are always worse.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum ThresholdDefinition {
    #[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
    Duration {
        #[cfg_attr(feature = "serde", serde(with = "crate::duration::text"))]
        good_threshold: Duration,
        #[cfg_attr(feature = "serde", serde(with = "crate::duration::text"))]
        marginal_threshold: Duration,
    },
    #[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
    Percent {
        good_threshold: f64,
        marginal_threshold: f64,
    },
}

impl ThresholdDefinition {
    pub fn duration(good_threshold: Duration, marginal_threshold: Duration) -> Self {
        ThresholdDefinition::Duration {
            good_threshold,
            marginal_threshold,
        }
    }

    pub fn percent(good_threshold: f64, marginal_threshold: f64) -> Self {
        ThresholdDefinition::Percent {
            good_threshold,
            marginal_threshold,
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            ThresholdDefinition::Duration { .. } => ValueKind::Duration,
            ThresholdDefinition::Percent { .. } => ValueKind::Percent,
        }
    }

    /// `(good, marginal)` when this is a duration threshold.
    pub fn as_duration(&self) -> Option<(Duration, Duration)> {
        match self {
            ThresholdDefinition::Duration {
                good_threshold,
                marginal_threshold,
            } => Some((*good_threshold, *marginal_threshold)),
            ThresholdDefinition::Percent { .. } => None,
        }
    }

    /// `(good, marginal)` when this is a percent threshold.
    pub fn as_percent(&self) -> Option<(f64, f64)> {
        match self {
            ThresholdDefinition::Percent {
                good_threshold,
                marginal_threshold,
            } => Some((*good_threshold, *marginal_threshold)),
            ThresholdDefinition::Duration { .. } => None,
        }
    }
}

/// Per-channel monitor configuration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct ChannelSohDefinition {
    pub channel_name: String,
    /// Monitor types that contribute to the channel's overall status.
    pub monitor_types_for_rollup: BTreeSet<SohMonitorType>,
    pub thresholds_by_monitor_type: BTreeMap<SohMonitorType, ThresholdDefinition>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub nominal_sample_rate_hz: f64,
}

impl ChannelSohDefinition {
    pub fn threshold(&self, monitor_type: SohMonitorType) -> Option<&ThresholdDefinition> {
        self.thresholds_by_monitor_type.get(&monitor_type)
    }

    /// Environmental monitor types this channel has thresholds for.
    pub fn environment_thresholds(
        &self,
    ) -> impl Iterator<Item = (SohMonitorType, &ThresholdDefinition)> {
        self.thresholds_by_monitor_type
            .iter()
            .filter(|(monitor_type, _)| monitor_type.is_environment_issue())
            .map(|(monitor_type, threshold)| (*monitor_type, threshold))
    }
}

/// Per-station monitor configuration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct StationSohDefinition {
    pub station_name: String,
    /// Monitor types that contribute to the station's overall status.
    pub monitor_types_for_rollup: BTreeSet<SohMonitorType>,
    /// For each monitor type, the channels whose results feed the station value.
    pub channels_by_monitor_type: BTreeMap<SohMonitorType, BTreeSet<String>>,
    pub channel_definitions: Vec<ChannelSohDefinition>,
    pub time_windows_by_monitor_type: BTreeMap<SohMonitorType, TimeWindowDefinition>,
}

impl StationSohDefinition {
    pub fn time_window(&self, monitor_type: SohMonitorType) -> Option<&TimeWindowDefinition> {
        self.time_windows_by_monitor_type.get(&monitor_type)
    }

    /// Channels assigned to a monitor type; empty when none are.
    pub fn channels_for(&self, monitor_type: SohMonitorType) -> impl Iterator<Item = &str> {
        self.channels_by_monitor_type
            .get(&monitor_type)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    pub fn is_channel_assigned(&self, monitor_type: SohMonitorType, channel: &str) -> bool {
        self.channels_by_monitor_type
            .get(&monitor_type)
            .is_some_and(|channels| channels.contains(channel))
    }

    pub fn channel_definition(&self, channel_name: &str) -> Option<&ChannelSohDefinition> {
        self.channel_definitions
            .iter()
            .find(|def| def.channel_name == channel_name)
    }

    /// How far back data for this station must be kept: the widest interval
    /// plus the widest back-off plus a one minute margin.
    pub fn cache_duration(&self) -> Duration {
        let windows = self.time_windows_by_monitor_type.values();
        let max_interval = windows
            .clone()
            .map(|w| w.calculation_interval)
            .max()
            .unwrap_or_else(Duration::zero);
        let max_back_off = windows
            .map(|w| w.back_off_duration)
            .max()
            .unwrap_or_else(Duration::zero);
        max_interval + max_back_off + Duration::seconds(CACHE_MARGIN_SECS)
    }

    /// Check the invariants the engine relies on.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        for monitor_type in self.channels_by_monitor_type.keys() {
            if !self.time_windows_by_monitor_type.contains_key(monitor_type) {
                return Err(DefinitionError::MissingTimeWindow {
                    station: self.station_name.clone(),
                    monitor_type: *monitor_type,
                });
            }
        }

        for (monitor_type, window) in &self.time_windows_by_monitor_type {
            if !window.is_valid() {
                return Err(DefinitionError::NegativeTimeWindow {
                    station: self.station_name.clone(),
                    monitor_type: *monitor_type,
                });
            }
        }

        let mut seen = BTreeSet::new();
        for channel in &self.channel_definitions {
            if !seen.insert(channel.channel_name.as_str()) {
                return Err(DefinitionError::DuplicateChannel {
                    station: self.station_name.clone(),
                    channel: channel.channel_name.clone(),
                });
            }
            for (monitor_type, threshold) in &channel.thresholds_by_monitor_type {
                if threshold.kind() != monitor_type.value_kind() {
                    return Err(DefinitionError::ThresholdKind {
                        channel: channel.channel_name.clone(),
                        monitor_type: *monitor_type,
                        found: threshold.kind(),
                    });
                }
            }
        }

        Ok(())
    }
}

/// Station part of a channel name: everything before the first `.`.
///
/// A name without a `.` is its own station.
pub fn station_name_of(channel_name: &str) -> &str {
    channel_name
        .split_once('.')
        .map_or(channel_name, |(station, _)| station)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EnvironmentIssueType;

    fn window(interval_secs: i64, back_off_secs: i64) -> TimeWindowDefinition {
        TimeWindowDefinition::new(
            Duration::seconds(interval_secs),
            Duration::seconds(back_off_secs),
        )
    }

    fn station() -> StationSohDefinition {
        StationSohDefinition {
            station_name: "STA".to_string(),
            monitor_types_for_rollup: [SohMonitorType::Lag].into_iter().collect(),
            channels_by_monitor_type: [(
                SohMonitorType::Lag,
                ["STA.BHZ".to_string()].into_iter().collect(),
            )]
            .into_iter()
            .collect(),
            channel_definitions: vec![ChannelSohDefinition {
                channel_name: "STA.BHZ".to_string(),
                monitor_types_for_rollup: [SohMonitorType::Lag].into_iter().collect(),
                thresholds_by_monitor_type: [(
                    SohMonitorType::Lag,
                    ThresholdDefinition::duration(Duration::seconds(1), Duration::seconds(2)),
                )]
                .into_iter()
                .collect(),
                nominal_sample_rate_hz: 40.0,
            }],
            time_windows_by_monitor_type: [
                (SohMonitorType::Lag, window(300, 30)),
                (SohMonitorType::Missing, window(600, 10)),
            ]
            .into_iter()
            .collect(),
        }
    }

    #[test]
    fn station_name_is_prefix_before_first_dot() {
        assert_eq!(station_name_of("ABC.ABC01.BHZ"), "ABC");
        assert_eq!(station_name_of("LONE"), "LONE");
    }

    #[test]
    fn cache_duration_is_widest_interval_plus_widest_back_off_plus_a_minute() {
        assert_eq!(station().cache_duration(), Duration::seconds(600 + 30 + 60));
    }

    #[test]
    fn valid_definition_passes() {
        assert_eq!(station().validate(), Ok(()));
        assert!(station().is_channel_assigned(SohMonitorType::Lag, "STA.BHZ"));
        assert_eq!(station().channels_for(SohMonitorType::Missing).count(), 0);
    }

    #[test]
    fn assigned_type_without_window_is_rejected() {
        let mut def = station();
        def.time_windows_by_monitor_type.remove(&SohMonitorType::Lag);
        assert_eq!(
            def.validate(),
            Err(DefinitionError::MissingTimeWindow {
                station: "STA".to_string(),
                monitor_type: SohMonitorType::Lag,
            })
        );
    }

    #[test]
    fn negative_window_is_rejected() {
        let mut def = station();
        def.time_windows_by_monitor_type
            .insert(SohMonitorType::Missing, window(10, -1));
        assert!(matches!(
            def.validate(),
            Err(DefinitionError::NegativeTimeWindow { .. })
        ));
    }

    #[test]
    fn percent_threshold_on_duration_monitor_is_rejected() {
        let mut def = station();
        def.channel_definitions[0]
            .thresholds_by_monitor_type
            .insert(SohMonitorType::Lag, ThresholdDefinition::percent(1.0, 2.0));
        assert!(matches!(
            def.validate(),
            Err(DefinitionError::ThresholdKind { .. })
        ));
    }

    #[test]
    fn environment_thresholds_skip_waveform_monitors() {
        let mut def = station().channel_definitions.remove(0);
        let clipped = EnvironmentIssueType::Clipped.monitor_type();
        def.thresholds_by_monitor_type
            .insert(clipped, ThresholdDefinition::percent(0.0, 10.0));
        let env: Vec<_> = def.environment_thresholds().map(|(t, _)| t).collect();
        assert_eq!(env, vec![clipped]);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn thresholds_deserialize_by_value_shape() {
        let duration: ThresholdDefinition =
            serde_json::from_str(r#"{"goodThreshold":"1s","marginalThreshold":"3s"}"#).unwrap();
        assert_eq!(
            duration.as_duration(),
            Some((Duration::seconds(1), Duration::seconds(3)))
        );
        let percent: ThresholdDefinition =
            serde_json::from_str(r#"{"goodThreshold":10.0,"marginalThreshold":30.0}"#).unwrap();
        assert_eq!(percent.as_percent(), Some((10.0, 30.0)));
    }
}
