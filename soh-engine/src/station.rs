//! Station rollup: the worst channel result per monitor type, then one
//! station status.

use std::collections::BTreeMap;

use soh_types::{ChannelSoh, MonitorValueAndStatus, SohMonitorType, SohStatus, StationSohDefinition};

use crate::channel::rollup_status;

/// The worst result for `monitor_type` among the channels assigned to it.
///
/// The worst status wins; within that status the largest value wins, with an
/// absent value losing to any concrete one.
pub fn worst_monitor_value(
    monitor_type: SohMonitorType,
    channel_sohs: &[ChannelSoh],
    mut is_assigned: impl FnMut(&str) -> bool,
) -> Option<MonitorValueAndStatus> {
    channel_sohs
        .iter()
        .filter(|soh| is_assigned(&soh.channel_name))
        .filter_map(|soh| soh.monitor_value(monitor_type))
        .max_by(|a, b| {
            b.status
                .cmp(&a.status)
                .then_with(|| a.value.magnitude_cmp(&b.value))
        })
        .copied()
}

/// One worst-channel value per monitor type with assigned channels.
pub fn station_monitor_values(
    definition: &StationSohDefinition,
    channel_sohs: &[ChannelSoh],
) -> BTreeMap<SohMonitorType, MonitorValueAndStatus> {
    definition
        .channels_by_monitor_type
        .iter()
        .filter_map(|(monitor_type, channels)| {
            worst_monitor_value(*monitor_type, channel_sohs, |name| channels.contains(name))
                .map(|value| (*monitor_type, value))
        })
        .collect()
}

/// Worst status among the station's rollup types, or `None` when none of
/// them produced a value.
pub fn station_status(
    definition: &StationSohDefinition,
    monitor_values: &BTreeMap<SohMonitorType, MonitorValueAndStatus>,
) -> Option<SohStatus> {
    rollup_status(monitor_values.values(), &definition.monitor_types_for_rollup)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::Duration;
    use soh_types::MonitorValue;

    use super::*;

    fn soh(name: &str, values: &[MonitorValueAndStatus]) -> ChannelSoh {
        ChannelSoh {
            channel_name: name.to_string(),
            status: SohStatus::worst(values.iter().map(|v| v.status)).unwrap_or(SohStatus::Marginal),
            monitor_values: values.iter().map(|v| (v.monitor_type, *v)).collect(),
        }
    }

    fn lag(ms: Option<i64>, status: SohStatus) -> MonitorValueAndStatus {
        MonitorValueAndStatus::duration(SohMonitorType::Lag, ms.map(Duration::milliseconds), status)
    }

    #[test]
    fn worst_status_bucket_wins_over_larger_values() {
        let sohs = [
            soh("A.1", &[lag(Some(900), SohStatus::Marginal)]),
            soh("A.2", &[lag(Some(100), SohStatus::Bad)]),
            soh("A.3", &[lag(Some(50), SohStatus::Bad)]),
        ];
        let worst = worst_monitor_value(SohMonitorType::Lag, &sohs, |_| true).unwrap();
        assert_eq!(worst, lag(Some(100), SohStatus::Bad));
    }

    #[test]
    fn concrete_value_beats_absent_in_same_bucket() {
        let sohs = [
            soh("A.1", &[lag(None, SohStatus::Marginal)]),
            soh("A.2", &[lag(Some(10), SohStatus::Marginal)]),
        ];
        let worst = worst_monitor_value(SohMonitorType::Lag, &sohs, |_| true).unwrap();
        assert_eq!(worst.value, MonitorValue::Duration(Some(Duration::milliseconds(10))));
    }

    #[test]
    fn unassigned_channels_are_ignored() {
        let sohs = [
            soh("A.1", &[lag(Some(10), SohStatus::Good)]),
            soh("A.2", &[lag(Some(999), SohStatus::Bad)]),
        ];
        let worst = worst_monitor_value(SohMonitorType::Lag, &sohs, |name| name == "A.1").unwrap();
        assert_eq!(worst.status, SohStatus::Good);
        assert!(worst_monitor_value(SohMonitorType::Missing, &sohs, |_| true).is_none());
    }

    #[test]
    fn station_status_uses_only_rollup_types() {
        let missing = MonitorValueAndStatus::percent(SohMonitorType::Missing, Some(90.0), SohStatus::Bad);
        let sohs = [
            soh("A.1", &[lag(Some(10), SohStatus::Good), missing]),
            soh("A.2", &[lag(Some(20), SohStatus::Good)]),
        ];
        let assigned: BTreeSet<String> = ["A.1".to_string(), "A.2".to_string()].into();
        let mut definition = StationSohDefinition {
            station_name: "A".to_string(),
            monitor_types_for_rollup: [SohMonitorType::Lag].into(),
            channels_by_monitor_type: [
                (SohMonitorType::Lag, assigned.clone()),
                (SohMonitorType::Missing, assigned),
            ]
            .into(),
            channel_definitions: Vec::new(),
            time_windows_by_monitor_type: BTreeMap::new(),
        };

        let values = station_monitor_values(&definition, &sohs);
        assert_eq!(values.len(), 2);
        assert_eq!(values[&SohMonitorType::Lag], lag(Some(20), SohStatus::Good));
        assert_eq!(station_status(&definition, &values), Some(SohStatus::Good));

        definition.monitor_types_for_rollup.insert(SohMonitorType::Missing);
        assert_eq!(station_status(&definition, &values), Some(SohStatus::Bad));

        definition.monitor_types_for_rollup = [SohMonitorType::Timeliness].into();
        assert_eq!(station_status(&definition, &values), None);
    }
}
