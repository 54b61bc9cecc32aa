//! Channel rollup: one worst-case status per channel.

use std::collections::{BTreeMap, BTreeSet};

use soh_types::{ChannelSoh, MonitorValueAndStatus, SohMonitorType, SohStatus, StationSohDefinition};

use crate::monitors::ChannelValues;

/// Worst status among the `values` whose monitor type is in `rollup_types`.
pub fn rollup_status<'a, I>(values: I, rollup_types: &BTreeSet<SohMonitorType>) -> Option<SohStatus>
where
    I: IntoIterator<Item = &'a MonitorValueAndStatus>,
{
    SohStatus::worst(
        values
            .into_iter()
            .filter(|value| rollup_types.contains(&value.monitor_type))
            .map(|value| value.status),
    )
}

/// Merge the four monitor families into `ChannelSoh` records, sorted by
/// channel name.
///
/// A channel with no result for any of its rollup types gets no record.
pub fn channel_sohs(definition: &StationSohDefinition, families: [ChannelValues; 4]) -> Vec<ChannelSoh> {
    let mut by_channel: BTreeMap<String, BTreeMap<SohMonitorType, MonitorValueAndStatus>> =
        BTreeMap::new();
    for family in families {
        for (channel, values) in family {
            by_channel
                .entry(channel)
                .or_default()
                .extend(values.into_iter().map(|value| (value.monitor_type, value)));
        }
    }

    by_channel
        .into_iter()
        .filter_map(|(channel_name, monitor_values)| {
            let channel = definition.channel_definition(&channel_name)?;
            let status = rollup_status(monitor_values.values(), &channel.monitor_types_for_rollup)?;
            Some(ChannelSoh {
                channel_name,
                status,
                monitor_values,
            })
        })
        .collect()
}
