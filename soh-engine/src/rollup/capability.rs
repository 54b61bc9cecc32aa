//! The capability rollup stage, run over a completed batch of station results.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use soh_types::{CapabilitySohRollup, ChannelSoh, SohStatus, StationSoh};
use tracing::debug;

use super::operator::Operand;
use super::{CapabilitySohRollupDefinition, StationRollupDefinition};

/// Evaluates every station group's rollup tree against one batch.
#[derive(Debug, Clone, Default)]
pub struct CapabilityRollup {
    definitions: Vec<CapabilitySohRollupDefinition>,
}

impl CapabilityRollup {
    pub fn new(definitions: Vec<CapabilitySohRollupDefinition>) -> Self {
        Self { definitions }
    }

    pub fn definitions(&self) -> &[CapabilitySohRollupDefinition] {
        &self.definitions
    }

    /// One rollup per station group.
    ///
    /// A station with the same rollup definition in several groups is
    /// evaluated once per call.
    pub fn evaluate(&self, station_sohs: &[StationSoh], time: DateTime<Utc>) -> Vec<CapabilitySohRollup> {
        let by_name: HashMap<&str, &StationSoh> = station_sohs
            .iter()
            .map(|soh| (soh.station_name.as_str(), soh))
            .collect();
        let mut memo: HashMap<(&str, &StationRollupDefinition), SohStatus> = HashMap::new();

        self.definitions
            .iter()
            .map(|definition| {
                let mut station_statuses = BTreeMap::new();
                let mut contributing_stations = BTreeSet::new();

                for leaf in definition.stations_to_group_operator.leaves() {
                    let Operand::Station(station) = leaf else {
                        continue;
                    };
                    let computed = definition
                        .station_rollups
                        .get(station)
                        .zip(by_name.get(station))
                        .map(|(rollup, soh)| {
                            *memo
                                .entry((station, rollup))
                                .or_insert_with(|| station_status(soh, rollup))
                        });
                    let status = computed.unwrap_or_else(|| {
                        debug!(
                            station_group = %definition.station_group,
                            station,
                            "no status for station, using MARGINAL"
                        );
                        SohStatus::Marginal
                    });
                    if computed.is_some() {
                        contributing_stations.insert(station.to_string());
                    }
                    station_statuses.insert(station.to_string(), status);
                }

                let status = definition
                    .stations_to_group_operator
                    .evaluate(&mut |operand| match operand {
                        Operand::Station(station) => station_statuses
                            .get(station)
                            .copied()
                            .unwrap_or(SohStatus::Marginal),
                        _ => SohStatus::Marginal,
                    });

                CapabilitySohRollup {
                    station_group: definition.station_group.clone(),
                    time,
                    status,
                    station_statuses,
                    contributing_stations,
                }
            })
            .collect()
    }
}

/// Station status from its channels, each channel rolled up from its monitors.
fn station_status(soh: &StationSoh, rollup: &StationRollupDefinition) -> SohStatus {
    rollup.channels_to_station_operator.evaluate(&mut |operand| {
        let Operand::Channel(channel) = operand else {
            return SohStatus::Marginal;
        };
        let Some(channel_rollup) = rollup.channel_rollups.get(channel) else {
            return SohStatus::Marginal;
        };
        let channel_soh = soh.channel_soh(channel);
        channel_rollup
            .monitors_to_channel_operator
            .evaluate(&mut |operand| monitor_status(channel_soh, operand))
    })
}

fn monitor_status(channel_soh: Option<&ChannelSoh>, operand: Operand<'_>) -> SohStatus {
    match operand {
        Operand::MonitorType(monitor_type) => channel_soh
            .and_then(|soh| soh.monitor_value(monitor_type))
            .map_or(SohStatus::Marginal, |value| value.status),
        _ => SohStatus::Marginal,
    }
}
