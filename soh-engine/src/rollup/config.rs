//! Raw capability rollup configuration and its resolution into operator trees.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use soh_types::SohMonitorType;

use super::operator::{Operand, Operands, RollupOperator};
use super::{CapabilitySohRollupDefinition, ChannelRollupDefinition, StationRollupDefinition};
use crate::error::ConfigError;

const STATION_OPERANDS: &str = "stationOperands";
const CHANNEL_OPERANDS: &str = "channelOperands";
const MONITOR_TYPE_OPERANDS: &str = "sohMonitorTypeOperands";
const OPERATOR_OPERANDS: &str = "rollupOperatorOperands";

/// A rollup operator as written in configuration.
///
/// At most one of the operand lists may be populated. A node with nested
/// operators is internal and must leave every leaf list empty; a terminal
/// node with no leaf list takes the default operands of its level.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollupOperatorConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub good_threshold: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marginal_threshold: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub station_operands: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub channel_operands: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub soh_monitor_type_operands: Vec<SohMonitorType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rollup_operator_operands: Vec<RollupOperatorConfig>,
    /// Anything else; rejected during resolution.
    #[serde(flatten)]
    pub unknown: BTreeMap<String, serde_json::Value>,
}

/// The operands a terminal operator at a given level falls back to.
#[derive(Debug, Clone, Copy)]
pub enum DefaultOperands<'a> {
    Stations(&'a [String]),
    Channels(&'a [String]),
    MonitorTypes(&'a [SohMonitorType]),
}

impl DefaultOperands<'_> {
    fn level(&self) -> &'static str {
        match self {
            DefaultOperands::Stations(_) => "station group",
            DefaultOperands::Channels(_) => "station",
            DefaultOperands::MonitorTypes(_) => "channel",
        }
    }

    fn field(&self) -> &'static str {
        match self {
            DefaultOperands::Stations(_) => STATION_OPERANDS,
            DefaultOperands::Channels(_) => CHANNEL_OPERANDS,
            DefaultOperands::MonitorTypes(_) => MONITOR_TYPE_OPERANDS,
        }
    }

    fn to_operands(self) -> Operands {
        match self {
            DefaultOperands::Stations(names) => Operands::Stations(names.to_vec()),
            DefaultOperands::Channels(names) => Operands::Channels(names.to_vec()),
            DefaultOperands::MonitorTypes(types) => Operands::MonitorTypes(types.to_vec()),
        }
    }
}

enum Kind {
    BestOf,
    WorstOf,
    MinGoodOf { good: usize, marginal: usize },
}

impl RollupOperatorConfig {
    fn kind(&self) -> Result<Kind, ConfigError> {
        let operator_type = self
            .operator_type
            .as_deref()
            .ok_or(ConfigError::MissingOperatorType)?;

        let has_thresholds = self.good_threshold.is_some() || self.marginal_threshold.is_some();
        match operator_type {
            "BEST_OF" if has_thresholds => Err(ConfigError::UnexpectedThresholds("BEST_OF")),
            "BEST_OF" => Ok(Kind::BestOf),
            "WORST_OF" if has_thresholds => Err(ConfigError::UnexpectedThresholds("WORST_OF")),
            "WORST_OF" => Ok(Kind::WorstOf),
            "MIN_GOOD_OF" => match (self.good_threshold, self.marginal_threshold) {
                (Some(good), Some(marginal)) => Ok(Kind::MinGoodOf { good, marginal }),
                _ => Err(ConfigError::MissingMinGoodOfThresholds),
            },
            other => Err(ConfigError::UnknownOperatorType(other.to_string())),
        }
    }

    fn populated_leaf_fields(&self) -> Vec<&'static str> {
        [
            (STATION_OPERANDS, self.station_operands.is_empty()),
            (CHANNEL_OPERANDS, self.channel_operands.is_empty()),
            (MONITOR_TYPE_OPERANDS, self.soh_monitor_type_operands.is_empty()),
        ]
        .into_iter()
        .filter_map(|(field, empty)| (!empty).then_some(field))
        .collect()
    }

    /// Resolve into an operator tree, filling empty terminal nodes from
    /// `defaults` and rejecting leaves from another level's domain.
    pub fn resolve(&self, defaults: DefaultOperands<'_>) -> Result<RollupOperator, ConfigError> {
        if let Some(field) = self.unknown.keys().next() {
            return Err(ConfigError::UnknownField(field.clone()));
        }

        let kind = self.kind()?;
        let populated = self.populated_leaf_fields();

        let operands = if !self.rollup_operator_operands.is_empty() {
            if !populated.is_empty() {
                return Err(ConfigError::ExclusiveOperands {
                    allowed: OPERATOR_OPERANDS,
                    found: populated,
                });
            }
            Operands::Operators(
                self.rollup_operator_operands
                    .iter()
                    .map(|nested| nested.resolve(defaults))
                    .collect::<Result<_, _>>()?,
            )
        } else {
            match populated.as_slice() {
                [] => defaults.to_operands(),
                [field] if *field == defaults.field() => match defaults {
                    DefaultOperands::Stations(_) => Operands::Stations(self.station_operands.clone()),
                    DefaultOperands::Channels(_) => Operands::Channels(self.channel_operands.clone()),
                    DefaultOperands::MonitorTypes(_) => {
                        Operands::MonitorTypes(self.soh_monitor_type_operands.clone())
                    }
                },
                [field] => {
                    return Err(ConfigError::WrongOperandDomain {
                        level: defaults.level(),
                        found: *field,
                    })
                }
                _ => {
                    return Err(ConfigError::ExclusiveOperands {
                        allowed: defaults.field(),
                        found: populated,
                    })
                }
            }
        };

        Ok(match kind {
            Kind::BestOf => RollupOperator::best_of(operands),
            Kind::WorstOf => RollupOperator::worst_of(operands),
            Kind::MinGoodOf { good, marginal } => RollupOperator::min_good_of(good, marginal, operands),
        })
    }
}

/// Channel-level rollup configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelRollupConfig {
    pub soh_monitors_to_channel_rollup_operator: RollupOperatorConfig,
}

/// Station-level rollup configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationRollupConfig {
    pub channels_to_station_rollup_operator: RollupOperatorConfig,
    #[serde(default)]
    pub channel_rollups: BTreeMap<String, ChannelRollupConfig>,
}

/// Rollup configuration of one station group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityRollupConfig {
    pub station_group: String,
    pub stations_to_group_rollup_operator: RollupOperatorConfig,
    #[serde(default)]
    pub station_rollups: BTreeMap<String, StationRollupConfig>,
}

impl CapabilityRollupConfig {
    /// Resolve the whole group: group operator over its stations, each
    /// station's operator over its channels, each channel's operator over
    /// monitor types.
    pub fn resolve(&self) -> Result<CapabilitySohRollupDefinition, ConfigError> {
        let stations: Vec<String> = self.station_rollups.keys().cloned().collect();
        let stations_to_group_operator = self
            .stations_to_group_rollup_operator
            .resolve(DefaultOperands::Stations(&stations))?;
        check_members(&stations_to_group_operator, &stations, "station", &self.station_group)?;

        let all_monitor_types = SohMonitorType::all();
        let station_rollups = self
            .station_rollups
            .iter()
            .map(|(station, config)| -> Result<_, ConfigError> {
                let channels: Vec<String> = config.channel_rollups.keys().cloned().collect();
                let channels_to_station_operator = config
                    .channels_to_station_rollup_operator
                    .resolve(DefaultOperands::Channels(&channels))?;
                check_members(&channels_to_station_operator, &channels, "channel", station)?;

                let channel_rollups = config
                    .channel_rollups
                    .iter()
                    .map(|(channel, config)| -> Result<_, ConfigError> {
                        let monitors_to_channel_operator = config
                            .soh_monitors_to_channel_rollup_operator
                            .resolve(DefaultOperands::MonitorTypes(&all_monitor_types))?;
                        Ok((
                            channel.clone(),
                            ChannelRollupDefinition {
                                monitors_to_channel_operator,
                            },
                        ))
                    })
                    .collect::<Result<_, ConfigError>>()?;

                Ok((
                    station.clone(),
                    StationRollupDefinition {
                        channels_to_station_operator,
                        channel_rollups,
                    },
                ))
            })
            .collect::<Result<_, ConfigError>>()?;

        Ok(CapabilitySohRollupDefinition {
            station_group: self.station_group.clone(),
            stations_to_group_operator,
            station_rollups,
        })
    }
}

/// Every station or channel leaf of `operator` must be one of `members`.
fn check_members(
    operator: &RollupOperator,
    members: &[String],
    kind: &'static str,
    owner: &str,
) -> Result<(), ConfigError> {
    for leaf in operator.leaves() {
        let name = match leaf {
            Operand::Station(name) | Operand::Channel(name) => name,
            Operand::MonitorType(_) => continue,
        };
        if !members.iter().any(|member| member == name) {
            return Err(ConfigError::UnknownOperand {
                kind,
                name: name.to_string(),
                owner: owner.to_string(),
            });
        }
    }
    Ok(())
}
