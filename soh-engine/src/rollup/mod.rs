//! Capability rollups: configurable status aggregation from monitor types up
//! to station groups.

mod capability;
mod config;
mod operator;

use std::collections::BTreeMap;

pub use capability::CapabilityRollup;
pub use config::{
    CapabilityRollupConfig, ChannelRollupConfig, DefaultOperands, RollupOperatorConfig,
    StationRollupConfig,
};
pub use operator::{Operand, Operands, RollupOperator};

/// How a channel's monitor statuses roll up into one channel status.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelRollupDefinition {
    pub monitors_to_channel_operator: RollupOperator,
}

/// How a station's channel statuses roll up into one station status.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StationRollupDefinition {
    pub channels_to_station_operator: RollupOperator,
    pub channel_rollups: BTreeMap<String, ChannelRollupDefinition>,
}

/// The full rollup tree of one station group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CapabilitySohRollupDefinition {
    pub station_group: String,
    pub stations_to_group_operator: RollupOperator,
    pub station_rollups: BTreeMap<String, StationRollupDefinition>,
}
