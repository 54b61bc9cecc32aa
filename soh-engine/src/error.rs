//! Error types for the engine.

use soh_types::{DefinitionError, SohMonitorType};
use thiserror::Error;

/// Configuration rejected at load time, before any batch is processed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A rollup operator object has a field that is not part of the schema.
    #[error("{0} is not a valid field for rollup operators")]
    UnknownField(String),

    /// A rollup operator object has no `operatorType`.
    #[error("rollup operator is missing operatorType")]
    MissingOperatorType,

    /// `operatorType` is not one of BEST_OF, WORST_OF, MIN_GOOD_OF.
    #[error("unknown rollup operator type: {0}")]
    UnknownOperatorType(String),

    /// More than one operand field is populated on the same operator.
    #[error("Only {allowed} can be specified, but found {found:?}")]
    ExclusiveOperands {
        allowed: &'static str,
        found: Vec<&'static str>,
    },

    /// MIN_GOOD_OF without both count thresholds.
    #[error("MIN_GOOD_OF requires goodThreshold and marginalThreshold")]
    MissingMinGoodOfThresholds,

    /// Count thresholds on an operator other than MIN_GOOD_OF.
    #[error("goodThreshold and marginalThreshold are only valid for MIN_GOOD_OF, not {0}")]
    UnexpectedThresholds(&'static str),

    /// A terminal operator names operands of the wrong kind for its level.
    #[error("{level} rollup operator cannot take {found}")]
    WrongOperandDomain {
        level: &'static str,
        found: &'static str,
    },

    /// An operand name in a capability definition that does not belong to it.
    #[error("{kind} {name} is not part of {owner}")]
    UnknownOperand {
        kind: &'static str,
        name: String,
        owner: String,
    },

    /// A station or channel definition is malformed.
    #[error(transparent)]
    Definition(#[from] DefinitionError),
}

/// A per-station computation failure. The station is left out of the batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalculationError {
    /// A time window with a negative interval or back-off.
    #[error("{0} may not be negative")]
    NegativeDuration(&'static str),

    /// A trim window whose start is not before its end.
    #[error("minStartTime is not before maxEndTime")]
    EmptyTrimWindow,

    /// Environmental observations from more than one channel given for a single channel.
    #[error("All environment issues must be from the same channel: expected {expected}, found {found}")]
    MixedChannels { expected: String, found: String },

    /// A monitor needs a time window the station does not define.
    #[error("station {station} has no time window for {monitor_type}")]
    MissingTimeWindow {
        station: String,
        monitor_type: SohMonitorType,
    },

    /// A threshold of the wrong kind for its monitor type.
    #[error("channel {channel} has a threshold of the wrong kind for {monitor_type}")]
    ThresholdKind {
        channel: String,
        monitor_type: SohMonitorType,
    },
}

/// Top-level error for engine operations.
#[derive(Debug, Error)]
pub enum SohError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Calculation(#[from] CalculationError),

    /// The history source failed while restoring state at startup.
    #[error("history query failed: {0}")]
    History(String),

    /// The worker pool could not be created.
    #[error("failed to build worker pool: {0}")]
    WorkerPool(String),

    /// A batch task panicked or was cancelled.
    #[error("batch task failed: {0}")]
    Task(String),

    /// An output could not be written.
    #[error("output failed: {0}")]
    Output(#[from] std::io::Error),
}

impl From<DefinitionError> for SohError {
    fn from(err: DefinitionError) -> Self {
        SohError::Config(ConfigError::Definition(err))
    }
}
