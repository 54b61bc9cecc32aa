//! Monitor type vocabulary.
//!
//! A monitor type names one health dimension: `LAG`, `MISSING`, `TIMELINESS`,
//! or one `ENV_*` dimension per kind of boolean environmental issue.

use core::fmt;
use core::str::FromStr;

/// Error returned when a monitor or issue type name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown monitor type: {0}")]
pub struct UnknownMonitorType(pub String);

macro_rules! environment_issue_types {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        /// Kind of boolean environmental issue reported alongside acquired data.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum EnvironmentIssueType {
            $($variant),+
        }

        impl EnvironmentIssueType {
            /// Every issue type, in declaration order.
            pub const ALL: &'static [EnvironmentIssueType] = &[$(EnvironmentIssueType::$variant),+];

            /// Returns the upper-case name used on the wire.
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(EnvironmentIssueType::$variant => $name),+
                }
            }
        }

        impl FromStr for EnvironmentIssueType {
            type Err = UnknownMonitorType;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(EnvironmentIssueType::$variant),)+
                    _ => Err(UnknownMonitorType(s.to_string())),
                }
            }
        }
    };
}

environment_issue_types! {
    AuthenticationSealBroken => "AUTHENTICATION_SEAL_BROKEN",
    BackupPowerUnstable => "BACKUP_POWER_UNSTABLE",
    CalibrationUnderway => "CALIBRATION_UNDERWAY",
    Clipped => "CLIPPED",
    ClockDifferentialInMicroseconds => "CLOCK_DIFFERENTIAL_IN_MICROSECONDS",
    ClockDifferentialTooLarge => "CLOCK_DIFFERENTIAL_TOO_LARGE",
    DeadSensorChannel => "DEAD_SENSOR_CHANNEL",
    DigitizerAnalogInputShorted => "DIGITIZER_ANALOG_INPUT_SHORTED",
    DigitizerCalibrationLoopBack => "DIGITIZER_CALIBRATION_LOOP_BACK",
    DigitizingEquipmentOpen => "DIGITIZING_EQUIPMENT_OPEN",
    DurationOutage => "DURATION_OUTAGE",
    EquipmentHousingOpen => "EQUIPMENT_HOUSING_OPEN",
    EquipmentMoved => "EQUIPMENT_MOVED",
    GpsReceiverOff => "GPS_RECEIVER_OFF",
    GpsReceiverUnlocked => "GPS_RECEIVER_UNLOCKED",
    LastGpsSyncTime => "LAST_GPS_SYNC_TIME",
    MainPowerFailure => "MAIN_POWER_FAILURE",
    MeanAmplitude => "MEAN_AMPLITUDE",
    StationPowerVoltage => "STATION_POWER_VOLTAGE",
    VaultDoorOpened => "VAULT_DOOR_OPENED",
    ZeroedData => "ZEROED_DATA",
}

impl EnvironmentIssueType {
    /// The monitor type this issue kind is reported under.
    pub const fn monitor_type(&self) -> SohMonitorType {
        SohMonitorType::Environment(*self)
    }
}

impl fmt::Display for EnvironmentIssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a monitor produces a duration or a percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Duration,
    Percent,
}

/// One health dimension of a channel or station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SohMonitorType {
    Lag,
    Missing,
    Timeliness,
    Environment(EnvironmentIssueType),
}

impl SohMonitorType {
    const ENV_PREFIX: &'static str = "ENV_";

    /// Every valid monitor type: the three waveform monitors followed by one
    /// per environmental issue kind.
    pub fn all() -> Vec<SohMonitorType> {
        [
            SohMonitorType::Lag,
            SohMonitorType::Missing,
            SohMonitorType::Timeliness,
        ]
        .into_iter()
        .chain(EnvironmentIssueType::ALL.iter().map(|t| t.monitor_type()))
        .collect()
    }

    pub fn is_environment_issue(&self) -> bool {
        matches!(self, SohMonitorType::Environment(_))
    }

    /// The environmental issue kind behind an `ENV_*` monitor type.
    pub fn environment_issue(&self) -> Option<EnvironmentIssueType> {
        match self {
            SohMonitorType::Environment(t) => Some(*t),
            _ => None,
        }
    }

    /// The kind of value this monitor computes.
    pub fn value_kind(&self) -> ValueKind {
        match self {
            SohMonitorType::Lag | SohMonitorType::Timeliness => ValueKind::Duration,
            SohMonitorType::Missing | SohMonitorType::Environment(_) => ValueKind::Percent,
        }
    }
}

impl fmt::Display for SohMonitorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SohMonitorType::Lag => f.write_str("LAG"),
            SohMonitorType::Missing => f.write_str("MISSING"),
            SohMonitorType::Timeliness => f.write_str("TIMELINESS"),
            SohMonitorType::Environment(t) => write!(f, "{}{}", Self::ENV_PREFIX, t.as_str()),
        }
    }
}

impl FromStr for SohMonitorType {
    type Err = UnknownMonitorType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LAG" => Ok(SohMonitorType::Lag),
            "MISSING" => Ok(SohMonitorType::Missing),
            "TIMELINESS" => Ok(SohMonitorType::Timeliness),
            other => other
                .strip_prefix(Self::ENV_PREFIX)
                .and_then(|issue| issue.parse::<EnvironmentIssueType>().ok())
                .map(SohMonitorType::Environment)
                .ok_or_else(|| UnknownMonitorType(s.to_string())),
        }
    }
}

/// Kind of station-wide summary value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum StationAggregateType {
    Lag,
    Missing,
    Timeliness,
    EnvironmentalIssues,
}

#[cfg(feature = "serde")]
mod serde_impls {
    use super::{EnvironmentIssueType, SohMonitorType};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    impl Serialize for SohMonitorType {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.collect_str(self)
        }
    }

    impl<'de> Deserialize<'de> for SohMonitorType {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(serde::de::Error::custom)
        }
    }

    impl Serialize for EnvironmentIssueType {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.serialize_str(self.as_str())
        }
    }

    impl<'de> Deserialize<'de> for EnvironmentIssueType {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(serde::de::Error::custom)
        }
    }
}
