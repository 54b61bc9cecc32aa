//! Three-valued health verdict.

use core::fmt;

/// State-of-health status for a monitor, channel, station or station group.
///
/// Variants are declared worst first, so the derived ordering is
/// `Bad < Marginal < Good` and the worst of a set is its minimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum SohStatus {
    Bad,
    Marginal,
    Good,
}

impl SohStatus {
    /// All statuses, worst first.
    pub const ALL: [SohStatus; 3] = [SohStatus::Bad, SohStatus::Marginal, SohStatus::Good];

    /// Returns the upper-case name used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            SohStatus::Bad => "BAD",
            SohStatus::Marginal => "MARGINAL",
            SohStatus::Good => "GOOD",
        }
    }

    /// Worst status of a set, or `None` for an empty set.
    pub fn worst<I: IntoIterator<Item = SohStatus>>(statuses: I) -> Option<SohStatus> {
        statuses.into_iter().min()
    }

    /// Best status of a set, or `None` for an empty set.
    pub fn best<I: IntoIterator<Item = SohStatus>>(statuses: I) -> Option<SohStatus> {
        statuses.into_iter().max()
    }

    /// True when this status is `other` or better.
    pub fn is_at_least(&self, other: SohStatus) -> bool {
        *self >= other
    }
}

impl fmt::Display for SohStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
