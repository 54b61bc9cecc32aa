//! Threshold classification of computed monitor values.

use chrono::Duration;
use soh_types::SohStatus;

/// Classify `value` against a good/marginal threshold pair.
///
/// Higher values are worse. An absent value is `Marginal`; a value below
/// `zero` is treated as a faulty signal and is `Bad` even if it is also
/// under the good threshold.
pub fn classify<T: PartialOrd>(value: Option<T>, zero: T, good: T, marginal: T) -> SohStatus {
    value.map_or(SohStatus::Marginal, |v| {
        if v < zero {
            SohStatus::Bad
        } else if v <= good {
            SohStatus::Good
        } else if v <= marginal {
            SohStatus::Marginal
        } else {
            SohStatus::Bad
        }
    })
}

/// Classify a duration with zero as the lower bound.
pub fn classify_duration(value: Option<Duration>, good: Duration, marginal: Duration) -> SohStatus {
    classify(value, Duration::zero(), good, marginal)
}

/// Classify a percentage with 0% as the lower bound.
pub fn classify_percent(value: Option<f64>, good: f64, marginal: f64) -> SohStatus {
    classify(value, 0.0, good, marginal)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn absent_is_marginal() {
        assert_eq!(classify_percent(None, 10.0, 30.0), SohStatus::Marginal);
        assert_eq!(
            classify_duration(None, Duration::seconds(1), Duration::seconds(3)),
            SohStatus::Marginal
        );
    }

    #[test]
    fn boundaries_are_inclusive() {
        assert_eq!(classify_percent(Some(10.0), 10.0, 30.0), SohStatus::Good);
        assert_eq!(classify_percent(Some(30.0), 10.0, 30.0), SohStatus::Marginal);
        assert_eq!(classify_percent(Some(30.0001), 10.0, 30.0), SohStatus::Bad);
    }

    #[test]
    fn below_zero_is_bad_even_under_good() {
        assert_eq!(
            classify_duration(
                Some(Duration::milliseconds(-1)),
                Duration::seconds(1),
                Duration::seconds(3)
            ),
            SohStatus::Bad
        );
    }

    #[test]
    fn duration_between_thresholds_is_marginal() {
        assert_eq!(
            classify_duration(
                Some(Duration::seconds(2)),
                Duration::seconds(1),
                Duration::seconds(3)
            ),
            SohStatus::Marginal
        );
    }

    proptest! {
        #[test]
        fn higher_values_are_never_better(
            a in 0.0f64..200.0,
            b in 0.0f64..200.0,
            good in 0.0f64..100.0,
            extra in 0.0f64..100.0,
        ) {
            let marginal = good + extra;
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(
                classify_percent(Some(lo), good, marginal) >= classify_percent(Some(hi), good, marginal)
            );
        }
    }
}
