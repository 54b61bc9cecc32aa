//! Calculation windows: selecting, trimming and merging time-stamped data.

use chrono::{DateTime, Duration, Utc};
use soh_types::TimeWindowDefinition;

use crate::error::CalculationError;

/// A half-open span of time `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Span {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Span {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// True when `[start, end)` intersects this span.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        start < self.end && end > self.start
    }
}

/// The active window `[now - back_off - interval, now - back_off)`.
pub fn active_window(
    now: DateTime<Utc>,
    definition: &TimeWindowDefinition,
) -> Result<Span, CalculationError> {
    if definition.calculation_interval < Duration::zero() {
        return Err(CalculationError::NegativeDuration("calculationInterval"));
    }
    if definition.back_off_duration < Duration::zero() {
        return Err(CalculationError::NegativeDuration("backOffDuration"));
    }

    let end = now - definition.back_off_duration;
    Ok(Span::new(end - definition.calculation_interval, end))
}

/// Keep the items whose `[start, end)` intersects the active window.
pub fn filter_overlap<T, I, FS, FE>(
    items: I,
    start_of: FS,
    end_of: FE,
    definition: &TimeWindowDefinition,
    now: DateTime<Utc>,
) -> Result<impl Iterator<Item = T>, CalculationError>
where
    I: IntoIterator<Item = T>,
    FS: Fn(&T) -> DateTime<Utc>,
    FE: Fn(&T) -> DateTime<Utc>,
{
    let window = active_window(now, definition)?;
    Ok(items
        .into_iter()
        .filter(move |item| window.overlaps(start_of(item), end_of(item))))
}

/// Clip `span` to `[window_start, window_end)`.
///
/// Returns `None` if the span has no positive length, ends at or before
/// `window_start`, or starts at or after `window_end`.
pub fn trim(
    span: Span,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Result<Option<Span>, CalculationError> {
    if window_start >= window_end {
        return Err(CalculationError::EmptyTrimWindow);
    }
    Ok(clip(span, window_start, window_end))
}

fn clip(span: Span, window_start: DateTime<Utc>, window_end: DateTime<Utc>) -> Option<Span> {
    if span.start >= span.end || span.end <= window_start || span.start >= window_end {
        return None;
    }
    Some(Span::new(
        span.start.max(window_start),
        span.end.min(window_end),
    ))
}

/// Percentage of `[window_start, window_end)` not covered by `spans`.
///
/// Spans are clipped to the window, sorted and merged into disjoint runs;
/// each run is credited one nominal sample period, capped at the window
/// length, so a frame boundary is not counted as a gap. The result is clamped to `[0, 100]`. A window of zero
/// length is 0% missing; no spans inside the window is 100% missing.
pub fn missing_percentage<I>(
    spans: I,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    nominal_sample_rate_hz: f64,
) -> f64
where
    I: IntoIterator<Item = Span>,
{
    if window_start >= window_end {
        return 0.0;
    }

    let interval = window_end - window_start;
    let adjustment = sample_period(nominal_sample_rate_hz)
        .map_or(Duration::zero(), |period| period.min(interval));

    let mut clipped: Vec<Span> = spans
        .into_iter()
        .filter_map(|span| clip(span, window_start, window_end))
        .collect();
    clipped.sort_by_key(|span| span.start);

    let mut runs: Vec<Span> = Vec::with_capacity(clipped.len());
    for span in clipped {
        match runs.last_mut() {
            Some(top) if top.end >= span.start => {
                if top.end < span.end {
                    top.end = span.end;
                }
            }
            _ => runs.push(span),
        }
    }

    if runs.is_empty() {
        return 100.0;
    }

    let acquired: f64 = runs
        .iter()
        .map(|run| seconds(run.duration().checked_add(&adjustment).unwrap_or(interval)))
        .sum();

    (100.0 * (1.0 - acquired / seconds(interval))).clamp(0.0, 100.0)
}

/// One sample period in whole milliseconds, or `None` for a rate that is not
/// positive. Periods too long to represent saturate at `Duration::MAX`.
fn sample_period(nominal_sample_rate_hz: f64) -> Option<Duration> {
    if nominal_sample_rate_hz.is_nan() || nominal_sample_rate_hz <= 0.0 {
        return None;
    }
    let millis = 1000.0 / nominal_sample_rate_hz;
    Some(
        Duration::try_milliseconds(millis as i64)
            .filter(|_| millis.is_finite())
            .unwrap_or(Duration::MAX),
    )
}

/// Fractional seconds of a duration.
pub(crate) fn seconds(d: Duration) -> f64 {
    d.num_nanoseconds()
        .map_or(d.num_milliseconds() as f64 / 1e3, |nanos| nanos as f64 / 1e9)
}
