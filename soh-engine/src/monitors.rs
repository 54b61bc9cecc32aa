//! Per-channel monitor calculators: timeliness, lag, missing and
//! environmental issues.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use soh_types::{
    ChannelSohDefinition, EnvironmentIssue, MonitorValueAndStatus, SohMonitorType, SohStatus,
    StationSohDefinition, ThresholdDefinition, TimeWindowDefinition,
};
use tracing::{debug, info, warn};

use crate::batch::{BatchData, WaveformReception};
use crate::cache::TimelinessCache;
use crate::classify::{classify_duration, classify_percent};
use crate::error::CalculationError;
use crate::window::{active_window, filter_overlap, missing_percentage};

/// How lag samples are combined into one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LagCombiner {
    /// Worst sample; used per channel.
    Max,
    /// Mean over samples; used for the station aggregate.
    Mean,
}

impl LagCombiner {
    pub fn combine<I>(self, lags: I) -> Option<Duration>
    where
        I: IntoIterator<Item = Duration>,
    {
        let mut lags = lags.into_iter();
        match self {
            LagCombiner::Max => lags.max(),
            LagCombiner::Mean => {
                let first = lags.next()?;
                let (sum, count) = lags.fold((first, 1i32), |(sum, count), lag| (sum + lag, count + 1));
                Some(sum / count)
            }
        }
    }
}

/// Timeliness of a channel whose latest data ends at `latest_end`.
pub fn timeliness(
    latest_end: DateTime<Utc>,
    now: DateTime<Utc>,
    good: Duration,
    marginal: Duration,
) -> MonitorValueAndStatus {
    let value = now - latest_end;
    let status = if latest_end > now {
        debug!(%latest_end, %now, "latest sample ends in the future, timeliness is BAD");
        SohStatus::Bad
    } else {
        classify_duration(Some(value), good, marginal)
    };
    MonitorValueAndStatus::duration(SohMonitorType::Timeliness, Some(value), status)
}

/// Lag over the waveforms that overlap the active window, combined with `combiner`.
pub fn lag<'a, I>(
    waveforms: I,
    window: &TimeWindowDefinition,
    combiner: LagCombiner,
    now: DateTime<Utc>,
) -> Result<Option<Duration>, CalculationError>
where
    I: IntoIterator<Item = &'a WaveformReception>,
{
    let in_window = filter_overlap(
        waveforms,
        |w| w.summary.start_time,
        |w| w.summary.end_time,
        window,
        now,
    )?;

    Ok(combiner.combine(in_window.map(|w| {
        let lag = w.lag();
        if lag < Duration::zero() {
            warn!(
                channel = %w.summary.channel_name,
                reception_time = %w.reception_time,
                end_time = %w.summary.end_time,
                "waveform received before it ended"
            );
        }
        lag
    })))
}

/// Percentage of the active window not covered by `waveforms`.
pub fn missing(
    waveforms: &[WaveformReception],
    window: &TimeWindowDefinition,
    nominal_sample_rate_hz: f64,
    now: DateTime<Utc>,
) -> Result<f64, CalculationError> {
    let span = active_window(now, window)?;
    if waveforms.is_empty() {
        return Ok(100.0);
    }
    Ok(missing_percentage(
        waveforms.iter().map(WaveformReception::span),
        span.start,
        span.end,
        nominal_sample_rate_hz,
    ))
}

/// Percentage of `issues` that are true, or `None` when there are none.
pub fn percent_true<'a, I>(issues: I) -> Option<f64>
where
    I: IntoIterator<Item = &'a EnvironmentIssue>,
{
    let (present, total) = issues
        .into_iter()
        .fold((0usize, 0usize), |(present, total), issue| {
            (present + usize::from(issue.status), total + 1)
        });
    (total > 0).then(|| 100.0 * present as f64 / total as f64)
}

/// Environmental statuses of one channel, one entry per environmental
/// threshold the channel defines.
///
/// Issue types without a threshold are ignored. Each type is evaluated over
/// its own monitor type's window, and every issue inside a window must
/// belong to `channel`.
pub fn environment_status(
    issues: &[EnvironmentIssue],
    channel: &ChannelSohDefinition,
    station: &StationSohDefinition,
    now: DateTime<Utc>,
) -> Result<Vec<MonitorValueAndStatus>, CalculationError> {
    let mut in_window = Vec::with_capacity(issues.len());
    for issue in issues {
        let monitor_type = issue.issue_type.monitor_type();
        if channel.threshold(monitor_type).is_none() {
            info!(
                channel = %channel.channel_name,
                %monitor_type,
                "no threshold for environmental issue type, ignoring"
            );
            continue;
        }
        let window = active_window(now, station_window(station, monitor_type)?)?;
        if window.overlaps(issue.start_time, issue.end_time) {
            in_window.push(issue);
        }
    }

    if let Some(other) = in_window
        .iter()
        .find(|issue| issue.channel_name != channel.channel_name)
    {
        return Err(CalculationError::MixedChannels {
            expected: channel.channel_name.clone(),
            found: other.channel_name.clone(),
        });
    }

    channel
        .environment_thresholds()
        .map(|(monitor_type, threshold)| {
            let (good, marginal) = percent_threshold(channel, monitor_type, threshold)?;
            // a configured type needs a window even when no issue reported
            station_window(station, monitor_type)?;
            let value = percent_true(
                in_window
                    .iter()
                    .copied()
                    .filter(|issue| issue.issue_type.monitor_type() == monitor_type),
            );
            Ok(MonitorValueAndStatus::percent(
                monitor_type,
                value,
                classify_percent(value, good, marginal),
            ))
        })
        .collect()
}

pub(crate) fn station_window(
    station: &StationSohDefinition,
    monitor_type: SohMonitorType,
) -> Result<&TimeWindowDefinition, CalculationError> {
    station
        .time_window(monitor_type)
        .ok_or_else(|| CalculationError::MissingTimeWindow {
            station: station.station_name.clone(),
            monitor_type,
        })
}

fn duration_threshold(
    channel: &ChannelSohDefinition,
    monitor_type: SohMonitorType,
    threshold: &ThresholdDefinition,
) -> Result<(Duration, Duration), CalculationError> {
    threshold
        .as_duration()
        .ok_or_else(|| CalculationError::ThresholdKind {
            channel: channel.channel_name.clone(),
            monitor_type,
        })
}

fn percent_threshold(
    channel: &ChannelSohDefinition,
    monitor_type: SohMonitorType,
    threshold: &ThresholdDefinition,
) -> Result<(f64, f64), CalculationError> {
    threshold
        .as_percent()
        .ok_or_else(|| CalculationError::ThresholdKind {
            channel: channel.channel_name.clone(),
            monitor_type,
        })
}

/// One station's view of a batch: its definition plus the shared batch maps.
#[derive(Debug, Clone, Copy)]
pub struct StationContext<'a> {
    pub definition: &'a StationSohDefinition,
    pub batch: &'a BatchData,
    pub cache: &'a TimelinessCache,
    pub now: DateTime<Utc>,
}

/// Monitor results of one family, by channel name.
pub type ChannelValues = BTreeMap<String, Vec<MonitorValueAndStatus>>;

impl<'a> StationContext<'a> {
    pub fn new(
        definition: &'a StationSohDefinition,
        batch: &'a BatchData,
        cache: &'a TimelinessCache,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            definition,
            batch,
            cache,
            now,
        }
    }

    fn channels_with(
        &self,
        monitor_type: SohMonitorType,
    ) -> impl Iterator<Item = (&'a ChannelSohDefinition, &'a ThresholdDefinition)> {
        self.definition
            .channel_definitions
            .iter()
            .filter_map(move |channel| channel.threshold(monitor_type).map(|t| (channel, t)))
    }

    /// Timeliness for every channel with a timeliness threshold.
    pub fn timeliness_by_channel(&self) -> Result<ChannelValues, CalculationError> {
        self.channels_with(SohMonitorType::Timeliness)
            .map(|(channel, threshold)| {
                let (good, marginal) =
                    duration_threshold(channel, SohMonitorType::Timeliness, threshold)?;
                let value = match self.cache.get(&channel.channel_name) {
                    Some(latest_end) => timeliness(latest_end, self.now, good, marginal),
                    None => {
                        debug!(channel = %channel.channel_name, "no sample time cached for channel");
                        MonitorValueAndStatus::unavailable(SohMonitorType::Timeliness)
                    }
                };
                Ok((channel.channel_name.clone(), vec![value]))
            })
            .collect()
    }

    /// Worst lag for every channel with a lag threshold.
    pub fn lag_by_channel(&self) -> Result<ChannelValues, CalculationError> {
        self.channels_with(SohMonitorType::Lag)
            .map(|(channel, threshold)| {
                let (good, marginal) = duration_threshold(channel, SohMonitorType::Lag, threshold)?;
                let window = station_window(self.definition, SohMonitorType::Lag)?;
                let value = lag(
                    self.batch.waveforms(&channel.channel_name),
                    window,
                    LagCombiner::Max,
                    self.now,
                )?;
                let status = classify_duration(value, good, marginal);
                Ok((
                    channel.channel_name.clone(),
                    vec![MonitorValueAndStatus::duration(SohMonitorType::Lag, value, status)],
                ))
            })
            .collect()
    }

    /// Missing percentage for every channel with a missing threshold.
    pub fn missing_by_channel(&self) -> Result<ChannelValues, CalculationError> {
        self.channels_with(SohMonitorType::Missing)
            .map(|(channel, threshold)| {
                let (good, marginal) =
                    percent_threshold(channel, SohMonitorType::Missing, threshold)?;
                let window = station_window(self.definition, SohMonitorType::Missing)?;
                let waveforms = self.batch.waveforms(&channel.channel_name);
                let value = missing(waveforms, window, channel.nominal_sample_rate_hz, self.now)?;
                // a channel with no data is bad whatever the thresholds say
                let status = if waveforms.is_empty() {
                    SohStatus::Bad
                } else {
                    classify_percent(Some(value), good, marginal)
                };
                Ok((
                    channel.channel_name.clone(),
                    vec![MonitorValueAndStatus::percent(SohMonitorType::Missing, Some(value), status)],
                ))
            })
            .collect()
    }

    /// Environmental statuses for every defined channel that reported issues.
    pub fn environment_by_channel(&self) -> Result<ChannelValues, CalculationError> {
        let Some(issues) = self.batch.station_issues(&self.definition.station_name) else {
            return Ok(ChannelValues::new());
        };

        issues
            .iter()
            .filter_map(|(name, issues)| {
                self.definition
                    .channel_definition(name)
                    .map(|channel| (channel, issues))
            })
            .map(|(channel, issues)| {
                let values = environment_status(issues, channel, self.definition, self.now)?;
                Ok((channel.channel_name.clone(), values))
            })
            .collect()
    }
}
