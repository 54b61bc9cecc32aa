//! Station-wide aggregates, computed from the batch maps independently of the
//! station rollup.

use chrono::Duration;
use soh_types::{station_name_of, ChannelSoh, SohMonitorType, StationAggregate};

use crate::error::CalculationError;
use crate::monitors::{lag, percent_true, station_window, LagCombiner, StationContext};
use crate::window::active_window;

/// All four aggregates for one station, in LAG, MISSING, TIMELINESS,
/// ENVIRONMENTAL_ISSUES order.
pub fn station_aggregates(
    ctx: &StationContext<'_>,
    channel_sohs: &[ChannelSoh],
) -> Result<Vec<StationAggregate>, CalculationError> {
    Ok(vec![
        StationAggregate::Lag(lag_aggregate(ctx)?),
        StationAggregate::Missing(missing_aggregate(ctx, channel_sohs)),
        StationAggregate::Timeliness(timeliness_aggregate(ctx)),
        StationAggregate::EnvironmentalIssues(environment_aggregate(ctx)?),
    ])
}

/// Mean lag over every sample of the station's LAG channels.
pub fn lag_aggregate(ctx: &StationContext<'_>) -> Result<Option<Duration>, CalculationError> {
    let station = ctx.definition.station_name.as_str();
    let mut channels = ctx
        .definition
        .channels_for(SohMonitorType::Lag)
        .filter(|channel| station_name_of(channel) == station)
        .peekable();
    if channels.peek().is_none() {
        return Ok(None);
    }

    let window = station_window(ctx.definition, SohMonitorType::Lag)?;
    let samples = channels.flat_map(|channel| ctx.batch.waveforms(channel));
    lag(samples, window, LagCombiner::Mean, ctx.now)
}

/// Mean of the per-channel missing percentages over the MISSING channels.
/// A channel without a value counts as 0%.
pub fn missing_aggregate(ctx: &StationContext<'_>, channel_sohs: &[ChannelSoh]) -> Option<f64> {
    let (sum, count) = channel_sohs
        .iter()
        .filter(|soh| ctx.definition.is_channel_assigned(SohMonitorType::Missing, &soh.channel_name))
        .map(|soh| {
            soh.monitor_value(SohMonitorType::Missing)
                .and_then(|value| value.value.as_percent())
                .unwrap_or(0.0)
        })
        .fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Staleness of the least recently updated TIMELINESS channel.
pub fn timeliness_aggregate(ctx: &StationContext<'_>) -> Option<Duration> {
    ctx.definition
        .channels_for(SohMonitorType::Timeliness)
        .filter_map(|channel| ctx.cache.get(channel))
        .min()
        .map(|oldest| ctx.now - oldest)
}

/// Percent true over every issue whose channel is assigned to the issue's
/// monitor type, whose type is rolled up, and which falls in its type's window.
pub fn environment_aggregate(ctx: &StationContext<'_>) -> Result<Option<f64>, CalculationError> {
    let Some(issues) = ctx.batch.station_issues(&ctx.definition.station_name) else {
        return Ok(None);
    };

    let mut qualifying = Vec::new();
    for issue in issues.values().flatten() {
        let monitor_type = issue.issue_type.monitor_type();
        if !ctx.definition.monitor_types_for_rollup.contains(&monitor_type)
            || !ctx.definition.is_channel_assigned(monitor_type, &issue.channel_name)
        {
            continue;
        }
        let window = active_window(ctx.now, station_window(ctx.definition, monitor_type)?)?;
        if window.overlaps(issue.start_time, issue.end_time) {
            qualifying.push(issue);
        }
    }

    Ok(percent_true(qualifying))
}
