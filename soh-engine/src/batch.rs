//! Per-batch derived maps, built once and shared by every station computation.

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use soh_types::{station_name_of, AcquiredStationSohExtract, EnvironmentIssue, WaveformSummary};

use crate::cache::TimelinessCache;
use crate::window::Span;

/// A waveform summary paired with the reception time of its frame.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WaveformReception {
    pub summary: WaveformSummary,
    pub reception_time: DateTime<Utc>,
}

impl WaveformReception {
    pub fn new(summary: WaveformSummary, reception_time: DateTime<Utc>) -> Self {
        Self {
            summary,
            reception_time,
        }
    }

    /// How long after the end of the data it was received. Negative when
    /// the reception clock is behind the digitizer clock.
    pub fn lag(&self) -> Duration {
        self.reception_time - self.summary.end_time
    }

    pub fn span(&self) -> Span {
        Span::new(self.summary.start_time, self.summary.end_time)
    }
}

/// Identifies a received frame across batches.
type FrameKey = (String, DateTime<Utc>, DateTime<Utc>, DateTime<Utc>);

/// Maps derived from the raw extracts of one batch.
#[derive(Debug, Default)]
pub struct BatchData {
    /// Channel name to its distinct waveform/reception pairs, sorted.
    waveforms: HashMap<String, Vec<WaveformReception>>,
    /// Station name to channel name to its distinct environmental issues, sorted.
    issues: HashMap<String, HashMap<String, Vec<EnvironmentIssue>>>,
    frames: HashSet<FrameKey>,
    extract_count: usize,
}

impl BatchData {
    /// Build the derived maps and advance the timeliness cache with every
    /// waveform end time seen.
    pub fn build<'a, I>(extracts: I, cache: &TimelinessCache) -> Self
    where
        I: IntoIterator<Item = &'a AcquiredStationSohExtract>,
    {
        let mut waveforms: HashMap<String, BTreeSet<WaveformReception>> = HashMap::new();
        let mut issues: HashMap<String, HashMap<String, BTreeSet<EnvironmentIssue>>> =
            HashMap::new();
        let mut latest: HashMap<&str, DateTime<Utc>> = HashMap::new();
        let mut frames = HashSet::new();
        let mut extract_count = 0;

        for extract in extracts {
            extract_count += 1;

            for metadata in &extract.acquisition_metadata {
                frames.insert((
                    metadata.station_name.clone(),
                    metadata.reception_time,
                    metadata.payload_start_time,
                    metadata.payload_end_time,
                ));
            }

            for (summary, reception_time) in extract.waveforms() {
                latest
                    .entry(summary.channel_name.as_str())
                    .and_modify(|end| *end = (*end).max(summary.end_time))
                    .or_insert(summary.end_time);
                waveforms
                    .entry(summary.channel_name.clone())
                    .or_default()
                    .insert(WaveformReception::new(summary.clone(), reception_time));
            }

            for issue in &extract.environment_issues {
                issues
                    .entry(station_name_of(&issue.channel_name).to_string())
                    .or_default()
                    .entry(issue.channel_name.clone())
                    .or_default()
                    .insert(issue.clone());
            }
        }

        cache.seed(latest);

        Self {
            waveforms: waveforms
                .into_iter()
                .map(|(channel, set)| (channel, set.into_iter().collect()))
                .collect(),
            issues: issues
                .into_iter()
                .map(|(station, channels)| {
                    let channels = channels
                        .into_iter()
                        .map(|(channel, set)| (channel, set.into_iter().collect()))
                        .collect();
                    (station, channels)
                })
                .collect(),
            frames,
            extract_count,
        }
    }

    /// Waveform/reception pairs for a channel; empty when none arrived.
    pub fn waveforms(&self, channel: &str) -> &[WaveformReception] {
        self.waveforms.get(channel).map_or(&[], Vec::as_slice)
    }

    /// Environmental issues of a station, by channel.
    pub fn station_issues(&self, station: &str) -> Option<&HashMap<String, Vec<EnvironmentIssue>>> {
        self.issues.get(station)
    }

    /// Number of extracts the batch was built from.
    pub fn extract_count(&self) -> usize {
        self.extract_count
    }

    pub fn channel_count(&self) -> usize {
        self.waveforms.len()
    }
}

/// Remembers the frames of the previous batch so the earliest reception time
/// of newly arrived frames can be reported per station.
#[derive(Debug, Default)]
pub struct ReceptionTracker {
    previous: Mutex<HashSet<FrameKey>>,
}

impl ReceptionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Earliest reception time per station among frames not in the previous
    /// batch, then remember this batch's frames.
    pub fn earliest_new_receptions(&self, batch: &BatchData) -> HashMap<String, DateTime<Utc>> {
        let mut previous = self.previous.lock();
        let mut earliest: HashMap<String, DateTime<Utc>> = HashMap::new();

        for (station, reception_time, _, _) in batch.frames.difference(&previous) {
            earliest
                .entry(station.clone())
                .and_modify(|t| *t = (*t).min(*reception_time))
                .or_insert(*reception_time);
        }

        *previous = batch.frames.clone();
        earliest
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use soh_types::{AcquisitionMetadata, EnvironmentIssueType};

    use super::*;

    fn t(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_600_000_000_000 + millis).unwrap()
    }

    fn frame(station: &str, channels: &[&str], start: i64, end: i64, received: i64) -> AcquisitionMetadata {
        AcquisitionMetadata {
            station_name: station.to_string(),
            reception_time: t(received),
            payload_start_time: t(start),
            payload_end_time: t(end),
            waveform_summaries: channels
                .iter()
                .map(|c| (c.to_string(), WaveformSummary::new(*c, t(start), t(end))))
                .collect(),
        }
    }

    fn issue(channel: &str, status: bool) -> EnvironmentIssue {
        EnvironmentIssue {
            channel_name: channel.to_string(),
            issue_type: EnvironmentIssueType::Clipped,
            start_time: t(0),
            end_time: t(1_000),
            status,
        }
    }

    #[test]
    fn build_groups_waveforms_by_channel_and_updates_cache() {
        let cache = TimelinessCache::new();
        let extracts = vec![
            AcquiredStationSohExtract {
                acquisition_metadata: vec![frame("STA", &["STA.BHZ", "STA.BHN"], 0, 1_000, 1_100)],
                environment_issues: vec![],
            },
            AcquiredStationSohExtract {
                acquisition_metadata: vec![frame("STA", &["STA.BHZ"], 1_000, 2_000, 2_050)],
                environment_issues: vec![],
            },
        ];

        let batch = BatchData::build(&extracts, &cache);

        assert_eq!(batch.extract_count(), 2);
        assert_eq!(batch.channel_count(), 2);
        assert_eq!(batch.waveforms("STA.BHZ").len(), 2);
        assert_eq!(batch.waveforms("STA.BHN").len(), 1);
        assert!(batch.waveforms("STA.XXX").is_empty());
        assert_eq!(batch.waveforms("STA.BHZ")[1].lag(), Duration::milliseconds(50));
        assert_eq!(cache.get("STA.BHZ"), Some(t(2_000)));
        assert_eq!(cache.get("STA.BHN"), Some(t(1_000)));
    }

    #[test]
    fn build_collapses_duplicate_deliveries() {
        let cache = TimelinessCache::new();
        let extract = AcquiredStationSohExtract {
            acquisition_metadata: vec![frame("STA", &["STA.BHZ"], 0, 1_000, 1_100)],
            environment_issues: vec![issue("STA.BHZ", true)],
        };
        let extracts = vec![extract.clone(), extract];

        let batch = BatchData::build(&extracts, &cache);

        assert_eq!(batch.waveforms("STA.BHZ").len(), 1);
        assert_eq!(batch.station_issues("STA").unwrap()["STA.BHZ"].len(), 1);
    }

    #[test]
    fn issues_are_keyed_by_station_prefix_then_channel() {
        let cache = TimelinessCache::new();
        let extracts = vec![AcquiredStationSohExtract {
            acquisition_metadata: vec![],
            environment_issues: vec![issue("AAA.BHZ", true), issue("AAA.BHN", false), issue("BBB.BHZ", true)],
        }];

        let batch = BatchData::build(&extracts, &cache);

        let aaa = batch.station_issues("AAA").unwrap();
        assert_eq!(aaa.len(), 2);
        assert_eq!(batch.station_issues("BBB").unwrap().len(), 1);
        assert!(batch.station_issues("CCC").is_none());
    }

    #[test]
    fn tracker_reports_only_frames_new_since_previous_batch() {
        let cache = TimelinessCache::new();
        let tracker = ReceptionTracker::new();
        let first = vec![AcquiredStationSohExtract {
            acquisition_metadata: vec![frame("STA", &["STA.BHZ"], 0, 1_000, 1_500)],
            environment_issues: vec![],
        }];
        let mut second = first.clone();
        second.push(AcquiredStationSohExtract {
            acquisition_metadata: vec![frame("STA", &["STA.BHZ"], 1_000, 2_000, 2_500)],
            environment_issues: vec![],
        });

        let earliest = tracker.earliest_new_receptions(&BatchData::build(&first, &cache));
        assert_eq!(earliest.get("STA"), Some(&t(1_500)));

        let earliest = tracker.earliest_new_receptions(&BatchData::build(&second, &cache));
        assert_eq!(earliest.get("STA"), Some(&t(2_500)));

        let earliest = tracker.earliest_new_receptions(&BatchData::build(&second, &cache));
        assert!(earliest.is_empty());
    }
}
