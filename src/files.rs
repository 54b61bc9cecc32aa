//! File-backed inputs: definitions, extract streams and history.

use std::collections::HashMap;
use std::fs;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use soh_engine::rollup::{CapabilityRollupConfig, CapabilitySohRollupDefinition};
use soh_engine::{SohError, SohHistory, Span};
use soh_types::{AcquiredStationSohExtract, StationSohDefinition};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, warn};

/// Load and validate a JSON array of station definitions.
pub fn load_station_definitions(path: &Path) -> Result<Vec<StationSohDefinition>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read station definitions {}", path.display()))?;
    let definitions: Vec<StationSohDefinition> = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse station definitions {}", path.display()))?;
    for definition in &definitions {
        definition
            .validate()
            .with_context(|| format!("invalid definition for station {}", definition.station_name))?;
    }
    Ok(definitions)
}

/// Load a JSON array of capability rollup configurations and resolve each.
pub fn load_capability_definitions(path: &Path) -> Result<Vec<CapabilitySohRollupDefinition>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read capability definitions {}", path.display()))?;
    let configs: Vec<CapabilityRollupConfig> = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse capability definitions {}", path.display()))?;
    configs
        .iter()
        .map(|config| {
            config
                .resolve()
                .with_context(|| format!("invalid rollup for station group {}", config.station_group))
        })
        .collect()
}

/// Parse newline-delimited JSON extracts. Blank lines are skipped and
/// malformed lines are logged and dropped.
pub fn parse_extracts(content: &str, source: &str) -> Vec<AcquiredStationSohExtract> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(index, line)| match serde_json::from_str(line) {
            Ok(extract) => Some(extract),
            Err(err) => {
                warn!(source, line = index + 1, error = %err, "skipping malformed extract");
                None
            }
        })
        .collect()
}

/// Follows a newline-delimited JSON file of extracts as it is appended to.
///
/// Each poll seeks to the end of the last complete line read and returns the
/// complete lines written since. A partially written last line is left for
/// the next poll. If the file shrinks it is read again from the start.
#[derive(Debug)]
pub struct ExtractTail {
    path: PathBuf,
    offset: u64,
}

impl ExtractTail {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            offset: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read any new extracts. A missing file yields nothing.
    pub async fn poll(&mut self) -> Result<Vec<AcquiredStationSohExtract>> {
        let mut file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "extract file not found yet");
                return Ok(Vec::new());
            }
            Err(err) => {
                return Err(err).with_context(|| format!("failed to open {}", self.path.display()));
            }
        };

        let len = file
            .metadata()
            .await
            .with_context(|| format!("failed to stat {}", self.path.display()))?
            .len();
        if len < self.offset {
            debug!(path = %self.path.display(), "extract file truncated, reading from start");
            self.offset = 0;
        }
        if len == self.offset {
            return Ok(Vec::new());
        }

        let mut unread = Vec::new();
        file.seek(SeekFrom::Start(self.offset)).await?;
        file.read_to_end(&mut unread)
            .await
            .with_context(|| format!("failed to read {}", self.path.display()))?;

        let Some(last_newline) = unread.iter().rposition(|b| *b == b'\n') else {
            return Ok(Vec::new());
        };
        let complete = &unread[..=last_newline];
        self.offset += complete.len() as u64;

        let content = String::from_utf8_lossy(complete);
        Ok(parse_extracts(&content, &self.path.display().to_string()))
    }
}

/// History backed by a newline-delimited JSON file of past extracts.
#[derive(Debug, Default)]
pub struct FileHistory {
    extracts: Vec<AcquiredStationSohExtract>,
}

impl FileHistory {
    pub fn new(extracts: Vec<AcquiredStationSohExtract>) -> Self {
        Self { extracts }
    }

    pub fn load(path: &Path) -> Result<Self, SohError> {
        let content = fs::read_to_string(path)
            .map_err(|err| SohError::History(format!("failed to read {}: {err}", path.display())))?;
        Ok(Self::new(parse_extracts(&content, &path.display().to_string())))
    }

    pub fn len(&self) -> usize {
        self.extracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extracts.is_empty()
    }
}

impl SohHistory for FileHistory {
    fn extracts(&self, station: &str, range: Span) -> Result<Vec<AcquiredStationSohExtract>, SohError> {
        Ok(self
            .extracts
            .iter()
            .filter(|extract| extract.station_name() == Some(station))
            .filter(|extract| {
                extract
                    .payload_end_time()
                    .is_some_and(|end| end >= range.start && end < range.end)
            })
            .cloned()
            .collect())
    }

    fn latest_sample_times(&self, channels: &[String]) -> Result<HashMap<String, DateTime<Utc>>, SohError> {
        let mut latest: HashMap<String, DateTime<Utc>> = HashMap::new();
        for (summary, _) in self.extracts.iter().flat_map(|extract| extract.waveforms()) {
            if !channels.contains(&summary.channel_name) {
                continue;
            }
            latest
                .entry(summary.channel_name.clone())
                .and_modify(|end| *end = (*end).max(summary.end_time))
                .or_insert(summary.end_time);
        }
        Ok(latest)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use chrono::TimeZone;
    use soh_types::{AcquisitionMetadata, WaveformSummary};

    use super::*;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_600_000_000 + secs, 0).unwrap()
    }

    fn extract(station: &str, end: i64) -> AcquiredStationSohExtract {
        let channel = format!("{station}.BHZ");
        AcquiredStationSohExtract {
            acquisition_metadata: vec![AcquisitionMetadata {
                station_name: station.to_string(),
                reception_time: t(end + 1),
                payload_start_time: t(end - 10),
                payload_end_time: t(end),
                waveform_summaries: [(channel.clone(), WaveformSummary::new(channel, t(end - 10), t(end)))].into(),
            }],
            environment_issues: Vec::new(),
        }
    }

    fn ndjson(extracts: &[AcquiredStationSohExtract]) -> String {
        extracts
            .iter()
            .map(|e| serde_json::to_string(e).unwrap() + "\n")
            .collect()
    }

    const STATIONS: &str = r#"[{
        "stationName": "STA",
        "monitorTypesForRollup": ["LAG"],
        "channelsByMonitorType": { "LAG": ["STA.BHZ"] },
        "channelDefinitions": [{
            "channelName": "STA.BHZ",
            "monitorTypesForRollup": ["LAG"],
            "thresholdsByMonitorType": {
                "LAG": { "goodThreshold": "1s", "marginalThreshold": "5s" }
            }
        }],
        "timeWindowsByMonitorType": {
            "LAG": { "calculationInterval": "10m", "backOffDuration": "30s" }
        }
    }]"#;

    #[test]
    fn station_definitions_load_from_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(STATIONS.as_bytes()).unwrap();

        let definitions = load_station_definitions(file.path()).unwrap();

        assert_eq!(definitions.len(), 1);
        assert_eq!(definitions[0].station_name, "STA");
        assert_eq!(definitions[0].channel_definitions[0].nominal_sample_rate_hz, 0.0);
    }

    #[test]
    fn station_definition_without_window_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let broken = STATIONS.replace(r#""LAG": { "calculationInterval""#, r#""MISSING": { "calculationInterval""#);
        file.write_all(broken.as_bytes()).unwrap();

        let err = load_station_definitions(file.path()).unwrap_err();
        assert!(err.to_string().contains("STA"));
    }

    #[test]
    fn capability_definitions_resolve() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            br#"[{
                "stationGroup": "G",
                "stationsToGroupRollupOperator": { "operatorType": "WORST_OF" },
                "stationRollups": {
                    "STA": {
                        "channelsToStationRollupOperator": { "operatorType": "BEST_OF" },
                        "channelRollups": {
                            "STA.BHZ": { "sohMonitorsToChannelRollupOperator": { "operatorType": "WORST_OF" } }
                        }
                    }
                }
            }]"#,
        )
        .unwrap();

        let definitions = load_capability_definitions(file.path()).unwrap();

        assert_eq!(definitions.len(), 1);
        assert_eq!(definitions[0].station_group, "G");
        assert!(definitions[0].station_rollups.contains_key("STA"));
    }

    #[test]
    fn capability_definition_errors_name_the_group() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            br#"[{
                "stationGroup": "G",
                "stationsToGroupRollupOperator": { "operatorType": "SOMETIMES_OF" },
                "stationRollups": {}
            }]"#,
        )
        .unwrap();

        let err = load_capability_definitions(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("G"));
    }

    #[test]
    fn parse_extracts_skips_blank_and_malformed_lines() {
        let content = format!("{}\n\nnot json\n", ndjson(&[extract("STA", 0)]).trim_end());
        let extracts = parse_extracts(&content, "test");
        assert_eq!(extracts, vec![extract("STA", 0)]);
    }

    #[tokio::test]
    async fn tail_returns_only_new_complete_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("extracts.ndjson");
        let mut tail = ExtractTail::new(&path);

        assert!(tail.poll().await.unwrap().is_empty());

        let first = ndjson(&[extract("STA", 0)]);
        let second = ndjson(&[extract("STA", 10)]);
        let (head, rest) = second.split_at(20);
        fs::write(&path, format!("{first}{head}")).unwrap();
        assert_eq!(tail.poll().await.unwrap(), vec![extract("STA", 0)]);

        fs::write(&path, format!("{first}{head}{rest}")).unwrap();
        assert_eq!(tail.poll().await.unwrap(), vec![extract("STA", 10)]);
        assert!(tail.poll().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn tail_rereads_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("extracts.ndjson");
        let mut tail = ExtractTail::new(&path);

        fs::write(&path, ndjson(&[extract("AAA", 0), extract("AAA", 10)])).unwrap();
        assert_eq!(tail.poll().await.unwrap().len(), 2);

        fs::write(&path, ndjson(&[extract("B", 20)])).unwrap();
        assert_eq!(tail.poll().await.unwrap(), vec![extract("B", 20)]);
    }

    #[test]
    fn history_filters_by_station_and_range() {
        let history = FileHistory::new(vec![extract("STA", 0), extract("STA", 50), extract("OTH", 50), extract("STA", 100)]);

        let found = history.extracts("STA", Span::new(t(0), t(100))).unwrap();

        assert_eq!(found, vec![extract("STA", 0), extract("STA", 50)]);
    }

    #[test]
    fn history_latest_sample_times_cover_requested_channels() {
        let history = FileHistory::new(vec![extract("STA", 0), extract("STA", 50), extract("OTH", 70)]);

        let latest = history
            .latest_sample_times(&["STA.BHZ".to_string(), "NONE.BHZ".to_string()])
            .unwrap();

        assert_eq!(latest.len(), 1);
        assert_eq!(latest["STA.BHZ"], t(50));
    }

    #[tokio::test]
    async fn tail_picks_up_appends_after_its_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("extracts.ndjson");
        let mut tail = ExtractTail::new(&path);

        fs::write(&path, ndjson(&[extract("STA", 0)])).unwrap();
        assert_eq!(tail.poll().await.unwrap().len(), 1);
        assert_eq!(tail.offset, fs::metadata(&path).unwrap().len());

        let mut file = fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(ndjson(&[extract("STA", 10), extract("STA", 20)]).as_bytes()).unwrap();
        assert_eq!(tail.poll().await.unwrap(), vec![extract("STA", 10), extract("STA", 20)]);
        assert!(tail.poll().await.unwrap().is_empty());
    }

    #[test]
    fn history_load_failure_is_a_history_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileHistory::load(&dir.path().join("absent.ndjson")).unwrap_err();
        assert!(matches!(err, SohError::History(ref message) if message.contains("absent.ndjson")));
    }

    #[test]
    fn history_loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(ndjson(&[extract("STA", 0), extract("STA", 10)]).as_bytes()).unwrap();

        let history = FileHistory::load(file.path()).unwrap();
        assert_eq!(history.len(), 2);
    }
}
