//! Service settings: an optional config file layered under `SOH_*` environment
//! variables.
//!
//! ```toml
//! reprocessing_period = "20s"
//! worker_threads = 8
//! station_definitions = "config/stations.json"
//! capability_definitions = "config/capability.json"
//! extracts = "data/extracts.ndjson"
//! output_dir = "out"
//! ```
//!
//! Nested keys use `__` in environment variables, e.g. `SOH_LOG_LEVEL=debug`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Duration;
use config::{Config, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// How often a batch is computed.
    #[serde(with = "soh_types::duration::text")]
    pub reprocessing_period: Duration,

    /// Worker pool size; 0 uses one thread per CPU.
    pub worker_threads: usize,

    /// How often batch statistics are logged.
    #[serde(with = "soh_types::duration::text")]
    pub monitor_logging_period: Duration,

    pub log_level: String,
    pub log_json: bool,

    /// JSON array of station definitions.
    pub station_definitions: PathBuf,

    /// JSON array of capability rollup configurations.
    pub capability_definitions: Option<PathBuf>,

    /// Newline-delimited JSON extracts, read as they are appended.
    pub extracts: PathBuf,

    /// Newline-delimited JSON extracts used to restore state at startup.
    pub history: Option<PathBuf>,

    pub output_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            reprocessing_period: Duration::seconds(20),
            worker_threads: 0,
            monitor_logging_period: Duration::seconds(60),
            log_level: "info".to_string(),
            log_json: false,
            station_definitions: PathBuf::from("stations.json"),
            capability_definitions: None,
            extracts: PathBuf::from("extracts.ndjson"),
            history: None,
            output_dir: PathBuf::from("."),
        }
    }
}

impl Settings {
    /// Load settings from an optional file and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_from(path, environment())
    }

    fn load_from(path: Option<&Path>, env: Environment) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let settings: Settings = builder
            .add_source(env)
            .build()
            .context("failed to read settings")?
            .try_deserialize()
            .context("invalid settings")?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.reprocessing_period <= Duration::zero() {
            anyhow::bail!("reprocessing_period must be positive");
        }
        if self.monitor_logging_period <= Duration::zero() {
            anyhow::bail!("monitor_logging_period must be positive");
        }
        Ok(())
    }

    pub fn reprocessing_interval(&self) -> Result<std::time::Duration> {
        self.reprocessing_period
            .to_std()
            .context("reprocessing_period out of range")
    }

    pub fn stats_interval(&self) -> Result<std::time::Duration> {
        self.monitor_logging_period
            .to_std()
            .context("monitor_logging_period out of range")
    }
}

fn environment() -> Environment {
    Environment::with_prefix("SOH")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        environment().source(Some(map))
    }

    #[test]
    fn defaults_apply_without_sources() {
        let settings = Settings::load_from(None, env(&[])).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.reprocessing_interval().unwrap(), std::time::Duration::from_secs(20));
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("soh.toml");
        std::fs::write(
            &path,
            "reprocessing_period = \"5s\"\nworker_threads = 3\nhistory = \"seed.ndjson\"\n",
        )
        .unwrap();

        let settings = Settings::load_from(Some(&path), env(&[])).unwrap();

        assert_eq!(settings.reprocessing_period, Duration::seconds(5));
        assert_eq!(settings.worker_threads, 3);
        assert_eq!(settings.history, Some(PathBuf::from("seed.ndjson")));
        assert_eq!(settings.monitor_logging_period, Duration::seconds(60));
    }

    #[test]
    fn environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("soh.toml");
        std::fs::write(&path, "log_level = \"warn\"\n").unwrap();

        let settings = Settings::load_from(
            Some(&path),
            env(&[("SOH_LOG_LEVEL", "debug"), ("SOH_LOG_JSON", "true")]),
        )
        .unwrap();

        assert_eq!(settings.log_level, "debug");
        assert!(settings.log_json);
    }

    #[test]
    fn non_positive_period_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("soh.toml");
        std::fs::write(&path, "reprocessing_period = \"0s\"\n").unwrap();

        assert!(Settings::load_from(Some(&path), env(&[])).is_err());
    }

    #[test]
    fn bad_duration_text_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("soh.toml");
        std::fs::write(&path, "monitor_logging_period = \"soon\"\n").unwrap();

        assert!(Settings::load_from(Some(&path), env(&[])).is_err());
    }
}
