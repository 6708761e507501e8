//! YAML planner configuration.

use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

use automanifest_core::{DerivationParams, MAX_NUDGES, WAVE_LIBRARY};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::Time;

pub const DEFAULT_DB_PATH: &str = "./automanifest.sqlite3";
pub const DEFAULT_INTENTION: &str = "Ship iOS app milestone";

#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("YAML parse error: {0}")]
    Yaml(String),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Wall-clock time of day written as `HH:MM`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay(Time);

impl TimeOfDay {
    /// # Errors
    /// Returns [`ConfigError::Validation`] when `hour` or `minute` is out of range.
    pub fn from_hm(hour: u8, minute: u8) -> Result<Self, ConfigError> {
        Time::from_hms(hour, minute, 0).map(Self).map_err(|err| {
            ConfigError::Validation(format!("invalid time of day {hour:02}:{minute:02}: {err}"))
        })
    }

    #[must_use]
    pub fn time(self) -> Time {
        self.0
    }
}

impl Display for TimeOfDay {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.0.hour(), self.0.minute())
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let invalid = || ConfigError::Validation(format!("expected HH:MM, got {value:?}"));
        let (hour, minute) = value.split_once(':').ok_or_else(invalid)?;
        if hour.len() != 2 || minute.len() != 2 {
            return Err(invalid());
        }
        let hour = hour.parse::<u8>().map_err(|_| invalid())?;
        let minute = minute.parse::<u8>().map_err(|_| invalid())?;
        Self::from_hm(hour, minute)
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PlannerConfig {
    pub db_path: PathBuf,
    pub expansion_len: usize,
    pub step_count: usize,
    pub default_intention: String,
    pub nudge_times: Vec<TimeOfDay>,
    pub background_refresh_at: TimeOfDay,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        let derivation = DerivationParams::default();
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            expansion_len: derivation.expansion_len,
            step_count: derivation.step_count,
            default_intention: DEFAULT_INTENTION.to_string(),
            nudge_times: vec![
                TimeOfDay(time::macros::time!(09:00)),
                TimeOfDay(time::macros::time!(14:00)),
            ],
            background_refresh_at: TimeOfDay(time::macros::time!(08:30)),
        }
    }
}

impl PlannerConfig {
    /// Parse a YAML config file from a path.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when the file cannot be read, parsed or validated.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|err| ConfigError::Io(format!("{}: {err}", path.display())))?;
        Self::parse(content.as_str())
    }

    /// Parse a YAML config document. An empty document yields the defaults.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when the YAML is malformed or fails validation.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|err| ConfigError::Yaml(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Returns [`ConfigError::Validation`] describing the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.expansion_len == 0 {
            return Err(ConfigError::Validation("expansion_len must be at least 1".into()));
        }
        if self.step_count == 0 || self.step_count > WAVE_LIBRARY.len() {
            return Err(ConfigError::Validation(format!(
                "step_count must be between 1 and {}",
                WAVE_LIBRARY.len()
            )));
        }
        if self.nudge_times.len() > MAX_NUDGES {
            return Err(ConfigError::Validation(format!(
                "at most {MAX_NUDGES} nudge_times are supported"
            )));
        }
        if self.db_path.as_os_str().is_empty() {
            return Err(ConfigError::Validation("db_path cannot be empty".into()));
        }
        Ok(())
    }

    #[must_use]
    pub fn derivation_params(&self) -> DerivationParams {
        DerivationParams { expansion_len: self.expansion_len, step_count: self.step_count }
    }

    #[must_use]
    pub fn nudge_clock_times(&self) -> Vec<Time> {
        self.nudge_times.iter().map(|at| at.time()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(yaml: &str) -> PlannerConfig {
        match PlannerConfig::parse(yaml) {
            Ok(config) => config,
            Err(err) => panic!("config should parse: {err}"),
        }
    }

    #[test]
    fn empty_document_uses_defaults() {
        let config = parse_ok("");
        assert_eq!(config, PlannerConfig::default());
        assert_eq!(config.expansion_len, 20_000);
        assert_eq!(config.step_count, 6);
        assert_eq!(config.default_intention, "Ship iOS app milestone");
        assert_eq!(
            config.nudge_times.iter().map(ToString::to_string).collect::<Vec<_>>(),
            vec!["09:00", "14:00"]
        );
        assert_eq!(config.background_refresh_at.to_string(), "08:30");
    }

    #[test]
    fn partial_document_overrides_named_fields() {
        let config = parse_ok(
            r#"
db_path: /tmp/planner.sqlite3
step_count: 3
nudge_times: ["07:15"]
background_refresh_at: "06:05"
"#,
        );

        assert_eq!(config.db_path, PathBuf::from("/tmp/planner.sqlite3"));
        assert_eq!(config.step_count, 3);
        assert_eq!(config.expansion_len, 20_000);
        assert_eq!(config.nudge_clock_times(), vec![time::macros::time!(07:15)]);
        assert_eq!(config.background_refresh_at.time(), time::macros::time!(06:05));
        assert_eq!(config.derivation_params().step_count, 3);
    }

    #[test]
    fn validation_rejects_out_of_range_values() {
        for (yaml, needle) in [
            ("expansion_len: 0", "expansion_len"),
            ("step_count: 0", "step_count"),
            ("step_count: 7", "step_count"),
            (r#"nudge_times: ["08:00", "12:00", "16:00"]"#, "nudge_times"),
        ] {
            match PlannerConfig::parse(yaml) {
                Err(ConfigError::Validation(message)) => assert!(message.contains(needle)),
                other => panic!("expected validation error for {yaml:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn malformed_times_are_rejected() {
        for yaml in [
            r#"background_refresh_at: "25:00""#,
            r#"background_refresh_at: "8:30""#,
            r#"nudge_times: ["09:60"]"#,
            r#"nudge_times: ["noon"]"#,
        ] {
            assert!(
                matches!(PlannerConfig::parse(yaml), Err(ConfigError::Yaml(_))),
                "{yaml} should fail to parse"
            );
        }
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(matches!(PlannerConfig::parse("step_cnt: 2"), Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let missing =
            std::env::temp_dir().join(format!("automanifest-missing-{}.yaml", ulid::Ulid::new()));
        assert!(matches!(PlannerConfig::from_path(&missing), Err(ConfigError::Io(_))));
    }

    #[test]
    fn config_serializes_times_as_text() {
        let yaml = match serde_yaml::to_string(&PlannerConfig::default()) {
            Ok(yaml) => yaml,
            Err(err) => panic!("config should serialize: {err}"),
        };
        assert!(yaml.contains("09:00"));
        assert_eq!(parse_ok(&yaml), PlannerConfig::default());
    }
}
