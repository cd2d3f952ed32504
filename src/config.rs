//! Configuration loading for period timing, the portal endpoint, and the
//! webdriver the submitter talks to. Values come from YAML files and are
//! validated up front so schedule resolution never sees a malformed config.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::schedule::WeekSchedule;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file unreadable: {0}")]
    Io(String),
    #[error("config parse failed: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Timing parameters that define one day's attendance windows.
#[derive(Debug, Clone, Deserialize)]
pub struct PeriodConfig {
    /// Hour of day when period 1 begins.
    pub start_hour: u32,
    pub period_duration_minutes: u32,
    /// Minutes before and after a period start during which check-in counts.
    pub attendance_buffer_minutes: u32,
    pub period_count: u32,
}

impl PeriodConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.period_count == 0 {
            return Err(ConfigError::Invalid(
                "period_count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Portal endpoint the submitter navigates to. The classroom id is appended
/// as the final path segment.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    pub base_url: String,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: "https://attendance.is.it-chiba.ac.jp/attendance/class_room".to_string(),
        }
    }
}

/// Where and how to reach the chromedriver that drives the portal UI.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebDriverConfig {
    pub endpoint: String,
    pub headless: bool,
    /// Upper bound for waits on elements that must appear.
    pub wait_secs: u64,
    /// Shorter bound for probes of elements that may legitimately be absent.
    pub probe_secs: u64,
}

impl Default for WebDriverConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9515".to_string(),
            headless: false,
            wait_secs: 10,
            probe_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub period_config: PeriodConfig,
    #[serde(default)]
    pub portal: PortalConfig,
    #[serde(default)]
    pub webdriver: WebDriverConfig,
}

/// Loads and validates the main configuration file.
pub fn load_config(path: impl AsRef<Path>) -> Result<AppConfig, ConfigError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
    let config: AppConfig =
        serde_yaml::from_str(&raw).map_err(|e| ConfigError::Parse(format!("{e}")))?;
    config.period_config.validate()?;
    Ok(config)
}

/// Loads the weekly classroom schedule, keyed by weekday abbreviation.
pub fn load_schedule(path: impl AsRef<Path>) -> Result<WeekSchedule, ConfigError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
    serde_yaml::from_str(&raw).map_err(|e| ConfigError::Parse(format!("{e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(content.as_bytes()).expect("write");
        file
    }

    #[test]
    fn loads_full_config() {
        let file = write_temp(
            r#"
period_config:
  start_hour: 9
  period_duration_minutes: 90
  attendance_buffer_minutes: 10
  period_count: 4
portal:
  base_url: "https://portal.example.edu/attendance/class_room"
webdriver:
  endpoint: "http://localhost:4444"
  headless: true
  wait_secs: 8
  probe_secs: 3
"#,
        );

        let config = load_config(file.path()).expect("config should load");
        assert_eq!(config.period_config.period_count, 4);
        assert_eq!(
            config.portal.base_url,
            "https://portal.example.edu/attendance/class_room"
        );
        assert!(config.webdriver.headless);
        assert_eq!(config.webdriver.wait_secs, 8);
    }

    #[test]
    fn portal_and_webdriver_sections_are_optional() {
        let file = write_temp(
            r#"
period_config:
  start_hour: 9
  period_duration_minutes: 90
  attendance_buffer_minutes: 10
  period_count: 2
"#,
        );

        let config = load_config(file.path()).expect("config should load");
        assert_eq!(config.webdriver.endpoint, "http://localhost:9515");
        assert!(!config.webdriver.headless);
        assert!(config.portal.base_url.ends_with("class_room"));
    }

    #[test]
    fn rejects_zero_periods() {
        let file = write_temp(
            r#"
period_config:
  start_hour: 9
  period_duration_minutes: 90
  attendance_buffer_minutes: 10
  period_count: 0
"#,
        );

        let err = load_config(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_malformed_yaml() {
        let file = write_temp("period_config: [not, a, mapping]");
        let err = load_config(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_config_file_is_an_io_error() {
        let err = load_config("definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn loads_schedule_entries() {
        let file = write_temp(
            r#"
Mon:
  - periods: [1, 2]
    classroom: "A1"
Wed:
  - periods: [3]
    classroom: "B2"
"#,
        );

        let schedule = load_schedule(file.path()).expect("schedule should load");
        assert_eq!(schedule["Mon"][0].classroom, "A1");
        assert_eq!(schedule["Mon"][0].periods, vec![1, 2]);
        assert_eq!(schedule["Wed"].len(), 1);
    }
}
