//! Scan configuration, loadable from TOML
//!
//! ```toml
//! ma_windows = [5, 10, 20, 30, 60, 120]
//! frequency = "D"
//! workers = 5
//! volume_ratio = 3.0
//! min_ma_in_range = 4
//! deadline_secs = 600.0
//! fetch_timeout_secs = 30.0
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    rules::{DEFAULT_MIN_MA_IN_RANGE, DEFAULT_VOLUME_RATIO},
    Frequency, MaWindow, Result, ScanError, DEFAULT_WORKERS,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub ma_windows: Vec<MaWindow>,
    pub frequency: Frequency,
    pub workers: usize,
    pub volume_ratio: f64,
    pub min_ma_in_range: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch_timeout_secs: Option<f64>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            ma_windows: MaWindow::defaults(),
            frequency: Frequency::Daily,
            workers: DEFAULT_WORKERS,
            volume_ratio: DEFAULT_VOLUME_RATIO,
            min_ma_in_range: DEFAULT_MIN_MA_IN_RANGE,
            deadline_secs: None,
            fetch_timeout_secs: None,
        }
    }
}

impl ScanConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: ScanConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(ScanError::InvalidConfig("workers must be at least 1".into()));
        }
        if self.ma_windows.is_empty() {
            return Err(ScanError::InvalidConfig("ma_windows must not be empty".into()));
        }
        let mut windows = self.ma_windows.clone();
        windows.sort();
        windows.dedup();
        if windows.len() != self.ma_windows.len() {
            return Err(ScanError::InvalidConfig("ma_windows must be distinct".into()));
        }
        if !self.volume_ratio.is_finite() || self.volume_ratio <= 0.0 {
            return Err(ScanError::InvalidConfig(format!(
                "volume_ratio must be positive, got {}",
                self.volume_ratio
            )));
        }
        if self.min_ma_in_range == 0 || self.min_ma_in_range > self.ma_windows.len() {
            return Err(ScanError::InvalidConfig(format!(
                "min_ma_in_range must be between 1 and {}, got {}",
                self.ma_windows.len(),
                self.min_ma_in_range
            )));
        }
        self.deadline()?;
        self.fetch_timeout()?;
        Ok(())
    }

    pub fn deadline(&self) -> Result<Option<Duration>> {
        seconds("deadline_secs", self.deadline_secs)
    }

    pub fn fetch_timeout(&self) -> Result<Option<Duration>> {
        seconds("fetch_timeout_secs", self.fetch_timeout_secs)
    }
}

fn seconds(field: &str, value: Option<f64>) -> Result<Option<Duration>> {
    value
        .map(|secs| {
            Duration::try_from_secs_f64(secs).map_err(|e| {
                ScanError::InvalidConfig(format!("{field} = {secs}: {e}"))
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = ScanConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.workers, 5);
        assert_eq!(config.ma_windows.len(), 6);
    }

    #[test]
    fn test_from_toml() {
        let config = ScanConfig::from_toml_str(
            r#"
            ma_windows = [1, 2, 4, 6, 12, 24]
            frequency = "W"
            workers = 8
            deadline_secs = 1.5
            "#,
        )
        .unwrap();
        assert_eq!(config.frequency, Frequency::Weekly);
        assert_eq!(config.workers, 8);
        assert_eq!(config.ma_windows[5].get(), 24);
        assert_eq!(config.volume_ratio, DEFAULT_VOLUME_RATIO);
        assert_eq!(config.deadline().unwrap(), Some(Duration::from_millis(1500)));
        assert_eq!(config.fetch_timeout().unwrap(), None);
    }

    #[test]
    fn test_rejects_invalid() {
        assert!(ScanConfig::from_toml_str("workers = 0").is_err());
        assert!(ScanConfig::from_toml_str("ma_windows = [5, 5, 10, 20]").is_err());
        assert!(ScanConfig::from_toml_str("ma_windows = [0, 5]").is_err());
        assert!(ScanConfig::from_toml_str("volume_ratio = -1.0").is_err());
        assert!(ScanConfig::from_toml_str("ma_windows = [5, 10]").is_err());
        assert!(ScanConfig::from_toml_str("deadline_secs = -2.0").is_err());
        assert!(ScanConfig::from_toml_str("workers = \"many\"").is_err());
    }

    #[test]
    fn test_round_trip() {
        let config = ScanConfig {
            workers: 3,
            fetch_timeout_secs: Some(2.0),
            ..Default::default()
        };
        let text = toml::to_string(&config).unwrap();
        assert_eq!(ScanConfig::from_toml_str(&text).unwrap(), config);
    }
}
