//! Where bars and universes come from
//!
//! The scanner only talks to [`DataSource`] and [`UniverseProvider`]. Workers
//! call `fetch_bars` concurrently, so implementations must be `Send + Sync`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use log::debug;

use crate::{
    indicators::attach_moving_averages, resample::resample, DailyBar, DateRange, Frequency, MaWindow, Result,
    ScanError, Security,
};

/// Everything a source needs to return one security's bars
#[derive(Debug, Clone, PartialEq)]
pub struct BarQuery {
    pub security_id: String,
    pub range: DateRange,
    pub frequency: Frequency,
    /// Order of `DailyBar::moving_averages` in the response
    pub ma_windows: Vec<MaWindow>,
}

/// Time series provider
pub trait DataSource: Send + Sync {
    /// Bars for `query.security_id` within `query.range`, in date order
    fn fetch_bars(&self, query: &BarQuery) -> Result<Vec<DailyBar>>;
}

/// Provider of the securities to scan
pub trait UniverseProvider {
    fn list_universe(&self) -> Result<Vec<Security>>;
}

// ============================================================
// IN-MEMORY SOURCE
// ============================================================

/// Bars held in memory. Frequency is ignored; the stored series is returned
/// as-is after the date filter.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    universe: Vec<Security>,
    bars: HashMap<String, Vec<DailyBar>>,
    failures: HashMap<String, String>,
    latency: Option<Duration>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a security and its history
    pub fn with_series(mut self, security: Security, bars: Vec<DailyBar>) -> Self {
        self.bars.insert(security.ts_code.clone(), bars);
        self.universe.push(security);
        self
    }

    /// Add a listed security whose fetch always fails with `message`
    pub fn with_failure(mut self, security: Security, message: impl Into<String>) -> Self {
        self.failures.insert(security.ts_code.clone(), message.into());
        self.universe.push(security);
        self
    }

    /// Sleep this long inside every fetch
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }
}

impl DataSource for InMemorySource {
    fn fetch_bars(&self, query: &BarQuery) -> Result<Vec<DailyBar>> {
        if let Some(latency) = self.latency {
            thread::sleep(latency);
        }
        let id = &query.security_id;
        if let Some(message) = self.failures.get(id) {
            return Err(ScanError::DataSource {
                security: id.clone(),
                message: message.clone(),
            });
        }
        let bars = self.bars.get(id).ok_or_else(|| ScanError::DataSource {
            security: id.clone(),
            message: "unknown security".into(),
        })?;
        Ok(bars
            .iter()
            .filter(|b| query.range.contains(b.trade_date))
            .cloned()
            .collect())
    }
}

impl UniverseProvider for InMemorySource {
    fn list_universe(&self) -> Result<Vec<Security>> {
        Ok(self.universe.clone())
    }
}

// ============================================================
// JSON DIRECTORY SOURCE
// ============================================================

/// Name of the universe listing inside a data directory
pub const UNIVERSE_FILE: &str = "universe.json";

/// Reads a directory laid out as:
///
/// ```text
/// <dir>/universe.json        [{"ts_code": "600519.SH", "name": "..."}, ...]
/// <dir>/<ts_code>.json       [{"trade_date": "20240102", "open": ..., "vol": ...}, ...]
/// ```
///
/// Files hold daily sessions. Weekly and monthly queries are resampled from
/// them, and each period is kept when its last session falls in the range.
/// Bars without `moving_averages` get simple moving averages of close at the
/// queried frequency, computed over the whole file before the date filter so
/// long windows are warmed up.
#[derive(Debug, Clone)]
pub struct JsonDirSource {
    root: PathBuf,
}

impl JsonDirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn series_path(&self, security: &str) -> PathBuf {
        self.root.join(format!("{security}.json"))
    }
}

impl DataSource for JsonDirSource {
    fn fetch_bars(&self, query: &BarQuery) -> Result<Vec<DailyBar>> {
        let id = &query.security_id;
        let path = self.series_path(id);
        let contents = std::fs::read_to_string(&path).map_err(|e| ScanError::DataSource {
            security: id.clone(),
            message: format!("failed to read {}: {e}", path.display()),
        })?;
        let mut bars: Vec<DailyBar> =
            serde_json::from_str(&contents).map_err(|e| ScanError::DataSource {
                security: id.clone(),
                message: format!("{}: {e}", path.display()),
            })?;
        debug!("{id}: loaded {} bars from {}", bars.len(), path.display());

        bars.sort_by_key(|b| b.trade_date);
        for bar in &mut bars {
            if bar.ts_code.is_empty() {
                bar.ts_code = id.clone();
            }
        }
        if query.frequency != Frequency::Daily {
            bars = resample(&bars, query.frequency);
        }
        attach_moving_averages(&mut bars, &query.ma_windows);

        bars.retain(|b| query.range.contains(b.trade_date));
        Ok(bars)
    }
}

impl UniverseProvider for JsonDirSource {
    fn list_universe(&self) -> Result<Vec<Security>> {
        let contents = std::fs::read_to_string(self.root.join(UNIVERSE_FILE))?;
        Ok(serde_json::from_str(&contents)?)
    }
}
