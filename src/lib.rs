//! # volspike - volume-spike uptrend scanner
//!
//! Scans daily stock bars for a three-day pattern: three up days in a row where
//! the middle day trades on a volume spike against both neighbours while most
//! of its moving averages sit inside the day's price body.
//!
//! ## Quick Start
//!
//! ```rust
//! use volspike::prelude::*;
//!
//! let source = InMemorySource::new();
//! let scanner = ScannerBuilder::new()
//!     .ma_windows([5, 10, 20, 30, 60, 120])
//!     .workers(5)
//!     .build()
//!     .unwrap();
//!
//! let range = DateRange::new(
//!     TradeDate::parse("20240101").unwrap(),
//!     TradeDate::parse("20241231").unwrap(),
//! )
//! .unwrap();
//! let report = scanner.scan_universe(&source, &[], &range).unwrap();
//! assert!(report.matches.is_empty());
//! ```

pub mod config;
pub mod features;
pub mod indicators;
pub mod params;
pub mod resample;
pub mod rules;
pub mod source;

pub mod prelude {
    pub use crate::{
        // Configuration
        config::ScanConfig,
        // Features
        features::{extract_features, FeatureRecord},
        // Parameters
        params::{get_count, get_multiple, ParamMeta, ParamType, ParameterizedRule},
        // Rules
        rules::{PatternRule, RuleId, VolumeSpikeRule},
        // Sources
        source::{BarQuery, DataSource, InMemorySource, JsonDirSource, UniverseProvider},
        AggregatedResult,
        DailyBar,
        DateRange,
        Frequency,
        MaWindow,
        Result,
        ScanError,
        Scanner,
        ScannerBuilder,
        Security,
        SecurityFailure,
        TradeDate,
        UniverseReport,
    };
}

use std::collections::BTreeMap;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use chrono::{Days, NaiveDate};
use log::{debug, info, warn};
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};

use features::{extract_features, FeatureRecord};
use rules::{PatternRule, VolumeSpikeRule};
use source::{BarQuery, DataSource, UniverseProvider};

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, ScanError>;

/// Errors raised while configuring or running a scan
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Bar {index}: {values} moving averages for {windows} configured windows")]
    MaLengthMismatch {
        index: usize,
        windows: usize,
        values: usize,
    },

    #[error("Data source failed for {security}: {message}")]
    DataSource { security: String, message: String },

    #[error("Fetch for {security} took {elapsed_ms} ms, over the {limit_ms} ms limit")]
    FetchTimeout {
        security: String,
        elapsed_ms: u128,
        limit_ms: u128,
    },

    #[error("Scan deadline passed before {security} was fetched")]
    DeadlineExceeded { security: String },

    #[error("Worker for {security} panicked: {message}")]
    WorkerPanicked { security: String, message: String },

    #[error("Worker pool: {0}")]
    ThreadPool(String),

    #[error("Invalid trade date: {0}")]
    InvalidDate(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Moving-average window length in bars (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MaWindow(usize);

impl MaWindow {
    /// Create a new window, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(ScanError::InvalidValue("MA window must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }

    /// Windows requested by default: 5/10/20/30/60/120 days
    pub fn defaults() -> Vec<MaWindow> {
        [5, 10, 20, 30, 60, 120].into_iter().map(Self::new_const).collect()
    }
}

impl Serialize for MaWindow {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for MaWindow {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        MaWindow::new(value).map_err(serde::de::Error::custom)
    }
}

/// Calendar date of a trading session.
///
/// Parses both `YYYYMMDD` (the market-data wire format) and ISO `YYYY-MM-DD`;
/// always serializes as `YYYYMMDD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TradeDate(NaiveDate);

impl TradeDate {
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        NaiveDate::parse_from_str(text, "%Y%m%d")
            .or_else(|_| NaiveDate::parse_from_str(text, "%Y-%m-%d"))
            .map(Self)
            .map_err(|_| ScanError::InvalidDate(text.to_string()))
    }

    pub fn from_ymd(year: i32, month: u32, day: u32) -> Result<Self> {
        NaiveDate::from_ymd_opt(year, month, day)
            .map(Self)
            .ok_or_else(|| ScanError::InvalidDate(format!("{year:04}-{month:02}-{day:02}")))
    }

    #[inline]
    pub fn date(self) -> NaiveDate {
        self.0
    }
}

impl From<NaiveDate> for TradeDate {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

impl fmt::Display for TradeDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y%m%d"))
    }
}

impl Serialize for TradeDate {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TradeDate {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(d)?;
        TradeDate::parse(&text).map_err(serde::de::Error::custom)
    }
}

/// Inclusive range of trade dates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: TradeDate,
    pub end: TradeDate,
}

impl DateRange {
    pub fn new(start: TradeDate, end: TradeDate) -> Result<Self> {
        if start > end {
            return Err(ScanError::InvalidConfig(format!(
                "date range start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Range covering `days` calendar days up to and including `end`
    pub fn lookback(end: TradeDate, days: u64) -> Result<Self> {
        let start = end
            .date()
            .checked_sub_days(Days::new(days))
            .ok_or(ScanError::InvalidValue("lookback underflows the calendar"))?;
        Self::new(start.into(), end)
    }

    #[inline]
    pub fn contains(&self, date: TradeDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Bar granularity requested from the data source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Frequency {
    #[default]
    #[serde(rename = "D", alias = "daily")]
    Daily,
    #[serde(rename = "W", alias = "weekly")]
    Weekly,
    #[serde(rename = "M", alias = "monthly")]
    Monthly,
}

impl Frequency {
    pub fn code(self) -> &'static str {
        match self {
            Frequency::Daily => "D",
            Frequency::Weekly => "W",
            Frequency::Monthly => "M",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// ============================================================
// MARKET DATA
// ============================================================

/// One security's session summary as delivered by the data source.
///
/// Price and volume fields are optional because providers leave holes in
/// history (suspensions, fresh listings). `moving_averages` is positional:
/// entry `k` belongs to the `k`-th configured [`MaWindow`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    #[serde(default)]
    pub ts_code: String,
    pub trade_date: TradeDate,
    #[serde(default)]
    pub open: Option<f64>,
    #[serde(default)]
    pub close: Option<f64>,
    #[serde(default)]
    pub pre_close: Option<f64>,
    #[serde(default, alias = "vol")]
    pub volume: Option<f64>,
    #[serde(default)]
    pub moving_averages: Vec<Option<f64>>,
}

/// Entry of a listed universe
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Security {
    pub ts_code: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl Security {
    pub fn new(ts_code: impl Into<String>) -> Self {
        Self {
            ts_code: ts_code.into(),
            name: None,
        }
    }

    pub fn named(ts_code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            ts_code: ts_code.into(),
            name: Some(name.into()),
        }
    }
}

// ============================================================
// AGGREGATED RESULTS
// ============================================================

/// Matches per security across a universe scan.
///
/// Only securities with at least one match are stored. Keys are ordered so
/// the serialized form does not depend on worker scheduling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregatedResult {
    matches: BTreeMap<String, Vec<TradeDate>>,
}

impl AggregatedResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the matches for a security. Empty lists are dropped and `false`
    /// is returned.
    pub fn insert(&mut self, security: impl Into<String>, dates: Vec<TradeDate>) -> bool {
        if dates.is_empty() {
            return false;
        }
        self.matches.insert(security.into(), dates);
        true
    }

    pub fn get(&self, security: &str) -> Option<&[TradeDate]> {
        self.matches.get(security).map(Vec::as_slice)
    }

    pub fn contains(&self, security: &str) -> bool {
        self.matches.contains_key(security)
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[TradeDate])> {
        self.matches.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn into_inner(self) -> BTreeMap<String, Vec<TradeDate>> {
        self.matches
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// A security whose scan did not complete
#[derive(Debug)]
pub struct SecurityFailure {
    pub security: String,
    pub error: ScanError,
}

/// Outcome of a universe scan
#[derive(Debug, Default)]
pub struct UniverseReport {
    pub matches: AggregatedResult,
    /// Sorted by security identifier
    pub failures: Vec<SecurityFailure>,
    pub scanned: usize,
}

impl UniverseReport {
    pub fn failed(&self, security: &str) -> Option<&ScanError> {
        self.failures
            .iter()
            .find(|f| f.security == security)
            .map(|f| &f.error)
    }
}

// ============================================================
// SCANNER
// ============================================================

/// Runs a [`PatternRule`] over one security or a whole universe
#[derive(Debug, Clone)]
pub struct Scanner<R: PatternRule = VolumeSpikeRule> {
    rule: R,
    ma_windows: Vec<MaWindow>,
    frequency: Frequency,
    workers: usize,
    deadline: Option<Duration>,
    fetch_timeout: Option<Duration>,
}

impl Scanner<VolumeSpikeRule> {
    /// Build a scanner with the default rule parameterized from `config`
    pub fn from_config(config: &config::ScanConfig) -> Result<Self> {
        config.validate()?;
        let rule = VolumeSpikeRule::new(config.volume_ratio, config.min_ma_in_range)?;
        let mut builder = ScannerBuilder::new()
            .rule(rule)
            .ma_windows(config.ma_windows.iter().map(|w| w.get()))
            .frequency(config.frequency)
            .workers(config.workers);
        if let Some(deadline) = config.deadline()? {
            builder = builder.deadline(deadline);
        }
        if let Some(timeout) = config.fetch_timeout()? {
            builder = builder.fetch_timeout(timeout);
        }
        builder.build()
    }
}

impl<R: PatternRule> Scanner<R> {
    pub fn rule(&self) -> &R {
        &self.rule
    }

    pub fn ma_windows(&self) -> &[MaWindow] {
        &self.ma_windows
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    // ===========================================
    // SINGLE SECURITY
    // ===========================================

    /// Center dates of every matching three-day window, most recent first.
    ///
    /// Accepts records in ascending or descending date order; the slice itself
    /// is left untouched.
    pub fn scan_features(&self, records: &[FeatureRecord]) -> Vec<TradeDate> {
        if records.len() < 3 {
            return Vec::new();
        }

        let mut ordered: Vec<&FeatureRecord> = records.iter().collect();
        ordered.sort_by(|a, b| b.trade_date.cmp(&a.trade_date));

        ordered
            .windows(3)
            .filter(|w| self.rule.matches(w[0], w[1], w[2]))
            .map(|w| w[1].trade_date)
            .collect()
    }

    /// Extract features from raw bars, then scan them
    pub fn scan_bars(&self, bars: &[DailyBar]) -> Result<Vec<TradeDate>> {
        let records = extract_features(bars, &self.ma_windows)?;
        Ok(self.scan_features(&records))
    }

    /// Fetch one security's history and scan it. Errors go straight to the caller.
    pub fn scan_security<S>(
        &self,
        source: &S,
        security: &str,
        range: &DateRange,
    ) -> Result<Vec<TradeDate>>
    where
        S: DataSource + ?Sized,
    {
        let bars = source.fetch_bars(&self.query(security, range))?;
        self.scan_bars(&bars)
    }

    // ===========================================
    // UNIVERSE FAN-OUT
    // ===========================================

    /// Scan every security on a pool of `workers` threads.
    ///
    /// Workers send their outcome over a channel; this thread is the only
    /// writer of the aggregate. A failing or panicking security lands in
    /// [`UniverseReport::failures`] and does not stop the others. Returns once
    /// every worker has finished.
    pub fn scan_universe<S>(
        &self,
        source: &S,
        universe: &[Security],
        range: &DateRange,
    ) -> Result<UniverseReport>
    where
        S: DataSource + ?Sized,
    {
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("volspike-worker-{i}"))
            .build()
            .map_err(|e| ScanError::ThreadPool(e.to_string()))?;

        let started = Instant::now();
        let (tx, rx) = mpsc::channel::<(String, Result<Vec<TradeDate>>)>();

        pool.scope(|scope| {
            for security in universe {
                let tx = tx.clone();
                scope.spawn(move |_| {
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                        self.scan_worker(source, security, range, started)
                    }))
                    .unwrap_or_else(|payload| {
                        Err(ScanError::WorkerPanicked {
                            security: security.ts_code.clone(),
                            message: panic_message(payload.as_ref()),
                        })
                    });
                    // Receiver outlives the scope, so the send cannot fail.
                    let _ = tx.send((security.ts_code.clone(), outcome));
                });
            }
        });
        drop(tx);

        let mut report = UniverseReport {
            scanned: universe.len(),
            ..Default::default()
        };
        for (security, outcome) in rx {
            match outcome {
                Ok(dates) => {
                    report.matches.insert(security, dates);
                }
                Err(error) => {
                    warn!("{security} skipped: {error}");
                    report.failures.push(SecurityFailure { security, error });
                }
            }
        }
        report.failures.sort_by(|a, b| a.security.cmp(&b.security));

        info!(
            "scanned {} securities in {:.2}s: {} with matches, {} failed",
            report.scanned,
            started.elapsed().as_secs_f64(),
            report.matches.len(),
            report.failures.len()
        );
        Ok(report)
    }

    /// List the universe from `source`, then scan it
    pub fn scan_listed<S>(&self, source: &S, range: &DateRange) -> Result<UniverseReport>
    where
        S: DataSource + UniverseProvider + ?Sized,
    {
        let universe = source.list_universe()?;
        info!("universe holds {} securities", universe.len());
        self.scan_universe(source, &universe, range)
    }

    // ===========================================
    // Internal helpers
    // ===========================================

    fn query(&self, security: &str, range: &DateRange) -> BarQuery {
        BarQuery {
            security_id: security.to_string(),
            range: *range,
            frequency: self.frequency,
            ma_windows: self.ma_windows.clone(),
        }
    }

    fn scan_worker<S>(
        &self,
        source: &S,
        security: &Security,
        range: &DateRange,
        started: Instant,
    ) -> Result<Vec<TradeDate>>
    where
        S: DataSource + ?Sized,
    {
        let id = &security.ts_code;
        if let Some(deadline) = self.deadline {
            if started.elapsed() >= deadline {
                debug!("{id}: deadline already passed, not fetching");
                return Err(ScanError::DeadlineExceeded {
                    security: id.clone(),
                });
            }
        }

        let fetch_start = Instant::now();
        let bars = source.fetch_bars(&self.query(id, range))?;
        let fetch_elapsed = fetch_start.elapsed();

        if let Some(limit) = self.fetch_timeout {
            if fetch_elapsed > limit {
                return Err(ScanError::FetchTimeout {
                    security: id.clone(),
                    elapsed_ms: fetch_elapsed.as_millis(),
                    limit_ms: limit.as_millis(),
                });
            }
        }

        let dates = self.scan_bars(&bars)?;
        info!(
            "{id} ({}) processed in {:.2}s: {} bars, {} match(es)",
            security.name.as_deref().unwrap_or("-"),
            fetch_start.elapsed().as_secs_f64(),
            bars.len(),
            dates.len()
        );
        Ok(dates)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for [`Scanner`] instances
#[derive(Debug, Clone)]
pub struct ScannerBuilder<R: PatternRule = VolumeSpikeRule> {
    rule: R,
    ma_windows: Vec<usize>,
    frequency: Frequency,
    workers: usize,
    deadline: Option<Duration>,
    fetch_timeout: Option<Duration>,
}

/// Worker count when none is configured
pub const DEFAULT_WORKERS: usize = 5;

impl Default for ScannerBuilder<VolumeSpikeRule> {
    fn default() -> Self {
        Self::new()
    }
}

impl ScannerBuilder<VolumeSpikeRule> {
    pub fn new() -> Self {
        Self {
            rule: VolumeSpikeRule::default(),
            ma_windows: MaWindow::defaults().into_iter().map(MaWindow::get).collect(),
            frequency: Frequency::default(),
            workers: DEFAULT_WORKERS,
            deadline: None,
            fetch_timeout: None,
        }
    }
}

impl<R: PatternRule> ScannerBuilder<R> {
    /// Swap the matching rule
    pub fn rule<R2: PatternRule>(self, rule: R2) -> ScannerBuilder<R2> {
        ScannerBuilder {
            rule,
            ma_windows: self.ma_windows,
            frequency: self.frequency,
            workers: self.workers,
            deadline: self.deadline,
            fetch_timeout: self.fetch_timeout,
        }
    }

    /// Moving-average windows, in the order the data source reports them
    pub fn ma_windows(mut self, windows: impl IntoIterator<Item = usize>) -> Self {
        self.ma_windows = windows.into_iter().collect();
        self
    }

    pub fn frequency(mut self, frequency: Frequency) -> Self {
        self.frequency = frequency;
        self
    }

    /// Upper bound on concurrently scanned securities
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Overall budget for a universe scan
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Fetches slower than this are discarded
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<Scanner<R>> {
        if self.workers == 0 {
            return Err(ScanError::InvalidValue("workers must be > 0"));
        }
        if self.ma_windows.is_empty() {
            return Err(ScanError::InvalidConfig(
                "at least one MA window is required".into(),
            ));
        }
        let ma_windows = self
            .ma_windows
            .iter()
            .map(|&w| MaWindow::new(w))
            .collect::<Result<Vec<_>>>()?;
        let mut seen = ma_windows.clone();
        seen.sort();
        seen.dedup();
        if seen.len() != ma_windows.len() {
            return Err(ScanError::InvalidConfig(
                "MA windows must be distinct".into(),
            ));
        }
        self.rule.validate_config()?;
        self.rule.validate_windows(&ma_windows)?;

        Ok(Scanner {
            rule: self.rule,
            ma_windows,
            frequency: self.frequency,
            workers: self.workers,
            deadline: self.deadline,
            fetch_timeout: self.fetch_timeout,
        })
    }
}

// ============================================================
// TESTS
// ============================================================
