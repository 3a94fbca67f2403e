//! Per-day features derived from a [`DailyBar`]
//!
//! A [`FeatureRecord`] answers two questions about a session: did it close up,
//! and which moving averages fall inside its price body. Missing inputs never
//! raise; they degrade to "unknown" (`is_up`) or `false` (range flags).

use std::collections::BTreeMap;

use serde::Serialize;

use crate::{DailyBar, MaWindow, Result, ScanError, TradeDate};

/// Derived, immutable view of one session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRecord {
    pub ts_code: String,
    pub trade_date: TradeDate,
    pub open: Option<f64>,
    pub close: Option<f64>,
    pub pre_close: Option<f64>,
    pub volume: Option<f64>,
    /// `None` when neither pre-close nor open is available to compare against
    pub is_up: Option<bool>,
    /// Window length -> MA inside `[min(open, close, pre_close), max(open, close)]`
    pub ma_in_range: BTreeMap<usize, bool>,
}

impl FeatureRecord {
    /// Derive features for one bar. `windows[k]` names `bar.moving_averages[k]`.
    pub fn from_bar(bar: &DailyBar, windows: &[MaWindow]) -> Result<Self> {
        if bar.moving_averages.len() != windows.len() {
            return Err(ScanError::MaLengthMismatch {
                index: 0,
                windows: windows.len(),
                values: bar.moving_averages.len(),
            });
        }

        let open = finite(bar.open);
        let close = finite(bar.close);
        let pre_close = finite(bar.pre_close);

        let ma_in_range = windows
            .iter()
            .zip(&bar.moving_averages)
            .map(|(window, &ma)| {
                (window.get(), ma_in_range(open, close, pre_close, finite(ma)))
            })
            .collect();

        Ok(Self {
            ts_code: bar.ts_code.clone(),
            trade_date: bar.trade_date,
            open,
            close,
            pre_close,
            volume: finite(bar.volume),
            is_up: classify_up(open, close, pre_close),
            ma_in_range,
        })
    }

    /// Number of windows whose MA sits inside the session body
    #[inline]
    pub fn in_range_count(&self) -> usize {
        self.ma_in_range.values().filter(|&&v| v).count()
    }

    #[inline]
    pub fn in_range(&self, window: usize) -> Option<bool> {
        self.ma_in_range.get(&window).copied()
    }
}

/// Derive features for a whole series, reporting the offending index on a
/// length mismatch
pub fn extract_features(bars: &[DailyBar], windows: &[MaWindow]) -> Result<Vec<FeatureRecord>> {
    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            FeatureRecord::from_bar(bar, windows).map_err(|e| match e {
                ScanError::MaLengthMismatch { windows, values, .. } => {
                    ScanError::MaLengthMismatch { index: i, windows, values }
                }
                other => other,
            })
        })
        .collect()
}

/// Close against pre-close, falling back to close against open
#[inline]
pub fn classify_up(open: Option<f64>, close: Option<f64>, pre_close: Option<f64>) -> Option<bool> {
    let close = close?;
    match (pre_close, open) {
        (Some(pre), _) => Some(close > pre),
        (None, Some(open)) => Some(close > open),
        (None, None) => None,
    }
}

/// Lower bound takes pre-close into account, upper bound does not.
#[inline]
pub fn ma_in_range(
    open: Option<f64>,
    close: Option<f64>,
    pre_close: Option<f64>,
    ma: Option<f64>,
) -> bool {
    let (Some(open), Some(close), Some(ma)) = (open, close, ma) else {
        return false;
    };
    let low = pre_close.map_or(open.min(close), |pre| open.min(close).min(pre));
    let high = open.max(close);
    (low..=high).contains(&ma)
}

#[inline]
fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}
