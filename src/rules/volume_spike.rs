//! VOLUME_SPIKE_UPTREND - three up sessions with a volume spike in the middle

use std::collections::HashMap;

use crate::{
  features::FeatureRecord,
  params::{get_count, get_multiple, ParamMeta, ParameterizedRule},
  MaWindow, Result, ScanError,
};

use super::{PatternRule, RuleId};

/// Default spike multiple: center volume must exceed 3x each neighbour
pub const DEFAULT_VOLUME_RATIO: f64 = 3.0;
/// Default number of MA windows that must sit inside the center body
pub const DEFAULT_MIN_MA_IN_RANGE: usize = 4;

/// Three consecutive up sessions, center volume strictly above
/// `volume_ratio` times both neighbours, and at least `min_ma_in_range`
/// of the center's moving averages inside its body.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeSpikeRule {
  pub volume_ratio: f64,
  pub min_ma_in_range: usize,
}

impl Default for VolumeSpikeRule {
  fn default() -> Self {
    Self {
      volume_ratio: DEFAULT_VOLUME_RATIO,
      min_ma_in_range: DEFAULT_MIN_MA_IN_RANGE,
    }
  }
}

impl VolumeSpikeRule {
  pub fn with_defaults() -> Self {
    Self::default()
  }

  pub fn new(volume_ratio: f64, min_ma_in_range: usize) -> Result<Self> {
    let rule = Self { volume_ratio, min_ma_in_range };
    rule.validate_config()?;
    Ok(rule)
  }
}

/// `cur / other`, or `None` when either side is missing, zero or not finite
#[inline]
pub fn volume_ratio(cur: Option<f64>, other: Option<f64>) -> Option<f64> {
  let (cur, other) = (cur?, other?);
  if other == 0.0 {
    return None;
  }
  let ratio = cur / other;
  ratio.is_finite().then_some(ratio)
}

impl PatternRule for VolumeSpikeRule {
  fn id(&self) -> RuleId {
    RuleId("VOLUME_SPIKE_UPTREND")
  }

  fn matches(&self, pre: &FeatureRecord, cur: &FeatureRecord, next: &FeatureRecord) -> bool {
    // Unknown direction counts as not up
    if [pre, cur, next].iter().any(|day| day.is_up != Some(true)) {
      return false;
    }

    let spikes = |neighbour: &FeatureRecord| {
      volume_ratio(cur.volume, neighbour.volume).is_some_and(|r| r > self.volume_ratio)
    };
    if !spikes(pre) || !spikes(next) {
      return false;
    }

    cur.in_range_count() >= self.min_ma_in_range
  }

  fn validate_config(&self) -> Result<()> {
    if !self.volume_ratio.is_finite() || self.volume_ratio <= 0.0 {
      return Err(ScanError::InvalidValue("volume_ratio must be finite and > 0"));
    }
    if self.min_ma_in_range == 0 {
      return Err(ScanError::InvalidValue("min_ma_in_range must be > 0"));
    }
    Ok(())
  }

  fn validate_windows(&self, windows: &[MaWindow]) -> Result<()> {
    if self.min_ma_in_range > windows.len() {
      return Err(ScanError::InvalidConfig(format!(
        "min_ma_in_range = {} needs at least that many MA windows, got {}",
        self.min_ma_in_range,
        windows.len()
      )));
    }
    Ok(())
  }
}

static VOLUME_SPIKE_PARAMS: &[ParamMeta] = &[
  ParamMeta::multiple(
    "volume_ratio",
    DEFAULT_VOLUME_RATIO,
    (1.5, 6.0, 0.5),
    "Center volume must exceed this multiple of each neighbour",
  ),
  ParamMeta::count(
    "min_ma_in_range",
    DEFAULT_MIN_MA_IN_RANGE as f64,
    (1.0, 6.0, 1.0),
    "Minimum moving averages inside the center session body",
  ),
];

impl ParameterizedRule for VolumeSpikeRule {
  fn param_meta() -> &'static [ParamMeta] {
    VOLUME_SPIKE_PARAMS
  }

  fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    Self::new(
      get_multiple(params, "volume_ratio", DEFAULT_VOLUME_RATIO)?,
      get_count(params, "min_ma_in_range", DEFAULT_MIN_MA_IN_RANGE)?,
    )
  }

  fn rule_id_str() -> &'static str {
    "VOLUME_SPIKE_UPTREND"
  }
}
