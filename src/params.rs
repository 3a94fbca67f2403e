//! Parameter metadata for matching rules
//!
//! Describes each tunable rule parameter so callers can:
//! - sweep a parameter grid when tuning thresholds
//! - document the knobs a rule exposes
//!
//! # Example
//!
//! ```rust
//! use volspike::params::ParameterizedRule;
//! use volspike::prelude::*;
//!
//! for param in VolumeSpikeRule::param_meta() {
//!     println!("{}: {:?} (default: {})", param.name, param.param_type, param.default);
//! }
//! ```

use std::collections::HashMap;

use crate::{Result, ScanError};

// ============================================================
// PARAMETER TYPES
// ============================================================

/// Type of parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
  /// Positive multiplier (e.g. volume spike ratio)
  Multiple,
  /// Non-negative whole number (e.g. how many MAs must agree)
  Count,
}

/// Metadata for a single rule parameter
#[derive(Debug, Clone)]
pub struct ParamMeta {
  /// Parameter name (e.g., "volume_ratio")
  pub name: &'static str,
  pub param_type: ParamType,
  pub default: f64,
  /// Range for tuning: (min, max, step)
  pub range: (f64, f64, f64),
  pub description: &'static str,
}

impl ParamMeta {
  pub const fn multiple(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Multiple, default, range, description }
  }

  pub const fn count(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Count, default, range, description }
  }

  /// Generate all values for grid search
  pub fn generate_grid(&self) -> Vec<f64> {
    let (min, max, step) = self.range;
    let mut values = Vec::new();
    let mut v = min;
    while v <= max + f64::EPSILON {
      values.push(v);
      v += step;
    }
    values
  }

  /// Validate a value for this parameter
  pub fn validate(&self, value: f64) -> Result<()> {
    let (min, max, _) = self.range;
    if value < min || value > max {
      return Err(ScanError::OutOfRange { field: self.name, value, min, max });
    }
    match self.param_type {
      ParamType::Multiple => Ok(()),
      ParamType::Count => {
        if value.fract() != 0.0 {
          return Err(ScanError::InvalidValue("Count must be a whole number"));
        }
        Ok(())
      },
    }
  }
}

// ============================================================
// PARAMETERIZED RULE TRAIT
// ============================================================

/// Rules whose thresholds can be discovered and set by name
pub trait ParameterizedRule: Sized {
  /// Returns metadata for all configurable parameters
  fn param_meta() -> &'static [ParamMeta];

  /// Creates a rule from named values. Missing parameters use their defaults.
  fn with_params(params: &HashMap<&str, f64>) -> Result<Self>;

  fn rule_id_str() -> &'static str;
}

// ============================================================
// PARAMETER VALUE HELPERS
// ============================================================

/// Positive finite multiplier from params with default fallback
pub fn get_multiple(params: &HashMap<&str, f64>, key: &str, default: f64) -> Result<f64> {
  let value = params.get(key).copied().unwrap_or(default);
  if !value.is_finite() || value <= 0.0 {
    return Err(ScanError::InvalidValue("Multiple must be finite and > 0"));
  }
  Ok(value)
}

/// Whole-number count from params with default fallback
pub fn get_count(params: &HashMap<&str, f64>, key: &str, default: usize) -> Result<usize> {
  let Some(value) = params.get(key).copied() else {
    return Ok(default);
  };
  if !value.is_finite() || value < 0.0 || value.fract() != 0.0 {
    return Err(ScanError::InvalidValue("Count must be a non-negative whole number"));
  }
  Ok(value as usize)
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_param_meta_multiple() {
    let meta = ParamMeta::multiple("ratio", 3.0, (1.5, 6.0, 0.5), "Spike multiple");

    assert_eq!(meta.name, "ratio");
    assert_eq!(meta.param_type, ParamType::Multiple);
    assert_eq!(meta.default, 3.0);
  }

  #[test]
  fn test_generate_grid() {
    let meta = ParamMeta::count("min", 4.0, (2.0, 4.0, 1.0), "Test");

    let grid = meta.generate_grid();
    assert_eq!(grid, vec![2.0, 3.0, 4.0]);
  }

  #[test]
  fn test_validate_count() {
    let meta = ParamMeta::count("min", 4.0, (1.0, 6.0, 1.0), "Test");

    assert!(meta.validate(1.0).is_ok());
    assert!(meta.validate(6.0).is_ok());
    assert!(meta.validate(0.0).is_err());
    assert!(meta.validate(7.0).is_err());
    assert!(meta.validate(2.5).is_err());
  }

  #[test]
  fn test_validate_multiple() {
    let meta = ParamMeta::multiple("ratio", 3.0, (1.5, 6.0, 0.5), "Test");

    assert!(meta.validate(2.75).is_ok());
    assert!(meta.validate(1.0).is_err());
  }

  #[test]
  fn test_get_multiple_helper() {
    let mut params = HashMap::new();
    params.insert("key1", 2.0);
    params.insert("bad", -1.0);

    assert_eq!(get_multiple(&params, "key1", 3.0).unwrap(), 2.0);
    assert_eq!(get_multiple(&params, "key2", 3.0).unwrap(), 3.0);
    assert!(get_multiple(&params, "bad", 3.0).is_err());
  }

  #[test]
  fn test_get_count_helper() {
    let mut params = HashMap::new();
    params.insert("key1", 5.0);
    params.insert("frac", 2.5);

    assert_eq!(get_count(&params, "key1", 4).unwrap(), 5);
    assert_eq!(get_count(&params, "key2", 4).unwrap(), 4);
    assert!(get_count(&params, "frac", 4).is_err());
  }
}
