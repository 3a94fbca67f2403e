//! Matching rules applied to three consecutive sessions
//!
//! Rules see a window as `(pre, cur, next)` in scan order, which runs from the
//! most recent session backwards. The built-in rule only compares the center
//! day against both neighbours, so it is symmetric in `pre` and `next`.

use crate::{features::FeatureRecord, MaWindow, Result};

pub mod volume_spike;

pub use volume_spike::*;

/// Unique identifier for a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuleId(pub &'static str);

impl RuleId {
  #[inline]
  pub fn as_str(&self) -> &'static str {
    self.0
  }
}

/// A predicate over a three-session window
pub trait PatternRule: Send + Sync {
  fn id(&self) -> RuleId;

  fn matches(&self, pre: &FeatureRecord, cur: &FeatureRecord, next: &FeatureRecord) -> bool;

  fn validate_config(&self) -> Result<()> {
    Ok(())
  }

  /// Reject MA window sets this rule could never match against
  fn validate_windows(&self, _windows: &[MaWindow]) -> Result<()> {
    Ok(())
  }
}
