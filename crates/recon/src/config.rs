//! Validated configuration records: `MatchingConfig` for the engine and
//! scoring function, `RequestOptions` for the orchestrator.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ReconError;
use crate::model::Direction;

/// How ledger timestamps are reduced to a date for comparison against
/// bank (date-only) entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimezonePolicy {
    /// Truncate the ledger timestamp to its wall-clock date regardless of
    /// offset.
    Ignore,
    /// Convert to UTC before taking the date.
    NormalizeToUtc,
    /// Leave both sides as-is; mismatches surface as `DateMismatch`.
    StrictLocal,
}

impl fmt::Display for TimezonePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TimezonePolicy::Ignore => "ignore",
            TimezonePolicy::NormalizeToUtc => "normalize_to_utc",
            TimezonePolicy::StrictLocal => "strict_local",
        };
        write!(f, "{s}")
    }
}

/// Scoring weights for the three component scores. Must sum to 1.0 (within
/// floating-point epsilon) — enforced in `MatchingConfig::validate`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    pub amount: f64,
    pub date: f64,
    pub r#type: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Weights { amount: 0.5, date: 0.3, r#type: 0.2 }
    }
}

const WEIGHT_SUM_EPSILON: f64 = 1e-6;

/// The engine and scoring function's configuration. Constructed and
/// validated eagerly; an invalid combination of fields is an
/// `InvalidConfig` error raised before any matching work begins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingConfig {
    pub date_tolerance_days: u32,
    pub amount_tolerance_percent: f64,
    pub enable_fuzzy: bool,
    pub enable_type_check: bool,
    pub min_confidence: f64,
    pub timezone_policy: TimezonePolicy,
    pub max_candidates_per_entry: usize,
    pub weights: Weights,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        MatchingConfig {
            date_tolerance_days: 1,
            amount_tolerance_percent: 0.0,
            enable_fuzzy: true,
            enable_type_check: false,
            min_confidence: 0.75,
            timezone_policy: TimezonePolicy::NormalizeToUtc,
            max_candidates_per_entry: 50,
            weights: Weights::default(),
        }
    }
}

impl MatchingConfig {
    pub fn validate(&self) -> Result<(), ReconError> {
        if self.amount_tolerance_percent < 0.0 || self.amount_tolerance_percent > 100.0 {
            return Err(ReconError::InvalidConfig {
                field: "amount_tolerance_percent".into(),
                message: format!(
                    "must be within [0, 100], got {}",
                    self.amount_tolerance_percent
                ),
                suggestion: "set amount_tolerance_percent between 0 and 100".into(),
            });
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(ReconError::InvalidConfig {
                field: "min_confidence".into(),
                message: format!("must be within [0, 1], got {}", self.min_confidence),
                suggestion: "set min_confidence between 0.0 and 1.0".into(),
            });
        }
        if self.max_candidates_per_entry == 0 {
            return Err(ReconError::InvalidConfig {
                field: "max_candidates_per_entry".into(),
                message: "must be positive".into(),
                suggestion: "set max_candidates_per_entry to at least 1".into(),
            });
        }
        let w = &self.weights;
        for (name, value) in [("amount", w.amount), ("date", w.date), ("type", w.r#type)] {
            if value < 0.0 {
                return Err(ReconError::InvalidConfig {
                    field: format!("weights.{name}"),
                    message: format!("must be non-negative, got {value}"),
                    suggestion: "set all weights to non-negative values".into(),
                });
            }
        }
        let sum = w.amount + w.date + w.r#type;
        if (sum - 1.0).abs() > WEIGHT_SUM_EPSILON {
            return Err(ReconError::InvalidConfig {
                field: "weights".into(),
                message: format!("amount + date + type must sum to 1.0, got {sum}"),
                suggestion: "adjust weights so they sum to exactly 1.0".into(),
            });
        }
        Ok(())
    }
}

/// Edge-case toggles and orchestrator-level knobs, independent of the
/// scoring/matching configuration proper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestOptions {
    pub detect_duplicates: bool,
    pub resolve_same_day_ambiguity: bool,
    pub find_partial_matches: bool,
    pub fix_common_errors: bool,
    pub same_day_bucket_limit: usize,
    pub max_partial_subset_size: usize,
    pub max_partial_candidates_examined: usize,
    pub cancel_check_interval: usize,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub min_amount_cents: Option<i64>,
    pub max_amount_cents: Option<i64>,
    pub exclude_zero: bool,
    pub exclude_negative: bool,
    /// Keep only ledger entries whose direction matches, per spec.md §4.5's
    /// "direction filter". `None` keeps every direction.
    pub direction: Option<Direction>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        RequestOptions {
            detect_duplicates: true,
            resolve_same_day_ambiguity: true,
            find_partial_matches: false,
            fix_common_errors: false,
            same_day_bucket_limit: 16,
            max_partial_subset_size: 3,
            max_partial_candidates_examined: 500,
            cancel_check_interval: 1000,
            start_date: None,
            end_date: None,
            min_amount_cents: None,
            max_amount_cents: None,
            exclude_zero: false,
            exclude_negative: false,
            direction: None,
        }
    }
}

impl RequestOptions {
    pub fn validate(&self) -> Result<(), ReconError> {
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(ReconError::InvalidConfig {
                    field: "start_date/end_date".into(),
                    message: format!("start_date {start} is after end_date {end}"),
                    suggestion: "ensure start_date <= end_date".into(),
                });
            }
        }
        if self.same_day_bucket_limit == 0 {
            return Err(ReconError::InvalidConfig {
                field: "same_day_bucket_limit".into(),
                message: "must be positive".into(),
                suggestion: "set same_day_bucket_limit to at least 1".into(),
            });
        }
        if self.max_partial_subset_size == 0 {
            return Err(ReconError::InvalidConfig {
                field: "max_partial_subset_size".into(),
                message: "must be positive".into(),
                suggestion: "set max_partial_subset_size to at least 1".into(),
            });
        }
        if self.cancel_check_interval == 0 {
            return Err(ReconError::InvalidConfig {
                field: "cancel_check_interval".into(),
                message: "must be positive".into(),
                suggestion: "set cancel_check_interval to at least 1".into(),
            });
        }
        Ok(())
    }
}
