//! Core record and result types: ledger/bank entries, matches, discrepancies,
//! the reconciliation result, and the stage/progress bookkeeping the
//! orchestrator emits.

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Direction of a transaction, independent of which side (ledger or bank)
/// it was observed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    Credit,
    Debit,
}

impl Direction {
    /// The direction implied by a signed bank amount: negative is a debit,
    /// non-negative (including zero, though zero amounts are rejected
    /// upstream) is a credit.
    pub fn from_signed_amount(amount_cents: i64) -> Self {
        if amount_cents < 0 {
            Direction::Debit
        } else {
            Direction::Credit
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Credit => write!(f, "credit"),
            Direction::Debit => write!(f, "debit"),
        }
    }
}

/// A record from the internal transaction system.
///
/// `amount_cents` is signed; `direction` is carried explicitly rather than
/// derived from the sign, since the source ledger tags direction
/// independently of amount sign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: String,
    pub amount_cents: i64,
    pub direction: Direction,
    pub timestamp: DateTime<FixedOffset>,
}

impl LedgerEntry {
    pub fn absolute_amount_cents(&self) -> i64 {
        self.amount_cents.abs()
    }
}

/// A record from an external bank statement. Sign encodes direction:
/// negative is a debit, non-negative is a credit. Date-only, no
/// time-of-day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankEntry {
    pub id: String,
    pub amount_cents: i64,
    pub date: NaiveDate,
}

impl BankEntry {
    pub fn absolute_amount_cents(&self) -> i64 {
        self.amount_cents.abs()
    }

    pub fn direction(&self) -> Direction {
        Direction::from_signed_amount(self.amount_cents)
    }
}

/// Categorical match-quality band, ordered worst to best for comparisons
/// like "promoted to a higher type".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MatchType {
    Possible,
    Fuzzy,
    Close,
    Exact,
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MatchType::Exact => "exact",
            MatchType::Close => "close",
            MatchType::Fuzzy => "fuzzy",
            MatchType::Possible => "possible",
        };
        write!(f, "{s}")
    }
}

/// Component sub-scores produced by the scoring function, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    pub amount_score: f64,
    pub date_score: f64,
    pub type_score: f64,
}

/// A 1:1 association between a ledger entry and a bank entry. Holds
/// non-owning references into the input batches; the batches must outlive
/// any `MatchResult` built from them.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult<'a> {
    pub ledger: &'a LedgerEntry,
    pub bank: &'a BankEntry,
    pub confidence: f64,
    pub match_type: MatchType,
    pub sub_scores: SubScores,
}

/// Severity band attached to a discrepancy, derived from the underlying
/// match's confidence (see the scoring-to-severity mapping in `discrepancy.rs`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

impl Severity {
    /// Confidence-band mapping shared by every discrepancy kind that is
    /// derived from a match's confidence (AmountDifference, TypeMismatch).
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.9 {
            Severity::Low
        } else if confidence >= 0.7 {
            Severity::Medium
        } else if confidence >= 0.5 {
            Severity::High
        } else {
            Severity::Critical
        }
    }
}

/// A finding about matched or unmatched entries that warrants attention.
/// Holds owned identifiers (not references) so a `Discrepancy` can outlive
/// the borrow-scoped `MatchResult` list it was derived from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Discrepancy {
    AmountDifference {
        ledger_id: String,
        bank_id: String,
        delta_cents: i64,
        severity: Severity,
        description: String,
    },
    DateMismatch {
        ledger_id: String,
        bank_id: String,
        date_offset_days: i64,
        severity: Severity,
        description: String,
    },
    TypeMismatch {
        ledger_id: String,
        bank_id: String,
        severity: Severity,
        description: String,
    },
    DuplicateLedger {
        ids: Vec<String>,
        severity: Severity,
        description: String,
    },
    DuplicateBank {
        ids: Vec<String>,
        severity: Severity,
        description: String,
    },
}

impl Discrepancy {
    pub fn severity(&self) -> Severity {
        match self {
            Discrepancy::AmountDifference { severity, .. }
            | Discrepancy::DateMismatch { severity, .. }
            | Discrepancy::TypeMismatch { severity, .. }
            | Discrepancy::DuplicateLedger { severity, .. }
            | Discrepancy::DuplicateBank { severity, .. } => *severity,
        }
    }
}

/// A candidate partial match: a small group of bank entries whose amounts
/// sum within tolerance to one unmatched ledger entry. Not counted as a
/// standard match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialMatch {
    pub ledger_id: String,
    pub bank_ids: Vec<String>,
    pub ledger_amount_cents: i64,
    pub bank_sum_cents: i64,
}

/// Per-stage duration and parse-error bookkeeping attached to the final
/// result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingStats {
    pub stage_durations_ms: Vec<(String, u64)>,
    pub ledger_parse_errors: usize,
    pub bank_parse_errors: usize,
    pub warnings: Vec<String>,
}

/// Summary counts and totals over one reconciliation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationSummary {
    pub matched_count: usize,
    pub exact_count: usize,
    pub close_count: usize,
    pub fuzzy_count: usize,
    pub possible_count: usize,
    pub unmatched_ledger_count: usize,
    pub unmatched_bank_count: usize,
    pub total_ledger_amount_cents: i64,
    pub total_bank_amount_cents: i64,
    pub net_discrepancy_cents: i64,
}

/// The fully populated result of one reconciliation run. Match results and
/// unmatched-entry lists borrow from the input batches.
#[derive(Debug, Clone)]
pub struct ReconciliationResult<'a> {
    pub matches: Vec<MatchResult<'a>>,
    pub unmatched_ledger: Vec<&'a LedgerEntry>,
    pub unmatched_bank: Vec<&'a BankEntry>,
    pub partial_matches: Vec<PartialMatch>,
    pub discrepancies: Vec<Discrepancy>,
    pub summary: ReconciliationSummary,
    pub stats: ProcessingStats,
}

/// Result of one parser invocation (a collaborator concern; this crate
/// never parses anything itself, only consumes the record).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParseStats {
    pub rows_seen: usize,
    pub rows_parsed: usize,
    pub error_count: usize,
    pub first_error_line: Option<usize>,
    pub duration_ms: u64,
}

/// Orchestrator pipeline stage. Linear, no cycles; any step may transition
/// to `Failed` or `Cancelled` instead of advancing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Step {
    Validating,
    ParsingLedger,
    ParsingBanks,
    Preprocessing,
    EdgeCasePre,
    Filtering,
    Matching,
    EdgeCasePost,
    Aggregating,
    Completed,
    Failed,
    Cancelled,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Step::Validating => "validating",
            Step::ParsingLedger => "parsing_ledger",
            Step::ParsingBanks => "parsing_banks",
            Step::Preprocessing => "preprocessing",
            Step::EdgeCasePre => "edge_case_pre",
            Step::Filtering => "filtering",
            Step::Matching => "matching",
            Step::EdgeCasePost => "edge_case_post",
            Step::Aggregating => "aggregating",
            Step::Completed => "completed",
            Step::Failed => "failed",
            Step::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Emitted on every stage transition via the `ProgressSink` collaborator
/// trait. Never carries a `Utc::now()` call directly inside the matching
/// engine; timestamps come from the injected `Clock`.
#[derive(Debug, Clone)]
pub struct ReconciliationProgress {
    pub current_step: Step,
    pub completed_steps: u32,
    pub total_steps: u32,
    pub elapsed: std::time::Duration,
    pub estimated_remaining: Option<std::time::Duration>,
    pub matched_so_far: usize,
    pub ledger_processed: usize,
    pub bank_processed: usize,
    pub timestamp: DateTime<Utc>,
}
