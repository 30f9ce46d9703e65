//! Pure scoring function mapping (ledger entry, bank entry, config) to a
//! confidence score and categorical match type. No I/O, no mutable state;
//! every comparison here feeds `ScoreRank`, a fully ordered tuple, so the
//! tie-break chain documented alongside it is the only thing any caller
//! ever needs to sort or pick by — never an ad hoc `if` chain that could
//! silently diverge. Grounded on the ordered-tuple discipline in
//! `windowed_nm.rs::SolutionScore`.

use chrono::NaiveDate;

use crate::config::MatchingConfig;
use crate::model::{BankEntry, Direction, LedgerEntry, MatchType, SubScores};

/// `amount_score` component: 1.0 on an exact match, linear falloff to 0.8
/// at the edge of tolerance, then a gentler falloff beyond tolerance down
/// to 0.
pub fn amount_score(ledger_abs_cents: i64, bank_abs_cents: i64, amount_tolerance_percent: f64) -> f64 {
    let delta = (ledger_abs_cents - bank_abs_cents).abs();
    if delta == 0 {
        return 1.0;
    }
    let tolerance = (ledger_abs_cents as f64 * (amount_tolerance_percent / 100.0)).max(0.0);
    if tolerance > 0.0 && (delta as f64) <= tolerance {
        1.0 - (delta as f64 / tolerance) * 0.2
    } else {
        (1.0 - delta as f64 / ledger_abs_cents.max(1) as f64).max(0.0)
    }
}

/// `date_score` component: 1.0 for same-day, linear falloff to 0.7 at the
/// edge of the tolerance window, 0 beyond it.
pub fn date_score(day_distance: i64, date_tolerance_days: u32) -> f64 {
    let d = day_distance.abs();
    if d == 0 {
        return 1.0;
    }
    let tol = i64::from(date_tolerance_days);
    if d <= tol {
        1.0 - (d as f64 / (tol + 1) as f64) * 0.3
    } else {
        0.0
    }
}

/// `type_score` component: full credit when directions agree (or the check
/// is disabled), a partial penalty (not a hard zero) when they disagree, so
/// a type mismatch can still surface as a discrepancy on an otherwise good
/// match rather than being discarded outright.
pub fn type_score(ledger_direction: Direction, bank_direction: Direction, enable_type_check: bool) -> f64 {
    if !enable_type_check {
        return 1.0;
    }
    if ledger_direction == bank_direction {
        1.0
    } else {
        0.3
    }
}

fn classify_match_type(
    confidence: f64,
    sub_scores: SubScores,
    min_confidence: f64,
    enable_fuzzy: bool,
) -> Option<MatchType> {
    let is_exact = sub_scores.amount_score == 1.0
        && sub_scores.date_score == 1.0
        && sub_scores.type_score == 1.0;
    if is_exact {
        return Some(MatchType::Exact);
    }
    if confidence >= 0.90 {
        return Some(MatchType::Close);
    }
    if enable_fuzzy && confidence >= min_confidence && confidence < 0.90 {
        return Some(MatchType::Fuzzy);
    }
    if confidence >= 0.5 && confidence < min_confidence {
        return Some(MatchType::Possible);
    }
    None
}

/// A scored candidate pairing, carried between candidate generation and
/// assignment. Not a public result type — `engine.rs` converts the winner
/// into a `MatchResult`.
#[derive(Debug, Clone, Copy)]
pub struct ScoredCandidate {
    pub bank_index: usize,
    pub confidence: f64,
    pub match_type: MatchType,
    pub sub_scores: SubScores,
    pub abs_amount_delta: i64,
    pub abs_date_delta: i64,
}

/// Fully ordered tie-break tuple: confidence desc, then smaller amount
/// delta, then smaller date delta, then lexicographically smaller bank id.
/// Sorting or `max_by_key`-ing on the *negation* of this (or reversing the
/// comparator) reproduces the documented tie-break chain verbatim, so no
/// caller needs to hand-write the chain itself.
#[derive(Debug, Clone, PartialEq, PartialOrd)]
pub struct ScoreRank<'a> {
    pub confidence: f64,
    pub neg_abs_amount_delta: i64,
    pub neg_abs_date_delta: i64,
    pub bank_id_rev: std::cmp::Reverse<&'a str>,
}

impl<'a> ScoreRank<'a> {
    pub fn new(candidate: &ScoredCandidate, bank_id: &'a str) -> Self {
        ScoreRank {
            confidence: candidate.confidence,
            neg_abs_amount_delta: -candidate.abs_amount_delta,
            neg_abs_date_delta: -candidate.abs_date_delta,
            bank_id_rev: std::cmp::Reverse(bank_id),
        }
    }
}

/// Score one (ledger, bank) pairing. Returns `None` when confidence falls
/// below 0.5 (not a match at all) per the documented threshold.
pub fn score(
    ledger: &LedgerEntry,
    bank: &BankEntry,
    ledger_normalized_date: NaiveDate,
    config: &MatchingConfig,
) -> Option<ScoredCandidate> {
    let abs_amount_delta = (ledger.absolute_amount_cents() - bank.absolute_amount_cents()).abs();
    let day_distance = (bank.date - ledger_normalized_date).num_days();

    let amount = amount_score(
        ledger.absolute_amount_cents(),
        bank.absolute_amount_cents(),
        config.amount_tolerance_percent,
    );
    let date = date_score(day_distance, config.date_tolerance_days);
    let r#type = type_score(ledger.direction, bank.direction(), config.enable_type_check);

    let w = &config.weights;
    let confidence = w.amount * amount + w.date * date + w.r#type * r#type;

    let sub_scores = SubScores { amount_score: amount, date_score: date, type_score: r#type };
    let match_type = classify_match_type(confidence, sub_scores, config.min_confidence, config.enable_fuzzy)?;

    Some(ScoredCandidate {
        bank_index: 0,
        confidence,
        match_type,
        sub_scores,
        abs_amount_delta,
        abs_date_delta: day_distance.abs(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    fn ledger(amount_cents: i64, direction: Direction) -> LedgerEntry {
        LedgerEntry {
            id: "TX1".into(),
            amount_cents,
            direction,
            timestamp: FixedOffset::east_opt(0).unwrap().with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap(),
        }
    }

    fn bank(amount_cents: i64, date: NaiveDate) -> BankEntry {
        BankEntry { id: "BS1".into(), amount_cents, date }
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn amount_score_exact_is_one() {
        assert_eq!(amount_score(10000, 10000, 0.0), 1.0);
    }

    #[test]
    fn amount_score_within_tolerance_drops_linearly_to_point_eight() {
        // delta = tolerance exactly -> 1.0 - 1.0*0.2 = 0.8
        let score = amount_score(10000, 9900, 1.0);
        assert!((score - 0.8).abs() < 1e-9);
    }

    #[test]
    fn amount_score_beyond_tolerance_uses_fallback_falloff() {
        let score = amount_score(10000, 5000, 1.0);
        assert!((score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn date_score_same_day_is_one() {
        assert_eq!(date_score(0, 3), 1.0);
    }

    #[test]
    fn date_score_beyond_tolerance_is_zero() {
        assert_eq!(date_score(5, 3), 0.0);
    }

    #[test]
    fn type_score_disabled_is_always_one() {
        assert_eq!(type_score(Direction::Credit, Direction::Debit, false), 1.0);
    }

    #[test]
    fn type_score_mismatch_is_partial_penalty_not_zero() {
        assert_eq!(type_score(Direction::Credit, Direction::Debit, true), 0.3);
    }

    #[test]
    fn scenario_s1_exact_pair() {
        let l = ledger(10050, Direction::Credit);
        let b = bank(10050, d(2024, 1, 15));
        let config = MatchingConfig::default();
        let result = score(&l, &b, d(2024, 1, 15), &config).unwrap();
        assert_eq!(result.match_type, MatchType::Exact);
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn scenario_s2_close_amount_within_tolerance() {
        let l = ledger(10000, Direction::Credit);
        let b = bank(10050, d(2024, 1, 15));
        let config = MatchingConfig {
            amount_tolerance_percent: 1.0,
            ..MatchingConfig::default()
        };
        let result = score(&l, &b, d(2024, 1, 15), &config).unwrap();
        assert_eq!(result.match_type, MatchType::Close);
        assert_eq!(result.abs_amount_delta, 50);
    }

    #[test]
    fn scenario_s6_type_mismatch_otherwise_perfect() {
        let l = ledger(10000, Direction::Credit);
        let b = bank(-10000, d(2024, 1, 15));
        let config = MatchingConfig { enable_type_check: true, ..MatchingConfig::default() };
        let result = score(&l, &b, d(2024, 1, 15), &config).unwrap();
        assert_eq!(result.sub_scores.type_score, 0.3);
        assert!(matches!(result.match_type, MatchType::Close | MatchType::Fuzzy));
    }

    #[test]
    fn below_half_confidence_is_not_a_match() {
        let l = ledger(10000, Direction::Credit);
        let b = bank(100, d(2024, 1, 15));
        let config = MatchingConfig::default();
        assert!(score(&l, &b, d(2024, 1, 15), &config).is_none());
    }

    #[test]
    fn score_rank_orders_by_confidence_first() {
        let a = ScoreRank {
            confidence: 0.9,
            neg_abs_amount_delta: 0,
            neg_abs_date_delta: 0,
            bank_id_rev: std::cmp::Reverse("Z"),
        };
        let b = ScoreRank {
            confidence: 0.95,
            neg_abs_amount_delta: -100,
            neg_abs_date_delta: 0,
            bank_id_rev: std::cmp::Reverse("A"),
        };
        assert!(b.partial_cmp(&a).unwrap() == std::cmp::Ordering::Greater);
    }
}
