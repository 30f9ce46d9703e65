//! Discrepancy analyzer: runs over the matched set and the two unmatched
//! sets, emitting tagged findings with confidence-banded severity.
//! Grounded on `classify.rs`'s bucket-assignment pattern and
//! `evidence.rs`'s exhaustive-match summary counting.

use crate::config::{MatchingConfig, TimezonePolicy};
use crate::edge_cases::duplicates::DuplicateGroup;
use crate::model::{Discrepancy, MatchResult, Severity};

/// Emit `AmountDifference`, `DateMismatch`, and `TypeMismatch` findings for
/// the matched set, per the bands documented alongside the scoring
/// function.
pub fn analyze_matches(matches: &[MatchResult<'_>], config: &MatchingConfig) -> Vec<Discrepancy> {
    let mut out = Vec::new();
    for m in matches {
        let delta_cents = m.ledger.absolute_amount_cents() - m.bank.absolute_amount_cents();
        if delta_cents != 0 {
            out.push(Discrepancy::AmountDifference {
                ledger_id: m.ledger.id.clone(),
                bank_id: m.bank.id.clone(),
                delta_cents,
                severity: Severity::from_confidence(m.confidence),
                description: format!(
                    "{} vs {}: amount differs by {} cents",
                    m.ledger.id, m.bank.id, delta_cents
                ),
            });
        }

        if config.timezone_policy == TimezonePolicy::StrictLocal && m.sub_scores.date_score < 1.0 {
            out.push(Discrepancy::DateMismatch {
                ledger_id: m.ledger.id.clone(),
                bank_id: m.bank.id.clone(),
                date_offset_days: (m.bank.date - m.ledger.timestamp.date_naive()).num_days(),
                severity: Severity::from_confidence(m.confidence),
                description: format!("{} vs {}: normalized dates differ", m.ledger.id, m.bank.id),
            });
        }

        if config.enable_type_check && m.ledger.direction != m.bank.direction() {
            out.push(Discrepancy::TypeMismatch {
                ledger_id: m.ledger.id.clone(),
                bank_id: m.bank.id.clone(),
                severity: Severity::from_confidence(m.confidence),
                description: format!(
                    "{} ({}) vs {} ({}): direction mismatch",
                    m.ledger.id, m.ledger.direction, m.bank.id, m.bank.direction()
                ),
            });
        }
    }
    out
}

/// Emit `DuplicateLedger` findings, one per group, each carrying the full
/// group's identifiers. Severity is `Medium` by default: the group is not
/// itself a failed match, but warrants review.
pub fn duplicate_ledger_discrepancies(groups: &[DuplicateGroup], ids: &[String]) -> Vec<Discrepancy> {
    groups
        .iter()
        .map(|g| {
            let group_ids: Vec<String> = g.indexes.iter().map(|&i| ids[i].clone()).collect();
            Discrepancy::DuplicateLedger {
                description: format!("{} ledger entries share amount/direction/date", group_ids.len()),
                ids: group_ids,
                severity: Severity::Medium,
            }
        })
        .collect()
}

/// Emit `DuplicateBank` findings, analogous to `duplicate_ledger_discrepancies`.
pub fn duplicate_bank_discrepancies(groups: &[DuplicateGroup], ids: &[String]) -> Vec<Discrepancy> {
    groups
        .iter()
        .map(|g| {
            let group_ids: Vec<String> = g.indexes.iter().map(|&i| ids[i].clone()).collect();
            Discrepancy::DuplicateBank {
                description: format!("{} bank entries share amount/date", group_ids.len()),
                ids: group_ids,
                severity: Severity::Medium,
            }
        })
        .collect()
}
