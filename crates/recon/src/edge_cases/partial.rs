//! Partial matching (optional, resource-intensive). For an unmatched
//! ledger entry, enumerate small subsets of unmatched same-day bank
//! entries (subset size <= `max_subset_size`) whose amounts sum within
//! tolerance to the ledger amount. Reported as a `PartialMatch` finding,
//! never counted as a standard match. Grounded on
//! `windowed_nm.rs::subset_sum_search`: a bounded recursive DFS with an
//! explicit node-visit cap and `cap_hit` flag.

use crate::config::MatchingConfig;
use crate::model::{BankEntry, LedgerEntry, PartialMatch};

fn amount_within_tolerance(ledger_abs: i64, candidate_sum: i64, config: &MatchingConfig) -> bool {
    let delta = (ledger_abs - candidate_sum).abs();
    if config.amount_tolerance_percent <= 0.0 {
        return delta == 0;
    }
    let tolerance = (ledger_abs as f64 * (config.amount_tolerance_percent / 100.0)).round() as i64;
    delta <= tolerance.max(0)
}

/// For one unmatched ledger entry, search `candidate_bank_idxs` (already
/// filtered to the same normalized date and not yet used) for a subset of
/// size <= `max_subset_size` summing within tolerance to the ledger
/// amount. Stops exploring once `max_candidates_examined` subset-sum nodes
/// have been visited — no silent unbounded search.
pub fn find_partial_match_for_entry(
    ledger_entry: &LedgerEntry,
    bank: &[BankEntry],
    candidate_bank_idxs: &[usize],
    config: &MatchingConfig,
    max_subset_size: usize,
    max_candidates_examined: usize,
) -> Option<PartialMatch> {
    let target = ledger_entry.absolute_amount_cents();
    let mut nodes_visited = 0usize;
    let mut found: Option<Vec<usize>> = None;

    fn search(
        start: usize,
        depth: usize,
        max_depth: usize,
        running_sum: i64,
        current: &mut Vec<usize>,
        candidates: &[usize],
        bank: &[BankEntry],
        target: i64,
        config: &MatchingConfig,
        nodes_visited: &mut usize,
        max_nodes: usize,
        found: &mut Option<Vec<usize>>,
    ) -> bool {
        if found.is_some() {
            return true;
        }
        *nodes_visited += 1;
        if *nodes_visited > max_nodes {
            return false;
        }
        if depth >= 2 && amount_within_tolerance(target, running_sum, config) {
            *found = Some(current.clone());
            return true;
        }
        if depth >= max_depth {
            return true;
        }
        for i in start..candidates.len() {
            let idx = candidates[i];
            let amount = bank[idx].absolute_amount_cents();
            current.push(idx);
            let keep_going = search(
                i + 1,
                depth + 1,
                max_depth,
                running_sum + amount,
                current,
                candidates,
                bank,
                target,
                config,
                nodes_visited,
                max_nodes,
                found,
            );
            current.pop();
            if !keep_going || found.is_some() {
                return keep_going;
            }
        }
        true
    }

    // Subset size requires at least 2 bank entries to be a "split" worth
    // reporting (a size-1 subset summing exactly to the ledger amount
    // would already have been a standard match).
    if max_subset_size >= 2 && candidate_bank_idxs.len() >= 2 {
        let mut current = Vec::new();
        search(
            0,
            0,
            max_subset_size,
            0,
            &mut current,
            candidate_bank_idxs,
            bank,
            target,
            config,
            &mut nodes_visited,
            max_candidates_examined,
            &mut found,
        );
    }

    found.map(|idxs| PartialMatch {
        ledger_id: ledger_entry.id.clone(),
        bank_sum_cents: idxs.iter().map(|&i| bank[i].absolute_amount_cents()).sum(),
        bank_ids: idxs.iter().map(|&i| bank[i].id.clone()).collect(),
        ledger_amount_cents: ledger_entry.amount_cents,
    })
}
