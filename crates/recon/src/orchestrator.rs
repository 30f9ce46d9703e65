//! Orchestrator: validates the request, invokes collaborators to load
//! data, sequences preprocessing -> engine -> edge handling -> aggregation,
//! emits progress events, and compiles the final result. Grounded on
//! `engine.rs::run`'s stage-sequencing shape (aggregate -> dispatch ->
//! classify -> summarize -> assemble result) and `model.rs`'s
//! `StepStatus`/`StepResult` typed-stage-outcome discipline, generalized to
//! a trait-based collaborator boundary since this crate takes no file
//! paths directly.

use std::time::{Duration, Instant};

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

use crate::config::{MatchingConfig, RequestOptions};
use crate::discrepancy;
use crate::edge_cases::{duplicates, partial, same_day, timezone};
use crate::engine;
use crate::error::ReconError;
use crate::index::BankIndex;
use crate::model::{
    BankEntry, LedgerEntry, ParseStats, PartialMatch, ProcessingStats,
    ReconciliationProgress, ReconciliationResult, ReconciliationSummary, Step,
};

/// Produces parsed, in-memory record batches. CSV dialect, header
/// aliasing, decimal parsing, and timezone tagging are the implementor's
/// concern; this crate only consumes the finished batch plus its stats.
pub trait RecordParser {
    fn parse_ledger(&self) -> Result<(Vec<LedgerEntry>, ParseStats), ReconError>;
    fn parse_banks(&self) -> Result<(Vec<BankEntry>, ParseStats), ReconError>;
}

/// Receives progress events. Must not panic; the orchestrator does not
/// observe a return value.
pub trait ProgressSink {
    fn on_progress(&mut self, event: &ReconciliationProgress);
}

/// A no-op sink, used as test/default scaffolding — this crate ships no
/// concrete reporting implementation.
pub struct NoopProgressSink;

impl ProgressSink for NoopProgressSink {
    fn on_progress(&mut self, _event: &ReconciliationProgress) {}
}

/// Injectable time source: a monotonic clock for stage durations, and a
/// wall clock for the +/-20-year sanity check and progress timestamps.
/// Injectable so tests stay deterministic.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
    fn monotonic(&self) -> Instant;
}

/// The system clock. The only concrete `Clock` this crate ships.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
    fn monotonic(&self) -> Instant {
        Instant::now()
    }
}

/// Cooperative cancellation: checked between stages and every
/// `RequestOptions::cancel_check_interval` ledger entries inside the
/// engine. Returning `true` stops the run with `ReconError::Cancelled`.
pub trait CancellationToken {
    fn is_cancelled(&self) -> bool;
}

/// Never cancels — default scaffolding for callers that don't need it.
pub struct NeverCancel;

impl CancellationToken for NeverCancel {
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// One reconciliation request: the matching configuration plus the
/// orchestrator-level options (filters, edge-case toggles, cancellation
/// cadence).
#[derive(Debug, Clone)]
pub struct ReconciliationRequest {
    pub matching: MatchingConfig,
    pub options: RequestOptions,
}

impl ReconciliationRequest {
    pub fn validate(&self) -> Result<(), ReconError> {
        self.matching.validate()?;
        self.options.validate()
    }
}

const TOTAL_STEPS: u32 = 9;
const SANITY_WINDOW_YEARS: i64 = 20;

fn step_index(step: Step) -> u32 {
    match step {
        Step::Validating => 0,
        Step::ParsingLedger => 1,
        Step::ParsingBanks => 2,
        Step::Preprocessing => 3,
        Step::EdgeCasePre => 4,
        Step::Filtering => 5,
        Step::Matching => 6,
        Step::EdgeCasePost => 7,
        Step::Aggregating => 8,
        Step::Completed | Step::Failed | Step::Cancelled => TOTAL_STEPS,
    }
}

struct ProgressEmitter<'a, S: ProgressSink, C: Clock> {
    sink: &'a mut S,
    clock: &'a C,
    started_at: Instant,
    matched_so_far: usize,
    ledger_processed: usize,
    bank_processed: usize,
}

impl<'a, S: ProgressSink, C: Clock> ProgressEmitter<'a, S, C> {
    fn emit(&mut self, step: Step) {
        let completed = step_index(step);
        let elapsed = self.clock.monotonic().saturating_duration_since(self.started_at);
        let estimated_remaining = if completed > 0 && completed < TOTAL_STEPS {
            let per_step = elapsed.as_secs_f64() / completed as f64;
            Some(Duration::from_secs_f64(per_step * (TOTAL_STEPS - completed) as f64))
        } else {
            None
        };
        self.sink.on_progress(&ReconciliationProgress {
            current_step: step,
            completed_steps: completed,
            total_steps: TOTAL_STEPS,
            elapsed,
            estimated_remaining,
            matched_so_far: self.matched_so_far,
            ledger_processed: self.ledger_processed,
            bank_processed: self.bank_processed,
            timestamp: self.clock.now(),
        });
    }
}

fn validate_ledger_entry(entry: &LedgerEntry, now: DateTime<Utc>) -> Result<(), ReconError> {
    if entry.id.trim().is_empty() {
        return Err(ReconError::InvalidInput {
            record_id: entry.id.clone(),
            field: "id".into(),
            message: "identifier must not be empty".into(),
        });
    }
    if entry.amount_cents == 0 {
        return Err(ReconError::InvalidInput {
            record_id: entry.id.clone(),
            field: "amount_cents".into(),
            message: "amount must not be zero".into(),
        });
    }
    let years = (now - entry.timestamp.with_timezone(&Utc)).num_days().abs() / 365;
    if years > SANITY_WINDOW_YEARS {
        return Err(ReconError::InvalidInput {
            record_id: entry.id.clone(),
            field: "timestamp".into(),
            message: format!("timestamp is more than {SANITY_WINDOW_YEARS} years from now"),
        });
    }
    Ok(())
}

fn validate_bank_entry(entry: &BankEntry, today: NaiveDate) -> Result<(), ReconError> {
    if entry.id.trim().is_empty() {
        return Err(ReconError::InvalidInput {
            record_id: entry.id.clone(),
            field: "id".into(),
            message: "identifier must not be empty".into(),
        });
    }
    if entry.amount_cents == 0 {
        return Err(ReconError::InvalidInput {
            record_id: entry.id.clone(),
            field: "amount_cents".into(),
            message: "amount must not be zero".into(),
        });
    }
    let years = (today - entry.date).num_days().abs() / 365;
    if years > SANITY_WINDOW_YEARS {
        return Err(ReconError::InvalidInput {
            record_id: entry.id.clone(),
            field: "date".into(),
            message: format!("date is more than {SANITY_WINDOW_YEARS} years from now"),
        });
    }
    Ok(())
}

/// Minimum non-zero amount a "bumped" zero amount is raised to, per the
/// `fix_common_errors` repair policy (spec §7).
const MIN_BUMPED_AMOUNT_CENTS: i64 = 1;

/// Sentinel date a collaborator parser may emit for an unparseable
/// timestamp; substituted with the caller's wall-clock date when
/// `fix_common_errors` is enabled.
fn epoch_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()
}

/// Repair common per-record problems in place: empty identifiers get a
/// synthetic one, zero amounts are bumped to a minimum, and a zero
/// (epoch) timestamp is replaced with the current time. Applied only when
/// `RequestOptions::fix_common_errors` is set; entries that remain invalid
/// afterward (e.g. a timestamp genuinely outside the sanity window) are
/// dropped by the validation pass that follows, not fixed here.
fn apply_common_fixes_ledger(ledger: &mut [LedgerEntry], now: DateTime<Utc>, warnings: &mut Vec<String>) {
    let substitute_offset = FixedOffset::east_opt(0).unwrap();
    for (idx, entry) in ledger.iter_mut().enumerate() {
        if entry.id.trim().is_empty() {
            let synthetic = format!("SYNTH-LEDGER-{idx}");
            warnings.push(format!("assigned synthetic identifier {synthetic} to unidentified ledger entry"));
            entry.id = synthetic;
        }
        if entry.amount_cents == 0 {
            warnings.push(format!("bumped zero amount on ledger entry {} to {MIN_BUMPED_AMOUNT_CENTS} cent", entry.id));
            entry.amount_cents = MIN_BUMPED_AMOUNT_CENTS;
        }
        if entry.timestamp.timestamp() == 0 {
            warnings.push(format!("substituted current time for zero timestamp on ledger entry {}", entry.id));
            entry.timestamp = now.with_timezone(&substitute_offset);
        }
    }
}

/// Bank-entry counterpart of `apply_common_fixes_ledger`. Bank entries have
/// no time-of-day, so the zero-timestamp fix substitutes an epoch-dated
/// entry's date with the caller's current date instead.
fn apply_common_fixes_bank(bank: &mut [BankEntry], today: NaiveDate, warnings: &mut Vec<String>) {
    let epoch = epoch_date();
    for (idx, entry) in bank.iter_mut().enumerate() {
        if entry.id.trim().is_empty() {
            let synthetic = format!("SYNTH-BANK-{idx}");
            warnings.push(format!("assigned synthetic identifier {synthetic} to unidentified bank entry"));
            entry.id = synthetic;
        }
        if entry.amount_cents == 0 {
            warnings.push(format!("bumped zero amount on bank entry {} to {MIN_BUMPED_AMOUNT_CENTS} cent", entry.id));
            entry.amount_cents = MIN_BUMPED_AMOUNT_CENTS;
        }
        if entry.date == epoch {
            warnings.push(format!("substituted current date for zero-dated bank entry {}", entry.id));
            entry.date = today;
        }
    }
}

fn passes_filters(
    entry: &LedgerEntry,
    normalized_date: NaiveDate,
    options: &RequestOptions,
) -> bool {
    if let Some(start) = options.start_date {
        if normalized_date < start {
            return false;
        }
    }
    if let Some(end) = options.end_date {
        if normalized_date > end {
            return false;
        }
    }
    if let Some(min) = options.min_amount_cents {
        if entry.amount_cents.abs() < min {
            return false;
        }
    }
    if let Some(max) = options.max_amount_cents {
        if entry.amount_cents.abs() > max {
            return false;
        }
    }
    if options.exclude_zero && entry.amount_cents == 0 {
        return false;
    }
    if options.exclude_negative && entry.amount_cents < 0 {
        return false;
    }
    if let Some(direction) = options.direction {
        if entry.direction != direction {
            return false;
        }
    }
    true
}

/// Run one reconciliation: validate, load via the `RecordParser`
/// collaborator, preprocess, filter, match, resolve edge cases, aggregate,
/// and return the fully populated result. `ledger_storage`/`bank_storage`
/// are caller-owned buffers the result's borrowed fields live inside —
/// the caller must keep them alive for as long as the result is used.
pub fn run<'a, P: RecordParser, S: ProgressSink, C: Clock, T: CancellationToken>(
    request: &ReconciliationRequest,
    parser: &P,
    progress: &mut S,
    clock: &C,
    cancel: &T,
    ledger_storage: &'a mut Vec<LedgerEntry>,
    bank_storage: &'a mut Vec<BankEntry>,
) -> Result<ReconciliationResult<'a>, ReconError> {
    let started_at = clock.monotonic();
    let mut emitter = ProgressEmitter {
        sink: progress,
        clock,
        started_at,
        matched_so_far: 0,
        ledger_processed: 0,
        bank_processed: 0,
    };
    let mut stats = ProcessingStats::default();
    let mut stage_start = started_at;

    let mut record_stage = |stats: &mut ProcessingStats, name: &str, clock: &C, stage_start: &mut Instant| {
        let now = clock.monotonic();
        stats.stage_durations_ms.push((name.to_string(), now.saturating_duration_since(*stage_start).as_millis() as u64));
        *stage_start = now;
    };

    emitter.emit(Step::Validating);
    request.validate()?;
    record_stage(&mut stats, "validating", clock, &mut stage_start);

    if cancel.is_cancelled() {
        return Err(ReconError::Cancelled);
    }

    emitter.emit(Step::ParsingLedger);
    let (ledger, ledger_parse_stats) = parser.parse_ledger()?;
    *ledger_storage = ledger;
    stats.ledger_parse_errors = ledger_parse_stats.error_count;
    record_stage(&mut stats, "parsing_ledger", clock, &mut stage_start);

    if cancel.is_cancelled() {
        return Err(ReconError::Cancelled);
    }

    emitter.emit(Step::ParsingBanks);
    let (bank, bank_parse_stats) = parser.parse_banks()?;
    *bank_storage = bank;
    stats.bank_parse_errors = bank_parse_stats.error_count;
    record_stage(&mut stats, "parsing_banks", clock, &mut stage_start);

    if ledger_storage.is_empty() && bank_storage.is_empty() {
        return Err(ReconError::InvalidConfig {
            field: "ledger/bank".into(),
            message: "both input batches are empty".into(),
            suggestion: "provide at least one ledger or bank entry".into(),
        });
    }

    let now = clock.now();
    let today = now.date_naive();

    if request.options.fix_common_errors {
        apply_common_fixes_ledger(ledger_storage, now, &mut stats.warnings);
        apply_common_fixes_bank(bank_storage, today, &mut stats.warnings);
    }

    let mut kept_ledger = Vec::with_capacity(ledger_storage.len());
    for entry in ledger_storage.drain(..) {
        match validate_ledger_entry(&entry, now) {
            Ok(()) => kept_ledger.push(entry),
            Err(e) if request.options.fix_common_errors => {
                stats.warnings.push(format!("dropped invalid ledger entry {}: {e}", entry.id));
            }
            Err(e) => return Err(e),
        }
    }
    *ledger_storage = kept_ledger;

    let mut kept_bank = Vec::with_capacity(bank_storage.len());
    for entry in bank_storage.drain(..) {
        match validate_bank_entry(&entry, today) {
            Ok(()) => kept_bank.push(entry),
            Err(e) if request.options.fix_common_errors => {
                stats.warnings.push(format!("dropped invalid bank entry {}: {e}", entry.id));
            }
            Err(e) => return Err(e),
        }
    }
    *bank_storage = kept_bank;

    if cancel.is_cancelled() {
        return Err(ReconError::Cancelled);
    }

    emitter.emit(Step::Preprocessing);
    let normalized_dates = timezone::normalize_ledger_dates(ledger_storage, request.matching.timezone_policy);
    record_stage(&mut stats, "preprocessing", clock, &mut stage_start);

    emitter.emit(Step::EdgeCasePre);
    let duplicate_ledger_groups = if request.options.detect_duplicates {
        duplicates::detect_duplicate_ledger(ledger_storage, &normalized_dates)
    } else {
        Vec::new()
    };
    let duplicate_bank_groups = if request.options.detect_duplicates {
        duplicates::detect_duplicate_bank(bank_storage)
    } else {
        Vec::new()
    };
    record_stage(&mut stats, "edge_case_pre", clock, &mut stage_start);

    if cancel.is_cancelled() {
        return Err(ReconError::Cancelled);
    }

    emitter.emit(Step::Filtering);
    let keep_ledger: Vec<bool> = ledger_storage
        .iter()
        .zip(normalized_dates.iter())
        .map(|(entry, &date)| passes_filters(entry, date, &request.options))
        .collect();
    record_stage(&mut stats, "filtering", clock, &mut stage_start);

    emitter.emit(Step::Matching);
    let filtered_ledger_idxs: Vec<usize> =
        (0..ledger_storage.len()).filter(|&i| keep_ledger[i]).collect();
    let filtered_ledger: Vec<LedgerEntry> =
        filtered_ledger_idxs.iter().map(|&i| ledger_storage[i].clone()).collect();
    let filtered_dates: Vec<NaiveDate> =
        filtered_ledger_idxs.iter().map(|&i| normalized_dates[i]).collect();

    let index = BankIndex::build(bank_storage);
    let mut cancelled_mid_match = false;
    let (engine_output, was_cancelled) = engine::run_matching(
        &filtered_ledger,
        bank_storage,
        &filtered_dates,
        &index,
        &request.matching,
        request.options.cancel_check_interval,
        || cancel.is_cancelled(),
    );
    if was_cancelled {
        cancelled_mid_match = true;
    }
    record_stage(&mut stats, "matching", clock, &mut stage_start);

    if cancelled_mid_match {
        return Err(ReconError::Cancelled);
    }

    emitter.emit(Step::EdgeCasePost);
    let mut matched_pairs: Vec<(usize, usize)> = engine_output
        .matched_pairs
        .iter()
        .map(|&(fli, bi)| (filtered_ledger_idxs[fli], bi))
        .collect();
    let mut unmatched_ledger_idxs: Vec<usize> = engine_output
        .unmatched_ledger
        .iter()
        .map(|&fli| filtered_ledger_idxs[fli])
        .collect();
    unmatched_ledger_idxs.extend((0..ledger_storage.len()).filter(|&i| !keep_ledger[i]));
    let mut unmatched_bank_idxs = engine_output.unmatched_bank.clone();

    if request.options.resolve_same_day_ambiguity {
        resolve_same_day_ambiguity(
            ledger_storage,
            bank_storage,
            &normalized_dates,
            &request.matching,
            &request.options,
            &mut matched_pairs,
            &mut unmatched_ledger_idxs,
            &mut unmatched_bank_idxs,
            &mut stats,
        );
    }

    let mut partial_matches = Vec::new();
    if request.options.find_partial_matches {
        partial_matches = find_all_partial_matches(
            ledger_storage,
            bank_storage,
            &normalized_dates,
            &unmatched_ledger_idxs,
            &unmatched_bank_idxs,
            &request.matching,
            &request.options,
        );
    }
    record_stage(&mut stats, "edge_case_post", clock, &mut stage_start);

    emitter.emit(Step::Aggregating);
    let matches = engine::to_match_results(
        &engine::EngineOutput {
            matched_pairs: matched_pairs.clone(),
            unmatched_ledger: Vec::new(),
            unmatched_bank: Vec::new(),
        },
        ledger_storage,
        bank_storage,
        &normalized_dates,
        &request.matching,
    );

    let mut discrepancies = discrepancy::analyze_matches(&matches, &request.matching);
    let ledger_ids: Vec<String> = ledger_storage.iter().map(|e| e.id.clone()).collect();
    let bank_ids: Vec<String> = bank_storage.iter().map(|e| e.id.clone()).collect();
    discrepancies.extend(discrepancy::duplicate_ledger_discrepancies(&duplicate_ledger_groups, &ledger_ids));
    discrepancies.extend(discrepancy::duplicate_bank_discrepancies(&duplicate_bank_groups, &bank_ids));

    let summary = build_summary(&matches, &unmatched_ledger_idxs, &unmatched_bank_idxs, ledger_storage, bank_storage);
    record_stage(&mut stats, "aggregating", clock, &mut stage_start);

    emitter.matched_so_far = matches.len();
    emitter.ledger_processed = ledger_storage.len();
    emitter.bank_processed = bank_storage.len();
    emitter.emit(Step::Completed);

    unmatched_ledger_idxs.sort_unstable();
    unmatched_ledger_idxs.dedup();
    unmatched_bank_idxs.sort_unstable();
    unmatched_bank_idxs.dedup();

    Ok(ReconciliationResult {
        matches,
        unmatched_ledger: unmatched_ledger_idxs.iter().map(|&i| &ledger_storage[i]).collect(),
        unmatched_bank: unmatched_bank_idxs.iter().map(|&i| &bank_storage[i]).collect(),
        partial_matches,
        discrepancies,
        summary,
        stats,
    })
}

#[allow(clippy::too_many_arguments)]
fn resolve_same_day_ambiguity(
    ledger: &[LedgerEntry],
    bank: &[BankEntry],
    normalized_dates: &[NaiveDate],
    config: &MatchingConfig,
    options: &RequestOptions,
    matched_pairs: &mut Vec<(usize, usize)>,
    unmatched_ledger_idxs: &mut Vec<usize>,
    unmatched_bank_idxs: &mut Vec<usize>,
    stats: &mut ProcessingStats,
) {
    use std::collections::BTreeMap;

    let mut buckets: BTreeMap<NaiveDate, (Vec<usize>, Vec<usize>, Vec<(usize, usize)>)> = BTreeMap::new();
    for &(li, bi) in matched_pairs.iter() {
        let date = normalized_dates[li];
        let bucket = buckets.entry(date).or_default();
        bucket.0.push(li);
        bucket.1.push(bi);
        bucket.2.push((li, bi));
    }

    let mut new_matched_pairs = Vec::new();
    for (date, (ledger_idxs, bank_idxs, fallback)) in buckets {
        if ledger_idxs.len() < 2 {
            new_matched_pairs.extend(fallback);
            continue;
        }
        let outcome = same_day::repair_bucket(
            ledger,
            bank,
            &ledger_idxs,
            &bank_idxs,
            date,
            config,
            options.same_day_bucket_limit,
            &fallback,
        );
        if outcome.fell_back {
            stats.warnings.push(format!(
                "same-day bucket on {date} exceeded the size bound; kept the existing greedy assignment"
            ));
        }
        let repaired_ledger: Vec<usize> = outcome.pairs.iter().map(|&(l, _)| l).collect();
        for &li in &ledger_idxs {
            if !repaired_ledger.contains(&li) {
                unmatched_ledger_idxs.push(li);
            }
        }
        let repaired_bank: Vec<usize> = outcome.pairs.iter().map(|&(_, b)| b).collect();
        for &bi in &bank_idxs {
            if !repaired_bank.contains(&bi) {
                unmatched_bank_idxs.push(bi);
            }
        }
        new_matched_pairs.extend(outcome.pairs);
    }
    *matched_pairs = new_matched_pairs;
}

#[allow(clippy::too_many_arguments)]
fn find_all_partial_matches(
    ledger: &[LedgerEntry],
    bank: &[BankEntry],
    normalized_dates: &[NaiveDate],
    unmatched_ledger_idxs: &[usize],
    unmatched_bank_idxs: &[usize],
    config: &MatchingConfig,
    options: &RequestOptions,
) -> Vec<PartialMatch> {
    let mut used_bank = vec![false; bank.len()];
    let mut out = Vec::new();
    let mut examined = 0usize;

    for &li in unmatched_ledger_idxs {
        if examined >= options.max_partial_candidates_examined {
            break;
        }
        let date = normalized_dates[li];
        let same_day_unmatched: Vec<usize> = unmatched_bank_idxs
            .iter()
            .copied()
            .filter(|&bi| bank[bi].date == date && !used_bank[bi])
            .collect();
        examined += same_day_unmatched.len();
        if let Some(partial) = partial::find_partial_match_for_entry(
            &ledger[li],
            bank,
            &same_day_unmatched,
            config,
            options.max_partial_subset_size,
            options.max_partial_candidates_examined.saturating_sub(examined).max(64),
        ) {
            for bi in unmatched_bank_idxs.iter().filter(|&&bi| partial.bank_ids.contains(&bank[bi].id)) {
                used_bank[*bi] = true;
            }
            out.push(partial);
        }
    }
    out
}

fn build_summary(
    matches: &[crate::model::MatchResult<'_>],
    unmatched_ledger_idxs: &[usize],
    unmatched_bank_idxs: &[usize],
    ledger: &[LedgerEntry],
    bank: &[BankEntry],
) -> ReconciliationSummary {
    use crate::model::MatchType;

    let mut exact_count = 0;
    let mut close_count = 0;
    let mut fuzzy_count = 0;
    let mut possible_count = 0;
    for m in matches {
        match m.match_type {
            MatchType::Exact => exact_count += 1,
            MatchType::Close => close_count += 1,
            MatchType::Fuzzy => fuzzy_count += 1,
            MatchType::Possible => possible_count += 1,
        }
    }

    let total_ledger_amount_cents: i64 = ledger.iter().map(|e| e.amount_cents.abs()).sum();
    let total_bank_amount_cents: i64 = bank.iter().map(|e| e.amount_cents.abs()).sum();

    ReconciliationSummary {
        matched_count: matches.len(),
        exact_count,
        close_count,
        fuzzy_count,
        possible_count,
        unmatched_ledger_count: unmatched_ledger_idxs.len(),
        unmatched_bank_count: unmatched_bank_idxs.len(),
        total_ledger_amount_cents,
        total_bank_amount_cents,
        net_discrepancy_cents: total_ledger_amount_cents - total_bank_amount_cents,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    struct FixedParser {
        ledger: Vec<LedgerEntry>,
        bank: Vec<BankEntry>,
    }

    impl RecordParser for FixedParser {
        fn parse_ledger(&self) -> Result<(Vec<LedgerEntry>, ParseStats), ReconError> {
            Ok((self.ledger.clone(), ParseStats::default()))
        }
        fn parse_banks(&self) -> Result<(Vec<BankEntry>, ParseStats), ReconError> {
            Ok((self.bank.clone(), ParseStats::default()))
        }
    }

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
        fn monotonic(&self) -> Instant {
            Instant::now()
        }
    }

    fn ledger(id: &str, amount_cents: i64) -> LedgerEntry {
        LedgerEntry {
            id: id.into(),
            amount_cents,
            direction: crate::model::Direction::Credit,
            timestamp: FixedOffset::east_opt(0).unwrap().with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap(),
        }
    }

    fn bank(id: &str, amount_cents: i64) -> BankEntry {
        BankEntry { id: id.into(), amount_cents, date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap() }
    }

    #[test]
    fn scenario_s1_end_to_end_exact_pair() {
        let parser = FixedParser {
            ledger: vec![ledger("TX1", 10050)],
            bank: vec![bank("BS1", 10050)],
        };
        let clock = FixedClock(Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap());
        let request = ReconciliationRequest {
            matching: MatchingConfig::default(),
            options: RequestOptions::default(),
        };
        let mut progress = NoopProgressSink;
        let mut ledger_storage = Vec::new();
        let mut bank_storage = Vec::new();
        let result = run(
            &request,
            &parser,
            &mut progress,
            &clock,
            &NeverCancel,
            &mut ledger_storage,
            &mut bank_storage,
        )
        .unwrap();
        assert_eq!(result.matches.len(), 1);
        assert!(result.unmatched_ledger.is_empty());
        assert!(result.unmatched_bank.is_empty());
        assert!(result.discrepancies.is_empty());
        assert_eq!(result.summary.matched_count, 1);
        assert_eq!(result.summary.exact_count, 1);
    }

    #[test]
    fn rejects_empty_batches() {
        let parser = FixedParser { ledger: vec![], bank: vec![] };
        let clock = FixedClock(Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap());
        let request = ReconciliationRequest {
            matching: MatchingConfig::default(),
            options: RequestOptions::default(),
        };
        let mut progress = NoopProgressSink;
        let mut ledger_storage = Vec::new();
        let mut bank_storage = Vec::new();
        let err = run(
            &request,
            &parser,
            &mut progress,
            &clock,
            &NeverCancel,
            &mut ledger_storage,
            &mut bank_storage,
        )
        .unwrap_err();
        assert!(matches!(err, ReconError::InvalidConfig { .. }));
    }

    struct AlwaysCancel;
    impl CancellationToken for AlwaysCancel {
        fn is_cancelled(&self) -> bool {
            true
        }
    }

    #[test]
    fn cancellation_before_parsing_returns_cancelled() {
        let parser = FixedParser { ledger: vec![ledger("TX1", 100)], bank: vec![bank("BS1", 100)] };
        let clock = FixedClock(Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap());
        let request = ReconciliationRequest {
            matching: MatchingConfig::default(),
            options: RequestOptions::default(),
        };
        let mut progress = NoopProgressSink;
        let mut ledger_storage = Vec::new();
        let mut bank_storage = Vec::new();
        let err = run(
            &request,
            &parser,
            &mut progress,
            &clock,
            &AlwaysCancel,
            &mut ledger_storage,
            &mut bank_storage,
        )
        .unwrap_err();
        assert!(matches!(err, ReconError::Cancelled));
    }

    #[test]
    fn invalid_config_is_rejected_before_any_parsing() {
        let parser = FixedParser { ledger: vec![], bank: vec![] };
        let clock = FixedClock(Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap());
        let mut bad_matching = MatchingConfig::default();
        bad_matching.min_confidence = 2.0;
        let request = ReconciliationRequest { matching: bad_matching, options: RequestOptions::default() };
        let mut progress = NoopProgressSink;
        let mut ledger_storage = Vec::new();
        let mut bank_storage = Vec::new();
        let err = run(
            &request,
            &parser,
            &mut progress,
            &clock,
            &NeverCancel,
            &mut ledger_storage,
            &mut bank_storage,
        )
        .unwrap_err();
        assert!(matches!(err, ReconError::InvalidConfig { .. }));
    }

    #[test]
    fn without_fix_common_errors_a_zero_amount_record_is_rejected() {
        let mut bad = ledger("TX1", 100);
        bad.amount_cents = 0;
        let parser = FixedParser { ledger: vec![bad], bank: vec![bank("BS1", 100)] };
        let clock = FixedClock(Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap());
        let request = ReconciliationRequest {
            matching: MatchingConfig::default(),
            options: RequestOptions::default(),
        };
        let mut progress = NoopProgressSink;
        let mut ledger_storage = Vec::new();
        let mut bank_storage = Vec::new();
        let err = run(
            &request,
            &parser,
            &mut progress,
            &clock,
            &NeverCancel,
            &mut ledger_storage,
            &mut bank_storage,
        )
        .unwrap_err();
        assert!(matches!(err, ReconError::InvalidInput { ref field, .. } if field == "amount_cents"));
    }

    #[test]
    fn fix_common_errors_repairs_zero_amount_and_empty_id_in_place() {
        let mut unidentified = ledger("", 100);
        unidentified.amount_cents = 0;
        let parser = FixedParser {
            ledger: vec![unidentified],
            bank: vec![bank("BS1", 1)],
        };
        let clock = FixedClock(Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap());
        let request = ReconciliationRequest {
            matching: MatchingConfig::default(),
            options: RequestOptions { fix_common_errors: true, ..RequestOptions::default() },
        };
        let mut progress = NoopProgressSink;
        let mut ledger_storage = Vec::new();
        let mut bank_storage = Vec::new();
        let result = run(
            &request,
            &parser,
            &mut progress,
            &clock,
            &NeverCancel,
            &mut ledger_storage,
            &mut bank_storage,
        )
        .unwrap();
        // The repaired entry now has a synthetic id and a bumped amount, so
        // it survives validation and is eligible for matching.
        assert_eq!(result.summary.unmatched_ledger_count + result.matches.len(), 1);
        assert!(!result.stats.warnings.is_empty());
    }

    #[test]
    fn fix_common_errors_still_drops_entries_invalid_for_other_reasons() {
        // A timestamp 25 years in the past is not a "common error" the
        // fix pass repairs; fix_common_errors drops it instead of erroring.
        let mut stale = ledger("TX1", 100);
        stale.timestamp = FixedOffset::east_opt(0).unwrap().with_ymd_and_hms(1999, 1, 1, 0, 0, 0).unwrap();
        let parser = FixedParser { ledger: vec![stale], bank: vec![bank("BS1", 100)] };
        let clock = FixedClock(Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap());
        let request = ReconciliationRequest {
            matching: MatchingConfig::default(),
            options: RequestOptions { fix_common_errors: true, ..RequestOptions::default() },
        };
        let mut progress = NoopProgressSink;
        let mut ledger_storage = Vec::new();
        let mut bank_storage = Vec::new();
        let result = run(
            &request,
            &parser,
            &mut progress,
            &clock,
            &NeverCancel,
            &mut ledger_storage,
            &mut bank_storage,
        )
        .unwrap();
        assert_eq!(result.summary.unmatched_ledger_count, 0);
        assert!(result.stats.warnings.iter().any(|w| w.contains("dropped invalid ledger entry")));
    }

    #[test]
    fn passes_filters_rejects_entries_whose_direction_does_not_match() {
        let mut credit = ledger("TX1", 100);
        credit.direction = crate::model::Direction::Credit;
        let mut debit = ledger("TX2", 100);
        debit.direction = crate::model::Direction::Debit;
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();

        let no_filter = RequestOptions::default();
        assert!(passes_filters(&credit, date, &no_filter));
        assert!(passes_filters(&debit, date, &no_filter));

        let credit_only =
            RequestOptions { direction: Some(crate::model::Direction::Credit), ..RequestOptions::default() };
        assert!(passes_filters(&credit, date, &credit_only));
        assert!(!passes_filters(&debit, date, &credit_only));
    }

    #[test]
    fn direction_filter_drops_the_wrong_direction_end_to_end() {
        let mut debit = ledger("TX1", 10050);
        debit.direction = crate::model::Direction::Debit;
        let credit = ledger("TX2", 20050);
        let parser = FixedParser {
            ledger: vec![debit, credit],
            bank: vec![bank("BS1", 10050), bank("BS2", 20050)],
        };
        let clock = FixedClock(Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap());
        let request = ReconciliationRequest {
            matching: MatchingConfig::default(),
            options: RequestOptions {
                direction: Some(crate::model::Direction::Credit),
                ..RequestOptions::default()
            },
        };
        let mut progress = NoopProgressSink;
        let mut ledger_storage = Vec::new();
        let mut bank_storage = Vec::new();
        let result = run(
            &request,
            &parser,
            &mut progress,
            &clock,
            &NeverCancel,
            &mut ledger_storage,
            &mut bank_storage,
        )
        .unwrap();
        // TX1 (Debit) is filtered out before matching and never appears as
        // matched or unmatched; TX2 (Credit) matches BS2 normally.
        assert_eq!(result.matches.len(), 1);
        assert_eq!(result.matches[0].ledger.id, "TX2");
        assert_eq!(result.summary.unmatched_ledger_count, 0);
        assert_eq!(result.summary.unmatched_bank_count, 1);
    }
}
