//! `recon-engine` — ledger-to-bank-statement reconciliation engine.
//!
//! Pure core crate: receives pre-loaded, validated ledger and bank-entry
//! batches through a `RecordParser` collaborator and returns a fully
//! classified `ReconciliationResult`. CSV ingestion, CLI flag parsing,
//! report rendering, and logging are collaborator concerns outside this
//! crate — see `orchestrator` for the trait seams.

pub mod config;
pub mod discrepancy;
pub mod edge_cases;
pub mod engine;
pub mod error;
pub mod index;
pub mod model;
pub mod orchestrator;
pub mod scoring;

pub use config::{MatchingConfig, RequestOptions, TimezonePolicy, Weights};
pub use error::ReconError;
pub use model::{
    BankEntry, Direction, Discrepancy, LedgerEntry, MatchResult, MatchType,
    ReconciliationResult, ReconciliationSummary, Severity,
};
pub use orchestrator::{
    CancellationToken, Clock, NeverCancel, NoopProgressSink, ProgressSink, ReconciliationRequest,
    RecordParser, SystemClock, run,
};
