use std::fmt;

/// Error taxonomy for the reconciliation engine. Hand-rolled `Display` +
/// `std::error::Error`, no derive macro.
#[derive(Debug)]
pub enum ReconError {
    /// Configuration out of range, weights not summing to 1, empty input
    /// lists, inconsistent date range. Raised eagerly before any work.
    InvalidConfig {
        field: String,
        message: String,
        suggestion: String,
    },
    /// A malformed record survived parsing (zero amount, timestamp outside
    /// the sane window) and `fix_common_errors` was not able to repair it.
    InvalidInput {
        record_id: String,
        field: String,
        message: String,
    },
    /// Invariant violation during matching — should not happen with
    /// validated inputs; represents a bug in the engine.
    ProcessingError { message: String },
    /// Cooperative cancellation was requested.
    Cancelled,
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig { field, message, suggestion } => {
                write!(f, "invalid config field '{field}': {message} ({suggestion})")
            }
            Self::InvalidInput { record_id, field, message } => {
                write!(f, "invalid input record '{record_id}', field '{field}': {message}")
            }
            Self::ProcessingError { message } => write!(f, "processing error: {message}"),
            Self::Cancelled => write!(f, "reconciliation cancelled"),
        }
    }
}

impl std::error::Error for ReconError {}
