//! Error types for the nettap harness.

use thiserror::Error;

/// Errors surfaced by the command gateway, one per failure mode of the
/// external control surface.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// The subsystem did not answer at all.
    #[error("Subsystem unreachable: {0}")]
    Unreachable(String),

    /// The subsystem refused the operation.
    ///
    /// Not necessarily a harness failure: scenarios that expect rejection
    /// (e.g. creating a reserved hook name) record this as a pass.
    #[error("Operation rejected: {0}")]
    Rejected(String),

    /// The subsystem answered with something the gateway could not decode.
    ///
    /// Always a harness-side defect; the enclosing batch is aborted rather
    /// than verified against an undecodable state.
    #[error("Malformed response: {0}")]
    ParseFailure(String),

    /// A dispatched operation exceeded the configured per-task timeout.
    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// A type alias for `Result<T, GatewayError>`.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors terminating the harness run itself.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// A prerequisite is missing or the collaborator is gone. Fatal before
    /// any assertion runs.
    #[error("Environment failure: {0}")]
    Environment(String),

    /// A gateway error that the run cannot proceed past.
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// A gate point found a non-zero cumulative failure count and aborted
    /// the run to avoid cascading false failures.
    #[error("Gate '{gate}' tripped with {failures} failure(s)")]
    GateTripped {
        /// Name of the gate that aborted the run.
        gate: String,
        /// Cumulative failure count at the gate.
        failures: u32,
    },

    /// Writing the report stream failed.
    #[error("Report I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A type alias for `Result<T, HarnessError>`.
pub type HarnessResult<T> = Result<T, HarnessError>;
