mod community;
mod csv_file;

pub use community::*;
pub use csv_file::*;

use thiserror::Error;

use crate::sen5x::AveragedMeasurement;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("server rejected submission with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("dispatch aborted: {0}")]
    Join(String),
}

/// Destination for one averaged reading per cycle.
///
/// `dispatch` blocks; the orchestrator runs it on the blocking pool.
pub trait Sink: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// `timestamp` is the cycle's Unix time in seconds.
    fn dispatch(&self, timestamp: i64, reading: &AveragedMeasurement) -> Result<(), SinkError>;

    /// Whether a failed `dispatch` may be run again under the dispatch retry policy.
    fn retryable(&self) -> bool {
        true
    }
}
