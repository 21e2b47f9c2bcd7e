use thiserror::Error;

use crate::dataset::TrajectoryId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TelemetryError {
    #[error("trajectory {id} does not exist or has no samples")]
    InvalidSelection { id: TrajectoryId },

    /// A stream is already connecting or streaming. Callers treat this as a no-op.
    #[error("stream already active")]
    AlreadyStreaming,
}

pub type TelemetryResult<T> = Result<T, TelemetryError>;
