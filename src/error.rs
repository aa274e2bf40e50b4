//! Error taxonomy for the feedback subsystem

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the feedback pipeline.
///
/// `InvalidInput` is the caller's fault and recoverable by dropping the
/// sample. `Persistence` means the external store failed; in-memory weight
/// tracking continues. Retrain trigger failures are terminal for the
/// affected ticket but non-fatal for the subsystem.
#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("persistence failure: {0}")]
    Persistence(#[source] anyhow::Error),

    #[error("retrain trigger failed: {0}")]
    RetrainTrigger(String),

    #[error("retrain trigger timed out after {0:?}")]
    RetrainTimeout(Duration),
}
