//! Errors shared by the provider, readers and exporters.
use std::sync::PoisonError;
use std::time::Duration;
use thiserror::Error;

/// Errors reported by lifecycle and export operations.
///
/// Failures of asynchronous operations are not returned directly; they are
/// recorded on the [`ResultCode`](crate::ResultCode) handed back by the
/// operation and can be read with [`ResultCode::failure`](crate::ResultCode::failure).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum OTelSdkError {
    /// Shutdown has already been invoked.
    ///
    /// The first shutdown performs all cleanup. Every further call on a
    /// component that was shut down reports this.
    #[error("Shutdown already invoked")]
    AlreadyShutdown,

    /// The operation did not complete within the given duration.
    ///
    /// The operation keeps running; the caller stopped waiting for it.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Any other failure, with a human readable reason.
    #[error("Operation failed: {0}")]
    InternalFailure(String),
}

impl<T> From<PoisonError<T>> for OTelSdkError {
    fn from(err: PoisonError<T>) -> Self {
        OTelSdkError::InternalFailure(format!("Mutex poisoned: {}", err))
    }
}

/// A specialized `Result` type for lifecycle and export operations.
pub type OTelSdkResult = Result<(), OTelSdkError>;
