//! Result and error types for mcmock.

use thiserror::Error;

/// Result type for mcmock operations
pub type MockResult<T> = Result<T, MockError>;

/// Errors that can occur in mcmock
///
/// Every variant that stems from a test failure has already been sent to the
/// bound [`FailureReporter`](crate::FailureReporter) by the time the error is
/// returned. The returned value only lets Rust callers branch on it.
#[derive(Debug, Error)]
pub enum MockError {
    /// `initialize` was called while a reporter was already bound
    #[error("Cannot re-initialise mcmock: a failure reporter is already bound")]
    ReporterAlreadyBound,

    /// A failure had to be reported but no reporter is bound
    #[error("No failure reporter bound, call initialize() first: {message}")]
    NoReporter {
        /// The message that could not be delivered
        message: String,
    },

    /// Registered expectations were never consumed
    #[error("There are {count} unfulfilled expectations:\n{listing}")]
    UnfulfilledExpectations {
        /// Number of drained expectations
        count: usize,
        /// Numbered listing of the drained api identifiers
        listing: String,
    },

    /// A stub observed a call that does not match its expectation
    #[error("Call mismatch: {message}")]
    CallMismatch {
        /// Error message
        message: String,
    },

    /// `peek_latest` was called with no pending expectation
    #[error("Cannot peek the latest expectation: the expectation queue is empty")]
    EmptyQueuePeek,

    /// The pending payload is not of the type the stub asked for
    #[error("Expected a payload for {requested}() but the pending expectation is for {pending}()")]
    PayloadTypeMismatch {
        /// API the stub was serving
        requested: String,
        /// API identifier stored with the pending expectation
        pending: String,
    },

    /// A C caller passed a NULL pointer where a value is required
    #[error("NULL argument passed to {function}: {argument}")]
    NullArgument {
        /// Exported function name
        function: &'static str,
        /// Parameter name
        argument: &'static str,
    },

    /// The per-thread context was entered again from inside a failure report
    #[error("The mcmock context is busy delivering a failure report")]
    ContextBusy,

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MockError {
    /// Create a call mismatch error
    #[must_use]
    pub fn call_mismatch(message: impl Into<String>) -> Self {
        Self::CallMismatch {
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether this error represents a test failure (as opposed to a setup problem)
    #[must_use]
    pub const fn is_test_failure(&self) -> bool {
        matches!(
            self,
            Self::ReporterAlreadyBound
                | Self::UnfulfilledExpectations { .. }
                | Self::CallMismatch { .. }
                | Self::EmptyQueuePeek
                | Self::PayloadTypeMismatch { .. }
        )
    }
}
