//! mcmock: Expectation Queue Runtime for Generated Mocks
//!
//! Generated mock stubs record what the code under test is expected to call
//! while a test arranges its scenario, then compare every real call against
//! the queue while the test acts. At teardown anything left in the queue is a
//! failure.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      mcmock Architecture                         │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  arrange            act                       teardown           │
//! │  ┌──────────┐      ┌──────────────┐          ┌──────────┐        │
//! │  │ register │─────►│ consume_next │─────────►│  verify  │        │
//! │  │ (tail)   │      │ (head)       │          │ (drain)  │        │
//! │  └──────────┘      └──────┬───────┘          └────┬─────┘        │
//! │                           │ mismatch              │ leftovers    │
//! │                           ▼                       ▼              │
//! │                    ┌────────────────────────────────────┐        │
//! │                    │ MessageFormatter ─► FailureReporter │        │
//! │                    └────────────────────────────────────┘        │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rust stubs pass a [`MockContext`] explicitly. C stubs go through the
//! `mcmock-capi` crate, which drives the per-thread context in [`global`].

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::large_stack_arrays, clippy::large_stack_frames))]

mod config;
mod context;
mod format;
mod reporter;
mod result;
mod store;

/// Per-thread process-wide context used by the C ABI
pub mod global;

/// Helpers for generated stubs: argument conditions and comparisons
pub mod stub;

pub use config::{
    MockConfig, MockConfigBuilder, DEFAULT_MESSAGE_CAPACITY, DEFAULT_TRUNCATION_MARKER,
    ENV_MESSAGE_CAPACITY, ENV_RESET_REPORTER_ON_VERIFY,
};
pub use context::MockContext;
pub use format::{Arg, FormattedMessage, MessageFormatter};
pub use reporter::{
    CollectingReporter, FailureReporter, PanicReporter, ReportedFailure, ReporterBinding,
};
pub use result::{MockError, MockResult};
pub use store::{unfulfilled_listing, Expectation, ExpectationStore, Payload};

/// Prelude for generated stubs and tests
pub mod prelude {
    pub use super::mock_assert;
    pub use super::stub::{check_arg, check_bytes, unexpected_call, Expected};
    pub use super::{
        Arg, CollectingReporter, FailureReporter, MessageFormatter, MockConfig, MockContext,
        MockError, MockResult, PanicReporter, Payload,
    };
}
