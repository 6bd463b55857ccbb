//! Failure Reporting
//!
//! All failures mcmock detects leave through exactly one
//! [`FailureReporter::report`] call. What a failure *means* (panic, mark the
//! test failed, abort the process) is decided by the reporter the test
//! harness binds, never by the engine.
//!
//! ```text
//!  initialize ──► ReporterBinding ◄── verify / assert_with / peek_latest
//!                       │
//!                       ▼
//!              FailureReporter::report(message)
//!          ┌────────────┼─────────────────┐
//!          ▼            ▼                 ▼
//!    PanicReporter  CollectingReporter  Fn(&str) / C callback
//! ```

use crate::result::MockError;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Receiver of formatted failure messages
pub trait FailureReporter {
    /// Deliver one failure message; called synchronously, never retried
    fn report(&self, message: &str);
}

impl<F> FailureReporter for F
where
    F: Fn(&str),
{
    fn report(&self, message: &str) {
        self(message);
    }
}

/// Reporter that fails the current Rust test by panicking with the message
#[derive(Debug, Clone, Copy, Default)]
pub struct PanicReporter;

impl FailureReporter for PanicReporter {
    fn report(&self, message: &str) {
        panic!("mcmock failure: {message}");
    }
}

/// A failure recorded by a [`CollectingReporter`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportedFailure {
    /// The delivered message
    pub message: String,
    /// Position of this failure in delivery order
    pub index: usize,
}

/// Reporter that records every message instead of failing
///
/// Clones share the same record, so one handle can be bound to a context
/// while the test keeps another to inspect what was reported.
///
/// ```
/// use mcmock::{CollectingReporter, MockContext};
///
/// let reporter = CollectingReporter::new();
/// let mut ctx = MockContext::new();
/// ctx.initialize(reporter.clone()).unwrap();
/// ctx.register("close", 0_i32);
/// let _ = ctx.verify();
/// assert_eq!(reporter.count(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CollectingReporter {
    failures: Rc<RefCell<Vec<ReportedFailure>>>,
}

impl CollectingReporter {
    /// Create an empty collector
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All failures reported so far
    #[must_use]
    pub fn failures(&self) -> Vec<ReportedFailure> {
        self.failures.borrow().clone()
    }

    /// Messages reported so far, in order
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.failures
            .borrow()
            .iter()
            .map(|f| f.message.clone())
            .collect()
    }

    /// Number of reported failures
    #[must_use]
    pub fn count(&self) -> usize {
        self.failures.borrow().len()
    }

    /// Whether nothing was reported
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.failures.borrow().is_empty()
    }

    /// The most recent message
    #[must_use]
    pub fn last_message(&self) -> Option<String> {
        self.failures.borrow().last().map(|f| f.message.clone())
    }

    /// Forget everything recorded
    pub fn clear(&self) {
        self.failures.borrow_mut().clear();
    }
}

impl FailureReporter for CollectingReporter {
    fn report(&self, message: &str) {
        let mut failures = self.failures.borrow_mut();
        let index = failures.len();
        failures.push(ReportedFailure {
            message: message.to_string(),
            index,
        });
    }
}

/// Holds at most one bound reporter
#[derive(Default)]
pub struct ReporterBinding {
    reporter: Option<Box<dyn FailureReporter>>,
}

impl fmt::Debug for ReporterBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReporterBinding")
            .field("bound", &self.is_bound())
            .finish()
    }
}

impl ReporterBinding {
    /// Create an unbound binding
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a reporter is bound
    #[must_use]
    pub const fn is_bound(&self) -> bool {
        self.reporter.is_some()
    }

    /// Install `reporter`, returning whether a previous one was replaced
    pub fn bind(&mut self, reporter: Box<dyn FailureReporter>) -> bool {
        self.reporter.replace(reporter).is_some()
    }

    /// Remove the bound reporter
    pub fn unbind(&mut self) {
        self.reporter = None;
    }

    /// Deliver `message` to the bound reporter
    ///
    /// # Panics
    ///
    /// With no reporter bound there is nowhere to send the failure, so this
    /// panics with a [`MockError::NoReporter`] message.
    pub fn deliver(&self, message: &str) {
        match &self.reporter {
            Some(reporter) => {
                tracing::warn!(target: "mcmock.engine", %message, "reporting failure");
                reporter.report(message);
            }
            None => {
                tracing::error!(target: "mcmock.engine", %message, "failure raised with no reporter bound");
                panic!(
                    "{}",
                    MockError::NoReporter {
                        message: message.to_string()
                    }
                );
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::cell::Cell;

    mod collecting {
        use super::*;

        #[test]
        fn test_new_is_empty() {
            let reporter = CollectingReporter::new();
            assert!(reporter.is_empty());
            assert_eq!(reporter.count(), 0);
            assert!(reporter.last_message().is_none());
        }

        #[test]
        fn test_records_in_order() {
            let reporter = CollectingReporter::new();
            reporter.report("first");
            reporter.report("second");
            assert_eq!(reporter.messages(), vec!["first", "second"]);
            assert_eq!(reporter.failures()[1].index, 1);
            assert_eq!(reporter.last_message().as_deref(), Some("second"));
        }

        #[test]
        fn test_clones_share_record() {
            let reporter = CollectingReporter::new();
            let handle = reporter.clone();
            reporter.report("shared");
            assert_eq!(handle.count(), 1);
            handle.clear();
            assert!(reporter.is_empty());
        }
    }

    mod closures {
        use super::*;

        #[test]
        fn test_closure_is_a_reporter() {
            let calls = Cell::new(0);
            let reporter = |_: &str| calls.set(calls.get() + 1);
            reporter.report("x");
            reporter.report("y");
            assert_eq!(calls.get(), 2);
        }
    }

    mod panic_reporter {
        use super::*;

        #[test]
        #[should_panic(expected = "mcmock failure: boom")]
        fn test_panics_with_message() {
            PanicReporter.report("boom");
        }
    }

    mod binding {
        use super::*;

        #[test]
        fn test_bind_and_replace() {
            let mut binding = ReporterBinding::new();
            assert!(!binding.is_bound());
            assert!(!binding.bind(Box::new(CollectingReporter::new())));
            assert!(binding.is_bound());
            assert!(binding.bind(Box::new(CollectingReporter::new())));
            binding.unbind();
            assert!(!binding.is_bound());
        }

        #[test]
        fn test_deliver_reaches_reporter() {
            let reporter = CollectingReporter::new();
            let mut binding = ReporterBinding::new();
            binding.bind(Box::new(reporter.clone()));
            binding.deliver("mismatch");
            assert_eq!(reporter.messages(), vec!["mismatch"]);
        }

        #[test]
        #[should_panic(expected = "No failure reporter bound")]
        fn test_deliver_without_reporter_panics() {
            ReporterBinding::new().deliver("lost");
        }

        #[test]
        fn test_debug_hides_reporter() {
            let binding = ReporterBinding::new();
            assert_eq!(format!("{binding:?}"), "ReporterBinding { bound: false }");
        }
    }
}
