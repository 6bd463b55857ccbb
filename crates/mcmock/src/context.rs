//! Mock Context
//!
//! [`MockContext`] owns everything one test run needs: the expectation queue,
//! the reporter binding and the message formatter. Generated stubs receive it
//! by reference, so two contexts never share state and tests in different
//! threads stay independent.
//!
//! # Lifecycle
//!
//! ```text
//!            initialize(reporter)
//!                   │
//!                   ▼
//!   ┌──────► Empty ──register──► Populated ──┐
//!   │          ▲                   │   ▲     │ register / consume_next
//!   │          │ last consume_next │   └─────┘
//!   │          └───────────────────┘
//!   │                              │ verify (drain + one report)
//!   └──────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use mcmock::{CollectingReporter, MockContext};
//!
//! let reporter = CollectingReporter::new();
//! let mut ctx = MockContext::new();
//! ctx.initialize(reporter.clone()).unwrap();
//!
//! ctx.register("foo", 1_u32);
//! ctx.register("bar", 2_u32);
//! assert_eq!(ctx.consume_next_as::<u32>("foo").unwrap(), Some(1));
//!
//! assert!(ctx.verify().is_err());
//! let message = reporter.last_message().unwrap();
//! assert!(message.contains("There are 1 unfulfilled expectations"));
//! assert!(message.contains(" 1. bar()"));
//! ```

use crate::config::MockConfig;
use crate::format::{Arg, FormattedMessage, MessageFormatter};
use crate::reporter::{FailureReporter, ReporterBinding};
use crate::result::{MockError, MockResult};
use crate::store::{unfulfilled_listing, ExpectationStore, Payload};
use std::any::Any;
use std::borrow::Cow;
use std::fmt;

const UNFULFILLED_TEMPLATE: &str =
    "\nThere are %d unfulfilled expectations. The ordered list of unfulfilled expectations is:\n%s";

/// One test run's expectation queue, reporter binding and formatter
#[derive(Debug, Default)]
pub struct MockContext {
    config: MockConfig,
    formatter: MessageFormatter,
    store: ExpectationStore,
    binding: ReporterBinding,
}

impl MockContext {
    /// Create a context with the default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context with an explicit configuration
    #[must_use]
    pub fn with_config(config: MockConfig) -> Self {
        Self {
            formatter: MessageFormatter::from_config(&config),
            config,
            store: ExpectationStore::new(),
            binding: ReporterBinding::new(),
        }
    }

    /// The active configuration
    #[must_use]
    pub const fn config(&self) -> &MockConfig {
        &self.config
    }

    /// The formatter used for every failure message
    #[must_use]
    pub const fn formatter(&self) -> &MessageFormatter {
        &self.formatter
    }

    /// Bind the failure reporter
    ///
    /// Binding twice without [`reset`](Self::reset) is misuse: the misuse is
    /// reported through the reporter that is already bound, then `reporter`
    /// replaces it and [`MockError::ReporterAlreadyBound`] is returned.
    pub fn initialize<R>(&mut self, reporter: R) -> MockResult<()>
    where
        R: FailureReporter + 'static,
    {
        let rebinding = self.binding.is_bound();
        if rebinding {
            self.raise(&MockError::ReporterAlreadyBound.to_string());
        }
        self.binding.bind(Box::new(reporter));
        tracing::debug!(target: "mcmock.engine", rebinding, "failure reporter bound");
        if rebinding {
            Err(MockError::ReporterAlreadyBound)
        } else {
            Ok(())
        }
    }

    /// Whether a failure reporter is bound
    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.binding.is_bound()
    }

    /// Drop every pending expectation without reporting, and unbind the reporter
    pub fn reset(&mut self) {
        let dropped = self.store.drain().len();
        self.binding.unbind();
        tracing::debug!(target: "mcmock.engine", dropped, "context reset");
    }

    /// Queue an expectation for `api`
    pub fn register<T: Any>(&mut self, api: impl Into<Cow<'static, str>>, payload: T) {
        self.store.register(api, Payload::new(payload));
    }

    /// Queue an already type-erased payload
    pub fn register_payload(&mut self, api: impl Into<Cow<'static, str>>, payload: Payload) {
        self.store.register(api, payload);
    }

    /// Payload of the most recently registered expectation, left queued
    ///
    /// An empty queue is reported as a failure and yields
    /// [`MockError::EmptyQueuePeek`].
    pub fn peek_latest(&mut self) -> MockResult<&mut Payload> {
        if self.store.is_empty() {
            self.raise(&MockError::EmptyQueuePeek.to_string());
            return Err(MockError::EmptyQueuePeek);
        }
        self.store
            .peek_latest()
            .map(|expectation| expectation.payload_mut())
            .ok_or(MockError::EmptyQueuePeek)
    }

    /// Typed [`peek_latest`](Self::peek_latest)
    ///
    /// A payload of another type is reported as a call mismatch.
    pub fn peek_latest_as<T: Any>(&mut self, api: &str) -> MockResult<&mut T> {
        let pending = match self.store.peek_latest() {
            Some(latest) if latest.payload().is::<T>() => None,
            Some(latest) => Some(latest.api().to_string()),
            None => {
                self.raise(&MockError::EmptyQueuePeek.to_string());
                return Err(MockError::EmptyQueuePeek);
            }
        };
        if let Some(pending) = pending {
            return Err(self.type_mismatch(api, pending));
        }
        self.store
            .peek_latest()
            .and_then(|latest| latest.payload_mut().downcast_mut::<T>())
            .ok_or(MockError::EmptyQueuePeek)
    }

    /// Remove and return the oldest payload; `None` when nothing is queued
    ///
    /// An empty queue is not a failure: the stub decides what an unexpected
    /// call means.
    pub fn consume_next(&mut self) -> Option<Payload> {
        self.store.consume_next().map(|e| e.into_payload())
    }

    /// Typed [`consume_next`](Self::consume_next) for a stub serving `api`
    ///
    /// When the oldest payload is not a `T`, the code under test called a
    /// different API than the next expected one: the mismatch is reported,
    /// the payload is released and [`MockError::PayloadTypeMismatch`] is
    /// returned.
    pub fn consume_next_as<T: Any>(&mut self, api: &str) -> MockResult<Option<T>> {
        let Some(expectation) = self.store.consume_next() else {
            return Ok(None);
        };
        let (pending, payload) = expectation.into_parts();
        match payload.downcast::<T>() {
            Ok(value) => Ok(Some(value)),
            Err(payload) => {
                drop(payload);
                Err(self.type_mismatch(api, pending.into_owned()))
            }
        }
    }

    /// Number of pending expectations
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Whether nothing is pending
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Identifiers of pending expectations, oldest first
    pub fn pending(&self) -> impl Iterator<Item = &str> + '_ {
        self.store.pending()
    }

    /// Check that every expectation was consumed
    ///
    /// Remaining expectations are drained oldest first, their payloads are
    /// released, and one failure listing them is reported. An empty queue
    /// reports nothing.
    pub fn verify(&mut self) -> MockResult<()> {
        let drained = self.store.drain();
        let taken = self
            .config
            .reset_reporter_on_verify
            .then(|| std::mem::take(&mut self.binding));
        let binding = taken.as_ref().unwrap_or(&self.binding);

        if drained.is_empty() {
            tracing::debug!(target: "mcmock.engine", "verify: all expectations fulfilled");
            return Ok(());
        }

        let count = drained.len();
        let listing = unfulfilled_listing(&drained);
        drop(drained);
        tracing::info!(target: "mcmock.engine", count, "verify: unfulfilled expectations");

        let message = self.formatter.format(
            UNFULFILLED_TEMPLATE,
            &[Arg::from(count), Arg::from(listing.as_str())],
        );
        self.deliver_with(binding, &message);
        Err(MockError::UnfulfilledExpectations { count, listing })
    }

    /// Report a printf-style message when `condition` holds
    pub fn assert_with(&self, condition: bool, template: &str, args: &[Arg<'_>]) {
        if condition {
            let message = self.formatter.format(template, args);
            self.deliver(&message);
        }
    }

    /// Report a Rust-formatted message when `condition` holds
    ///
    /// See also [`mock_assert!`](crate::mock_assert).
    pub fn assert_fmt(&self, condition: bool, args: fmt::Arguments<'_>) {
        if condition {
            let message = self.formatter.format_args(args);
            self.deliver(&message);
        }
    }

    /// Report a message unconditionally
    pub fn fail(&self, message: &str) {
        self.raise(message);
    }

    /// Report text that was formatted outside mcmock
    ///
    /// The text is cut to this context's bound. `truncated` marks text that
    /// was already cut upstream, so the marker is applied either way.
    pub fn fail_preformatted(&self, text: &str, truncated: bool) {
        let message = self.formatter.bound(text, truncated);
        self.deliver(&message);
    }

    fn type_mismatch(&self, requested: &str, pending: String) -> MockError {
        let err = MockError::PayloadTypeMismatch {
            requested: requested.to_string(),
            pending,
        };
        self.raise(&err.to_string());
        err
    }

    fn raise(&self, message: &str) {
        let message = self.formatter.format_args(format_args!("{message}"));
        self.deliver(&message);
    }

    fn deliver(&self, message: &FormattedMessage) {
        self.deliver_with(&self.binding, message);
    }

    fn deliver_with(&self, binding: &ReporterBinding, message: &FormattedMessage) {
        if message.is_truncated() {
            tracing::debug!(
                target: "mcmock.engine",
                capacity = self.formatter.capacity(),
                "failure message truncated"
            );
        }
        binding.deliver(message.as_str());
    }
}

/// Report a failure through a [`MockContext`] when the condition holds
///
/// ```
/// use mcmock::{mock_assert, CollectingReporter, MockContext};
///
/// let reporter = CollectingReporter::new();
/// let mut ctx = MockContext::new();
/// ctx.initialize(reporter.clone()).unwrap();
///
/// let (expected, actual) = (3, 4);
/// mock_assert!(ctx, expected != actual, "write(): expected {} bytes, got {}", expected, actual);
/// assert_eq!(reporter.messages(), vec!["write(): expected 3 bytes, got 4"]);
/// ```
#[macro_export]
macro_rules! mock_assert {
    ($ctx:expr, $condition:expr, $($arg:tt)+) => {
        $ctx.assert_fmt($condition, ::std::format_args!($($arg)+))
    };
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::reporter::CollectingReporter;
    use std::rc::Rc;

    fn initialized() -> (MockContext, CollectingReporter) {
        let reporter = CollectingReporter::new();
        let mut ctx = MockContext::new();
        ctx.initialize(reporter.clone()).unwrap();
        (ctx, reporter)
    }

    mod lifecycle {
        use super::*;

        #[test]
        fn test_new_is_uninitialized_and_empty() {
            let ctx = MockContext::new();
            assert!(!ctx.is_initialized());
            assert!(ctx.is_empty());
            assert_eq!(ctx.config(), &MockConfig::default());
        }

        #[test]
        fn test_initialize_binds() {
            let (ctx, reporter) = initialized();
            assert!(ctx.is_initialized());
            assert!(reporter.is_empty());
        }

        #[test]
        fn test_double_initialize_reports_through_first_reporter() {
            let (mut ctx, first) = initialized();
            let second = CollectingReporter::new();

            let err = ctx.initialize(second.clone()).unwrap_err();
            assert!(matches!(err, MockError::ReporterAlreadyBound));
            assert_eq!(first.count(), 1);
            assert!(first.messages()[0].contains("Cannot re-initialise mcmock"));
            assert!(second.is_empty());

            ctx.fail("after rebinding");
            assert_eq!(second.messages(), vec!["after rebinding"]);
            assert_eq!(first.count(), 1);
        }

        #[test]
        fn test_reset_allows_clean_initialize() {
            let (mut ctx, first) = initialized();
            ctx.register("leftover", 1_u8);
            ctx.reset();
            assert!(ctx.is_empty());
            assert!(!ctx.is_initialized());

            let second = CollectingReporter::new();
            assert!(ctx.initialize(second.clone()).is_ok());
            assert!(first.is_empty());
            assert!(second.is_empty());
        }
    }

    mod consume {
        use super::*;

        #[test]
        fn test_fifo_payloads() {
            let (mut ctx, reporter) = initialized();
            for i in 0..5_u32 {
                ctx.register("step", i);
            }
            let seen: Vec<u32> = (0..5)
                .map(|_| ctx.consume_next_as::<u32>("step").unwrap().unwrap())
                .collect();
            assert_eq!(seen, vec![0, 1, 2, 3, 4]);
            assert!(reporter.is_empty());
        }

        #[test]
        fn test_empty_consume_is_sentinel_not_failure() {
            let (mut ctx, reporter) = initialized();
            assert!(ctx.consume_next().is_none());
            assert_eq!(ctx.consume_next_as::<u32>("read").unwrap(), None);
            assert!(reporter.is_empty());
        }

        #[test]
        fn test_empty_consume_without_reporter_does_not_panic() {
            let mut ctx = MockContext::new();
            assert!(ctx.consume_next().is_none());
        }

        #[test]
        fn test_wrong_type_is_call_mismatch() {
            let (mut ctx, reporter) = initialized();
            ctx.register("open", String::from("/dev/null"));
            ctx.register("close", 3_i32);

            let err = ctx.consume_next_as::<i32>("close").unwrap_err();
            assert!(matches!(err, MockError::PayloadTypeMismatch { .. }));
            assert_eq!(
                reporter.messages(),
                vec!["Expected a payload for close() but the pending expectation is for open()"]
            );
            // the mismatched expectation is gone, the next one is intact
            assert_eq!(ctx.consume_next_as::<i32>("close").unwrap(), Some(3));
        }

        #[test]
        fn test_consumed_payload_ownership_moves_to_caller() {
            let (mut ctx, _reporter) = initialized();
            let tracker = Rc::new(());
            ctx.register("hold", Rc::clone(&tracker));
            let held = ctx.consume_next().unwrap().downcast::<Rc<()>>().unwrap();
            assert_eq!(Rc::strong_count(&tracker), 2);
            drop(held);
            assert_eq!(Rc::strong_count(&tracker), 1);
        }
    }

    mod peek {
        use super::*;

        #[test]
        fn test_peek_returns_tail_repeatedly() {
            let (mut ctx, reporter) = initialized();
            ctx.register("first", 1_i64);
            ctx.register("second", 2_i64);
            for _ in 0..3 {
                assert_eq!(ctx.peek_latest().unwrap().downcast_ref::<i64>(), Some(&2));
            }
            assert_eq!(ctx.len(), 2);
            assert!(reporter.is_empty());
        }

        #[test]
        fn test_peek_empty_reports_and_errors() {
            let (mut ctx, reporter) = initialized();
            let err = ctx.peek_latest().unwrap_err();
            assert!(matches!(err, MockError::EmptyQueuePeek));
            assert_eq!(reporter.count(), 1);
            assert!(reporter.messages()[0].contains("expectation queue is empty"));
        }

        #[test]
        #[should_panic(expected = "No failure reporter bound")]
        fn test_peek_empty_without_reporter_fails_hard() {
            let mut ctx = MockContext::new();
            let _ = ctx.peek_latest();
        }

        #[test]
        fn test_peek_latest_as_edits_tail() {
            #[derive(Debug, PartialEq)]
            struct ReadCall {
                fd: i32,
                ignore_fd: bool,
            }

            let (mut ctx, _reporter) = initialized();
            ctx.register("read", ReadCall { fd: 4, ignore_fd: false });
            ctx.peek_latest_as::<ReadCall>("read").unwrap().ignore_fd = true;
            assert_eq!(
                ctx.consume_next_as::<ReadCall>("read").unwrap(),
                Some(ReadCall { fd: 4, ignore_fd: true })
            );
        }

        #[test]
        fn test_peek_latest_as_wrong_type() {
            let (mut ctx, reporter) = initialized();
            ctx.register("write", 1_u8);
            assert!(ctx.peek_latest_as::<String>("read").is_err());
            assert_eq!(reporter.count(), 1);
            assert_eq!(ctx.len(), 1);
        }

        #[test]
        fn test_peek_latest_as_empty() {
            let (mut ctx, reporter) = initialized();
            assert!(matches!(
                ctx.peek_latest_as::<u8>("read"),
                Err(MockError::EmptyQueuePeek)
            ));
            assert_eq!(reporter.count(), 1);
        }
    }

    mod verify {
        use super::*;

        #[test]
        fn test_verify_empty_is_silent() {
            let (mut ctx, reporter) = initialized();
            assert!(ctx.verify().is_ok());
            assert!(ctx.verify().is_ok());
            assert!(reporter.is_empty());
        }

        #[test]
        fn test_verify_empty_without_reporter_is_ok() {
            assert!(MockContext::new().verify().is_ok());
        }

        #[test]
        fn test_verify_lists_unfulfilled_in_order() {
            let (mut ctx, reporter) = initialized();
            ctx.register("a", ());
            ctx.register("b", ());
            ctx.register("c", ());

            let err = ctx.verify().unwrap_err();
            assert!(matches!(err, MockError::UnfulfilledExpectations { count: 3, .. }));
            assert_eq!(reporter.count(), 1);
            let message = reporter.last_message().unwrap();
            assert_eq!(
                message,
                "\nThere are 3 unfulfilled expectations. The ordered list of unfulfilled \
                 expectations is:\n 1. a()\n 2. b()\n 3. c()\n"
            );
            assert!(ctx.is_empty());
        }

        #[test]
        fn test_verify_releases_every_payload_once() {
            let (mut ctx, _reporter) = initialized();
            let tracker = Rc::new(());
            for _ in 0..4 {
                ctx.register("held", Rc::clone(&tracker));
            }
            let _ = ctx.verify();
            assert_eq!(Rc::strong_count(&tracker), 1);
        }

        #[test]
        fn test_verify_keeps_reporter_by_default() {
            let (mut ctx, reporter) = initialized();
            ctx.register("x", ());
            let _ = ctx.verify();
            assert!(ctx.is_initialized());
            assert_eq!(reporter.count(), 1);
        }

        #[test]
        fn test_verify_can_reset_reporter() {
            let config = MockConfig::builder().reset_reporter_on_verify(true).build().unwrap();
            let reporter = CollectingReporter::new();
            let mut ctx = MockContext::with_config(config);
            ctx.initialize(reporter.clone()).unwrap();
            ctx.register("x", ());

            let _ = ctx.verify();
            assert_eq!(reporter.count(), 1);
            assert!(!ctx.is_initialized());
            assert!(ctx.initialize(CollectingReporter::new()).is_ok());
        }

        #[test]
        fn test_verify_reset_unbinds_when_clean() {
            let config = MockConfig::builder().reset_reporter_on_verify(true).build().unwrap();
            let mut ctx = MockContext::with_config(config);
            ctx.initialize(CollectingReporter::new()).unwrap();
            assert!(ctx.verify().is_ok());
            assert!(!ctx.is_initialized());
        }

        #[test]
        fn test_verify_reset_unbinds_panicking_reporter() {
            let config = MockConfig::builder().reset_reporter_on_verify(true).build().unwrap();
            let mut ctx = MockContext::with_config(config);
            ctx.initialize(crate::reporter::PanicReporter).unwrap();
            ctx.register("x", ());
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| ctx.verify()));
            assert!(outcome.is_err());
            assert!(!ctx.is_initialized());
            assert!(ctx.is_empty());
        }

        #[test]
        fn test_verify_message_is_bounded() {
            let config = MockConfig::builder().message_capacity(80).build().unwrap();
            let reporter = CollectingReporter::new();
            let mut ctx = MockContext::with_config(config);
            ctx.initialize(reporter.clone()).unwrap();
            for _ in 0..50 {
                ctx.register("a_rather_long_mocked_api_name", ());
            }
            let _ = ctx.verify();
            let message = reporter.last_message().unwrap();
            assert!(message.len() <= 80);
            assert!(message.ends_with("..."));
        }
    }

    mod asserts {
        use super::*;

        #[test]
        fn test_assert_with_true_reports() {
            let (ctx, reporter) = initialized();
            ctx.assert_with(true, "%s(): arg %d mismatch", &[Arg::from("seek"), Arg::from(2)]);
            assert_eq!(reporter.messages(), vec!["seek(): arg 2 mismatch"]);
        }

        #[test]
        fn test_assert_with_false_is_noop() {
            let (ctx, reporter) = initialized();
            ctx.assert_with(false, "%s", &[Arg::from("never")]);
            assert!(reporter.is_empty());
        }

        #[test]
        fn test_assert_with_false_without_reporter_is_noop() {
            MockContext::new().assert_with(false, "nothing", &[]);
        }

        #[test]
        fn test_mock_assert_macro() {
            let (ctx, reporter) = initialized();
            mock_assert!(ctx, 1 + 1 == 2, "{}() returned {}", "sum", 2);
            mock_assert!(ctx, false, "unreachable {}", 0);
            assert_eq!(reporter.messages(), vec!["sum() returned 2"]);
        }

        #[test]
        fn test_fail_reports_verbatim() {
            let (ctx, reporter) = initialized();
            ctx.fail("100% broken");
            assert_eq!(reporter.messages(), vec!["100% broken"]);
        }
    }
}
