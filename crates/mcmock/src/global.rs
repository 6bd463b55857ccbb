//! Process-wide Context
//!
//! Generated C stubs cannot carry a [`MockContext`] around, so the C ABI
//! works against an implicit one. There is one such context per thread:
//! tests running on different threads never see each other's expectations.
//!
//! The context is borrowed for the duration of every call, including the
//! reporter callback. A reporter must not call back into this module.

use crate::config::MockConfig;
use crate::context::MockContext;
use crate::reporter::FailureReporter;
use crate::result::{MockError, MockResult};
use crate::store::Payload;
use std::any::Any;
use std::borrow::Cow;
use std::cell::RefCell;

thread_local! {
    static CONTEXT: RefCell<MockContext> = RefCell::new(MockContext::new());
}

/// Run `f` against this thread's context
pub fn with_context<R>(f: impl FnOnce(&mut MockContext) -> R) -> R {
    CONTEXT.with(|ctx| f(&mut *ctx.borrow_mut()))
}

/// Run `f` against this thread's context unless it is already in use
///
/// A reporter callback runs while the context is borrowed; calls made from
/// inside it get [`MockError::ContextBusy`] here instead of a panic.
pub fn try_with_context<R>(f: impl FnOnce(&mut MockContext) -> R) -> MockResult<R> {
    CONTEXT.with(|ctx| {
        let mut ctx = ctx.try_borrow_mut().map_err(|_| MockError::ContextBusy)?;
        Ok(f(&mut *ctx))
    })
}

/// Replace this thread's context with a fresh one using `config`
///
/// Refused while a reporter is bound or expectations are pending.
pub fn configure(config: MockConfig) -> MockResult<()> {
    config.validate()?;
    try_with_context(|ctx| {
        if ctx.is_initialized() || !ctx.is_empty() {
            return Err(MockError::config(
                "cannot reconfigure an active context, call reset() first",
            ));
        }
        *ctx = MockContext::with_config(config);
        Ok(())
    })?
}

/// Bind this thread's failure reporter
pub fn initialize<R>(reporter: R) -> MockResult<()>
where
    R: FailureReporter + 'static,
{
    with_context(|ctx| ctx.initialize(reporter))
}

/// Whether this thread's context has a reporter bound
pub fn is_initialized() -> bool {
    with_context(|ctx| ctx.is_initialized())
}

/// Queue an expectation on this thread's context
pub fn register<T: Any>(api: impl Into<Cow<'static, str>>, payload: T) {
    with_context(|ctx| ctx.register(api, payload));
}

/// Queue a type-erased payload on this thread's context
pub fn register_payload(api: impl Into<Cow<'static, str>>, payload: Payload) {
    with_context(|ctx| ctx.register_payload(api, payload));
}

/// Run `f` on the most recently registered payload
pub fn with_latest<R>(f: impl FnOnce(&mut Payload) -> R) -> MockResult<R> {
    with_context(|ctx| ctx.peek_latest().map(f))
}

/// Remove and return the oldest payload
pub fn consume_next() -> Option<Payload> {
    with_context(MockContext::consume_next)
}

/// Typed [`consume_next`] for a stub serving `api`
pub fn consume_next_as<T: Any>(api: &str) -> MockResult<Option<T>> {
    with_context(|ctx| ctx.consume_next_as::<T>(api))
}

/// Verify this thread's context
pub fn verify() -> MockResult<()> {
    with_context(MockContext::verify)
}

/// Report `message` through this thread's reporter when `condition` holds
pub fn assert_msg(condition: bool, message: &str) {
    if condition {
        with_context(|ctx| ctx.fail(message));
    }
}

/// Report text formatted outside mcmock, cut to this thread's bound
///
/// `truncated` marks text that was already cut before it got here.
pub fn fail_preformatted(text: &str, truncated: bool) {
    with_context(|ctx| ctx.fail_preformatted(text, truncated));
}

/// Number of pending expectations on this thread
pub fn pending_count() -> usize {
    with_context(|ctx| ctx.len())
}

/// Byte bound applied to this thread's failure messages
pub fn message_capacity() -> usize {
    with_context(|ctx| ctx.formatter().capacity())
}

/// Return this thread's context to its pristine state
pub fn reset() {
    with_context(MockContext::reset);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::reporter::CollectingReporter;

    // The harness may reuse threads between tests, so each test starts
    // from reset().

    #[test]
    fn test_end_to_end_on_thread_context() {
        reset();
        let reporter = CollectingReporter::new();
        initialize(reporter.clone()).unwrap();
        register("foo", 1_i32);
        register("bar", 2_i32);

        assert_eq!(consume_next_as::<i32>("foo").unwrap(), Some(1));
        assert!(verify().is_err());
        let message = reporter.last_message().unwrap();
        assert!(message.contains("There are 1 unfulfilled expectations"));
        assert!(message.contains(" 1. bar()"));
        assert!(!message.contains("foo"));
        assert_eq!(pending_count(), 0);
    }

    #[test]
    fn test_with_latest_edits_tail() {
        reset();
        initialize(CollectingReporter::new()).unwrap();
        register("write", 10_usize);
        with_latest(|payload| *payload.downcast_mut::<usize>().unwrap() += 1).unwrap();
        assert_eq!(consume_next().unwrap().downcast::<usize>().unwrap(), 11);
    }

    #[test]
    fn test_with_latest_empty_reports() {
        reset();
        let reporter = CollectingReporter::new();
        initialize(reporter.clone()).unwrap();
        assert!(matches!(with_latest(|_| ()), Err(MockError::EmptyQueuePeek)));
        assert_eq!(reporter.count(), 1);
    }

    #[test]
    fn test_assert_msg() {
        reset();
        let reporter = CollectingReporter::new();
        initialize(reporter.clone()).unwrap();
        assert_msg(false, "quiet");
        assert_msg(true, "loud");
        assert_eq!(reporter.messages(), vec!["loud"]);
    }

    #[test]
    fn test_configure_only_when_idle() {
        reset();
        let config = MockConfig::builder().message_capacity(64).build().unwrap();
        assert!(configure(config.clone()).is_ok());
        with_context(|ctx| assert_eq!(ctx.config().message_capacity, 64));

        initialize(CollectingReporter::new()).unwrap();
        assert!(matches!(configure(config.clone()), Err(MockError::Config { .. })));

        reset();
        assert!(!is_initialized());
        assert!(configure(config).is_ok());
        configure(MockConfig::default()).unwrap();
    }

    #[test]
    fn test_threads_are_isolated() {
        reset();
        register("main_thread_only", ());
        let other = std::thread::spawn(pending_count).join().unwrap();
        assert_eq!(other, 0);
        assert_eq!(pending_count(), 1);
        reset();
    }

    #[test]
    fn test_reentrant_access_is_refused() {
        reset();
        let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let sink = std::rc::Rc::clone(&seen);
        initialize(move |_: &str| {
            let busy = try_with_context(|ctx| ctx.len());
            let reconfigure = configure(MockConfig::default());
            sink.borrow_mut().push((busy.is_err(), reconfigure.is_err()));
        })
        .unwrap();
        assert_msg(true, "from the test");
        assert_eq!(*seen.borrow(), vec![(true, true)]);
        assert_eq!(try_with_context(|ctx| ctx.len()).unwrap(), 0);
        reset();
    }

    #[test]
    fn test_fail_preformatted_uses_thread_bound() {
        reset();
        let reporter = CollectingReporter::new();
        configure(MockConfig::builder().message_capacity(12).build().unwrap()).unwrap();
        initialize(reporter.clone()).unwrap();
        assert_eq!(message_capacity(), 12);
        fail_preformatted("0123456789AB", true);
        assert_eq!(reporter.messages(), vec!["012345678..."]);
        reset();
        configure(MockConfig::default()).unwrap();
    }

    #[test]
    fn test_register_payload() {
        reset();
        register_payload("raw", Payload::new('x'));
        assert_eq!(consume_next().unwrap().downcast::<char>().unwrap(), 'x');
    }
}
