//! Stub Support
//!
//! Building blocks for generated stubs. A generated stub stores one
//! conditions struct per expected call, made of [`Expected`] fields (expected
//! value plus an ignore flag) and a return value. When the code under test
//! calls the stub it consumes the conditions and checks each argument with
//! [`check_arg`] / [`check_bytes`]; every mismatch is one reported failure.
//!
//! ```
//! use mcmock::stub::{check_arg, Expected};
//! use mcmock::{CollectingReporter, MockContext};
//!
//! struct SeekConditions {
//!     fd: Expected<i32>,
//!     offset: Expected<i64>,
//!     retval: i64,
//! }
//!
//! fn seek(ctx: &mut MockContext, fd: i32, offset: i64) -> i64 {
//!     match ctx.consume_next_as::<SeekConditions>("seek") {
//!         Ok(Some(c)) => {
//!             check_arg(ctx, "seek", "fd", &c.fd, &fd);
//!             check_arg(ctx, "seek", "offset", &c.offset, &offset);
//!             c.retval
//!         }
//!         _ => -1,
//!     }
//! }
//!
//! let reporter = CollectingReporter::new();
//! let mut ctx = MockContext::new();
//! ctx.initialize(reporter.clone()).unwrap();
//! ctx.register("seek", SeekConditions {
//!     fd: Expected::new(3),
//!     offset: Expected::new(0).ignored(),
//!     retval: 128,
//! });
//!
//! assert_eq!(seek(&mut ctx, 3, 4096), 128);
//! assert!(reporter.is_empty());
//! ```

use crate::context::MockContext;
use std::fmt::Debug;

/// An expected argument value that can be excluded from comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Expected<T> {
    value: T,
    ignore: bool,
}

impl<T> Expected<T> {
    /// Expect exactly `value`
    #[must_use]
    pub const fn new(value: T) -> Self {
        Self {
            value,
            ignore: false,
        }
    }

    /// Accept any value for this argument
    #[must_use]
    pub fn ignored(mut self) -> Self {
        self.ignore = true;
        self
    }

    /// Stop comparing this argument (used on the latest registered expectation)
    pub fn ignore(&mut self) {
        self.ignore = true;
    }

    /// Whether the argument is excluded from comparison
    #[must_use]
    pub const fn is_ignored(&self) -> bool {
        self.ignore
    }

    /// The expected value
    #[must_use]
    pub const fn value(&self) -> &T {
        &self.value
    }

    /// Whether `actual` satisfies the expectation
    #[must_use]
    pub fn matches(&self, actual: &T) -> bool
    where
        T: PartialEq,
    {
        self.ignore || &self.value == actual
    }
}

impl<T> From<T> for Expected<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

/// Compare one argument, reporting a call mismatch when it differs
///
/// Returns whether the argument matched.
pub fn check_arg<T>(ctx: &MockContext, api: &str, param: &str, expected: &Expected<T>, actual: &T) -> bool
where
    T: PartialEq + Debug,
{
    let matched = expected.matches(actual);
    crate::mock_assert!(
        ctx,
        !matched,
        "{}(): parameter '{}' expected {:?}, got {:?}",
        api,
        param,
        expected.value(),
        actual
    );
    matched
}

/// Compare the data an input pointer refers to
///
/// `expected` of `None` means the pointed-to data is not being verified.
/// Returns whether the data matched.
pub fn check_bytes(ctx: &MockContext, api: &str, param: &str, expected: Option<&[u8]>, actual: &[u8]) -> bool {
    let Some(expected) = expected else {
        return true;
    };
    if expected.len() != actual.len() {
        crate::mock_assert!(
            ctx,
            true,
            "{}(): data behind parameter '{}' expected {} bytes, got {}",
            api,
            param,
            expected.len(),
            actual.len()
        );
        return false;
    }
    match expected.iter().zip(actual).position(|(e, a)| e != a) {
        Some(offset) => {
            crate::mock_assert!(
                ctx,
                true,
                "{}(): data behind parameter '{}' differs at byte {} (expected 0x{:02x}, got 0x{:02x})",
                api,
                param,
                offset,
                expected[offset],
                actual[offset]
            );
            false
        }
        None => true,
    }
}

/// Report that `api` was called while no expectation was pending
pub fn unexpected_call(ctx: &MockContext, api: &str) {
    crate::mock_assert!(ctx, true, "Unexpected call to {}(): no expectations remaining", api);
}
