//! Expectation Store
//!
//! Strict FIFO queue of expectations. Registration order encodes the call
//! order the code under test must follow, so nothing here ever reorders:
//! stubs append at the tail, consume from the head, and may inspect the tail
//! to adjust the expectation that was registered last.

use std::any::{self, Any};
use std::borrow::Cow;
use std::collections::VecDeque;
use std::fmt;

/// Type-erased, owned payload of one expectation
///
/// The value is dropped exactly once: either by whoever downcasts it out of
/// the payload, or together with the payload when the store drains it.
pub struct Payload {
    value: Box<dyn Any>,
    type_name: &'static str,
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

impl Payload {
    /// Wrap a value
    #[must_use]
    pub fn new<T: Any>(value: T) -> Self {
        Self {
            value: Box::new(value),
            type_name: any::type_name::<T>(),
        }
    }

    /// Name of the wrapped type, for diagnostics
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Whether the payload holds a `T`
    #[must_use]
    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    /// Take the value out, or get the payload back if it is not a `T`
    pub fn downcast<T: Any>(self) -> Result<T, Self> {
        let type_name = self.type_name;
        match self.value.downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(value) => Err(Self { value, type_name }),
        }
    }

    /// Borrow the value as a `T`
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref()
    }

    /// Mutably borrow the value as a `T`
    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.value.downcast_mut()
    }
}

/// One registered expectation: which API is expected next, and with what
#[derive(Debug)]
pub struct Expectation {
    api: Cow<'static, str>,
    payload: Payload,
}

impl Expectation {
    /// Create an expectation
    #[must_use]
    pub fn new(api: impl Into<Cow<'static, str>>, payload: Payload) -> Self {
        Self {
            api: api.into(),
            payload,
        }
    }

    /// Identifier of the mocked API (diagnostics only)
    #[must_use]
    pub fn api(&self) -> &str {
        &self.api
    }

    /// The expected-call payload
    #[must_use]
    pub const fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Mutable access to the payload
    pub fn payload_mut(&mut self) -> &mut Payload {
        &mut self.payload
    }

    /// Split into identifier and payload
    #[must_use]
    pub fn into_parts(self) -> (Cow<'static, str>, Payload) {
        (self.api, self.payload)
    }

    /// Take the payload, dropping the identifier
    #[must_use]
    pub fn into_payload(self) -> Payload {
        self.payload
    }
}

/// Ordered store of pending expectations
#[derive(Debug, Default)]
pub struct ExpectationStore {
    queue: VecDeque<Expectation>,
}

impl ExpectationStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an expectation at the tail
    pub fn register(&mut self, api: impl Into<Cow<'static, str>>, payload: Payload) {
        let expectation = Expectation::new(api, payload);
        tracing::debug!(
            target: "mcmock.engine",
            api = expectation.api(),
            payload = expectation.payload.type_name(),
            position = self.queue.len() + 1,
            "register expectation"
        );
        self.queue.push_back(expectation);
    }

    /// The most recently registered expectation, left in place
    pub fn peek_latest(&mut self) -> Option<&mut Expectation> {
        self.queue.back_mut()
    }

    /// The oldest expectation, left in place
    #[must_use]
    pub fn peek_next(&self) -> Option<&Expectation> {
        self.queue.front()
    }

    /// Remove and return the oldest expectation
    pub fn consume_next(&mut self) -> Option<Expectation> {
        let next = self.queue.pop_front();
        match &next {
            Some(expectation) => tracing::debug!(
                target: "mcmock.engine",
                api = expectation.api(),
                remaining = self.queue.len(),
                "consume expectation"
            ),
            None => tracing::debug!(target: "mcmock.engine", "consume on empty queue"),
        }
        next
    }

    /// Remove every pending expectation, oldest first
    pub fn drain(&mut self) -> Vec<Expectation> {
        self.queue.drain(..).collect()
    }

    /// Number of pending expectations
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether nothing is pending
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Identifiers of pending expectations, oldest first
    pub fn pending(&self) -> impl Iterator<Item = &str> + '_ {
        self.queue.iter().map(Expectation::api)
    }
}

/// Numbered listing of drained expectations, one `" <n>. <api>()"` line each
#[must_use]
pub fn unfulfilled_listing(expectations: &[Expectation]) -> String {
    let mut listing = String::new();
    for (i, expectation) in expectations.iter().enumerate() {
        listing.push_str(&format!(" {}. {}()\n", i + 1, expectation.api()));
    }
    listing
}
