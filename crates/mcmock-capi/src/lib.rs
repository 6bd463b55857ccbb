// C ABI for the mcmock expectation queue.
//
// Generated C stubs call these symbols instead of a Rust context. Every call
// works on the calling thread's context in `mcmock::global`.
//
// Tracing: span 'capi' with field api_func.
// Log level: DEBUG for queue traffic, WARN for misuse reported to the test.
//
// mcmock_assert_msg keeps its variadic C signature: csrc/assert_msg.c
// formats with vsnprintf into the thread's message bound and hands the text
// to mcmock_report_formatted through hooks installed by mcmock_initialise().
//
// A panic never crosses the ABI: entry points abort the process instead. The
// only panic paths are a failure raised before mcmock_initialise() and a
// failure callback that re-enters the queue.

#![allow(unsafe_code, unsafe_op_in_unsafe_fn, non_camel_case_types)]

use std::borrow::Cow;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::Once;

use mcmock::{global, FailureReporter, MockConfig, MockError, Payload, DEFAULT_MESSAGE_CAPACITY};
use tracing_subscriber::EnvFilter;

// ── Result codes ────────────────────────────────────────────────────

pub const MCMOCK_OK: c_int = 0;
pub const MCMOCK_ERROR: c_int = -1;

/// Environment variable read by [`mcmock_init_logging`]
pub const ENV_LOG_FILTER: &str = "MCMOCK_LOG";

const DEFAULT_LOG_FILTER: &str = "warn";

// ── Callback types ──────────────────────────────────────────────────

/// Test framework hook receiving every failure message
pub type mcmock_test_assert = Option<unsafe extern "C" fn(message: *const c_char)>;

/// Releases a payload the queue dropped without handing it back
pub type mcmock_release = Option<unsafe extern "C" fn(payload: *mut c_void)>;

// ── Reporter ────────────────────────────────────────────────────────

/// Forwards failure messages to a C callback as NUL-terminated strings
#[derive(Debug, Clone, Copy)]
pub struct CReporter {
    callback: unsafe extern "C" fn(*const c_char),
}

impl CReporter {
    /// Wrap `callback`
    #[must_use]
    pub const fn new(callback: unsafe extern "C" fn(*const c_char)) -> Self {
        Self { callback }
    }
}

impl FailureReporter for CReporter {
    fn report(&self, message: &str) {
        let message = c_message(message);
        // SAFETY: the callback was supplied by the test framework for exactly
        // this purpose and the string outlives the call.
        unsafe { (self.callback)(message.as_ptr()) }
    }
}

/// Interior NULs would cut the message short on the C side
fn c_message(message: &str) -> CString {
    CString::new(message.replace('\0', "\\0")).unwrap_or_default()
}

// ── Payloads ────────────────────────────────────────────────────────

/// A condition structure owned by the queue on behalf of C code
///
/// Dropping it runs the release function, so a payload the queue discards
/// at verify time is released exactly once. Handing it back to C with
/// [`ForeignPayload::into_raw`] transfers ownership instead.
#[derive(Debug)]
pub struct ForeignPayload {
    ptr: *mut c_void,
    release: mcmock_release,
}

impl ForeignPayload {
    /// Take ownership of `ptr`, released with `release` if never consumed
    #[must_use]
    pub const fn new(ptr: *mut c_void, release: mcmock_release) -> Self {
        Self { ptr, release }
    }

    /// The raw pointer, still owned by the queue
    #[must_use]
    pub const fn as_ptr(&self) -> *mut c_void {
        self.ptr
    }

    /// Give the pointer back to C without releasing it
    #[must_use]
    pub fn into_raw(mut self) -> *mut c_void {
        self.release = None;
        self.ptr
    }
}

impl Drop for ForeignPayload {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            if !self.ptr.is_null() {
                tracing::debug!(target: "mcmock.capi", "releasing unconsumed payload");
                // SAFETY: the registering caller handed ownership of `ptr`
                // to the queue together with a matching release function.
                unsafe { release(self.ptr) }
            }
        }
    }
}

unsafe extern "C" fn release_with_free(payload: *mut c_void) {
    libc::free(payload);
}

// ── Helpers ─────────────────────────────────────────────────────────

fn abort_on_panic<R>(api_func: &'static str, f: impl FnOnce() -> R) -> R {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(_) => {
            tracing::error!(target: "mcmock.capi", api_func, "mcmock failure could not be reported, aborting");
            std::process::abort()
        }
    }
}

fn report_null(function: &'static str, argument: &'static str) {
    let err = MockError::NullArgument { function, argument };
    tracing::warn!(target: "mcmock.capi", %err, "null argument");
    global::assert_msg(true, &err.to_string());
}

unsafe fn api_name(name: *const c_char) -> Cow<'static, str> {
    Cow::Owned(CStr::from_ptr(name).to_string_lossy().into_owned())
}

unsafe fn register(
    function: &'static str,
    conditions: *mut c_void,
    name: *const c_char,
    release: mcmock_release,
) {
    let payload = ForeignPayload::new(conditions, release);
    if name.is_null() {
        report_null(function, "api_name");
        return;
    }
    global::register_payload(api_name(name), Payload::new(payload));
}

// ── mcmock_initialise ───────────────────────────────────────────────

/// Bind the failure callback for the calling thread.
///
/// Calling it twice reports the misuse through the callback already bound
/// and then rebinds to `callback`.
///
/// # Safety
/// `callback` must stay callable until [`mcmock_reset`] or thread exit, and
/// must not call back into any `mcmock_*` function.
#[no_mangle]
pub unsafe extern "C" fn mcmock_initialise(callback: mcmock_test_assert) {
    let _span = tracing::info_span!("capi", api_func = "initialise").entered();
    install_format_hooks();
    abort_on_panic("initialise", || {
        let Some(callback) = callback else {
            report_null("mcmock_initialise", "callback");
            return;
        };
        if let Err(err) = global::initialize(CReporter::new(callback)) {
            tracing::warn!(target: "mcmock.capi", %err, "mcmock_initialise");
        }
    });
}

// ── mcmock_register_expectation ─────────────────────────────────────

/// Queue `conditions` for the API named `api_name`.
///
/// The queue owns `conditions` until [`mcmock_get_next_expectation`] hands
/// it back. If it is still queued at [`mcmock_verify`] it is released with
/// `free()`.
///
/// # Safety
/// `conditions` must be null or allocated with `malloc`. `api_name` must be
/// a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn mcmock_register_expectation(
    conditions: *mut c_void,
    api_name: *const c_char,
) {
    let _span = tracing::info_span!("capi", api_func = "register_expectation").entered();
    abort_on_panic("register_expectation", || {
        register(
            "mcmock_register_expectation",
            conditions,
            api_name,
            Some(release_with_free),
        );
    });
}

/// Queue `conditions`, released with `release` if never consumed.
///
/// A null `release` leaves unconsumed payloads to the caller.
///
/// # Safety
/// `conditions` must remain valid until consumed or released. `api_name`
/// must be a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn mcmock_register_expectation_with_release(
    conditions: *mut c_void,
    api_name: *const c_char,
    release: mcmock_release,
) {
    let _span =
        tracing::info_span!("capi", api_func = "register_expectation_with_release").entered();
    abort_on_panic("register_expectation_with_release", || {
        register(
            "mcmock_register_expectation_with_release",
            conditions,
            api_name,
            release,
        );
    });
}

// ── mcmock_peek_latest_expectation ──────────────────────────────────

/// The most recently registered payload, still owned by the queue.
///
/// Returns null and reports a failure when the queue is empty.
///
/// # Safety
/// The returned pointer is only valid until the payload is consumed or the
/// queue is drained.
#[no_mangle]
pub unsafe extern "C" fn mcmock_peek_latest_expectation() -> *mut c_void {
    let _span = tracing::info_span!("capi", api_func = "peek_latest_expectation").entered();
    abort_on_panic("peek_latest_expectation", || {
        global::with_latest(|payload| {
            payload
                .downcast_ref::<ForeignPayload>()
                .map_or(ptr::null_mut(), ForeignPayload::as_ptr)
        })
        .unwrap_or(ptr::null_mut())
    })
}

// ── mcmock_get_next_expectation ─────────────────────────────────────

/// Remove the oldest payload and hand ownership back to the caller.
///
/// Returns null without reporting when nothing is queued: the stub decides
/// whether an unexpected call is a failure.
///
/// # Safety
/// The caller becomes responsible for releasing the returned pointer.
#[no_mangle]
pub unsafe extern "C" fn mcmock_get_next_expectation() -> *mut c_void {
    let _span = tracing::info_span!("capi", api_func = "get_next_expectation").entered();
    abort_on_panic("get_next_expectation", || {
        let Some(payload) = global::consume_next() else {
            return ptr::null_mut();
        };
        match payload.downcast::<ForeignPayload>() {
            Ok(foreign) => foreign.into_raw(),
            Err(payload) => {
                let message = format!(
                    "Cannot hand a {} payload registered from Rust to a C stub",
                    payload.type_name()
                );
                drop(payload);
                global::assert_msg(true, &message);
                ptr::null_mut()
            }
        }
    })
}

// ── mcmock_verify ───────────────────────────────────────────────────

/// Report every unfulfilled expectation in one message and empty the queue.
///
/// # Safety
/// Payloads still queued are released; the caller must not use pointers
/// obtained from [`mcmock_peek_latest_expectation`] afterwards.
#[no_mangle]
pub unsafe extern "C" fn mcmock_verify() {
    let _span = tracing::info_span!("capi", api_func = "verify").entered();
    abort_on_panic("verify", || {
        if let Err(err) = global::verify() {
            tracing::debug!(target: "mcmock.capi", %err, "mcmock_verify");
        }
    });
}

// ── mcmock_assert_msg ───────────────────────────────────────────────

extern "C" {
    /// Report a printf-formatted message when `condition` is true.
    ///
    /// Implemented in `csrc/assert_msg.c`. The message is formatted with the
    /// C library's `vsnprintf` into [`mcmock_message_capacity`] bytes.
    ///
    /// # Safety
    /// `fmt` must be a valid null-terminated format string and the variadic
    /// arguments must match its conversions.
    pub fn mcmock_assert_msg(condition: bool, fmt: *const c_char, ...);

    fn mcmock_install_format_hooks(
        report: unsafe extern "C" fn(*const c_char, usize),
        capacity: extern "C" fn() -> usize,
    );
}

static FORMAT_HOOKS: Once = Once::new();

fn install_format_hooks() {
    FORMAT_HOOKS.call_once(|| {
        // SAFETY: both hooks are `extern "C"` functions with the signatures
        // csrc/assert_msg.c expects, and live for the whole process.
        unsafe { mcmock_install_format_hooks(mcmock_report_formatted, mcmock_message_capacity) }
    });
}

/// Report an already formatted `message` when `condition` is true.
///
/// # Safety
/// `message` must be a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn mcmock_assert_str(condition: bool, message: *const c_char) {
    let _span = tracing::info_span!("capi", api_func = "assert_str").entered();
    abort_on_panic("assert_str", || {
        if !condition {
            return;
        }
        if message.is_null() {
            report_null("mcmock_assert_str", "message");
            return;
        }
        global::assert_msg(true, &CStr::from_ptr(message).to_string_lossy());
    });
}

/// Deliver the output of `vsnprintf` for [`mcmock_assert_msg`].
///
/// `length` is the value `vsnprintf` returned: when it exceeds the bytes in
/// `message` the text was cut and is marked as truncated.
///
/// # Safety
/// `message` must be null or a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn mcmock_report_formatted(message: *const c_char, length: usize) {
    let _span = tracing::info_span!("capi", api_func = "report_formatted").entered();
    abort_on_panic("report_formatted", || {
        if message.is_null() {
            report_null("mcmock_assert_msg", "fmt");
            return;
        }
        let message = CStr::from_ptr(message);
        let truncated = length > message.to_bytes().len();
        global::fail_preformatted(&message.to_string_lossy(), truncated);
    });
}

/// Byte bound of the calling thread's failure messages.
///
/// Falls back to the default bound while the context is busy reporting.
#[no_mangle]
pub extern "C" fn mcmock_message_capacity() -> usize {
    abort_on_panic("message_capacity", || {
        global::try_with_context(|ctx| ctx.formatter().capacity())
            .unwrap_or(DEFAULT_MESSAGE_CAPACITY)
    })
}

// ── Introspection and lifecycle ─────────────────────────────────────

/// Number of expectations still queued on the calling thread.
///
/// Returns 0 when called from inside the failure callback.
#[no_mangle]
pub extern "C" fn mcmock_pending_expectations() -> usize {
    abort_on_panic("pending_expectations", || {
        global::try_with_context(|ctx| ctx.len()).unwrap_or_else(|err| {
            tracing::warn!(target: "mcmock.capi", %err, "mcmock_pending_expectations");
            0
        })
    })
}

/// Drop every queued payload and unbind the callback.
///
/// # Safety
/// Pointers obtained from [`mcmock_peek_latest_expectation`] become invalid.
#[no_mangle]
pub unsafe extern "C" fn mcmock_reset() {
    let _span = tracing::info_span!("capi", api_func = "reset").entered();
    abort_on_panic("reset", global::reset);
}

/// Reload the calling thread's configuration from `MCMOCK_*` variables.
///
/// Returns [`MCMOCK_ERROR`] when a variable is malformed or the context is
/// in use.
#[no_mangle]
pub extern "C" fn mcmock_configure_from_env() -> c_int {
    let _span = tracing::info_span!("capi", api_func = "configure_from_env").entered();
    abort_on_panic("configure_from_env", || {
        match MockConfig::from_env().and_then(global::configure) {
            Ok(()) => MCMOCK_OK,
            Err(err) => {
                tracing::warn!(target: "mcmock.capi", %err, "mcmock_configure_from_env");
                MCMOCK_ERROR
            }
        }
    })
}

/// Install a stderr log subscriber filtered by `MCMOCK_LOG`.
///
/// Returns [`MCMOCK_ERROR`] when a global subscriber is already set.
#[no_mangle]
pub extern "C" fn mcmock_init_logging() -> c_int {
    abort_on_panic("init_logging", || {
        let filter = EnvFilter::try_from_env(ENV_LOG_FILTER)
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
        match tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
        {
            Ok(()) => MCMOCK_OK,
            Err(_) => MCMOCK_ERROR,
        }
    })
}
