//! Bounded Message Formatting
//!
//! Every failure message mcmock produces goes through a [`MessageFormatter`]:
//! a printf-style (or `format_args!`) interpolation into a buffer with a fixed
//! upper bound. Output past the bound is cut, and the cut is made visible both
//! through [`FormattedMessage::is_truncated`] and a marker at the end of the
//! text.
//!
//! ## Example
//!
//! ```
//! use mcmock::{Arg, MessageFormatter};
//!
//! let formatter = MessageFormatter::new(3000, "...");
//! let msg = formatter.format("%s() called %d times", &[Arg::from("open"), Arg::from(2)]);
//! assert_eq!(msg.as_str(), "open() called 2 times");
//! assert!(!msg.is_truncated());
//! ```

use crate::config::MockConfig;
use std::fmt::{self, Write as _};

/// Digits past the bound that can still change the visible prefix: an f64
/// has at most 1074 significant fractional digits.
const PRECISION_SLACK: usize = 1100;

/// Largest precision `core::fmt` accepts
const MAX_PRECISION: usize = u16::MAX as usize;

/// Result of a bounded format operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedMessage {
    text: String,
    truncated: bool,
}

impl FormattedMessage {
    /// The formatted text, marker included when truncated
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Whether the output was cut at the capacity bound
    #[must_use]
    pub const fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Take the text
    #[must_use]
    pub fn into_string(self) -> String {
        self.text
    }
}

impl fmt::Display for FormattedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// A single printf argument
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Arg<'a> {
    /// Signed integer (`%d`, `%i`)
    Int(i64),
    /// Unsigned integer (`%u`, `%x`, `%X`, `%o`)
    Uint(u64),
    /// Floating point (`%f`, `%e`, `%g`)
    Float(f64),
    /// String (`%s`)
    Str(&'a str),
    /// Character (`%c`)
    Char(char),
    /// Address (`%p`)
    Ptr(usize),
}

macro_rules! arg_from {
    ($variant:ident, $target:ty; $($source:ty),+) => {
        $(impl From<$source> for Arg<'_> {
            fn from(value: $source) -> Self {
                Self::$variant(value as $target)
            }
        })+
    };
}

arg_from!(Int, i64; i8, i16, i32, i64, isize);
arg_from!(Uint, u64; u8, u16, u32, u64, usize);
arg_from!(Float, f64; f32, f64);

impl From<char> for Arg<'_> {
    fn from(value: char) -> Self {
        Self::Char(value)
    }
}

impl<'a> From<&'a str> for Arg<'a> {
    fn from(value: &'a str) -> Self {
        Self::Str(value)
    }
}

impl<'a> From<&'a String> for Arg<'a> {
    fn from(value: &'a String) -> Self {
        Self::Str(value.as_str())
    }
}

impl<T> From<*const T> for Arg<'_> {
    fn from(value: *const T) -> Self {
        Self::Ptr(value as usize)
    }
}

/// Bounded printf-style formatter
#[derive(Debug, Clone)]
pub struct MessageFormatter {
    capacity: usize,
    marker: String,
}

impl Default for MessageFormatter {
    fn default() -> Self {
        Self::from_config(&MockConfig::default())
    }
}

impl MessageFormatter {
    /// Create a formatter with an explicit bound and truncation marker
    ///
    /// A marker that does not fit in `capacity` is shortened to fit.
    #[must_use]
    pub fn new(capacity: usize, marker: impl Into<String>) -> Self {
        let mut marker = marker.into();
        while !marker.is_empty() && marker.len() >= capacity {
            marker.pop();
        }
        Self { capacity, marker }
    }

    /// Create a formatter from a context configuration
    #[must_use]
    pub fn from_config(config: &MockConfig) -> Self {
        Self::new(config.message_capacity, config.truncation_marker.clone())
    }

    /// Upper bound in bytes
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Format Rust format arguments into the bounded buffer
    #[must_use]
    pub fn format_args(&self, args: fmt::Arguments<'_>) -> FormattedMessage {
        let mut buf = BoundedBuffer::new(self.capacity);
        // An Err only signals that the bound was hit.
        let _ = buf.write_fmt(args);
        buf.finish(&self.marker)
    }

    /// Format a printf-style template into the bounded buffer
    ///
    /// Supports `%d %i %u %x %X %o %c %s %f %F %e %E %g %G %p %%` with the
    /// `-`, `0`, `+`, space and `#` flags, a field width and a precision.
    /// Length modifiers (`h`, `l`, `ll`, `z`, ...) are accepted and ignored.
    /// A conversion without a matching argument is copied verbatim.
    #[must_use]
    pub fn format(&self, template: &str, args: &[Arg<'_>]) -> FormattedMessage {
        let mut buf = BoundedBuffer::new(self.capacity);
        let _ = render_printf(&mut buf, template, args, self.precision_limit());
        buf.finish(&self.marker)
    }

    /// Copy text that was formatted elsewhere into the bound
    ///
    /// `truncated` marks text that was already cut before it got here, such
    /// as the output of a C `vsnprintf` into a buffer of this capacity.
    #[must_use]
    pub fn bound(&self, text: &str, truncated: bool) -> FormattedMessage {
        let mut buf = BoundedBuffer::new(self.capacity);
        let _ = buf.write_str(text);
        buf.truncated |= truncated;
        buf.finish(&self.marker)
    }

    /// Precision past which rendering cannot change the bounded output
    fn precision_limit(&self) -> usize {
        self.capacity
            .saturating_add(PRECISION_SLACK)
            .min(MAX_PRECISION)
    }
}

/// `fmt::Write` sink that stops accepting bytes at a fixed bound
struct BoundedBuffer {
    text: String,
    limit: usize,
    truncated: bool,
}

impl BoundedBuffer {
    fn new(limit: usize) -> Self {
        Self {
            text: String::with_capacity(limit.min(256)),
            limit,
            truncated: false,
        }
    }

    fn finish(mut self, marker: &str) -> FormattedMessage {
        if self.truncated {
            let keep = floor_char_boundary(&self.text, self.limit.saturating_sub(marker.len()));
            self.text.truncate(keep);
            self.text.push_str(marker);
        }
        FormattedMessage {
            text: self.text,
            truncated: self.truncated,
        }
    }
}

impl fmt::Write for BoundedBuffer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.truncated {
            return Err(fmt::Error);
        }
        let room = self.limit - self.text.len();
        if s.len() <= room {
            self.text.push_str(s);
            return Ok(());
        }
        let cut = floor_char_boundary(s, room);
        self.text.push_str(&s[..cut]);
        self.truncated = true;
        Err(fmt::Error)
    }
}

fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

#[derive(Debug, Default, Clone, Copy)]
struct Spec {
    left: bool,
    zero: bool,
    plus: bool,
    space: bool,
    alt: bool,
    width: usize,
    precision: Option<usize>,
}

fn render_printf(
    out: &mut impl fmt::Write,
    template: &str,
    args: &[Arg<'_>],
    precision_limit: usize,
) -> fmt::Result {
    let mut args = args.iter();
    let mut rest = template;

    while let Some(pos) = rest.find('%') {
        out.write_str(&rest[..pos])?;
        let directive = &rest[pos..];
        let (mut spec, conv, len) = parse_directive(directive);
        spec.precision = spec.precision.map(|p| p.min(precision_limit));
        rest = &directive[len..];

        match conv {
            Some('%') => out.write_char('%')?,
            Some(c) if "diuxXocsfFeEgGp".contains(c) => match args.next() {
                Some(arg) => write_conversion(out, spec, c, *arg)?,
                None => out.write_str(&directive[..len])?,
            },
            _ => out.write_str(&directive[..len])?,
        }
    }
    out.write_str(rest)
}

/// Parse `%[flags][width][.precision][length]conv`, returning the spec,
/// the conversion character and the byte length of the directive.
fn parse_directive(directive: &str) -> (Spec, Option<char>, usize) {
    let bytes = directive.as_bytes();
    let mut spec = Spec::default();
    let mut i = 1;

    while i < bytes.len() {
        match bytes[i] {
            b'-' => spec.left = true,
            b'0' => spec.zero = true,
            b'+' => spec.plus = true,
            b' ' => spec.space = true,
            b'#' => spec.alt = true,
            _ => break,
        }
        i += 1;
    }
    let digits = ascii_digits(&bytes[i..]);
    spec.width = parse_decimal(&bytes[i..i + digits]);
    i += digits;
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        let digits = ascii_digits(&bytes[i..]);
        spec.precision = Some(parse_decimal(&bytes[i..i + digits]));
        i += digits;
    }
    while i < bytes.len() && b"hlLqjzt".contains(&bytes[i]) {
        i += 1;
    }
    match directive[i..].chars().next() {
        Some(c) => (spec, Some(c), i + c.len_utf8()),
        None => (spec, None, i),
    }
}

fn ascii_digits(bytes: &[u8]) -> usize {
    bytes.iter().take_while(|b| b.is_ascii_digit()).count()
}

/// Saturates instead of overflowing; the bound cuts the output long before.
fn parse_decimal(digits: &[u8]) -> usize {
    digits.iter().fold(0_usize, |acc, d| {
        acc.saturating_mul(10).saturating_add(usize::from(d - b'0'))
    })
}

fn write_conversion(out: &mut impl fmt::Write, spec: Spec, conv: char, arg: Arg<'_>) -> fmt::Result {
    match conv {
        'd' | 'i' => {
            let value = match arg {
                Arg::Int(v) => v,
                Arg::Uint(v) => v as i64,
                Arg::Float(v) => v as i64,
                Arg::Char(c) => i64::from(u32::from(c)),
                Arg::Ptr(p) => p as i64,
                Arg::Str(s) => return pad(out, spec, "", s, false),
            };
            let sign = sign_prefix(value < 0, spec);
            let digits = integer_digits(u128::from(value.unsigned_abs()), 10, false, spec.precision);
            pad(out, spec, sign, &digits, spec.precision.is_none())
        }
        'u' | 'x' | 'X' | 'o' => {
            let value = match arg {
                Arg::Uint(v) => v,
                Arg::Int(v) => v as u64,
                Arg::Float(v) => v as u64,
                Arg::Char(c) => u64::from(u32::from(c)),
                Arg::Ptr(p) => p as u64,
                Arg::Str(s) => return pad(out, spec, "", s, false),
            };
            let radix = match conv {
                'x' | 'X' => 16,
                'o' => 8,
                _ => 10,
            };
            let mut digits = integer_digits(u128::from(value), radix, conv == 'X', spec.precision);
            let prefix = match conv {
                'x' if spec.alt && value != 0 => "0x",
                'X' if spec.alt && value != 0 => "0X",
                _ => "",
            };
            if conv == 'o' && spec.alt && !digits.starts_with('0') {
                digits.insert(0, '0');
            }
            pad(out, spec, prefix, &digits, spec.precision.is_none())
        }
        'c' => {
            let mut tmp = [0u8; 4];
            let text: &str = match arg {
                Arg::Char(c) => c.encode_utf8(&mut tmp),
                Arg::Int(v) => char::from_u32(v as u32).unwrap_or('?').encode_utf8(&mut tmp),
                Arg::Uint(v) => char::from_u32(v as u32).unwrap_or('?').encode_utf8(&mut tmp),
                Arg::Str(s) => s.get(..s.chars().next().map_or(0, char::len_utf8)).unwrap_or(""),
                Arg::Float(_) | Arg::Ptr(_) => "?",
            };
            pad(out, spec, "", text, false)
        }
        's' => {
            let owned;
            let text: &str = match arg {
                Arg::Str(s) => s,
                Arg::Char(c) => {
                    owned = c.to_string();
                    &owned
                }
                Arg::Int(v) => {
                    owned = v.to_string();
                    &owned
                }
                Arg::Uint(v) => {
                    owned = v.to_string();
                    &owned
                }
                Arg::Float(v) => {
                    owned = v.to_string();
                    &owned
                }
                Arg::Ptr(p) => {
                    owned = format!("{p:#x}");
                    &owned
                }
            };
            let text = match spec.precision {
                Some(max) => text.char_indices().nth(max).map_or(text, |(i, _)| &text[..i]),
                None => text,
            };
            pad(out, spec, "", text, false)
        }
        'f' | 'F' | 'e' | 'E' | 'g' | 'G' => {
            let value = match arg {
                Arg::Float(v) => v,
                Arg::Int(v) => v as f64,
                Arg::Uint(v) => v as f64,
                Arg::Char(_) | Arg::Ptr(_) | Arg::Str(_) => f64::NAN,
            };
            let sign = sign_prefix(value.is_sign_negative() && !value.is_nan(), spec);
            let upper = conv.is_ascii_uppercase();
            if !value.is_finite() {
                let word = match (value.is_nan(), upper) {
                    (true, false) => "nan",
                    (true, true) => "NAN",
                    (false, false) => "inf",
                    (false, true) => "INF",
                };
                return pad(out, spec, sign, word, false);
            }
            let body = float_body(value.abs(), conv.to_ascii_lowercase(), spec);
            let body = if upper { body.to_ascii_uppercase() } else { body };
            pad(out, spec, sign, &body, true)
        }
        'p' => match arg {
            Arg::Ptr(0) => pad(out, spec, "", "(nil)", false),
            Arg::Ptr(p) => pad(out, spec, "0x", &format!("{p:x}"), false),
            other => write_conversion(out, spec, 'x', other),
        },
        _ => Ok(()),
    }
}

const fn sign_prefix(negative: bool, spec: Spec) -> &'static str {
    if negative {
        "-"
    } else if spec.plus {
        "+"
    } else if spec.space {
        " "
    } else {
        ""
    }
}

fn integer_digits(value: u128, radix: u32, upper: bool, precision: Option<usize>) -> String {
    if value == 0 && precision == Some(0) {
        return String::new();
    }
    let mut digits = match (radix, upper) {
        (16, true) => format!("{value:X}"),
        (16, false) => format!("{value:x}"),
        (8, _) => format!("{value:o}"),
        _ => value.to_string(),
    };
    if let Some(min) = precision {
        if digits.len() < min {
            digits.insert_str(0, &"0".repeat(min - digits.len()));
        }
    }
    digits
}

fn float_body(value: f64, conv: char, spec: Spec) -> String {
    let precision = spec.precision.unwrap_or(6);
    match conv {
        'f' => {
            let mut s = format!("{value:.precision$}");
            if spec.alt && precision == 0 {
                s.push('.');
            }
            s
        }
        'e' => c_exponent(value, precision),
        _ => {
            let p = if precision == 0 { 1 } else { precision };
            let exponent = decimal_exponent(value, p - 1);
            let mut s = if exponent >= -4 && exponent < p as i32 {
                let decimals = (p as i32 - 1 - exponent).max(0) as usize;
                format!("{value:.decimals$}")
            } else {
                c_exponent(value, p - 1)
            };
            if !spec.alt {
                s = strip_trailing_zeros(&s);
            }
            s
        }
    }
}

/// Exponent of `value` once rounded to `precision` fractional digits in e-notation
fn decimal_exponent(value: f64, precision: usize) -> i32 {
    let rendered = format!("{value:.precision$e}");
    rendered
        .split_once('e')
        .and_then(|(_, exp)| exp.parse().ok())
        .unwrap_or(0)
}

/// C-style e-notation: at least two exponent digits with an explicit sign
fn c_exponent(value: f64, precision: usize) -> String {
    let rendered = format!("{value:.precision$e}");
    match rendered.split_once('e') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{mantissa}e{sign}{:02}", exp.unsigned_abs())
        }
        None => rendered,
    }
}

fn strip_trailing_zeros(s: &str) -> String {
    let (mantissa, exponent) = match s.find('e') {
        Some(i) => (&s[..i], &s[i..]),
        None => (s, ""),
    };
    let mantissa = if mantissa.contains('.') {
        mantissa.trim_end_matches('0').trim_end_matches('.')
    } else {
        mantissa
    };
    format!("{mantissa}{exponent}")
}

/// Write `prefix` + `body` padded to the field width
fn pad(out: &mut impl fmt::Write, spec: Spec, prefix: &str, body: &str, zero_ok: bool) -> fmt::Result {
    let len = prefix.chars().count() + body.chars().count();
    let fill = spec.width.saturating_sub(len);
    if spec.left {
        out.write_str(prefix)?;
        out.write_str(body)?;
        write_repeat(out, ' ', fill)
    } else if spec.zero && zero_ok {
        out.write_str(prefix)?;
        write_repeat(out, '0', fill)?;
        out.write_str(body)
    } else {
        write_repeat(out, ' ', fill)?;
        out.write_str(prefix)?;
        out.write_str(body)
    }
}

fn write_repeat(out: &mut impl fmt::Write, c: char, count: usize) -> fmt::Result {
    for _ in 0..count {
        out.write_char(c)?;
    }
    Ok(())
}
