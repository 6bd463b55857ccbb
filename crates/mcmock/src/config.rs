//! Runtime Configuration
//!
//! Configuration for a [`MockContext`](crate::MockContext): message buffer
//! bound, truncation marker and reporter lifecycle policy.

use crate::result::{MockError, MockResult};
use serde::{Deserialize, Serialize};

/// Default upper bound, in bytes, of every formatted failure message
pub const DEFAULT_MESSAGE_CAPACITY: usize = 3000;

/// Default marker appended to a message cut at the capacity bound
pub const DEFAULT_TRUNCATION_MARKER: &str = "...";

/// Environment variable overriding [`MockConfig::message_capacity`]
pub const ENV_MESSAGE_CAPACITY: &str = "MCMOCK_MESSAGE_CAPACITY";

/// Environment variable overriding [`MockConfig::reset_reporter_on_verify`]
pub const ENV_RESET_REPORTER_ON_VERIFY: &str = "MCMOCK_RESET_REPORTER_ON_VERIFY";

/// Configuration for a mock context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MockConfig {
    /// Upper bound of a formatted message in bytes (marker included)
    pub message_capacity: usize,
    /// Marker written at the end of a truncated message
    pub truncation_marker: String,
    /// Unbind the failure reporter at the end of every `verify()`
    pub reset_reporter_on_verify: bool,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            message_capacity: DEFAULT_MESSAGE_CAPACITY,
            truncation_marker: DEFAULT_TRUNCATION_MARKER.to_string(),
            reset_reporter_on_verify: false,
        }
    }
}

impl MockConfig {
    /// Create the default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new builder
    #[must_use]
    pub fn builder() -> MockConfigBuilder {
        MockConfigBuilder::default()
    }

    /// Parse a configuration from JSON; missing fields keep their defaults
    pub fn from_json(json: &str) -> MockResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Default configuration with overrides from the `MCMOCK_*` environment variables
    pub fn from_env() -> MockResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> MockResult<Self> {
        let mut config = Self::default();
        if let Some(raw) = lookup(ENV_MESSAGE_CAPACITY) {
            config.message_capacity = raw.trim().parse().map_err(|_| {
                MockError::config(format!("{ENV_MESSAGE_CAPACITY} must be a byte count, got '{raw}'"))
            })?;
        }
        if let Some(raw) = lookup(ENV_RESET_REPORTER_ON_VERIFY) {
            config.reset_reporter_on_verify = parse_flag(&raw).ok_or_else(|| {
                MockError::config(format!(
                    "{ENV_RESET_REPORTER_ON_VERIFY} must be a boolean, got '{raw}'"
                ))
            })?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Check that the marker fits inside the message bound
    pub fn validate(&self) -> MockResult<()> {
        if self.message_capacity == 0 {
            return Err(MockError::config("message_capacity must be greater than zero"));
        }
        if self.truncation_marker.len() >= self.message_capacity {
            return Err(MockError::config(format!(
                "truncation marker ({} bytes) does not fit in message_capacity ({})",
                self.truncation_marker.len(),
                self.message_capacity
            )));
        }
        Ok(())
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

/// Builder for `MockConfig`
#[derive(Debug, Clone, Default)]
pub struct MockConfigBuilder {
    config: MockConfig,
}

impl MockConfigBuilder {
    /// Set the message capacity in bytes
    #[must_use]
    pub fn message_capacity(mut self, bytes: usize) -> Self {
        self.config.message_capacity = bytes;
        self
    }

    /// Set the truncation marker
    #[must_use]
    pub fn truncation_marker(mut self, marker: impl Into<String>) -> Self {
        self.config.truncation_marker = marker.into();
        self
    }

    /// Unbind the reporter after every `verify()`
    #[must_use]
    pub fn reset_reporter_on_verify(mut self, enabled: bool) -> Self {
        self.config.reset_reporter_on_verify = enabled;
        self
    }

    /// Build the configuration
    pub fn build(self) -> MockResult<MockConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
