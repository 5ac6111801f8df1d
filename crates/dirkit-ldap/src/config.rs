//! Session and transport options.
//!
//! [`SessionOptions`] holds the settings a session interprets itself (busy retries and bind
//! credentials). Everything under [`TransportOptions`] is handed to the connector untouched
//! before the bind.

use dirkit_core::retry::{BusyRetryPolicy, DEFAULT_BUSY_WAIT_MS, DEFAULT_MAX_BUSY_RETRIES};
use dirkit_core::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

/// Default connection timeout (seconds).
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 10;
/// Default operation timeout (seconds).
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 15;

const fn default_max_busy_retries() -> u32 {
    DEFAULT_MAX_BUSY_RETRIES
}

#[allow(clippy::cast_possible_wrap)]
const fn default_busy_wait_interval_ms() -> i64 {
    DEFAULT_BUSY_WAIT_MS as i64
}

const fn default_connection_timeout_secs() -> u64 {
    DEFAULT_CONNECTION_TIMEOUT_SECS
}

const fn default_operation_timeout_secs() -> u64 {
    DEFAULT_OPERATION_TIMEOUT_SECS
}

const fn default_tls_verify() -> bool {
    true
}

/// Options forwarded verbatim to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct TransportOptions {
    /// Connection establishment timeout in seconds
    #[validate(range(min = 1, max = 300))]
    #[serde(default = "default_connection_timeout_secs")]
    pub connection_timeout_secs: u64,

    /// Per-request timeout in seconds
    #[validate(range(min = 1, max = 3600))]
    #[serde(default = "default_operation_timeout_secs")]
    pub operation_timeout_secs: u64,

    /// Upgrade plain `ldap://` connections with StartTLS
    #[serde(default)]
    pub starttls: bool,

    /// Whether to verify TLS certificates
    #[serde(default = "default_tls_verify")]
    pub tls_verify: bool,

    /// Optional path to a PEM CA certificate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_ca_cert: Option<PathBuf>,
}

impl TransportOptions {
    /// Creates transport options with defaults.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            connection_timeout_secs: DEFAULT_CONNECTION_TIMEOUT_SECS,
            operation_timeout_secs: DEFAULT_OPERATION_TIMEOUT_SECS,
            starttls: false,
            tls_verify: true,
            tls_ca_cert: None,
        }
    }

    /// Overrides the connection timeout in seconds.
    #[must_use]
    pub const fn with_connection_timeout_secs(mut self, seconds: u64) -> Self {
        self.connection_timeout_secs = seconds;
        self
    }

    /// Overrides the operation timeout in seconds.
    #[must_use]
    pub const fn with_operation_timeout_secs(mut self, seconds: u64) -> Self {
        self.operation_timeout_secs = seconds;
        self
    }

    /// Enables or disables StartTLS.
    #[must_use]
    pub const fn with_starttls(mut self, enabled: bool) -> Self {
        self.starttls = enabled;
        self
    }

    /// Enables or disables TLS certificate verification.
    #[must_use]
    pub const fn with_tls_verification(mut self, verify: bool) -> Self {
        self.tls_verify = verify;
        self
    }

    /// Sets the custom CA certificate path for TLS verification.
    #[must_use]
    pub fn with_tls_ca_cert(mut self, path: PathBuf) -> Self {
        self.tls_ca_cert = Some(path);
        self
    }

    /// Returns the connection timeout duration.
    #[must_use]
    pub const fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    /// Returns the operation timeout duration.
    #[must_use]
    pub const fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Options a session is constructed with. Fixed for the session's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SessionOptions {
    /// Busy retries after the first attempt; 0 fails on the first busy reply
    #[validate(range(max = 1000))]
    #[serde(default = "default_max_busy_retries")]
    pub max_busy_retries: u32,

    /// Pause between busy retries in milliseconds; non-positive uses the default
    #[serde(default = "default_busy_wait_interval_ms")]
    pub busy_wait_interval_ms: i64,

    /// Bind identity; anonymous when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_identity: Option<String>,

    /// Bind secret (never serialized)
    #[serde(default, skip_serializing)]
    pub bind_secret: Option<SecretString>,

    /// Pass-through transport options
    #[validate(nested)]
    #[serde(default)]
    pub transport: TransportOptions,
}

impl SessionOptions {
    /// Creates options with defaults and an anonymous bind.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_busy_retries: DEFAULT_MAX_BUSY_RETRIES,
            busy_wait_interval_ms: default_busy_wait_interval_ms(),
            bind_identity: None,
            bind_secret: None,
            transport: TransportOptions::new(),
        }
    }

    /// Sets the busy retry budget.
    #[must_use]
    pub const fn with_max_busy_retries(mut self, retries: u32) -> Self {
        self.max_busy_retries = retries;
        self
    }

    /// Sets the busy wait interval in milliseconds.
    #[must_use]
    pub const fn with_busy_wait_interval_ms(mut self, millis: i64) -> Self {
        self.busy_wait_interval_ms = millis;
        self
    }

    /// Sets bind credentials.
    #[must_use]
    pub fn with_bind(mut self, identity: impl Into<String>, secret: impl Into<String>) -> Self {
        self.bind_identity = Some(identity.into());
        self.bind_secret = Some(SecretString::from(secret.into()));
        self
    }

    /// Replaces the pass-through transport options.
    #[must_use]
    pub fn with_transport(mut self, transport: TransportOptions) -> Self {
        self.transport = transport;
        self
    }

    /// Validates every field.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid field set.
    pub fn check(&self) -> Result<()> {
        self.validate()
            .map_err(|e| Error::Config(format!("Invalid session options: {e}")))
    }

    /// Busy-retry policy derived from these options.
    #[must_use]
    pub const fn retry_policy(&self) -> BusyRetryPolicy {
        BusyRetryPolicy::new()
            .with_max_busy_retries(self.max_busy_retries)
            .with_wait_interval_ms(self.busy_wait_interval_ms)
    }

    /// Bind identity, empty for anonymous.
    #[must_use]
    pub fn bind_identity(&self) -> &str {
        self.bind_identity.as_deref().unwrap_or_default()
    }

    /// Bind secret, empty for anonymous.
    #[must_use]
    pub fn bind_secret(&self) -> &str {
        self.bind_secret
            .as_ref()
            .map(|secret| secret.expose_secret())
            .unwrap_or_default()
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::new()
    }
}
