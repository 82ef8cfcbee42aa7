//! # Session Configuration
//!
//! Loaded once at session start from a TOML file. Every key is optional;
//! missing keys fall back to the protocol defaults.
//!
//! ```toml
//! [failsafe]
//! max_cinematic_ms = 12000
//!
//! [locks]
//! transient_grace_ms = 2000
//! request_timeout_ms = 5000
//! enforce_interaction_locks = true
//!
//! [hatch]
//! lock_ms = 15000
//!
//! [transport]
//! channel_capacity = 1024
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use simlock_shared::{
    DEFAULT_CHANNEL_CAPACITY, DEFAULT_HATCH_LOCK_MS, DEFAULT_MAX_CINEMATIC_MS,
    DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_TRANSIENT_GRACE_MS,
};

use crate::error::{OwnershipError, OwnershipResult};

/// Top-level ownership configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OwnershipConfig {
    /// Failsafe monitor settings.
    pub failsafe: FailsafeConfig,
    /// Lock arbitration settings.
    pub locks: LockConfig,
    /// Local hatch hold settings.
    pub hatch: HatchConfig,
    /// Message channel settings.
    pub transport: TransportConfig,
}

/// Failsafe monitor settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FailsafeConfig {
    /// Longest a cinematic may run before it is force-ended (milliseconds).
    pub max_cinematic_ms: u64,
}

impl Default for FailsafeConfig {
    fn default() -> Self {
        Self {
            max_cinematic_ms: DEFAULT_MAX_CINEMATIC_MS,
        }
    }
}

/// Lock arbitration settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Lifetime of a transient record on the authority (milliseconds).
    pub transient_grace_ms: u64,
    /// How long a client waits for a response before giving up (milliseconds).
    pub request_timeout_ms: u64,
    /// When false, call sites run single-player behaviour without asking for locks.
    pub enforce_interaction_locks: bool,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            transient_grace_ms: DEFAULT_TRANSIENT_GRACE_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            enforce_interaction_locks: true,
        }
    }
}

/// Local hatch hold settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HatchConfig {
    /// Default hold duration (milliseconds).
    pub lock_ms: u64,
}

impl Default for HatchConfig {
    fn default() -> Self {
        Self {
            lock_ms: DEFAULT_HATCH_LOCK_MS,
        }
    }
}

/// Message channel settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Capacity of each bounded channel.
    pub channel_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl OwnershipConfig {
    /// Parses and validates a config from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`OwnershipError::InvalidConfig`] if the text is not valid TOML
    /// or a value is out of range.
    pub fn from_toml_str(text: &str) -> OwnershipResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| OwnershipError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a config file.
    ///
    /// # Errors
    ///
    /// Returns [`OwnershipError::ConfigIo`] if the file cannot be read, or
    /// [`OwnershipError::InvalidConfig`] if its content is unusable.
    pub fn load(path: impl AsRef<Path>) -> OwnershipResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| OwnershipError::ConfigIo {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::info!("Loaded ownership config from {}", path.display());
        Ok(config)
    }

    /// Checks that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`OwnershipError::InvalidConfig`] naming the first bad key.
    pub fn validate(&self) -> OwnershipResult<()> {
        let checks = [
            ("failsafe.max_cinematic_ms", self.failsafe.max_cinematic_ms),
            ("locks.transient_grace_ms", self.locks.transient_grace_ms),
            ("locks.request_timeout_ms", self.locks.request_timeout_ms),
            ("hatch.lock_ms", self.hatch.lock_ms),
        ];
        if let Some((key, _)) = checks.iter().find(|(_, value)| *value == 0) {
            return Err(OwnershipError::InvalidConfig(format!("{key} must be greater than zero")));
        }
        if self.transport.channel_capacity == 0 {
            return Err(OwnershipError::InvalidConfig(
                "transport.channel_capacity must be greater than zero".to_owned(),
            ));
        }
        Ok(())
    }

    /// Maximum cinematic duration.
    #[must_use]
    pub const fn max_cinematic_duration(&self) -> Duration {
        Duration::from_millis(self.failsafe.max_cinematic_ms)
    }

    /// Transient record lifetime on the authority.
    #[must_use]
    pub const fn transient_grace(&self) -> Duration {
        Duration::from_millis(self.locks.transient_grace_ms)
    }

    /// Client-side request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.locks.request_timeout_ms)
    }

    /// Default hatch hold duration.
    #[must_use]
    pub const fn hatch_lock_duration(&self) -> Duration {
        Duration::from_millis(self.hatch.lock_ms)
    }
}
