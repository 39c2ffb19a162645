//! Configuration of a [`SharedRegister`](crate::SharedRegister) client

use std::time::Duration;

/// The timeouts used by a client
///
/// The request timeout bounds every single RPC to a replica and should be shorter than the phase
/// timeout, which bounds how long a whole phase waits for a quorum.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct RegisterConfig {
    phase_timeout: Duration,
    request_timeout: Duration,
}

impl Default for RegisterConfig {
    /// # Settings
    /// * Phase timeout of 1 second
    /// * Request timeout of 500 milliseconds
    ///
    /// ```rust
    /// # use abd::config::RegisterConfig;
    /// # use std::time::Duration;
    /// let config = RegisterConfig::default();
    /// assert_eq!(Duration::from_secs(1), config.phase_timeout());
    /// assert_eq!(Duration::from_millis(500), config.request_timeout());
    /// ```
    fn default() -> Self {
        Self {
            phase_timeout: Duration::from_secs(1),
            request_timeout: Duration::from_millis(500),
        }
    }
}

impl RegisterConfig {
    /// Updates the maximum time a phase waits for a quorum of replicas
    pub fn with_phase_timeout(mut self, value: Duration) -> Self {
        self.phase_timeout = value;
        self
    }

    pub fn phase_timeout(&self) -> Duration {
        self.phase_timeout
    }

    /// Updates the deadline for a single request to a replica
    pub fn with_request_timeout(mut self, value: Duration) -> Self {
        self.request_timeout = value;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}
