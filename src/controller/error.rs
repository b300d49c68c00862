//! Error types for the volume sizing controller

use std::time::Duration;

use thiserror::Error;

/// Error variants are named with the `Error` suffix for clarity (e.g., `KubeError`).
/// This is idiomatic for error enums and improves readability at call sites.
#[allow(clippy::enum_variant_names)]
#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Fresh stats for a volume are missing or stale; the volume is
    /// skipped this cycle and retried on the next
    #[error("Probe unavailable: {0}")]
    ProbeUnavailable(String),

    /// WAL health could not be determined; resolution is policy-dependent
    /// (fail-open or fail-closed)
    #[error("WAL health unknown: {0}")]
    WalHealthUnknown(String),

    /// A sizing policy that admission let through is malformed; surfaced
    /// as a blocking condition, never a crash
    #[error("Invalid configuration: {0}")]
    ConfigurationInvalid(String),

    /// A concurrent writer changed the PVC under us; retried next cycle
    /// without consuming budget
    #[error("Patch conflict: {0}")]
    PatchConflict(String),

    #[error("Missing object key: {0}")]
    MissingObjectKey(&'static str),

    #[error("Resource not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::KubeError(e) => match e {
                kube::Error::Api(api_err) => {
                    // 4xx errors (except 409 Conflict, 429 TooManyRequests)
                    // are usually not retryable; 5xx errors are
                    let code = api_err.code;
                    if (400..500).contains(&code) {
                        code == 409 || code == 429
                    } else {
                        true
                    }
                }
                // Network and other errors are retryable
                _ => true,
            },
            // Stats and WAL health may well be there next cycle
            Error::ProbeUnavailable(_) => true,
            Error::WalHealthUnknown(_) => true,
            // A conflicting writer resolves itself; try again
            Error::PatchConflict(_) => true,
            // Configuration needs a human
            Error::ConfigurationInvalid(_) => false,
            Error::SerializationError(_) => false,
            Error::MissingObjectKey(_) => false,
            Error::NotFound(_) => true, // Resource might appear later
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Exponential backoff configuration
#[derive(Clone, Debug)]
pub struct BackoffConfig {
    /// Initial delay for first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for each subsequent retry
    pub multiplier: f64,
    /// Random jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300), // 5 minutes
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl BackoffConfig {
    /// Calculate the backoff delay for a given retry attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay_secs =
            self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);

        // Apply jitter
        let jitter_range = base_delay_secs * self.jitter;
        let jitter = rand::random::<f64>() * jitter_range * 2.0 - jitter_range;
        let delay_with_jitter = (base_delay_secs + jitter).max(0.0);

        // Cap at max delay
        let capped_delay = delay_with_jitter.min(self.max_delay.as_secs_f64());

        Duration::from_secs_f64(capped_delay)
    }

    /// Get the delay for an error, with different handling for retryable vs non-retryable
    pub fn delay_for_error(&self, error: &Error, attempt: u32) -> Duration {
        if error.is_retryable() {
            self.delay_for_attempt(attempt)
        } else {
            // Non-retryable errors wait for manual intervention or an
            // eventual spec change
            self.max_delay
        }
    }
}
