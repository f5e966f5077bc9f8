//! Classified probe failures shared by all providers.
//!
//! The automation layer and terminal renderer never classify failures
//! themselves; they hand raw output back to the provider parsers, which map
//! product-specific symptoms onto this taxonomy. The credential manager
//! classifies its own failures independently.

use thiserror::Error;

/// Error type for provider probes.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The provider's CLI binary could not be found on the user's PATH
    #[error("binary not found: {name}")]
    BinaryNotFound { name: String },

    /// The subprocess or HTTP request could not be carried out
    #[error("execution failed: {reason}")]
    ExecutionFailed { reason: String },

    /// The probe exceeded its deadline; partial output was discarded
    #[error("probe timed out")]
    Timeout,

    /// The provider wants the user to authenticate (retryable after login)
    #[error("authentication required")]
    AuthenticationRequired,

    /// Stored credentials are irrecoverably invalid (refresh was rejected)
    #[error("session expired")]
    SessionExpired,

    /// The feature is gated behind a paid plan
    #[error("subscription required: {message}")]
    SubscriptionRequired { message: String },

    /// Output or response body did not match any known shape
    #[error("parse failed: {reason}")]
    ParseFailed { reason: String },
}

impl ProbeError {
    /// Actionable recovery hint for the display layer.
    pub fn advice(&self) -> &'static str {
        match self {
            ProbeError::BinaryNotFound { .. } => "Install the provider's CLI or adjust PATH",
            ProbeError::ExecutionFailed { .. } => "Re-run the probe; check the CLI works manually",
            ProbeError::Timeout => "The CLI was slow to respond; try again",
            ProbeError::AuthenticationRequired => "Run the provider's login command again",
            ProbeError::SessionExpired => "Sign in again; the stored session is no longer valid",
            ProbeError::SubscriptionRequired { .. } => "Usage data requires a subscription plan",
            ProbeError::ParseFailed { .. } => "The CLI output format may have changed; update quotabar",
        }
    }

    /// Whether a later probe could plausibly succeed without user action.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProbeError::ExecutionFailed { .. } | ProbeError::Timeout
        )
    }

    /// Shorthand for an execution failure with a formatted reason.
    pub fn execution(reason: impl Into<String>) -> Self {
        ProbeError::ExecutionFailed {
            reason: reason.into(),
        }
    }

    /// Shorthand for a parse failure with a formatted reason.
    pub fn parse(reason: impl Into<String>) -> Self {
        ProbeError::ParseFailed {
            reason: reason.into(),
        }
    }
}
