//! Error types and handling
//!
//! This module provides the engine-level error type used throughout Scout.
//! All errors implement the `ScoutErrorExt` trait which provides user-friendly
//! hints and indicates whether errors are recoverable.
//!
//! Capability-level failures have their own type
//! ([`CapabilityError`](crate::capability::CapabilityError)) because they are
//! always recovered inside a run and never reach the caller as errors.

use thiserror::Error;

/// Trait for Scout error extensions
///
/// This trait provides additional context for errors, including user-friendly
/// hints and recoverability information. All engine errors implement this trait.
pub trait ScoutErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint is safe to display to end users and does not contain:
    /// - Secrets (API keys, tokens, passwords)
    /// - Vendor response bodies
    /// - Internal implementation details
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be retried or worked around. Non-recoverable
    /// errors typically require a configuration change.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Configuration**: Invalid or missing configuration
/// - **Database**: SQLite operation failures
/// - **Reasoning engine**: API failures and authentication errors
/// - **Capabilities**: Registration problems
/// - **Network**: Enrichment provider transport failures
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, ScoutErrorExt};
///
/// let error = EngineError::Network("connection reset".to_string());
/// println!("Hint: {}", error.user_hint());
/// assert!(error.is_recoverable());
///
/// let fatal_error = EngineError::MissingApiKey("OPENAI_API_KEY".to_string());
/// assert!(!fatal_error.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing API key: environment variable {0} is not set")]
    MissingApiKey(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(String),

    // Reasoning engine errors
    #[error("Reasoning engine error: {0}")]
    Reasoning(String),

    // Capability errors
    #[error("Capability already registered: {0}")]
    DuplicateCapability(String),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),
}

impl ScoutErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",
            Self::MissingApiKey(_) => "Export the API key named in config.toml and retry",

            Self::Database(_) => "Database operation failed. Check the data directory",

            Self::Reasoning(_) => "Reasoning engine unavailable. Check your API key and network",

            Self::DuplicateCapability(_) => "Two capabilities share a name. Check registration",

            Self::Network(_) => "Network operation failed. Check your connection",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::MissingApiKey(_) | Self::DuplicateCapability(_) => false,

            // All other errors are potentially recoverable
            _ => true,
        }
    }
}
