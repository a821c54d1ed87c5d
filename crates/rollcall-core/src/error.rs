use std::time::Duration;

use thiserror::Error;

/// Application-wide error types.
///
/// This enum represents all possible errors that can occur in the Rollcall
/// engine. It uses the `thiserror` crate for ergonomic error handling and
/// automatic conversion from underlying library errors.
///
/// # Error Classes
///
/// The taxonomy mirrors how callers are expected to react:
///
/// - [`Provider`](AppError::Provider) — transient network/API failure; the
///   caller moves on to the next page/probe/member, nothing retries
///   automatically beyond the throttle wrapper.
/// - [`Throttled`](AppError::Throttled) — the provider demanded a backoff;
///   always honored before any further call.
/// - [`PermissionDenied`](AppError::PermissionDenied) — fatal to the
///   affected strategy or member only, never to the whole job.
/// - [`NotFound`](AppError::NotFound) — treated as a zero-result, not a
///   failure.
/// - [`Cancelled`](AppError::Cancelled) — job-local; unwinds to the job
///   controller without further remote calls.
#[derive(Error, Debug)]
pub enum AppError {
    /// Database operation failed.
    ///
    /// Wraps all errors from SQLx operations, including connection
    /// failures, query errors, and constraint violations.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Transient provider/API failure (network, timeout, malformed page).
    ///
    /// Not retried automatically; the owning loop logs it and advances to
    /// its next page, probe, or member.
    #[error("Provider error: {0}")]
    Provider(String),

    /// The provider issued an explicit backoff signal with a wait time.
    #[error("Throttled by provider, retry after {}s", wait.as_secs())]
    Throttled {
        /// How long the provider asked us to wait.
        wait: Duration,
    },

    /// The provider refused the operation for this channel or member.
    ///
    /// Fatal only to the affected strategy/member; the job continues.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Channel or member no longer exists on the provider side.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The channel record has no usable access credential and it could not
    /// be re-derived from the handle.
    #[error("Channel {0} has no usable access credential")]
    ChannelUnusable(i64),

    /// The owning job was cancelled; no further calls are made.
    #[error("Job cancelled")]
    Cancelled,

    /// JSON serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration file error (channel registry, harvest settings).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem error while writing an export artifact.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic application error for cases not covered by specific variants.
    ///
    /// Use this sparingly - prefer creating specific error variants
    /// for better error handling and debugging.
    #[error("Error: {0}")]
    Generic(String),
}

impl AppError {
    /// Returns a user-friendly message suitable for CLI or bot output.
    ///
    /// Never includes stack traces; always a short classified message.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Database(e) => {
                if e.to_string().contains("connection") {
                    "Cannot connect to the database. Is PostgreSQL running?".to_string()
                } else {
                    format!("Database error: {}", e)
                }
            }
            AppError::Provider(msg) => {
                format!("The provider API failed: {}. Try again later.", msg)
            }
            AppError::Throttled { wait } => {
                format!(
                    "Rate limited by the provider. Wait {} seconds and retry.",
                    wait.as_secs()
                )
            }
            AppError::PermissionDenied(what) => {
                format!(
                    "Access denied: {}. Make sure the account administers this channel.",
                    what
                )
            }
            AppError::NotFound(what) => {
                format!("Not found: {}. It may have been deleted or renamed.", what)
            }
            AppError::ChannelUnusable(id) => {
                format!(
                    "Channel {} is missing its access credential. Re-add it by handle.",
                    id
                )
            }
            AppError::Cancelled => "The job was cancelled.".to_string(),
            AppError::Config(msg) => {
                format!("Configuration error: {}. Check your channels file.", msg)
            }
            _ => self.to_string(),
        }
    }

    /// Returns true if a whole-operation retry could plausibly succeed.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use rollcall_core::error::AppError;
    ///
    /// assert!(AppError::Provider("connection reset".into()).is_retryable());
    /// assert!(AppError::Throttled { wait: Duration::from_secs(5) }.is_retryable());
    /// assert!(!AppError::NotFound("channel".into()).is_retryable());
    /// assert!(!AppError::Cancelled.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Provider(_) | AppError::Throttled { .. })
    }

    /// Returns true for errors that should stop the current enumeration
    /// strategy without aborting the rest of the job.
    pub fn ends_strategy(&self) -> bool {
        matches!(
            self,
            AppError::PermissionDenied(_) | AppError::NotFound(_) | AppError::Cancelled
        )
    }
}
