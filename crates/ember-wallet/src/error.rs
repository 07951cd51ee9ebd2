//! Error type for embedded-wallet flows.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by sign-in, recovery, and session management.
///
/// None of these are retried implicitly; transient-looking conditions are
/// reported to the caller, who owns the retry policy.
#[derive(Debug, Error)]
pub enum WalletError {
    /// No session envelope or auth token is available.
    #[error("not signed in")]
    NotSignedIn,

    /// The auth service rejected the bearer token.
    #[error("auth token was rejected")]
    Unauthorized,

    /// Server-reported email, phone, or auth provider disagrees with the
    /// caller's claim.
    #[error("server identity does not match the caller's claim")]
    IdentityMismatch,

    /// The server reports an initialized wallet but the device share is
    /// missing, or the wallet was never initialized.
    #[error("wallet is not initialized on this device")]
    WalletUninitialized,

    /// Enrollment or recovery needs a recovery code and neither the server
    /// nor the caller supplied one.
    #[error("no recovery code available")]
    MissingRecoveryCode,

    /// The one-time code was rejected.
    #[error("one-time code was rejected")]
    BadOtp,

    /// The one-time code has expired.
    #[error("one-time code has expired")]
    OtpExpired,

    /// The auth service is rate limiting this client.
    #[error("too many attempts, retry after {} s", retry_after.as_secs())]
    Throttled {
        /// Server-suggested backoff.
        retry_after: Duration,
    },

    /// The server refused a write because the state already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A required server-side record is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// The server answered with a status or shape this client does not
    /// understand.
    #[error("unexpected server response: {0}")]
    ServerProtocol(String),

    /// The server reported an error status.
    #[error("server error ({0}): {1}")]
    ServerError(u16, String),

    /// The auth service could not be reached.
    #[error("cannot reach the auth service")]
    ServerUnreachable,

    /// The request timed out.
    #[error("request timed out")]
    Timeout,

    /// Local persistence failed.
    #[error("storage: {0}")]
    Storage(String),

    /// The stored session envelope could not be parsed.
    #[error("stored session is corrupt: {0}")]
    StorageCorrupt(String),

    /// A share or signing primitive failed.
    #[error(transparent)]
    Crypto(#[from] ember_crypto::CryptoError),
}

impl From<reqwest::Error> for WalletError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::ServerUnreachable
        } else {
            Self::ServerError(
                err.status().map(|s| s.as_u16()).unwrap_or(0),
                err.to_string(),
            )
        }
    }
}

/// Result alias for this crate.
pub type Result<T> = std::result::Result<T, WalletError>;
