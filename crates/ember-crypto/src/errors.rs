//! Error types for cryptographic operations.

use thiserror::Error;

/// Errors surfaced by share arithmetic, share encryption, and signing.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// A share failed to decode, or two shares with the same id were
    /// combined.
    #[error("share is malformed or corrupt: {0}")]
    ShareCorrupt(String),

    /// AES-GCM authentication failed while unwrapping the recovery share.
    #[error("recovery code does not match the encrypted share")]
    WrongRecoveryCode,

    /// The secret value does not fit below the sharing field prime.
    #[error("secret does not fit the sharing field")]
    SecretOutOfRange,

    /// A private key was rejected by the curve implementation.
    #[error("invalid private key: {0}")]
    InvalidKey(String),

    /// A signature failed to parse or to recover a signer address.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// EIP-712 typed data could not be encoded.
    #[error("typed data: {0}")]
    TypedData(String),

    /// A transaction input was incomplete or could not be encoded.
    #[error("transaction: {0}")]
    Transaction(String),

    /// Key derivation failed.
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),
}

/// Result alias for this crate.
pub type Result<T> = std::result::Result<T, CryptoError>;
