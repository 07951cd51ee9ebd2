//! Error type for smart-wallet operations.

use thiserror::Error;

/// Errors surfaced by UserOperation building, submission, and the
/// smart-wallet facade.
#[derive(Debug, Error)]
pub enum SmartWalletError {
    /// The smart account has no code on chain.
    #[error("smart account is not deployed")]
    NotDeployed,

    /// A deployment attempt did not produce on-chain code.
    #[error("smart account deployment failed: {0}")]
    DeploymentFailed(String),

    /// The bundler rejected a request or answered with an RPC error.
    #[error("bundler error: {0}")]
    BundlerError(String),

    /// The bundler or chain endpoint could not be reached.
    #[error("cannot reach the bundler")]
    BundlerUnreachable,

    /// No receipt surfaced within the polling window.
    #[error("user operation {0} was not mined within the wait window")]
    ReceiptTimeout(String),

    /// Post-sign ERC-1271 verification did not return the magic value.
    #[error("smart account rejected the signature")]
    InvalidSignature,

    /// The operation has no meaning on a ZK-Sync chain.
    #[error("operation is not supported on ZK-Sync chains")]
    NotSupportedOnZkSync,

    /// The configured entry-point address matches no known revision.
    #[error("unrecognized entry point address {0}")]
    UnknownEntryPoint(String),

    /// An on-chain response could not be ABI-decoded.
    #[error("abi: {0}")]
    Abi(String),

    /// The personal account failed to produce a signature.
    #[error("signer: {0}")]
    Signer(String),

    /// A signing primitive failed.
    #[error(transparent)]
    Crypto(#[from] ember_crypto::CryptoError),
}

impl From<reqwest::Error> for SmartWalletError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            Self::BundlerUnreachable
        } else {
            Self::BundlerError(err.to_string())
        }
    }
}

/// Result alias for this crate.
pub type Result<T> = std::result::Result<T, SmartWalletError>;
