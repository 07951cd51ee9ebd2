//! # ember-wallet
//!
//! Embedded-wallet core: drives share acquisition against the auth service,
//! assembles the signing account from two shares, and persists the session
//! envelope that keeps a device enrolled between launches.
//!
//! The state machine is deliberately strict: it never re-authenticates
//! implicitly, it never mutates local state before the server step of a
//! flow has fully succeeded, and any share failure during recovery aborts
//! the sign-in attempt without touching the stored envelope.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod server;
pub mod store;
pub mod types;
pub mod wallet;

pub use error::WalletError;
pub use server::AuthClient;
pub use store::LocalStore;
pub use types::{
    AuthProvider, OtpChannel, SessionEnvelope, User, UserWallet, VerifyOtpResult, WalletStatus,
};
pub use wallet::EmbeddedWallet;
