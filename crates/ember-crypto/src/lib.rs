//! # ember-crypto
//!
//! Cryptographic primitives for the Ember wallet SDK.
//!
//! The wallet's signing key is never stored whole: it is split into three
//! Shamir shares over a 128-bit prime field, and any two of the three
//! reconstruct it exactly. One share stays on the device, one lives with the
//! auth service, and one is wrapped under a user-held recovery code with
//! AES-256-GCM. This crate owns that share arithmetic plus the secp256k1
//! signing surface built on top of the reconstructed key: EIP-191 personal
//! messages, EIP-712 v4 typed data, and legacy / EIP-1559 transactions.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod account;
pub mod constants;
pub mod eip712;
pub mod errors;
pub mod shamir;
pub mod transaction;
pub mod vault;

pub use account::{
    hash_prefixed_message, recover_address_from_personal_sign, PrivateKeyAccount,
};
pub use constants::*;
pub use eip712::TypedData;
pub use errors::CryptoError;
pub use shamir::{combine, derive_share, split, Secret, Share, ShareSet};
pub use transaction::TransactionInput;
pub use vault::{decrypt_share, encrypt_share};
