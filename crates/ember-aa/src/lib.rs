//! # ember-aa
//!
//! ERC-4337 account-abstraction client for the Ember wallet SDK.
//!
//! A [`SmartWallet`] wraps any [`PersonalAccount`] (the embedded wallet's
//! in-process key or an external signer) and drives a smart contract
//! account through UserOperations: deploy-on-first-use, gas estimation and
//! paymaster sponsorship, EntryPoint v0.6 and v0.7 layouts, ERC-1271
//! message validation, and session-key permissioning. ZK-Sync chains take
//! the native EIP-712 transaction path instead.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod abi;
mod builder;
pub mod bundler;
pub mod constants;
pub mod error;
pub mod permissions;
pub mod personal;
pub mod smart_wallet;
pub mod userop;
pub mod zksync;

pub use bundler::BundlerClient;
pub use error::SmartWalletError;
pub use permissions::SessionKeyParams;
pub use personal::PersonalAccount;
pub use smart_wallet::{SmartWallet, SmartWalletConfig, TokenPaymaster};
pub use userop::{EntryPointVersion, UserOp, UserOperationV6, UserOperationV7};
pub use zksync::ZkSyncTransaction;
