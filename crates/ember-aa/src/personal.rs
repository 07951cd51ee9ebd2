//! The personal-account capability the smart wallet wraps.
//!
//! A smart account is controlled by some signer: the embedded wallet's
//! in-process key, or an external signer (injected browser wallet, hardware
//! device) that only exposes a signing RPC. The facade depends on exactly
//! this capability set, owned unidirectionally as a trait object, so no
//! reference cycle exists between the smart wallet and its controller.

use alloy_primitives::{Address, Bytes};
use async_trait::async_trait;
use ember_crypto::PrivateKeyAccount;

use crate::error::{Result, SmartWalletError};

/// The controlling signer of a smart account.
#[async_trait]
pub trait PersonalAccount: Send + Sync {
    /// The signer's EOA address.
    fn address(&self) -> Address;

    /// Whether this signer lives outside the process.
    ///
    /// External signers stringify payloads before hashing, so operation
    /// hashes are handed to them in `0x`-hex form; in-process signers get
    /// raw bytes.
    fn is_external(&self) -> bool;

    /// EIP-191 `personal_sign`; returns the 65-byte signature.
    async fn personal_sign(&self, message: &[u8]) -> Result<Bytes>;

    /// EIP-712 v4 over an `eth_signTypedData_v4` JSON payload.
    async fn sign_typed_data(&self, payload: &str) -> Result<Bytes>;
}

#[async_trait]
impl PersonalAccount for PrivateKeyAccount {
    fn address(&self) -> Address {
        self.address_raw()
    }

    fn is_external(&self) -> bool {
        false
    }

    async fn personal_sign(&self, message: &[u8]) -> Result<Bytes> {
        decode_signature(&PrivateKeyAccount::personal_sign(self, message)?)
    }

    async fn sign_typed_data(&self, payload: &str) -> Result<Bytes> {
        decode_signature(&self.sign_typed_data_v4(payload)?)
    }
}

fn decode_signature(hex_sig: &str) -> Result<Bytes> {
    hex::decode(hex_sig.trim_start_matches("0x"))
        .map(Bytes::from)
        .map_err(|e| SmartWalletError::Signer(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn private_key_account_signs_65_bytes() {
        let account = PrivateKeyAccount::generate();
        let signature = PersonalAccount::personal_sign(&account, b"hello").await.unwrap();
        assert_eq!(signature.len(), 65);
        assert!(!account.is_external());
    }
}
