//! secp256k1 key container and Ethereum message signing.
//!
//! A [`PrivateKeyAccount`] is the transient signing identity reconstructed
//! from two shares at sign-in. It signs raw digests (`eth_sign`), EIP-191
//! personal messages, EIP-712 v4 typed data, and RLP transactions. All
//! signatures are 65-byte `r || s || v` with `v ∈ {27, 28}` unless a chain
//! id binds them (EIP-155), and callers must not re-adjust `v`.

use alloy_primitives::{keccak256, Address, B256};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};

use crate::constants::SIGNATURE_SIZE;
use crate::eip712::TypedData;
use crate::errors::{CryptoError, Result};

/// An in-memory secp256k1 account.
///
/// The key scalar lives only inside the [`SigningKey`], which zeroizes
/// itself on drop; dropping the account at sign-out is the disposal path.
pub struct PrivateKeyAccount {
    signing_key: SigningKey,
}

impl PrivateKeyAccount {
    /// Build an account from a 32-byte private key.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        let signing_key = SigningKey::from_bytes(bytes.into())
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Self { signing_key })
    }

    /// Build an account from a hex-encoded private key, `0x` optional.
    pub fn from_hex(s: &str) -> Result<Self> {
        let raw = hex::decode(s.trim_start_matches("0x"))
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let bytes: [u8; 32] = raw
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("expected 32 bytes".into()))?;
        Self::from_bytes(&bytes)
    }

    /// Generate a fresh random account.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::random(&mut rand::thread_rng()),
        }
    }

    /// Derive the account from a reconstructed wallet secret.
    ///
    /// The 16-byte secret is stretched to the 32-byte key scalar with
    /// Keccak-256, so the same secret always yields the same address.
    pub fn from_secret(secret: &crate::shamir::Secret) -> Result<Self> {
        Self::from_bytes(&keccak256(secret.as_bytes()).0)
    }

    /// The raw 20-byte account address.
    pub fn address_raw(&self) -> Address {
        address_of(self.signing_key.verifying_key())
    }

    /// The EIP-55 checksummed account address.
    pub fn address(&self) -> String {
        self.address_raw().to_checksum(None)
    }

    /// Sign `keccak256(message)` directly, without any prefix.
    pub fn eth_sign(&self, message: &[u8]) -> Result<String> {
        let signature = self.sign_hash(keccak256(message))?;
        Ok(format!("0x{}", hex::encode(signature)))
    }

    /// Sign the EIP-191 prefixed hash of `message`.
    pub fn personal_sign(&self, message: &[u8]) -> Result<String> {
        let signature = self.sign_hash(hash_prefixed_message(message))?;
        Ok(format!("0x{}", hex::encode(signature)))
    }

    /// Sign an EIP-712 v4 payload given as `eth_signTypedData_v4` JSON.
    pub fn sign_typed_data_v4(&self, json: &str) -> Result<String> {
        let typed = TypedData::from_json(json)?;
        let signature = self.sign_hash(typed.signing_hash()?)?;
        Ok(format!("0x{}", hex::encode(signature)))
    }

    /// Sign a precomputed 32-byte digest, returning `r || s || v`.
    pub fn sign_hash(&self, hash: B256) -> Result<[u8; SIGNATURE_SIZE]> {
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(hash.as_slice())
            .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;

        let mut out = [0u8; SIGNATURE_SIZE];
        out[..32].copy_from_slice(&signature.r().to_bytes());
        out[32..64].copy_from_slice(&signature.s().to_bytes());
        out[64] = recovery_id.to_byte() + 27;
        Ok(out)
    }

    pub(crate) fn sign_digest_recoverable(&self, hash: B256) -> Result<(Signature, RecoveryId)> {
        self.signing_key
            .sign_prehash_recoverable(hash.as_slice())
            .map_err(|e| CryptoError::InvalidSignature(e.to_string()))
    }
}

impl std::fmt::Debug for PrivateKeyAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKeyAccount")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

/// `keccak256("\x19Ethereum Signed Message:\n" || len || message)`.
pub fn hash_prefixed_message(message: &[u8]) -> B256 {
    let mut prefixed =
        Vec::with_capacity(26 + 20 + message.len());
    prefixed.extend_from_slice(b"\x19Ethereum Signed Message:\n");
    prefixed.extend_from_slice(message.len().to_string().as_bytes());
    prefixed.extend_from_slice(message);
    keccak256(&prefixed)
}

/// Recover the EIP-55 signer address of a `personal_sign` signature.
pub fn recover_address_from_personal_sign(message: &[u8], signature: &str) -> Result<String> {
    let raw = hex::decode(signature.trim_start_matches("0x"))
        .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
    if raw.len() != SIGNATURE_SIZE {
        return Err(CryptoError::InvalidSignature(format!(
            "expected {SIGNATURE_SIZE} bytes, got {}",
            raw.len()
        )));
    }

    let v = raw[64];
    let recovery_id = RecoveryId::from_byte(v.checked_sub(27).unwrap_or(v))
        .ok_or_else(|| CryptoError::InvalidSignature(format!("invalid v byte {v}")))?;
    let signature = Signature::from_slice(&raw[..64])
        .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;

    let hash = hash_prefixed_message(message);
    let verifying_key = VerifyingKey::recover_from_prehash(hash.as_slice(), &signature, recovery_id)
        .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
    Ok(address_of(&verifying_key).to_checksum(None))
}

fn address_of(key: &VerifyingKey) -> Address {
    let encoded = key.to_encoded_point(false);
    let hash = keccak256(&encoded.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

#[cfg(test)]
mod tests {
    use super::*;

    // The canonical well-known test key.
    const TEST_KEY: &str = "4f3edf983ac636a65a842ce7c78d9aa706d3b113bce9c46f30d7d21715b23b1d";
    const TEST_ADDRESS: &str = "0x90F8bf6A479f320ead074411a4B0e7944Ea8c9C1";

    #[test]
    fn address_derivation_matches_known_vector() {
        let account = PrivateKeyAccount::from_hex(TEST_KEY).unwrap();
        assert_eq!(account.address(), TEST_ADDRESS);
    }

    #[test]
    fn personal_sign_recovers_to_signer() {
        let account = PrivateKeyAccount::generate();
        for message in [&b"hello"[..], b"", &[0u8; 1024]] {
            let signature = account.personal_sign(message).unwrap();
            let recovered = recover_address_from_personal_sign(message, &signature).unwrap();
            assert_eq!(recovered, account.address());
        }
    }

    #[test]
    fn eth_sign_differs_from_personal_sign() {
        let account = PrivateKeyAccount::from_hex(TEST_KEY).unwrap();
        let raw = account.eth_sign(b"hello").unwrap();
        let prefixed = account.personal_sign(b"hello").unwrap();
        assert_ne!(raw, prefixed);
    }

    #[test]
    fn signature_has_legacy_v() {
        let account = PrivateKeyAccount::generate();
        let signature = account.sign_hash(keccak256(b"digest")).unwrap();
        assert!(signature[64] == 27 || signature[64] == 28);
    }

    #[test]
    fn from_secret_is_deterministic() {
        let secret = crate::shamir::Secret::generate();
        let a = PrivateKeyAccount::from_secret(&secret).unwrap();
        let b = PrivateKeyAccount::from_secret(&secret).unwrap();
        assert_eq!(a.address(), b.address());
    }

    #[test]
    fn bad_keys_are_rejected() {
        assert!(PrivateKeyAccount::from_hex("0xdeadbeef").is_err());
        assert!(PrivateKeyAccount::from_bytes(&[0u8; 32]).is_err());
    }

    #[test]
    fn tampered_signature_recovers_a_different_address() {
        let account = PrivateKeyAccount::generate();
        let mut signature =
            hex::decode(account.personal_sign(b"msg").unwrap().trim_start_matches("0x")).unwrap();
        signature[10] ^= 0xff;
        let tampered = format!("0x{}", hex::encode(signature));
        match recover_address_from_personal_sign(b"msg", &tampered) {
            Ok(address) => assert_ne!(address, account.address()),
            Err(CryptoError::InvalidSignature(_)) => {}
            Err(other) => panic!("unexpected error {other:?}"),
        }
    }
}
