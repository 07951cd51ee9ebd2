//! Recovery-share encryption under a user-held recovery code.
//!
//! The recovery share never leaves the device in plaintext: it is wrapped
//! with AES-256-GCM under a key derived from the recovery code with Argon2id
//! (m = 64 MiB, t = 3, p = 4, fixed domain salt). The envelope that goes to
//! the auth service is `base64url(nonce || ciphertext || tag)` without
//! padding.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use zeroize::Zeroize;

use crate::constants::{
    ARGON2_M_COST, ARGON2_P_COST, ARGON2_T_COST, GCM_NONCE_SIZE, GCM_TAG_SIZE, KEK_SALT,
};
use crate::errors::{CryptoError, Result};
use crate::shamir::Share;

/// Encrypt a share's wire form under the recovery code.
pub fn encrypt_share(share: &Share, recovery_code: &str) -> Result<String> {
    let mut key = derive_key(recovery_code)?;
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));

    let mut nonce = [0u8; GCM_NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), share.to_wire().as_bytes())
        .map_err(|_| CryptoError::KeyDerivation("AES-GCM encryption failed".into()))?;
    key.zeroize();

    let mut envelope = Vec::with_capacity(GCM_NONCE_SIZE + ciphertext.len());
    envelope.extend_from_slice(&nonce);
    envelope.extend_from_slice(&ciphertext);
    Ok(URL_SAFE_NO_PAD.encode(envelope))
}

/// Decrypt an encrypted-share envelope with the recovery code.
///
/// Fails with [`CryptoError::WrongRecoveryCode`] when the GCM tag does not
/// verify, and [`CryptoError::ShareCorrupt`] when the envelope itself is
/// malformed.
pub fn decrypt_share(blob: &str, recovery_code: &str) -> Result<Share> {
    let envelope = URL_SAFE_NO_PAD
        .decode(blob)
        .map_err(|_| CryptoError::ShareCorrupt("envelope is not base64url".into()))?;
    if envelope.len() < GCM_NONCE_SIZE + GCM_TAG_SIZE {
        return Err(CryptoError::ShareCorrupt(format!(
            "envelope too short: {} bytes",
            envelope.len()
        )));
    }
    let (nonce, ciphertext) = envelope.split_at(GCM_NONCE_SIZE);

    let mut key = derive_key(recovery_code)?;
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::WrongRecoveryCode);
    key.zeroize();

    let mut plaintext = plaintext?;
    let wire = std::str::from_utf8(&plaintext)
        .map_err(|_| CryptoError::ShareCorrupt("decrypted share is not UTF-8".into()))?;
    let share = Share::from_wire(wire);
    plaintext.zeroize();
    share
}

/// Derive the 32-byte KEK from the recovery code.
fn derive_key(recovery_code: &str) -> Result<[u8; 32]> {
    use argon2::{Algorithm, Argon2, Params, Version};

    let params = Params::new(ARGON2_M_COST, ARGON2_T_COST, ARGON2_P_COST, Some(32))
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = [0u8; 32];
    argon2
        .hash_password_into(recovery_code.as_bytes(), KEK_SALT, &mut key)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shamir::{split, Secret};

    fn sample_share() -> Share {
        split(&Secret::generate()).recovery
    }

    #[test]
    fn encrypt_then_decrypt_round_trips() {
        let share = sample_share();
        let blob = encrypt_share(&share, "hunter2").unwrap();

        assert_ne!(blob, share.to_wire(), "ciphertext must differ from the share");

        let decrypted = decrypt_share(&blob, "hunter2").unwrap();
        assert_eq!(decrypted.to_wire(), share.to_wire());
    }

    #[test]
    fn wrong_code_fails_with_wrong_recovery_code() {
        let share = sample_share();
        let blob = encrypt_share(&share, "correct horse").unwrap();
        let result = decrypt_share(&blob, "battery staple");
        assert!(matches!(result, Err(CryptoError::WrongRecoveryCode)));
    }

    #[test]
    fn truncated_envelope_is_share_corrupt() {
        let result = decrypt_share("AAAA", "code");
        assert!(matches!(result, Err(CryptoError::ShareCorrupt(_))));
    }

    #[test]
    fn non_base64_envelope_is_share_corrupt() {
        let result = decrypt_share("not base64!!", "code");
        assert!(matches!(result, Err(CryptoError::ShareCorrupt(_))));
    }

    #[test]
    fn nonces_are_fresh_per_encryption() {
        let share = sample_share();
        let a = encrypt_share(&share, "code").unwrap();
        let b = encrypt_share(&share, "code").unwrap();
        assert_ne!(a, b);
    }
}
