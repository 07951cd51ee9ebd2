//! Cryptographic constants shared with the auth service.
//!
//! All constants are normative wire contracts: the auth service stores and
//! returns shares in exactly this field and encoding, and the recovery-share
//! envelope must decrypt with exactly these KDF parameters. None of them may
//! change without a coordinated service migration.

use alloy_primitives::U256;

/// Size of the wallet secret in bytes (128 bits).
pub const SECRET_SIZE: usize = 16;

/// The sharing field: the largest 128-bit prime, `2^128 - 159`.
///
/// Every share `y` value and every secret lives in `[0, FIELD_PRIME)`.
pub const FIELD_PRIME: U256 =
    U256::from_limbs([0xffff_ffff_ffff_ff61, 0xffff_ffff_ffff_ffff, 0, 0]);

/// Share id of the device share (`f(1)`).
pub const DEVICE_SHARE_ID: u8 = 1;

/// Share id of the auth-service share (`f(2)`).
pub const AUTH_SHARE_ID: u8 = 2;

/// Share id of the recovery share (`f(3)`).
pub const RECOVERY_SHARE_ID: u8 = 3;

/// Size of AES-GCM nonces in bytes (96 bits).
pub const GCM_NONCE_SIZE: usize = 12;

/// Size of AES-GCM authentication tags in bytes (128 bits).
pub const GCM_TAG_SIZE: usize = 16;

/// Fixed domain-separation salt for deriving the recovery-share KEK.
///
/// The encrypted-share envelope carries no salt field, so the KDF salt is a
/// protocol constant rather than per-ciphertext data.
pub const KEK_SALT: &[u8] = b"ember:recovery-share-kek:v1";

/// Argon2id memory cost for the recovery-share KEK (64 MiB).
pub const ARGON2_M_COST: u32 = 65536;

/// Argon2id iteration count for the recovery-share KEK.
pub const ARGON2_T_COST: u32 = 3;

/// Argon2id parallelism for the recovery-share KEK.
pub const ARGON2_P_COST: u32 = 4;

/// Size of an Ethereum `r || s || v` signature in bytes.
pub const SIGNATURE_SIZE: usize = 65;
