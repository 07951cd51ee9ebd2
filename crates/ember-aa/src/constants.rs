//! Protocol constants for the ERC-4337 pipeline.
//!
//! Surfaced as plain constants rather than runtime configuration: entry
//! points are canonical singletons, the magic value is fixed by ERC-1271,
//! and the gas buffers compensate for known estimation shortfalls on
//! not-yet-deployed accounts.

use alloy_primitives::{address, Address, U256};

/// Canonical EntryPoint v0.6 singleton.
pub const ENTRY_POINT_V06: Address = address!("5FF137D4b0FDCD49DcA30c7CF57E578a026d2789");

/// Canonical EntryPoint v0.7 singleton.
pub const ENTRY_POINT_V07: Address = address!("0000000071727De22E5E9d8BAf0edAc6f37da032");

/// ERC-1271 `isValidSignature` success value.
pub const ERC1271_MAGIC_VALUE: [u8; 4] = [0x16, 0x26, 0xba, 0x7e];

/// 65 bytes that parse as an ECDSA signature, used while estimating.
pub const DUMMY_SIGNATURE: [u8; 65] = dummy_signature();

const fn dummy_signature() -> [u8; 65] {
    let mut sig = [0xffu8; 65];
    sig[64] = 0x1c;
    sig
}

/// Post-estimation call-gas buffer for v0.6 operations.
///
/// Estimation against a counterfactual account undershoots calldata cost;
/// the buffer absorbs it.
pub const V06_CALL_GAS_BUFFER: u64 = 50_000;

/// Post-estimation call-gas buffer for v0.7 operations.
pub const V07_CALL_GAS_BUFFER: u64 = 21_000;

/// `2^96 - 1`: the token allowance granted to an ERC-20 paymaster, and
/// the balance injected as a state override during estimation.
pub const TOKEN_PAYMASTER_ALLOWANCE: U256 = U256::from_limbs([u64::MAX, u32::MAX as u64, 0, 0]);

/// Number of random bytes drawn for a parallel-nonce key (192 bits).
pub const NONCE_KEY_SIZE: usize = 24;

/// Receipt polling cadence.
pub const RECEIPT_POLL_INTERVAL_MS: u64 = 1_000;

/// Give up waiting for a receipt after this many polls.
pub const RECEIPT_POLL_LIMIT: u32 = 120;

/// Default gas-per-pubdata limit for ZK-Sync EIP-712 transactions.
pub const ZK_GAS_PER_PUBDATA: u64 = 50_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowance_is_2_pow_96_minus_1() {
        assert_eq!(
            TOKEN_PAYMASTER_ALLOWANCE,
            (U256::from(1u8) << 96) - U256::from(1u8)
        );
    }

    #[test]
    fn dummy_signature_has_a_plausible_v() {
        assert_eq!(DUMMY_SIGNATURE.len(), 65);
        assert_eq!(DUMMY_SIGNATURE[64], 0x1c);
    }
}
