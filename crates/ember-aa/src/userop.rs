//! UserOperation records for EntryPoint v0.6 and v0.7.
//!
//! The two revisions are distinct record shapes, held behind the
//! [`UserOp`] tagged variant so the builder selects pack/hash/encode logic
//! exactly once per call. The wire form (hexified JSON for the bundler)
//! and the hashed form (the packed ABI struct) differ for v0.7; hashing
//! always operates on the packed form.

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

use crate::abi::{entry_point_v06, entry_point_v07};
use crate::constants::{ENTRY_POINT_V06, ENTRY_POINT_V07};
use crate::error::{Result, SmartWalletError};

fn bytes_is_empty(bytes: &Bytes) -> bool {
    bytes.is_empty()
}

/// Which EntryPoint revision an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPointVersion {
    /// EntryPoint v0.6: flat `initCode` and `paymasterAndData`.
    V06,
    /// EntryPoint v0.7: split factory and paymaster fields, packed gas.
    V07,
}

impl EntryPointVersion {
    /// Resolve the revision from an entry-point address by equality
    /// against the canonical singletons.
    pub fn from_entry_point(address: Address) -> Result<Self> {
        if address == ENTRY_POINT_V06 {
            Ok(Self::V06)
        } else if address == ENTRY_POINT_V07 {
            Ok(Self::V07)
        } else {
            Err(SmartWalletError::UnknownEntryPoint(address.to_string()))
        }
    }
}

/// A v0.6 operation in wire form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationV6 {
    /// The smart account.
    pub sender: Address,
    /// EntryPoint-assigned nonce (192-bit key, 64-bit sequence).
    pub nonce: U256,
    /// `factory || factoryData`, empty once deployed.
    pub init_code: Bytes,
    /// The account call to execute.
    pub call_data: Bytes,
    /// Gas for the execution phase.
    pub call_gas_limit: U256,
    /// Gas for the verification phase.
    pub verification_gas_limit: U256,
    /// Gas paid up front for calldata and bundler overhead.
    pub pre_verification_gas: U256,
    /// Fee cap.
    pub max_fee_per_gas: U256,
    /// Priority fee.
    pub max_priority_fee_per_gas: U256,
    /// Paymaster address and payload, empty when self-funded.
    pub paymaster_and_data: Bytes,
    /// Account signature over the operation hash.
    pub signature: Bytes,
}

/// A v0.7 operation in wire form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationV7 {
    /// The smart account.
    pub sender: Address,
    /// EntryPoint-assigned nonce.
    pub nonce: U256,
    /// Deployment factory, absent once deployed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory: Option<Address>,
    /// Factory calldata, empty once deployed.
    #[serde(default, skip_serializing_if = "bytes_is_empty")]
    pub factory_data: Bytes,
    /// The account call to execute.
    pub call_data: Bytes,
    /// Gas for the execution phase.
    pub call_gas_limit: U256,
    /// Gas for the verification phase.
    pub verification_gas_limit: U256,
    /// Gas paid up front for calldata and bundler overhead.
    pub pre_verification_gas: U256,
    /// Fee cap.
    pub max_fee_per_gas: U256,
    /// Priority fee.
    pub max_priority_fee_per_gas: U256,
    /// Sponsoring paymaster, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster: Option<Address>,
    /// Gas for the paymaster's validation.
    #[serde(default, skip_serializing_if = "U256::is_zero")]
    pub paymaster_verification_gas_limit: U256,
    /// Gas for the paymaster's post-op.
    #[serde(default, skip_serializing_if = "U256::is_zero")]
    pub paymaster_post_op_gas_limit: U256,
    /// Paymaster payload.
    #[serde(default, skip_serializing_if = "bytes_is_empty")]
    pub paymaster_data: Bytes,
    /// Account signature over the operation hash.
    pub signature: Bytes,
}

/// A version-tagged operation.
#[derive(Debug, Clone)]
pub enum UserOp {
    /// EntryPoint v0.6 shape.
    V6(UserOperationV6),
    /// EntryPoint v0.7 shape.
    V7(UserOperationV7),
}

impl UserOp {
    /// The operation's version tag.
    pub fn version(&self) -> EntryPointVersion {
        match self {
            Self::V6(_) => EntryPointVersion::V06,
            Self::V7(_) => EntryPointVersion::V07,
        }
    }

    /// Replace the signature field.
    pub fn set_signature(&mut self, signature: Bytes) {
        match self {
            Self::V6(op) => op.signature = signature,
            Self::V7(op) => op.signature = signature,
        }
    }

    /// Whether the operation carries deployment init code.
    pub fn deploys(&self) -> bool {
        match self {
            Self::V6(op) => !op.init_code.is_empty(),
            Self::V7(op) => op.factory.is_some(),
        }
    }

    /// The hexified JSON the bundler expects.
    pub fn to_wire(&self) -> serde_json::Value {
        match self {
            Self::V6(op) => serde_json::to_value(op).expect("userop serializes"),
            Self::V7(op) => serde_json::to_value(op).expect("userop serializes"),
        }
    }
}

impl UserOperationV6 {
    /// The ABI struct hashed by `EntryPoint.getUserOpHash`.
    pub fn to_abi(&self) -> entry_point_v06::UserOperation {
        entry_point_v06::UserOperation {
            sender: self.sender,
            nonce: self.nonce,
            initCode: self.init_code.clone(),
            callData: self.call_data.clone(),
            callGasLimit: self.call_gas_limit,
            verificationGasLimit: self.verification_gas_limit,
            preVerificationGas: self.pre_verification_gas,
            maxFeePerGas: self.max_fee_per_gas,
            maxPriorityFeePerGas: self.max_priority_fee_per_gas,
            paymasterAndData: self.paymaster_and_data.clone(),
            signature: self.signature.clone(),
        }
    }
}

impl UserOperationV7 {
    /// Pack into the v0.7 on-chain layout.
    ///
    /// `accountGasLimits` is `pad16(verificationGasLimit) ||
    /// pad16(callGasLimit)` and `gasFees` is
    /// `pad16(maxPriorityFeePerGas) || pad16(maxFeePerGas)`;
    /// `paymasterAndData` is `paymaster || pad16(pmVerificationGas) ||
    /// pad16(pmPostOpGas) || paymasterData` or empty.
    pub fn pack(&self) -> entry_point_v07::PackedUserOperation {
        entry_point_v07::PackedUserOperation {
            sender: self.sender,
            nonce: self.nonce,
            initCode: self.init_code(),
            callData: self.call_data.clone(),
            accountGasLimits: pack_pair(self.verification_gas_limit, self.call_gas_limit),
            preVerificationGas: self.pre_verification_gas,
            gasFees: pack_pair(self.max_priority_fee_per_gas, self.max_fee_per_gas),
            paymasterAndData: self.paymaster_and_data(),
            signature: self.signature.clone(),
        }
    }

    /// `factory || factoryData`, or empty once deployed.
    pub fn init_code(&self) -> Bytes {
        match self.factory {
            Some(factory) => {
                let mut out = Vec::with_capacity(20 + self.factory_data.len());
                out.extend_from_slice(factory.as_slice());
                out.extend_from_slice(&self.factory_data);
                Bytes::from(out)
            }
            None => Bytes::new(),
        }
    }

    /// The flat paymaster field of the packed layout.
    pub fn paymaster_and_data(&self) -> Bytes {
        match self.paymaster {
            Some(paymaster) => {
                let mut out = Vec::with_capacity(20 + 32 + self.paymaster_data.len());
                out.extend_from_slice(paymaster.as_slice());
                out.extend_from_slice(&self.paymaster_verification_gas_limit.to_be_bytes::<32>()[16..]);
                out.extend_from_slice(&self.paymaster_post_op_gas_limit.to_be_bytes::<32>()[16..]);
                out.extend_from_slice(&self.paymaster_data);
                Bytes::from(out)
            }
            None => Bytes::new(),
        }
    }
}

/// Two 128-bit quantities packed big-endian into one word.
fn pack_pair(high: U256, low: U256) -> B256 {
    let mut word = [0u8; 32];
    word[..16].copy_from_slice(&high.to_be_bytes::<32>()[16..]);
    word[16..].copy_from_slice(&low.to_be_bytes::<32>()[16..]);
    B256::from(word)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;
    use alloy_sol_types::SolValue;

    fn sample_v7() -> UserOperationV7 {
        UserOperationV7 {
            sender: address!("1111111111111111111111111111111111111111"),
            nonce: U256::from(7u8),
            factory: Some(address!("2222222222222222222222222222222222222222")),
            factory_data: Bytes::from(vec![0xab, 0xcd]),
            call_data: Bytes::from(vec![0x01]),
            call_gas_limit: U256::from(0x5678u64),
            verification_gas_limit: U256::from(0x1234u64),
            pre_verification_gas: U256::from(90_000u64),
            max_fee_per_gas: U256::from(40u64),
            max_priority_fee_per_gas: U256::from(2u64),
            paymaster: None,
            paymaster_verification_gas_limit: U256::ZERO,
            paymaster_post_op_gas_limit: U256::ZERO,
            paymaster_data: Bytes::new(),
            signature: Bytes::new(),
        }
    }

    #[test]
    fn account_gas_limits_pack_verification_then_call() {
        let packed = sample_v7().pack();
        let word = packed.accountGasLimits;
        assert_eq!(&word[..16], &{
            let mut half = [0u8; 16];
            half[14..].copy_from_slice(&[0x12, 0x34]);
            half
        });
        assert_eq!(&word[16..], &{
            let mut half = [0u8; 16];
            half[14..].copy_from_slice(&[0x56, 0x78]);
            half
        });
    }

    #[test]
    fn gas_fees_pack_priority_then_max() {
        let packed = sample_v7().pack();
        let word = packed.gasFees;
        assert_eq!(word[15], 2);
        assert_eq!(word[31], 40);
    }

    #[test]
    fn init_code_concatenates_factory_and_data() {
        let op = sample_v7();
        let init_code = op.init_code();
        assert_eq!(&init_code[..20], op.factory.unwrap().as_slice());
        assert_eq!(&init_code[20..], &[0xab, 0xcd]);

        let deployed = UserOperationV7 {
            factory: None,
            factory_data: Bytes::new(),
            ..op
        };
        assert!(deployed.init_code().is_empty());
    }

    #[test]
    fn paymaster_and_data_layout() {
        let mut op = sample_v7();
        op.paymaster = Some(address!("3333333333333333333333333333333333333333"));
        op.paymaster_verification_gas_limit = U256::from(0xaau64);
        op.paymaster_post_op_gas_limit = U256::from(0xbbu64);
        op.paymaster_data = Bytes::from(vec![0xee]);

        let flat = op.paymaster_and_data();
        assert_eq!(flat.len(), 20 + 16 + 16 + 1);
        assert_eq!(&flat[..20], op.paymaster.unwrap().as_slice());
        assert_eq!(flat[35], 0xaa);
        assert_eq!(flat[51], 0xbb);
        assert_eq!(flat[52], 0xee);
    }

    #[test]
    fn packing_survives_wire_round_trip() {
        let op = sample_v7();
        let json = serde_json::to_string(&op).unwrap();
        let reparsed: UserOperationV7 = serde_json::from_str(&json).unwrap();
        assert_eq!(op.pack().abi_encode(), reparsed.pack().abi_encode());
    }

    #[test]
    fn version_resolution_is_string_equality() {
        assert_eq!(
            EntryPointVersion::from_entry_point(ENTRY_POINT_V06).unwrap(),
            EntryPointVersion::V06
        );
        assert_eq!(
            EntryPointVersion::from_entry_point(ENTRY_POINT_V07).unwrap(),
            EntryPointVersion::V07
        );
        assert!(matches!(
            EntryPointVersion::from_entry_point(Address::ZERO),
            Err(SmartWalletError::UnknownEntryPoint(_))
        ));
    }

    #[test]
    fn wire_form_omits_absent_optional_fields() {
        let mut op = sample_v7();
        op.factory = None;
        op.factory_data = Bytes::new();
        let wire = serde_json::to_value(&op).unwrap();
        assert!(wire.get("factory").is_none());
        assert!(wire.get("paymaster").is_none());
        assert!(wire.get("sender").is_some());
    }
}
