//! ZK-Sync native account abstraction: EIP-712 (type `0x71`)
//! transactions.
//!
//! On ZK-Sync chains there is no EntryPoint and no UserOperation. The
//! wallet builds a native typed transaction, optionally attaches a
//! paymaster hint fetched from the paymaster service, signs the EIP-712
//! digest under the `("zkSync", "2", chainId)` domain, and broadcasts the
//! RLP envelope through the bundler.

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_rlp::{Encodable, Header};
use serde_json::json;

use crate::constants::ZK_GAS_PER_PUBDATA;

/// EIP-712 transaction type marker.
pub const ZK_EIP712_TX_TYPE: u8 = 0x71;

/// A ZK-Sync EIP-712 transaction under construction.
#[derive(Debug, Clone)]
pub struct ZkSyncTransaction {
    /// Sender EOA.
    pub from: Address,
    /// Call target.
    pub to: Address,
    /// Wei value.
    pub value: U256,
    /// Calldata.
    pub data: Bytes,
    /// Account nonce.
    pub nonce: U256,
    /// Gas limit.
    pub gas_limit: U256,
    /// Fee cap.
    pub max_fee_per_gas: U256,
    /// Priority fee.
    pub max_priority_fee_per_gas: U256,
    /// Gas per byte of pubdata.
    pub gas_per_pubdata: U256,
    /// Sponsoring paymaster, when gasless.
    pub paymaster: Option<Address>,
    /// Paymaster input blob.
    pub paymaster_input: Bytes,
    /// Hashes of factory dependencies; empty for plain calls.
    pub factory_deps: Vec<B256>,
}

impl ZkSyncTransaction {
    /// A plain call with the default pubdata limit and no paymaster.
    pub fn call(from: Address, to: Address, value: U256, data: Bytes) -> Self {
        Self {
            from,
            to,
            value,
            data,
            nonce: U256::ZERO,
            gas_limit: U256::ZERO,
            max_fee_per_gas: U256::ZERO,
            max_priority_fee_per_gas: U256::ZERO,
            gas_per_pubdata: U256::from(ZK_GAS_PER_PUBDATA),
            paymaster: None,
            paymaster_input: Bytes::new(),
            factory_deps: Vec::new(),
        }
    }

    /// The JSON shape `zk_paymasterData` consumes.
    pub fn to_rpc_value(&self) -> serde_json::Value {
        json!({
            "from": self.from,
            "to": self.to,
            "value": self.value,
            "data": self.data,
            "nonce": self.nonce,
            "gasLimit": self.gas_limit,
            "maxFeePerGas": self.max_fee_per_gas,
            "maxPriorityFeePerGas": self.max_priority_fee_per_gas,
            "gasPerPubdataByteLimit": self.gas_per_pubdata,
        })
    }

    /// The `eth_signTypedData_v4` payload under the
    /// `("zkSync", "2", chainId)` domain.
    ///
    /// Addresses participate as `uint256` per the ZK-Sync transaction
    /// type; an absent paymaster encodes as zero.
    pub fn typed_data_payload(&self, chain_id: u64) -> String {
        json!({
            "types": {
                "EIP712Domain": [
                    {"name": "name", "type": "string"},
                    {"name": "version", "type": "string"},
                    {"name": "chainId", "type": "uint256"}
                ],
                "Transaction": [
                    {"name": "txType", "type": "uint256"},
                    {"name": "from", "type": "uint256"},
                    {"name": "to", "type": "uint256"},
                    {"name": "gasLimit", "type": "uint256"},
                    {"name": "gasPerPubdataByteLimit", "type": "uint256"},
                    {"name": "maxFeePerGas", "type": "uint256"},
                    {"name": "maxPriorityFeePerGas", "type": "uint256"},
                    {"name": "paymaster", "type": "uint256"},
                    {"name": "nonce", "type": "uint256"},
                    {"name": "value", "type": "uint256"},
                    {"name": "data", "type": "bytes"},
                    {"name": "factoryDeps", "type": "bytes32[]"},
                    {"name": "paymasterInput", "type": "bytes"}
                ]
            },
            "primaryType": "Transaction",
            "domain": {
                "name": "zkSync",
                "version": "2",
                "chainId": chain_id,
            },
            "message": {
                "txType": ZK_EIP712_TX_TYPE,
                "from": address_as_uint(self.from),
                "to": address_as_uint(self.to),
                "gasLimit": self.gas_limit.to_string(),
                "gasPerPubdataByteLimit": self.gas_per_pubdata.to_string(),
                "maxFeePerGas": self.max_fee_per_gas.to_string(),
                "maxPriorityFeePerGas": self.max_priority_fee_per_gas.to_string(),
                "paymaster": address_as_uint(self.paymaster.unwrap_or(Address::ZERO)),
                "nonce": self.nonce.to_string(),
                "value": self.value.to_string(),
                "data": self.data,
                "factoryDeps": self.factory_deps,
                "paymasterInput": self.paymaster_input,
            }
        })
        .to_string()
    }

    /// Serialize the signed transaction as the `0x71` RLP envelope,
    /// `0x`-hex for `zk_broadcastTransaction`.
    pub fn serialize_signed(&self, signature: &[u8], chain_id: u64) -> String {
        let mut fields = Vec::new();
        self.nonce.encode(&mut fields);
        self.max_priority_fee_per_gas.encode(&mut fields);
        self.max_fee_per_gas.encode(&mut fields);
        self.gas_limit.encode(&mut fields);
        self.to.encode(&mut fields);
        self.value.encode(&mut fields);
        self.data.encode(&mut fields);
        chain_id.encode(&mut fields);
        // Legacy r/s placeholders, unused by the EIP-712 flavor.
        fields.push(alloy_rlp::EMPTY_STRING_CODE);
        fields.push(alloy_rlp::EMPTY_STRING_CODE);
        chain_id.encode(&mut fields);
        self.from.encode(&mut fields);
        self.gas_per_pubdata.encode(&mut fields);
        encode_b256_list(&self.factory_deps, &mut fields);
        Bytes::copy_from_slice(signature).encode(&mut fields);
        self.encode_paymaster_params(&mut fields);

        let mut out = vec![ZK_EIP712_TX_TYPE];
        Header {
            list: true,
            payload_length: fields.len(),
        }
        .encode(&mut out);
        out.extend_from_slice(&fields);
        format!("0x{}", hex::encode(out))
    }

    fn encode_paymaster_params(&self, out: &mut Vec<u8>) {
        match self.paymaster {
            Some(paymaster) => {
                let mut inner = Vec::new();
                paymaster.encode(&mut inner);
                self.paymaster_input.encode(&mut inner);
                Header {
                    list: true,
                    payload_length: inner.len(),
                }
                .encode(out);
                out.extend_from_slice(&inner);
            }
            None => Header {
                list: true,
                payload_length: 0,
            }
            .encode(out),
        }
    }
}

fn encode_b256_list(items: &[B256], out: &mut Vec<u8>) {
    let mut inner = Vec::new();
    for item in items {
        item.encode(&mut inner);
    }
    Header {
        list: true,
        payload_length: inner.len(),
    }
    .encode(out);
    out.extend_from_slice(&inner);
}

/// The decimal `uint256` spelling of an address.
fn address_as_uint(address: Address) -> String {
    U256::from_be_slice(address.as_slice()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;
    use ember_crypto::TypedData;

    fn sample() -> ZkSyncTransaction {
        let mut tx = ZkSyncTransaction::call(
            address!("00000000000000000000000000000000000000aa"),
            address!("00000000000000000000000000000000000000bb"),
            U256::from(5u8),
            Bytes::from(vec![0x01, 0x02]),
        );
        tx.nonce = U256::from(3u8);
        tx.gas_limit = U256::from(500_000u64);
        tx.max_fee_per_gas = U256::from(250_000_000u64);
        tx.max_priority_fee_per_gas = U256::ZERO;
        tx
    }

    #[test]
    fn typed_data_payload_hashes() {
        let tx = sample();
        let typed = TypedData::from_json(&tx.typed_data_payload(324)).unwrap();
        let hash = typed.signing_hash().unwrap();
        assert_ne!(hash, B256::ZERO);
    }

    #[test]
    fn paymaster_changes_the_digest() {
        let mut with = sample();
        with.paymaster = Some(address!("00000000000000000000000000000000000000cc"));
        with.paymaster_input = Bytes::from(vec![0x8c, 0x5a, 0x34, 0x45]);

        let without_hash = TypedData::from_json(&sample().typed_data_payload(324))
            .unwrap()
            .signing_hash()
            .unwrap();
        let with_hash = TypedData::from_json(&with.typed_data_payload(324))
            .unwrap()
            .signing_hash()
            .unwrap();
        assert_ne!(without_hash, with_hash);
    }

    #[test]
    fn envelope_is_type_0x71() {
        let raw = sample().serialize_signed(&[0u8; 65], 324);
        assert!(raw.starts_with("0x71"));
    }

    #[test]
    fn envelope_with_paymaster_is_longer() {
        let plain = sample().serialize_signed(&[0u8; 65], 324);
        let mut sponsored = sample();
        sponsored.paymaster = Some(address!("00000000000000000000000000000000000000cc"));
        sponsored.paymaster_input = Bytes::from(vec![0u8; 68]);
        let raw = sponsored.serialize_signed(&[0u8; 65], 324);
        assert!(raw.len() > plain.len());
    }
}
