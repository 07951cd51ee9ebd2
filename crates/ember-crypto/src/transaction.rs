//! Legacy (EIP-155) and EIP-1559 transaction signing.
//!
//! The input record mirrors the JSON transaction shape the SDK accepts:
//! `nonce` is mandatory, and the fee fields select the encoding — a
//! `gas_price` produces a legacy EIP-155 payload, otherwise both
//! `max_fee_per_gas` and `max_priority_fee_per_gas` are required and a
//! type-2 envelope is produced. Output is the `0x`-prefixed raw
//! transaction ready for `eth_sendRawTransaction`.

use alloy_primitives::{keccak256, Address, Bytes, U256};
use alloy_rlp::{Encodable, Header};
use serde::{Deserialize, Serialize};

use crate::account::PrivateKeyAccount;
use crate::errors::{CryptoError, Result};

/// A transaction to sign, fields named as on the JSON wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionInput {
    /// Recipient; `None` deploys a contract.
    pub to: Option<Address>,
    /// Wei value.
    #[serde(default)]
    pub value: U256,
    /// Calldata.
    #[serde(default)]
    pub data: Bytes,
    /// Account nonce; signing fails when absent.
    pub nonce: Option<u64>,
    /// Gas limit.
    pub gas_limit: u64,
    /// Legacy gas price; presence selects EIP-155 encoding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<u128>,
    /// EIP-1559 fee cap.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_fee_per_gas: Option<u128>,
    /// EIP-1559 priority fee.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_priority_fee_per_gas: Option<u128>,
    /// Chain the signature is bound to.
    pub chain_id: u64,
}

impl PrivateKeyAccount {
    /// Sign a transaction, returning the raw `0x`-prefixed encoding.
    pub fn sign_transaction(&self, tx: &TransactionInput) -> Result<String> {
        let nonce = tx
            .nonce
            .ok_or_else(|| CryptoError::Transaction("nonce is required".into()))?;

        let raw = match tx.gas_price {
            Some(gas_price) => self.sign_legacy(tx, nonce, gas_price)?,
            None => {
                let max_fee = tx.max_fee_per_gas.ok_or_else(|| {
                    CryptoError::Transaction("maxFeePerGas is required without gasPrice".into())
                })?;
                let max_priority = tx.max_priority_fee_per_gas.ok_or_else(|| {
                    CryptoError::Transaction(
                        "maxPriorityFeePerGas is required without gasPrice".into(),
                    )
                })?;
                self.sign_eip1559(tx, nonce, max_fee, max_priority)?
            }
        };
        Ok(format!("0x{}", hex::encode(raw)))
    }

    fn sign_legacy(&self, tx: &TransactionInput, nonce: u64, gas_price: u128) -> Result<Vec<u8>> {
        // Signing payload: rlp([nonce, gasPrice, gas, to, value, data,
        // chainId, 0, 0]) per EIP-155.
        let hash = {
            let mut fields = Vec::new();
            nonce.encode(&mut fields);
            gas_price.encode(&mut fields);
            tx.gas_limit.encode(&mut fields);
            encode_to_field(tx.to, &mut fields);
            tx.value.encode(&mut fields);
            tx.data.encode(&mut fields);
            tx.chain_id.encode(&mut fields);
            0u8.encode(&mut fields);
            0u8.encode(&mut fields);
            keccak256(rlp_list(fields))
        };

        let (signature, recovery_id) = self.sign_digest_recoverable(hash)?;
        let v = tx.chain_id * 2 + 35 + u64::from(recovery_id.to_byte());

        let mut fields = Vec::new();
        nonce.encode(&mut fields);
        gas_price.encode(&mut fields);
        tx.gas_limit.encode(&mut fields);
        encode_to_field(tx.to, &mut fields);
        tx.value.encode(&mut fields);
        tx.data.encode(&mut fields);
        v.encode(&mut fields);
        encode_signature_scalar(&signature.r().to_bytes(), &mut fields);
        encode_signature_scalar(&signature.s().to_bytes(), &mut fields);
        Ok(rlp_list(fields))
    }

    fn sign_eip1559(
        &self,
        tx: &TransactionInput,
        nonce: u64,
        max_fee: u128,
        max_priority: u128,
    ) -> Result<Vec<u8>> {
        // Signing payload: 0x02 || rlp([chainId, nonce, maxPriorityFee,
        // maxFee, gas, to, value, data, accessList]).
        let base_fields = |fields: &mut Vec<u8>| {
            tx.chain_id.encode(fields);
            nonce.encode(fields);
            max_priority.encode(fields);
            max_fee.encode(fields);
            tx.gas_limit.encode(fields);
            encode_to_field(tx.to, fields);
            tx.value.encode(fields);
            tx.data.encode(fields);
            // Empty access list.
            Header {
                list: true,
                payload_length: 0,
            }
            .encode(fields);
        };

        let hash = {
            let mut fields = Vec::new();
            base_fields(&mut fields);
            let mut payload = vec![0x02];
            payload.extend_from_slice(&rlp_list(fields));
            keccak256(&payload)
        };

        let (signature, recovery_id) = self.sign_digest_recoverable(hash)?;

        let mut fields = Vec::new();
        base_fields(&mut fields);
        recovery_id.to_byte().encode(&mut fields);
        encode_signature_scalar(&signature.r().to_bytes(), &mut fields);
        encode_signature_scalar(&signature.s().to_bytes(), &mut fields);

        let mut out = vec![0x02];
        out.extend_from_slice(&rlp_list(fields));
        Ok(out)
    }
}

/// Wrap already-encoded fields in an RLP list header.
fn rlp_list(fields: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(fields.len() + 4);
    Header {
        list: true,
        payload_length: fields.len(),
    }
    .encode(&mut out);
    out.extend_from_slice(&fields);
    out
}

/// `to` encodes as the 20-byte address, or the empty string for creates.
fn encode_to_field(to: Option<Address>, out: &mut Vec<u8>) {
    match to {
        Some(address) => address.encode(out),
        None => out.push(alloy_rlp::EMPTY_STRING_CODE),
    }
}

/// r and s encode as minimal big-endian integers.
fn encode_signature_scalar(scalar: &[u8], out: &mut Vec<u8>) {
    U256::from_be_slice(scalar).encode(out);
}
