//! JSON-RPC client for the bundler endpoint.
//!
//! The bundler fronts both the ERC-4337 methods and plain chain reads
//! (`eth_getCode`, `eth_call`, ...), so one client covers the whole
//! pipeline. Every method is a single attempt; retry policy belongs to the
//! caller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy_primitives::{Address, Bytes, B256, U256};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{Result, SmartWalletError};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Bundler gas-price quote.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasPrices {
    /// Fee cap to use.
    pub max_fee_per_gas: U256,
    /// Priority fee to use.
    pub max_priority_fee_per_gas: U256,
}

/// `eth_estimateUserOperationGas` result.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasEstimate {
    /// Execution-phase gas.
    pub call_gas_limit: U256,
    /// Verification-phase gas.
    pub verification_gas_limit: U256,
    /// Up-front gas.
    pub pre_verification_gas: U256,
    /// v0.7 paymaster validation gas, when a paymaster is attached.
    #[serde(default)]
    pub paymaster_verification_gas_limit: Option<U256>,
    /// v0.7 paymaster post-op gas, when a paymaster is attached.
    #[serde(default)]
    pub paymaster_post_op_gas_limit: Option<U256>,
}

/// `pm_sponsorUserOperation` result, covering both revisions.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymasterResult {
    /// v0.6 flat field.
    #[serde(default)]
    pub paymaster_and_data: Option<Bytes>,
    /// v0.7 paymaster address.
    #[serde(default)]
    pub paymaster: Option<Address>,
    /// v0.7 paymaster payload.
    #[serde(default)]
    pub paymaster_data: Option<Bytes>,
    /// v0.7 paymaster validation gas.
    #[serde(default)]
    pub paymaster_verification_gas_limit: Option<U256>,
    /// v0.7 paymaster post-op gas.
    #[serde(default)]
    pub paymaster_post_op_gas_limit: Option<U256>,
}

/// The slice of the operation receipt the SDK consumes.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationReceipt {
    /// The enclosing transaction receipt.
    pub receipt: TransactionReceipt,
}

/// The enclosing transaction receipt.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    /// Hash of the bundle transaction that included the operation.
    pub transaction_hash: B256,
}

/// ZK-Sync paymaster hint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZkPaymasterData {
    /// Paymaster contract.
    pub paymaster: Address,
    /// Its encoded input.
    pub paymaster_input: Bytes,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// JSON-RPC client over a single bundler URL.
pub struct BundlerClient {
    client: Client,
    url: String,
    next_id: AtomicU64,
}

impl BundlerClient {
    /// Build a client for the given bundler URL.
    pub fn new(url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|_| SmartWalletError::BundlerUnreachable)?;
        Ok(Self {
            client,
            url: url.to_string(),
            next_id: AtomicU64::new(1),
        })
    }

    /// One round trip; a `null` result maps to `None`.
    async fn call_nullable<P: Serialize, R: DeserializeOwned>(
        &self,
        method: &str,
        params: P,
    ) -> Result<Option<R>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        tracing::debug!(method, id, "bundler rpc");
        let response: RpcResponse = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await?
            .json()
            .await
            .map_err(|e| SmartWalletError::BundlerError(format!("{method}: {e}")))?;

        if let Some(error) = response.error {
            return Err(SmartWalletError::BundlerError(format!(
                "{method} failed ({}): {}",
                error.code, error.message
            )));
        }
        match response.result {
            Value::Null => Ok(None),
            result => serde_json::from_value(result)
                .map(Some)
                .map_err(|e| SmartWalletError::BundlerError(format!("{method}: {e}"))),
        }
    }

    async fn call<P: Serialize, R: DeserializeOwned>(&self, method: &str, params: P) -> Result<R> {
        self.call_nullable(method, params)
            .await?
            .ok_or_else(|| SmartWalletError::BundlerError(format!("{method}: empty result")))
    }

    /// `eth_getCode` at the latest block.
    pub async fn get_code(&self, address: Address) -> Result<Bytes> {
        self.call("eth_getCode", json!([address, "latest"])).await
    }

    /// `eth_call` against a contract, returning the raw return data.
    pub async fn eth_call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        self.call("eth_call", json!([{ "to": to, "data": data }, "latest"]))
            .await
    }

    /// `eth_getTransactionCount` at the latest block.
    pub async fn get_transaction_count(&self, address: Address) -> Result<U256> {
        self.call("eth_getTransactionCount", json!([address, "latest"]))
            .await
    }

    /// `eth_estimateGas` for a plain call.
    pub async fn estimate_gas(&self, from: Address, to: Address, value: U256, data: &Bytes) -> Result<U256> {
        self.call(
            "eth_estimateGas",
            json!([{ "from": from, "to": to, "value": value, "data": data }]),
        )
        .await
    }

    /// The bundler's recommended operation gas prices.
    pub async fn get_user_operation_gas_price(&self) -> Result<GasPrices> {
        self.call("thirdweb_getUserOperationGasPrice", json!([]))
            .await
    }

    /// `eth_estimateUserOperationGas`, with an optional state-override
    /// map as the third parameter.
    pub async fn estimate_user_operation_gas(
        &self,
        op: &Value,
        entry_point: Address,
        state_overrides: Option<Value>,
    ) -> Result<GasEstimate> {
        let params = match state_overrides {
            Some(overrides) => json!([op, entry_point, overrides]),
            None => json!([op, entry_point]),
        };
        self.call("eth_estimateUserOperationGas", params).await
    }

    /// Ask the paymaster service to sponsor an operation.
    pub async fn sponsor_user_operation(
        &self,
        op: &Value,
        entry_point: Address,
    ) -> Result<PaymasterResult> {
        self.call("pm_sponsorUserOperation", json!([op, entry_point]))
            .await
    }

    /// Submit an operation; returns the userOpHash.
    pub async fn send_user_operation(&self, op: &Value, entry_point: Address) -> Result<B256> {
        self.call("eth_sendUserOperation", json!([op, entry_point]))
            .await
    }

    /// Fetch the operation receipt, `None` while still pending.
    pub async fn get_user_operation_receipt(
        &self,
        user_op_hash: B256,
    ) -> Result<Option<UserOperationReceipt>> {
        self.call_nullable("eth_getUserOperationReceipt", json!([user_op_hash]))
            .await
    }

    /// ZK-Sync: fetch `(paymaster, paymasterInput)` for a gasless
    /// transaction.
    pub async fn zk_paymaster_data(&self, tx: &Value) -> Result<ZkPaymasterData> {
        self.call("zk_paymasterData", json!([tx])).await
    }

    /// ZK-Sync: broadcast a signed EIP-712 transaction.
    pub async fn zk_broadcast_transaction(&self, signed_tx: &str) -> Result<B256> {
        let result: Value = self
            .call("zk_broadcastTransaction", json!([signed_tx]))
            .await?;
        // The service replies with either the bare hash or an object
        // carrying it.
        let hash = result
            .as_str()
            .map(str::to_owned)
            .or_else(|| {
                result
                    .get("transactionHash")
                    .and_then(Value::as_str)
                    .map(str::to_owned)
            })
            .ok_or_else(|| {
                SmartWalletError::BundlerError("zk_broadcastTransaction: no hash in reply".into())
            })?;
        hash.parse()
            .map_err(|_| SmartWalletError::BundlerError(format!("bad transaction hash {hash}")))
    }
}

impl std::fmt::Debug for BundlerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundlerClient")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gas_estimate_parses_bundler_reply() {
        let estimate: GasEstimate = serde_json::from_value(json!({
            "callGasLimit": "0x5208",
            "verificationGasLimit": "0x186a0",
            "preVerificationGas": "0xb7d4",
        }))
        .unwrap();
        assert_eq!(estimate.call_gas_limit, U256::from(0x5208u64));
        assert!(estimate.paymaster_verification_gas_limit.is_none());
    }

    #[test]
    fn paymaster_result_parses_both_revisions() {
        let v6: PaymasterResult = serde_json::from_value(json!({
            "paymasterAndData": "0xdeadbeef",
        }))
        .unwrap();
        assert!(v6.paymaster_and_data.is_some());
        assert!(v6.paymaster.is_none());

        let v7: PaymasterResult = serde_json::from_value(json!({
            "paymaster": "0x3333333333333333333333333333333333333333",
            "paymasterData": "0x01",
            "paymasterVerificationGasLimit": "0x1",
            "paymasterPostOpGasLimit": "0x2",
        }))
        .unwrap();
        assert!(v7.paymaster.is_some());
        assert_eq!(v7.paymaster_post_op_gas_limit, Some(U256::from(2u8)));
    }

    #[test]
    fn receipt_reply_extracts_transaction_hash() {
        let receipt: UserOperationReceipt = serde_json::from_value(json!({
            "userOpHash": "0x1111111111111111111111111111111111111111111111111111111111111111",
            "receipt": {
                "transactionHash": "0x2222222222222222222222222222222222222222222222222222222222222222",
                "blockNumber": "0x10"
            }
        }))
        .unwrap();
        assert_eq!(
            receipt.receipt.transaction_hash.to_string(),
            "0x2222222222222222222222222222222222222222222222222222222222222222"
        );
    }
}
