//! The UserOperation build-and-submit pipeline.
//!
//! One call runs the whole spec'd sequence, in order: init-code
//! resolution, randomized-nonce fetch, gas-price query, the two-phase
//! paymaster-and-estimation dance under a dummy signature, hashing through
//! the EntryPoint, signing by the personal account, submission, and
//! receipt polling.

use std::time::Duration;

use alloy_primitives::aliases::U192;
use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::{SolCall, SolValue};
use rand::RngCore;
use serde_json::{json, Value};

use crate::abi::{account_factory, entry_point_v06, entry_point_v07, erc20};
use crate::bundler::GasPrices;
use crate::constants::{
    DUMMY_SIGNATURE, NONCE_KEY_SIZE, RECEIPT_POLL_INTERVAL_MS, RECEIPT_POLL_LIMIT,
    TOKEN_PAYMASTER_ALLOWANCE, V06_CALL_GAS_BUFFER, V07_CALL_GAS_BUFFER,
};
use crate::error::{Result, SmartWalletError};
use crate::smart_wallet::{DeployGuard, SmartWallet};
use crate::userop::{EntryPointVersion, UserOp, UserOperationV6, UserOperationV7};

use std::sync::atomic::Ordering;

impl SmartWallet {
    /// Build, sign, submit, and await one operation whose `callData` is
    /// already encoded for the account.
    pub(crate) async fn send_account_calldata(&self, call_data: Bytes) -> Result<B256> {
        // The guard, when present, pins the deploy lock until this
        // operation is mined or fails, so concurrent sends wait instead
        // of emitting a second initCode.
        let (mut op, _deploy_guard) = self.build_user_op(call_data).await?;

        let hash = self.hash_user_op(&op).await?;
        let signature = self.sign_user_op_hash(hash).await?;
        op.set_signature(signature);

        self.submit_and_wait(&op).await
    }

    /// Run the pre-signature pipeline: steps 1 through 4 of the flow.
    async fn build_user_op(&self, call_data: Bytes) -> Result<(UserOp, Option<DeployGuard<'_>>)> {
        let (factory, factory_data, guard) = self.resolve_factory().await?;
        let nonce = self.fetch_randomized_nonce().await?;
        let fees = self.bundler.get_user_operation_gas_price().await?;
        let sponsored = self.config.gasless || self.config.token_paymaster.is_some();

        let op = match self.version {
            EntryPointVersion::V06 => UserOp::V6(
                self.finalize_v06(factory, factory_data, call_data, nonce, fees, sponsored)
                    .await?,
            ),
            EntryPointVersion::V07 => UserOp::V7(
                self.finalize_v07(factory, factory_data, call_data, nonce, fees, sponsored)
                    .await?,
            ),
        };
        Ok((op, guard))
    }

    /// Step 1: factory resolution under the deploy lock.
    async fn resolve_factory(
        &self,
    ) -> Result<(Option<Address>, Bytes, Option<DeployGuard<'_>>)> {
        if self.deploy_lock.is_deploying() {
            // Another operation is deploying; once it finishes the account
            // has code and this operation proceeds without init code.
            self.deploy_lock.wait_until_idle().await;
            return Ok((None, Bytes::new(), None));
        }

        if self.is_deployed().await? {
            return Ok((None, Bytes::new(), None));
        }

        if !self.deploy_lock.try_acquire() {
            self.deploy_lock.wait_until_idle().await;
            return Ok((None, Bytes::new(), None));
        }

        let call = account_factory::createAccountCall {
            admin: self.personal.address(),
            data: Bytes::new(),
        };
        tracing::info!(account = %self.account, "this operation deploys the smart account");
        Ok((
            Some(self.config.factory),
            Bytes::from(call.abi_encode()),
            Some(self.deploy_lock.guard()),
        ))
    }

    /// Step 2: a random 192-bit key gives parallel nonces without
    /// coordination; the EntryPoint resolves collisions.
    async fn fetch_randomized_nonce(&self) -> Result<U256> {
        let mut key_bytes = [0u8; NONCE_KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut key_bytes);
        let key = U192::from_be_slice(&key_bytes);

        let data = match self.version {
            EntryPointVersion::V06 => entry_point_v06::getNonceCall {
                sender: self.account,
                key,
            }
            .abi_encode(),
            EntryPointVersion::V07 => entry_point_v07::getNonceCall {
                sender: self.account,
                key,
            }
            .abi_encode(),
        };
        let ret = self
            .bundler
            .eth_call(self.config.entry_point, data.into())
            .await?;

        match self.version {
            EntryPointVersion::V06 => entry_point_v06::getNonceCall::abi_decode_returns(&ret, true)
                .map(|r| r.nonce)
                .map_err(|e| SmartWalletError::Abi(e.to_string())),
            EntryPointVersion::V07 => entry_point_v07::getNonceCall::abi_decode_returns(&ret, true)
                .map(|r| r.nonce)
                .map_err(|e| SmartWalletError::Abi(e.to_string())),
        }
    }

    /// Steps 3-4 for v0.6: dummy signature, paymaster, estimate,
    /// paymaster again.
    async fn finalize_v06(
        &self,
        factory: Option<Address>,
        factory_data: Bytes,
        call_data: Bytes,
        nonce: U256,
        fees: GasPrices,
        sponsored: bool,
    ) -> Result<UserOperationV6> {
        let init_code = match factory {
            Some(factory) => {
                let mut out = Vec::with_capacity(20 + factory_data.len());
                out.extend_from_slice(factory.as_slice());
                out.extend_from_slice(&factory_data);
                Bytes::from(out)
            }
            None => Bytes::new(),
        };

        let mut op = UserOperationV6 {
            sender: self.account,
            nonce,
            init_code,
            call_data,
            call_gas_limit: U256::ZERO,
            verification_gas_limit: U256::ZERO,
            pre_verification_gas: U256::ZERO,
            max_fee_per_gas: fees.max_fee_per_gas,
            max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
            paymaster_and_data: Bytes::new(),
            signature: Bytes::from(DUMMY_SIGNATURE.to_vec()),
        };

        if sponsored {
            let pm = self
                .bundler
                .sponsor_user_operation(&serde_json::to_value(&op).expect("serializes"), self.config.entry_point)
                .await?;
            op.paymaster_and_data = pm.paymaster_and_data.unwrap_or_default();
        }

        let estimate = self
            .bundler
            .estimate_user_operation_gas(
                &serde_json::to_value(&op).expect("serializes"),
                self.config.entry_point,
                None,
            )
            .await?;
        op.call_gas_limit = estimate.call_gas_limit + U256::from(V06_CALL_GAS_BUFFER);
        op.verification_gas_limit = estimate.verification_gas_limit;
        op.pre_verification_gas = estimate.pre_verification_gas;

        if sponsored {
            let pm = self
                .bundler
                .sponsor_user_operation(&serde_json::to_value(&op).expect("serializes"), self.config.entry_point)
                .await?;
            op.paymaster_and_data = pm.paymaster_and_data.unwrap_or_default();
        }

        Ok(op)
    }

    /// Steps 3-4 for v0.7, with the token-balance state override active
    /// during estimation when an ERC-20 paymaster is configured.
    async fn finalize_v07(
        &self,
        factory: Option<Address>,
        factory_data: Bytes,
        call_data: Bytes,
        nonce: U256,
        fees: GasPrices,
        sponsored: bool,
    ) -> Result<UserOperationV7> {
        let mut op = UserOperationV7 {
            sender: self.account,
            nonce,
            factory,
            factory_data,
            call_data,
            call_gas_limit: U256::ZERO,
            verification_gas_limit: U256::ZERO,
            pre_verification_gas: U256::ZERO,
            max_fee_per_gas: fees.max_fee_per_gas,
            max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
            paymaster: None,
            paymaster_verification_gas_limit: U256::ZERO,
            paymaster_post_op_gas_limit: U256::ZERO,
            paymaster_data: Bytes::new(),
            signature: Bytes::from(DUMMY_SIGNATURE.to_vec()),
        };

        if sponsored {
            let pm = self
                .bundler
                .sponsor_user_operation(&serde_json::to_value(&op).expect("serializes"), self.config.entry_point)
                .await?;
            op.paymaster = pm.paymaster;
            op.paymaster_data = pm.paymaster_data.unwrap_or_default();
            op.paymaster_verification_gas_limit =
                pm.paymaster_verification_gas_limit.unwrap_or_default();
            op.paymaster_post_op_gas_limit = pm.paymaster_post_op_gas_limit.unwrap_or_default();
        }

        let estimate = self
            .bundler
            .estimate_user_operation_gas(
                &serde_json::to_value(&op).expect("serializes"),
                self.config.entry_point,
                self.token_balance_override(),
            )
            .await?;
        op.call_gas_limit = estimate.call_gas_limit + U256::from(V07_CALL_GAS_BUFFER);
        op.verification_gas_limit = estimate.verification_gas_limit;
        op.pre_verification_gas = estimate.pre_verification_gas;
        if let Some(gas) = estimate.paymaster_verification_gas_limit {
            op.paymaster_verification_gas_limit = gas;
        }
        if let Some(gas) = estimate.paymaster_post_op_gas_limit {
            op.paymaster_post_op_gas_limit = gas;
        }

        if sponsored {
            let pm = self
                .bundler
                .sponsor_user_operation(&serde_json::to_value(&op).expect("serializes"), self.config.entry_point)
                .await?;
            op.paymaster = pm.paymaster;
            op.paymaster_data = pm.paymaster_data.unwrap_or_default();
            if let Some(gas) = pm.paymaster_verification_gas_limit {
                op.paymaster_verification_gas_limit = gas;
            }
            if let Some(gas) = pm.paymaster_post_op_gas_limit {
                op.paymaster_post_op_gas_limit = gas;
            }
        }

        Ok(op)
    }

    /// Step 5: the EntryPoint computes the operation hash; v0.7 hashes
    /// the packed form.
    async fn hash_user_op(&self, op: &UserOp) -> Result<B256> {
        let data = match op {
            UserOp::V6(op) => entry_point_v06::getUserOpHashCall {
                userOp: op.to_abi(),
            }
            .abi_encode(),
            UserOp::V7(op) => entry_point_v07::getUserOpHashCall { userOp: op.pack() }.abi_encode(),
        };
        let ret = self
            .bundler
            .eth_call(self.config.entry_point, data.into())
            .await?;
        if ret.len() < 32 {
            return Err(SmartWalletError::Abi(format!(
                "getUserOpHash returned {} bytes",
                ret.len()
            )));
        }
        Ok(B256::from_slice(&ret[..32]))
    }

    /// Step 6: external signers receive the hash in `0x`-hex string form
    /// because injected wallets stringify before hashing; the in-process
    /// signer receives raw bytes.
    async fn sign_user_op_hash(&self, hash: B256) -> Result<Bytes> {
        if self.personal.is_external() {
            self.personal
                .personal_sign(hash.to_string().as_bytes())
                .await
        } else {
            self.personal.personal_sign(hash.as_slice()).await
        }
    }

    /// Step 7: submit and poll at one-second cadence until the bundle
    /// transaction hash surfaces.
    async fn submit_and_wait(&self, op: &UserOp) -> Result<B256> {
        let user_op_hash = self
            .bundler
            .send_user_operation(&op.to_wire(), self.config.entry_point)
            .await?;
        tracing::info!(%user_op_hash, deploys = op.deploys(), "user operation submitted");

        for _ in 0..RECEIPT_POLL_LIMIT {
            if let Some(receipt) = self
                .bundler
                .get_user_operation_receipt(user_op_hash)
                .await?
            {
                return Ok(receipt.receipt.transaction_hash);
            }
            tokio::time::sleep(Duration::from_millis(RECEIPT_POLL_INTERVAL_MS)).await;
        }
        Err(SmartWalletError::ReceiptTimeout(user_op_hash.to_string()))
    }

    /// Make sure the ERC-20 paymaster can pull fees before the first real
    /// operation: grant a near-infinite allowance through a normal
    /// operation. The `is_approving` flag short-circuits the re-entry
    /// this causes through `send_transaction`.
    pub(crate) async fn ensure_token_paymaster_approval(&self) -> Result<()> {
        let Some(tp) = self.config.token_paymaster.clone() else {
            return Ok(());
        };
        if self.version != EntryPointVersion::V07 {
            return Ok(());
        }
        if self.is_approved.load(Ordering::Acquire) || self.is_approving.load(Ordering::Acquire) {
            return Ok(());
        }

        let call = erc20::allowanceCall {
            owner: self.account,
            spender: tp.paymaster,
        };
        let ret = self.bundler.eth_call(tp.token, call.abi_encode().into()).await?;
        let allowance = erc20::allowanceCall::abi_decode_returns(&ret, true)
            .map_err(|e| SmartWalletError::Abi(e.to_string()))?
            ._0;
        if allowance >= TOKEN_PAYMASTER_ALLOWANCE {
            self.is_approved.store(true, Ordering::Release);
            return Ok(());
        }

        tracing::info!(token = %tp.token, paymaster = %tp.paymaster, "approving token paymaster");
        self.is_approving.store(true, Ordering::Release);
        let approve = erc20::approveCall {
            spender: tp.paymaster,
            amount: TOKEN_PAYMASTER_ALLOWANCE,
        };
        let result = Box::pin(self.send_transaction(tp.token, U256::ZERO, Bytes::from(approve.abi_encode())))
            .await;
        self.is_approving.store(false, Ordering::Release);
        result?;
        self.is_approved.store(true, Ordering::Release);
        Ok(())
    }

    /// During estimation with the token paymaster attached, pretend the
    /// account holds `2^96 - 1` tokens so estimation succeeds regardless
    /// of real balance.
    fn token_balance_override(&self) -> Option<Value> {
        let tp = self.config.token_paymaster.as_ref()?;
        let slot = keccak256((self.account, tp.balance_storage_slot).abi_encode());

        let mut diff = serde_json::Map::new();
        diff.insert(
            slot.to_string(),
            Value::String(B256::from(TOKEN_PAYMASTER_ALLOWANCE).to_string()),
        );
        let mut overrides = serde_json::Map::new();
        overrides.insert(tp.token.to_string(), json!({ "stateDiff": diff }));
        Some(Value::Object(overrides))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smart_wallet::DeployLock;

    #[test]
    fn deploy_lock_admits_one_claimant() {
        let lock = DeployLock::new();
        assert!(lock.try_acquire());
        assert!(!lock.try_acquire());
        lock.release();
        assert!(lock.try_acquire());
    }

    #[tokio::test]
    async fn waiters_resume_after_release() {
        use std::sync::Arc;
        let lock = Arc::new(DeployLock::new());
        assert!(lock.try_acquire());

        let waiter = {
            let lock = Arc::clone(&lock);
            tokio::spawn(async move {
                lock.wait_until_idle().await;
                true
            })
        };

        // Give the waiter a chance to park before releasing.
        tokio::time::sleep(Duration::from_millis(20)).await;
        lock.release();
        assert!(waiter.await.unwrap());
    }

    #[test]
    fn balance_override_slot_is_the_mapping_slot() {
        // keccak256(abi.encode(account, storageSlot)) per the solidity
        // mapping layout.
        let account = Address::repeat_byte(0x11);
        let slot = U256::from(9u8);
        let expected = keccak256((account, slot).abi_encode());
        // Sanity: tuple encoding is 64 bytes, address left-padded.
        let encoded = (account, slot).abi_encode();
        assert_eq!(encoded.len(), 64);
        assert_eq!(&encoded[12..32], account.as_slice());
        assert_eq!(expected.len(), 32);
    }
}
