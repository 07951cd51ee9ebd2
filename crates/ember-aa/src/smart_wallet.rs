//! The smart-wallet facade.
//!
//! Wraps a personal account and drives an ERC-4337 contract account:
//! deploy-on-first-use, transaction submission through the UserOperation
//! builder, ERC-1271 message signing, and session-key / admin
//! permissioning. On ZK-Sync chains the facade switches to native EIP-712
//! transactions and rejects the operations that have no meaning there.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::SolCall;
use ember_crypto::hash_prefixed_message;
use tokio::sync::Notify;

use crate::abi::{account_factory, smart_account};
use crate::bundler::BundlerClient;
use crate::constants::{ENTRY_POINT_V06, ENTRY_POINT_V07, ERC1271_MAGIC_VALUE};
use crate::error::{Result, SmartWalletError};
use crate::permissions::{
    self, SessionKeyParams, SIGNER_ROLE_GRANT_ADMIN, SIGNER_ROLE_REVOKE_ADMIN,
};
use crate::personal::PersonalAccount;
use crate::userop::EntryPointVersion;
use crate::zksync::ZkSyncTransaction;

/// Static configuration of a smart wallet.
#[derive(Debug, Clone)]
pub struct SmartWalletConfig {
    /// Chain the account lives on.
    pub chain_id: u64,
    /// EntryPoint singleton; selects the protocol revision.
    pub entry_point: Address,
    /// Account factory used at deploy-on-first-use.
    pub factory: Address,
    /// Whether operations are paymaster-sponsored.
    pub gasless: bool,
    /// Whether this chain is a ZK-Sync fork with native AA.
    pub zksync: bool,
    /// ERC-20 paymaster settings, when gas is paid in a token.
    pub token_paymaster: Option<TokenPaymaster>,
}

impl SmartWalletConfig {
    /// A v0.6 configuration with the canonical EntryPoint.
    pub fn v06(chain_id: u64, factory: Address) -> Self {
        Self {
            chain_id,
            entry_point: ENTRY_POINT_V06,
            factory,
            gasless: false,
            zksync: false,
            token_paymaster: None,
        }
    }

    /// A v0.7 configuration with the canonical EntryPoint.
    pub fn v07(chain_id: u64, factory: Address) -> Self {
        Self {
            chain_id,
            entry_point: ENTRY_POINT_V07,
            factory,
            gasless: false,
            zksync: false,
            token_paymaster: None,
        }
    }
}

/// ERC-20 paymaster parameters.
#[derive(Debug, Clone)]
pub struct TokenPaymaster {
    /// The paymaster contract to approve and pay.
    pub paymaster: Address,
    /// The fee token.
    pub token: Address,
    /// Storage slot of the token's balance mapping, for the estimation
    /// state override.
    pub balance_storage_slot: U256,
}

/// Cooperative deploy lock.
///
/// The first operation that must deploy sets the flag; later operations
/// wait on the broadcast and then proceed with empty init code. A
/// condition-style `Notify` replaces polling.
pub(crate) struct DeployLock {
    deploying: AtomicBool,
    notify: Notify,
}

impl DeployLock {
    pub(crate) fn new() -> Self {
        Self {
            deploying: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    pub(crate) fn is_deploying(&self) -> bool {
        self.deploying.load(Ordering::Acquire)
    }

    /// Claim the deploy; returns false when another operation holds it.
    pub(crate) fn try_acquire(&self) -> bool {
        self.deploying
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) async fn wait_until_idle(&self) {
        while self.is_deploying() {
            self.notify.notified().await;
        }
    }

    pub(crate) fn release(&self) {
        self.deploying.store(false, Ordering::Release);
        self.notify.notify_waiters();
    }

    /// A guard that releases the claimed lock on drop.
    pub(crate) fn guard(&self) -> DeployGuard<'_> {
        DeployGuard { lock: self }
    }
}

/// Releases the deploy lock when the deploying operation finishes,
/// successfully or not.
pub(crate) struct DeployGuard<'a> {
    lock: &'a DeployLock,
}

impl Drop for DeployGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

/// An ERC-4337 smart account bound to a personal signer.
pub struct SmartWallet {
    pub(crate) personal: Arc<dyn PersonalAccount>,
    pub(crate) bundler: BundlerClient,
    pub(crate) config: SmartWalletConfig,
    pub(crate) version: EntryPointVersion,
    pub(crate) account: Address,
    pub(crate) deploy_lock: DeployLock,
    pub(crate) is_approving: AtomicBool,
    pub(crate) is_approved: AtomicBool,
}

impl SmartWallet {
    /// Resolve the counterfactual account address and bind the wallet.
    ///
    /// On ZK-Sync chains the personal account acts natively and the smart
    /// address is the personal address.
    pub async fn connect(
        personal: Arc<dyn PersonalAccount>,
        bundler: BundlerClient,
        config: SmartWalletConfig,
    ) -> Result<Self> {
        let version = EntryPointVersion::from_entry_point(config.entry_point)?;
        let account = if config.zksync {
            personal.address()
        } else {
            let call = account_factory::getAddressCall {
                adminSigner: personal.address(),
                data: Bytes::new(),
            };
            let ret = bundler
                .eth_call(config.factory, call.abi_encode().into())
                .await?;
            account_factory::getAddressCall::abi_decode_returns(&ret, true)
                .map_err(|e| SmartWalletError::Abi(e.to_string()))?
                .account
        };

        tracing::info!(%account, chain_id = config.chain_id, "smart wallet connected");
        Ok(Self {
            personal,
            bundler,
            config,
            version,
            account,
            deploy_lock: DeployLock::new(),
            is_approving: AtomicBool::new(false),
            is_approved: AtomicBool::new(false),
        })
    }

    /// The address transactions act as.
    pub fn address(&self) -> Address {
        self.account
    }

    /// The controlling personal account's address.
    pub fn personal_address(&self) -> Address {
        self.personal.address()
    }

    /// Probe the chain for account code; never cached.
    pub async fn is_deployed(&self) -> Result<bool> {
        if self.config.zksync {
            return Ok(true);
        }
        let code = self.bundler.get_code(self.account).await?;
        Ok(!code.is_empty())
    }

    /// Deploy the account now with a zero-value self-call.
    pub async fn force_deploy(&self) -> Result<()> {
        if self.config.zksync {
            return Err(SmartWalletError::NotSupportedOnZkSync);
        }
        if self.is_deployed().await? {
            return Ok(());
        }
        self.send_transaction(self.account, U256::ZERO, Bytes::new())
            .await?;
        if !self.is_deployed().await? {
            return Err(SmartWalletError::DeploymentFailed(
                "deployment operation mined but no code at account".into(),
            ));
        }
        Ok(())
    }

    /// Execute a call through the smart account; returns the transaction
    /// hash of the including bundle.
    pub async fn send_transaction(&self, to: Address, value: U256, data: Bytes) -> Result<B256> {
        if self.config.zksync {
            return self.send_zk_transaction(to, value, data).await;
        }

        self.ensure_token_paymaster_approval().await?;

        let call = smart_account::executeCall {
            target: to,
            value,
            data,
        };
        self.send_account_calldata(Bytes::from(call.abi_encode()))
            .await
    }

    /// Execute a batch of calls in one operation.
    pub async fn send_batch_transaction(
        &self,
        targets: Vec<Address>,
        values: Vec<U256>,
        datas: Vec<Bytes>,
    ) -> Result<B256> {
        if self.config.zksync {
            return Err(SmartWalletError::NotSupportedOnZkSync);
        }

        self.ensure_token_paymaster_approval().await?;

        let call = smart_account::executeBatchCall {
            targets,
            values,
            datas,
        };
        self.send_account_calldata(Bytes::from(call.abi_encode()))
            .await
    }

    /// Sign a message so the smart account validates it under ERC-1271.
    ///
    /// Prefers the account's EIP-712 `AccountMessage` wrapper; falls back
    /// to the personal account's `personal_sign` when the account does not
    /// expose `getMessageHash`. Either way the result is verified with
    /// `isValidSignature` and rejected unless the magic value comes back.
    pub async fn personal_sign(&self, message: &[u8]) -> Result<Bytes> {
        if self.config.zksync {
            return self.personal.personal_sign(message).await;
        }

        if !self.is_deployed().await? {
            self.force_deploy().await?;
        }

        let original_hash = hash_prefixed_message(message);
        let probe = smart_account::getMessageHashCall {
            hash: original_hash,
        };
        let signature = match self
            .bundler
            .eth_call(self.account, probe.abi_encode().into())
            .await
        {
            Ok(ret) if ret.len() >= 32 => {
                let payload = permissions::account_message_typed_data(
                    self.config.chain_id,
                    self.account,
                    original_hash,
                );
                self.personal.sign_typed_data(&payload).await?
            }
            _ => {
                tracing::warn!("account lacks getMessageHash, falling back to personal signer");
                self.personal.personal_sign(message).await?
            }
        };

        let check = smart_account::isValidSignatureCall {
            hash: original_hash,
            signature: signature.clone(),
        };
        let ret = self
            .bundler
            .eth_call(self.account, check.abi_encode().into())
            .await
            .map_err(|_| SmartWalletError::InvalidSignature)?;
        if ret.len() < 4 || ret[..4] != ERC1271_MAGIC_VALUE {
            return Err(SmartWalletError::InvalidSignature);
        }
        Ok(signature)
    }

    /// Authorize a session key with time bounds and target restrictions.
    pub async fn create_session_key(&self, params: &SessionKeyParams) -> Result<B256> {
        self.set_permissions(permissions::session_key_request(params))
            .await
    }

    /// Revoke a session key.
    pub async fn revoke_session_key(
        &self,
        signer: Address,
        req_validity_end: u64,
    ) -> Result<B256> {
        self.set_permissions(permissions::revoke_session_key_request(
            signer,
            req_validity_end,
        ))
        .await
    }

    /// Grant admin rights to a signer.
    pub async fn add_admin(&self, admin: Address, req_validity_end: u64) -> Result<B256> {
        self.set_permissions(permissions::admin_request(
            admin,
            SIGNER_ROLE_GRANT_ADMIN,
            req_validity_end,
        ))
        .await
    }

    /// Revoke admin rights from a signer.
    pub async fn remove_admin(&self, admin: Address, req_validity_end: u64) -> Result<B256> {
        self.set_permissions(permissions::admin_request(
            admin,
            SIGNER_ROLE_REVOKE_ADMIN,
            req_validity_end,
        ))
        .await
    }

    /// The account's currently active signers and their restrictions.
    pub async fn get_all_active_signers(
        &self,
    ) -> Result<Vec<smart_account::SignerPermissions>> {
        if self.config.zksync {
            return Err(SmartWalletError::NotSupportedOnZkSync);
        }
        let call = smart_account::getAllActiveSignersCall {};
        let ret = self
            .bundler
            .eth_call(self.account, call.abi_encode().into())
            .await?;
        Ok(
            smart_account::getAllActiveSignersCall::abi_decode_returns(&ret, true)
                .map_err(|e| SmartWalletError::Abi(e.to_string()))?
                .signers,
        )
    }

    /// Sign and submit one permission change.
    ///
    /// The EIP-712 signature happens here, before the builder runs, so a
    /// hardware personal signer prompts once rather than again after gas
    /// estimation.
    async fn set_permissions(
        &self,
        req: smart_account::SignerPermissionRequest,
    ) -> Result<B256> {
        if self.config.zksync {
            return Err(SmartWalletError::NotSupportedOnZkSync);
        }

        let payload =
            permissions::permission_request_typed_data(self.config.chain_id, self.account, &req);
        let signature = self.personal.sign_typed_data(&payload).await?;

        let call = smart_account::setPermissionsForSignerCall { req, signature };
        self.send_account_calldata(Bytes::from(call.abi_encode()))
            .await
    }

    /// ZK-Sync native submission path.
    async fn send_zk_transaction(&self, to: Address, value: U256, data: Bytes) -> Result<B256> {
        let from = self.personal.address();
        let mut tx = ZkSyncTransaction::call(from, to, value, data);
        tx.nonce = self.bundler.get_transaction_count(from).await?;
        tx.gas_limit = self
            .bundler
            .estimate_gas(from, to, tx.value, &tx.data)
            .await?;

        let fees = self.bundler.get_user_operation_gas_price().await?;
        tx.max_fee_per_gas = fees.max_fee_per_gas;
        tx.max_priority_fee_per_gas = fees.max_priority_fee_per_gas;

        if self.config.gasless {
            let hint = self.bundler.zk_paymaster_data(&tx.to_rpc_value()).await?;
            tx.paymaster = Some(hint.paymaster);
            tx.paymaster_input = hint.paymaster_input;
        }

        let payload = tx.typed_data_payload(self.config.chain_id);
        let signature = self.personal.sign_typed_data(&payload).await?;
        let raw = tx.serialize_signed(&signature, self.config.chain_id);

        let hash = self.bundler.zk_broadcast_transaction(&raw).await?;
        tracing::info!(%hash, "zk transaction broadcast");
        Ok(hash)
    }
}

impl std::fmt::Debug for SmartWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmartWallet")
            .field("account", &self.account)
            .field("version", &self.version)
            .field("zksync", &self.config.zksync)
            .finish_non_exhaustive()
    }
}
