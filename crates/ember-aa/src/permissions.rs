//! Signer-permission requests: session keys and admin changes.
//!
//! Every permission change is one EIP-712-signed `SignerPermissionRequest`
//! handed to `setPermissionsForSigner`. The request is signed by the
//! controlling personal account *before* the operation enters the builder,
//! so hardware signers prompt once, not once per gas estimation.

use alloy_primitives::{Address, B256, U256};
use rand::RngCore;
use serde_json::json;

use crate::abi::smart_account::SignerPermissionRequest;

/// `isAdmin` discriminator: plain session key.
pub const SIGNER_ROLE_SESSION: u8 = 0;
/// `isAdmin` discriminator: grant admin.
pub const SIGNER_ROLE_GRANT_ADMIN: u8 = 1;
/// `isAdmin` discriminator: revoke admin.
pub const SIGNER_ROLE_REVOKE_ADMIN: u8 = 2;

/// Time-bounded, target-restricted permissions for a session key.
#[derive(Debug, Clone)]
pub struct SessionKeyParams {
    /// The session signer being authorized.
    pub signer: Address,
    /// Contracts the signer may call.
    pub approved_targets: Vec<Address>,
    /// Per-transaction native-token ceiling, in wei.
    pub native_token_limit_per_tx: U256,
    /// Unix seconds the permission becomes valid.
    pub permission_start: u64,
    /// Unix seconds the permission lapses.
    pub permission_end: u64,
    /// Unix seconds the signed request becomes acceptable.
    pub req_validity_start: u64,
    /// Unix seconds the signed request expires.
    pub req_validity_end: u64,
}

/// Build the request for a new session key.
pub fn session_key_request(params: &SessionKeyParams) -> SignerPermissionRequest {
    SignerPermissionRequest {
        signer: params.signer,
        isAdmin: SIGNER_ROLE_SESSION,
        approvedTargets: params.approved_targets.clone(),
        nativeTokenLimitPerTransaction: params.native_token_limit_per_tx,
        permissionStartTimestamp: params.permission_start as u128,
        permissionEndTimestamp: params.permission_end as u128,
        reqValidityStartTimestamp: params.req_validity_start as u128,
        reqValidityEndTimestamp: params.req_validity_end as u128,
        uid: fresh_uid(),
    }
}

/// Build the request that revokes a session key: no targets, no limit, a
/// permission window that has already closed.
pub fn revoke_session_key_request(
    signer: Address,
    req_validity_end: u64,
) -> SignerPermissionRequest {
    SignerPermissionRequest {
        signer,
        isAdmin: SIGNER_ROLE_SESSION,
        approvedTargets: Vec::new(),
        nativeTokenLimitPerTransaction: U256::ZERO,
        permissionStartTimestamp: 0,
        permissionEndTimestamp: 0,
        reqValidityStartTimestamp: 0,
        reqValidityEndTimestamp: req_validity_end as u128,
        uid: fresh_uid(),
    }
}

/// Build an admin grant or revocation request.
pub fn admin_request(signer: Address, role: u8, req_validity_end: u64) -> SignerPermissionRequest {
    SignerPermissionRequest {
        signer,
        isAdmin: role,
        approvedTargets: Vec::new(),
        nativeTokenLimitPerTransaction: U256::ZERO,
        permissionStartTimestamp: 0,
        permissionEndTimestamp: 0,
        reqValidityStartTimestamp: 0,
        reqValidityEndTimestamp: req_validity_end as u128,
        uid: fresh_uid(),
    }
}

/// A random 16-byte request id, left-aligned in the `bytes32` slot.
fn fresh_uid() -> B256 {
    let mut uid = B256::ZERO;
    rand::thread_rng().fill_bytes(&mut uid.0[..16]);
    uid
}

/// The `eth_signTypedData_v4` payload for a permission request, under the
/// account's `("Account", "1", chainId, account)` domain.
pub fn permission_request_typed_data(
    chain_id: u64,
    account: Address,
    req: &SignerPermissionRequest,
) -> String {
    json!({
        "types": {
            "EIP712Domain": [
                {"name": "name", "type": "string"},
                {"name": "version", "type": "string"},
                {"name": "chainId", "type": "uint256"},
                {"name": "verifyingContract", "type": "address"}
            ],
            "SignerPermissionRequest": [
                {"name": "signer", "type": "address"},
                {"name": "isAdmin", "type": "uint8"},
                {"name": "approvedTargets", "type": "address[]"},
                {"name": "nativeTokenLimitPerTransaction", "type": "uint256"},
                {"name": "permissionStartTimestamp", "type": "uint128"},
                {"name": "permissionEndTimestamp", "type": "uint128"},
                {"name": "reqValidityStartTimestamp", "type": "uint128"},
                {"name": "reqValidityEndTimestamp", "type": "uint128"},
                {"name": "uid", "type": "bytes32"}
            ]
        },
        "primaryType": "SignerPermissionRequest",
        "domain": {
            "name": "Account",
            "version": "1",
            "chainId": chain_id,
            "verifyingContract": account,
        },
        "message": {
            "signer": req.signer,
            "isAdmin": req.isAdmin,
            "approvedTargets": req.approvedTargets,
            "nativeTokenLimitPerTransaction": req.nativeTokenLimitPerTransaction.to_string(),
            "permissionStartTimestamp": req.permissionStartTimestamp.to_string(),
            "permissionEndTimestamp": req.permissionEndTimestamp.to_string(),
            "reqValidityStartTimestamp": req.reqValidityStartTimestamp.to_string(),
            "reqValidityEndTimestamp": req.reqValidityEndTimestamp.to_string(),
            "uid": req.uid,
        }
    })
    .to_string()
}

/// The `eth_signTypedData_v4` payload for the ERC-1271 `AccountMessage`
/// wrapper: `message` is the ABI encoding of the original prefixed hash.
pub fn account_message_typed_data(chain_id: u64, account: Address, original_hash: B256) -> String {
    json!({
        "types": {
            "EIP712Domain": [
                {"name": "name", "type": "string"},
                {"name": "version", "type": "string"},
                {"name": "chainId", "type": "uint256"},
                {"name": "verifyingContract", "type": "address"}
            ],
            "AccountMessage": [
                {"name": "message", "type": "bytes"}
            ]
        },
        "primaryType": "AccountMessage",
        "domain": {
            "name": "Account",
            "version": "1",
            "chainId": chain_id,
            "verifyingContract": account,
        },
        "message": {
            "message": original_hash,
        }
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;
    use alloy_sol_types::{eip712_domain, SolStruct};
    use ember_crypto::TypedData;

    const ACCOUNT: Address = address!("00000000000000000000000000000000000000aa");

    fn params() -> SessionKeyParams {
        SessionKeyParams {
            signer: address!("00000000000000000000000000000000000000bb"),
            approved_targets: vec![address!("00000000000000000000000000000000000000cc")],
            native_token_limit_per_tx: U256::from(10u8).pow(U256::from(18u8)),
            permission_start: 1_700_000_000,
            permission_end: 1_700_003_600,
            req_validity_start: 1_700_000_000,
            req_validity_end: 1_700_003_600,
        }
    }

    #[test]
    fn uids_are_unique_and_16_bytes() {
        let a = session_key_request(&params());
        let b = session_key_request(&params());
        assert_ne!(a.uid, b.uid);
        assert_eq!(&a.uid[16..], &[0u8; 16], "low half stays zero");
        assert_ne!(&a.uid[..16], &[0u8; 16]);
    }

    /// The JSON payload hashes identically to the `sol!` struct's own
    /// EIP-712 digest, so external and in-process signers agree.
    #[test]
    fn typed_data_payload_matches_sol_struct_digest() {
        let req = session_key_request(&params());
        let payload = permission_request_typed_data(137, ACCOUNT, &req);
        let via_json = TypedData::from_json(&payload).unwrap().signing_hash().unwrap();

        let domain = eip712_domain! {
            name: "Account",
            version: "1",
            chain_id: 137,
            verifying_contract: ACCOUNT,
        };
        let via_struct = req.eip712_signing_hash(&domain);
        assert_eq!(via_json, via_struct);
    }

    #[test]
    fn account_message_payload_hashes() {
        let hash = B256::repeat_byte(0x42);
        let payload = account_message_typed_data(1, ACCOUNT, hash);
        let typed = TypedData::from_json(&payload).unwrap();
        assert!(typed.signing_hash().is_ok());
    }

    #[test]
    fn revocation_closes_the_permission_window() {
        let req = revoke_session_key_request(params().signer, 1_700_000_000);
        assert_eq!(req.isAdmin, SIGNER_ROLE_SESSION);
        assert!(req.approvedTargets.is_empty());
        assert_eq!(req.permissionEndTimestamp, 0);
    }
}
