//! Typed ABI facade for the contracts the pipeline touches.
//!
//! Calldata is always produced through these `sol!` definitions; nothing
//! in the crate assembles selectors or reflection-style calls by hand.

/// EntryPoint v0.6: flat UserOperation.
pub mod entry_point_v06 {
    alloy_sol_types::sol! {
        /// The on-chain v0.6 operation layout.
        #[derive(Debug)]
        struct UserOperation {
            address sender;
            uint256 nonce;
            bytes initCode;
            bytes callData;
            uint256 callGasLimit;
            uint256 verificationGasLimit;
            uint256 preVerificationGas;
            uint256 maxFeePerGas;
            uint256 maxPriorityFeePerGas;
            bytes paymasterAndData;
            bytes signature;
        }

        function getUserOpHash(UserOperation userOp) external view returns (bytes32);
        function getNonce(address sender, uint192 key) external view returns (uint256 nonce);
    }
}

/// EntryPoint v0.7: packed UserOperation.
pub mod entry_point_v07 {
    alloy_sol_types::sol! {
        /// The packed layout hashed and submitted on chain for v0.7.
        #[derive(Debug)]
        struct PackedUserOperation {
            address sender;
            uint256 nonce;
            bytes initCode;
            bytes callData;
            bytes32 accountGasLimits;
            uint256 preVerificationGas;
            bytes32 gasFees;
            bytes paymasterAndData;
            bytes signature;
        }

        function getUserOpHash(PackedUserOperation userOp) external view returns (bytes32);
        function getNonce(address sender, uint192 key) external view returns (uint256 nonce);
    }
}

/// The account factory consumed at deploy-on-first-use.
pub mod account_factory {
    alloy_sol_types::sol! {
        function createAccount(address admin, bytes data) external returns (address account);
        function getAddress(address adminSigner, bytes data) external view returns (address account);
    }
}

/// The smart account itself: execution, ERC-1271, and permissioning.
pub mod smart_account {
    alloy_sol_types::sol! {
        /// EIP-712-signed permission change for a signer.
        #[derive(Debug)]
        struct SignerPermissionRequest {
            address signer;
            uint8 isAdmin;
            address[] approvedTargets;
            uint256 nativeTokenLimitPerTransaction;
            uint128 permissionStartTimestamp;
            uint128 permissionEndTimestamp;
            uint128 reqValidityStartTimestamp;
            uint128 reqValidityEndTimestamp;
            bytes32 uid;
        }

        /// An active signer as reported by the account.
        #[derive(Debug)]
        struct SignerPermissions {
            address signer;
            address[] approvedTargets;
            uint256 nativeTokenLimitPerTransaction;
            uint128 startTimestamp;
            uint128 endTimestamp;
        }

        /// ERC-1271 wrapper struct the account hashes via
        /// `getMessageHash`.
        #[derive(Debug)]
        struct AccountMessage {
            bytes message;
        }

        function execute(address target, uint256 value, bytes calldata data) external;
        function executeBatch(address[] targets, uint256[] values, bytes[] datas) external;
        function getMessageHash(bytes32 hash) external view returns (bytes32);
        function isValidSignature(bytes32 hash, bytes signature) external view returns (bytes4 magicValue);
        function setPermissionsForSigner(SignerPermissionRequest req, bytes signature) external;
        function getAllActiveSigners() external view returns (SignerPermissions[] signers);
    }
}

/// Minimal ERC-20 surface for the token-paymaster bootstrap.
pub mod erc20 {
    alloy_sol_types::sol! {
        function approve(address spender, uint256 amount) external returns (bool);
        function allowance(address owner, address spender) external view returns (uint256);
    }
}
