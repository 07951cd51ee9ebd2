//! Wire and session records for the embedded wallet.

use ember_crypto::PrivateKeyAccount;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WalletError};

/// How the user proved their identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    /// Email one-time code.
    Email,
    /// Phone one-time code.
    Phone,
    /// Sign-In With Ethereum.
    Siwe,
    /// A third-party OAuth provider.
    Oauth,
}

/// The delivery channel of a one-time code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OtpChannel {
    /// Code sent by email.
    Email,
    /// Code sent by SMS.
    Phone,
}

/// The long-lived client state, persisted as `session.json`.
///
/// Written only after enrollment or recovery fully succeeds; the device
/// share in here is useless without the auth token, which is why sign-out
/// may drop the token alone.
///
/// Schema evolution is additive: new fields must be optional with serde
/// defaults so older envelopes keep loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEnvelope {
    /// Bearer token for the auth service; removed on sign-out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    /// The device share in wire form.
    pub device_share: String,
    /// Email the account is bound to, when email-authenticated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Phone number the account is bound to, when phone-authenticated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Server-side user id.
    pub wallet_user_id: String,
    /// The identity provider used at enrollment.
    pub auth_provider: AuthProvider,
}

/// Result of completing an identity proof (OTP or SIWE).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOtpResult {
    /// Whether this identity has never enrolled a wallet.
    pub is_new_user: bool,
    /// Bearer token for subsequent calls.
    pub auth_token: String,
    /// Server-side user id.
    pub wallet_user_id: String,
    /// Server-managed recovery code, when the service holds one.
    #[serde(default)]
    pub recovery_code: Option<String>,
    /// Verified email, if the identity proof was email-based.
    #[serde(default)]
    pub email: Option<String>,
    /// Verified phone, if the identity proof was phone-based.
    #[serde(default)]
    pub phone: Option<String>,
}

/// Wallet status as the server reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletStatus {
    /// Token expired or revoked.
    LoggedOut,
    /// Authenticated, but no wallet has been enrolled.
    LoggedInUninitialized,
    /// Authenticated with an enrolled wallet.
    LoggedInInitialized,
}

/// Server-side view of the authenticated user's wallet.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserWallet {
    /// Raw status token; parse with [`UserWallet::status`].
    #[serde(rename = "status")]
    pub raw_status: String,
    /// The enrolled wallet address, once initialized.
    #[serde(default)]
    pub address: Option<String>,
    /// Email bound to the account.
    #[serde(default)]
    pub email: Option<String>,
    /// Phone bound to the account.
    #[serde(default)]
    pub phone: Option<String>,
    /// Provider the account was created with.
    #[serde(default)]
    pub auth_provider: Option<AuthProvider>,
}

impl UserWallet {
    /// Parse the status token.
    ///
    /// An unrecognized token is a hard protocol error, never silently
    /// ignored.
    pub fn status(&self) -> Result<WalletStatus> {
        match self.raw_status.as_str() {
            "loggedOut" => Ok(WalletStatus::LoggedOut),
            "loggedInUninitialized" => Ok(WalletStatus::LoggedInUninitialized),
            "loggedInInitialized" => Ok(WalletStatus::LoggedInInitialized),
            other => Err(WalletError::ServerProtocol(format!(
                "unknown wallet status {other:?}"
            ))),
        }
    }
}

/// An authenticated user with a live signing account.
///
/// Lives in process memory from sign-in until sign-out; the account's key
/// zeroizes when the `User` is dropped.
pub struct User {
    /// The reconstructed signing account.
    pub account: PrivateKeyAccount,
    /// Email bound to the account, if any.
    pub email: Option<String>,
    /// Phone bound to the account, if any.
    pub phone: Option<String>,
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("address", &self.account.address())
            .field("email", &self.email)
            .field("phone", &self.phone)
            .finish()
    }
}
