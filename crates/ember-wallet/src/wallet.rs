//! The embedded-wallet sign-in state machine.
//!
//! Three flows produce a live [`User`]:
//!
//! - **Enrollment**: a new identity splits a fresh secret, uploads the auth
//!   share and the code-encrypted recovery share, and keeps the device
//!   share locally.
//! - **Recovery**: a returning identity on a new device pulls both server
//!   shares, unwraps the recovery share with the recovery code, rebuilds
//!   the secret, and mints a fresh device share from the recovered
//!   polynomial.
//! - **Re-login**: a returning identity on an enrolled device combines the
//!   stored device share with the fetched auth share.
//!
//! Local state is written only after the server step of a flow has
//! succeeded, and any share failure aborts without mutating the envelope.

use ember_crypto::{
    combine, decrypt_share, derive_share, encrypt_share, split, PrivateKeyAccount, Secret, Share,
    DEVICE_SHARE_ID,
};

use crate::error::{Result, WalletError};
use crate::server::AuthClient;
use crate::store::LocalStore;
use crate::types::{
    AuthProvider, OtpChannel, SessionEnvelope, User, VerifyOtpResult, WalletStatus,
};

/// The embedded wallet: auth client + local store + memoized user.
///
/// Not safe for parallel calls from multiple threads; callers serialize,
/// matching the cooperative model of the SDK surface above it.
pub struct EmbeddedWallet {
    client: AuthClient,
    store: LocalStore,
    user: Option<User>,
}

impl EmbeddedWallet {
    /// Build a wallet over an auth client and a session store.
    pub fn new(client: AuthClient, store: LocalStore) -> Self {
        Self {
            client,
            store,
            user: None,
        }
    }

    /// The signed-in user, if one is memoized.
    pub fn current_user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    /// Complete an OTP identity proof and sign in, enrolling or recovering
    /// as the server dictates.
    ///
    /// `recovery_code_override` replaces the server-managed recovery code
    /// when the integrating developer holds the code instead of the end
    /// user; it is authoritative for both encryption and decryption within
    /// this sign-in.
    pub async fn sign_in_with_otp(
        &mut self,
        channel: OtpChannel,
        contact: &str,
        code: &str,
        recovery_code_override: Option<&str>,
    ) -> Result<&User> {
        let verify = self.client.verify_otp(channel, contact, code).await?;
        let provider = match channel {
            OtpChannel::Email => AuthProvider::Email,
            OtpChannel::Phone => AuthProvider::Phone,
        };
        self.complete_sign_in(verify, provider, recovery_code_override)
            .await
    }

    /// Sign in with Ethereum: fetch the SIWE payload, sign it with the
    /// caller's external account, and verify.
    pub async fn sign_in_with_siwe(
        &mut self,
        signer: &PrivateKeyAccount,
        recovery_code_override: Option<&str>,
    ) -> Result<&User> {
        let payload = self.client.fetch_siwe_payload(&signer.address()).await?;
        let signature = signer.personal_sign(payload.as_bytes())?;
        let verify = self.client.verify_siwe(&payload, &signature).await?;
        self.complete_sign_in(verify, AuthProvider::Siwe, recovery_code_override)
            .await
    }

    async fn complete_sign_in(
        &mut self,
        verify: VerifyOtpResult,
        provider: AuthProvider,
        recovery_code_override: Option<&str>,
    ) -> Result<&User> {
        let recovery_code = recovery_code_override
            .map(str::to_owned)
            .or_else(|| verify.recovery_code.clone())
            .ok_or(WalletError::MissingRecoveryCode)?;

        if verify.is_new_user {
            self.create_account(&verify, provider, &recovery_code).await
        } else {
            self.recover_account(&verify, provider, &recovery_code).await
        }
    }

    /// Enrollment: split a fresh secret and upload the server-held shares.
    async fn create_account(
        &mut self,
        verify: &VerifyOtpResult,
        provider: AuthProvider,
        recovery_code: &str,
    ) -> Result<&User> {
        let secret = Secret::generate();
        let account = PrivateKeyAccount::from_secret(&secret)?;
        let shares = split(&secret);
        let encrypted_recovery = encrypt_share(&shares.recovery, recovery_code)?;

        self.client
            .store_address_and_shares(
                &account.address(),
                &shares.auth.to_wire(),
                &encrypted_recovery,
                &verify.auth_token,
            )
            .await?;

        tracing::info!(wallet_user_id = %verify.wallet_user_id, "enrolled new wallet");
        self.persist_and_memoize(verify, provider, shares.device.to_wire(), account)
    }

    /// Recovery: rebuild the secret from the two server shares and mint a
    /// fresh device share.
    async fn recover_account(
        &mut self,
        verify: &VerifyOtpResult,
        provider: AuthProvider,
        recovery_code: &str,
    ) -> Result<&User> {
        let (auth_wire, encrypted_recovery) = self
            .client
            .fetch_auth_and_recovery_shares(&verify.auth_token)
            .await?;

        let (account, device_share) =
            assemble_recovered(&auth_wire, &encrypted_recovery, recovery_code)?;

        // The recovered key must be the key the server enrolled.
        let details = self.client.fetch_user_details(&verify.auth_token).await?;
        if let Some(stored) = &details.address {
            if !stored.eq_ignore_ascii_case(&account.address()) {
                return Err(WalletError::ServerProtocol(format!(
                    "recovered address {} does not match enrolled address {stored}",
                    account.address()
                )));
            }
        }

        tracing::info!(wallet_user_id = %verify.wallet_user_id, "recovered wallet on this device");
        self.persist_and_memoize(verify, provider, device_share.to_wire(), account)
    }

    fn persist_and_memoize(
        &mut self,
        verify: &VerifyOtpResult,
        provider: AuthProvider,
        device_share: String,
        account: PrivateKeyAccount,
    ) -> Result<&User> {
        let envelope = SessionEnvelope {
            auth_token: Some(verify.auth_token.clone()),
            device_share,
            email: verify.email.clone(),
            phone: verify.phone.clone(),
            wallet_user_id: verify.wallet_user_id.clone(),
            auth_provider: provider,
        };
        self.store.save(&envelope)?;

        Ok(self.user.insert(User {
            account,
            email: verify.email.clone(),
            phone: verify.phone.clone(),
        }))
    }

    /// Return the signed-in user, assembling the account from the stored
    /// device share and the fetched auth share when necessary.
    ///
    /// This never re-authenticates: a missing or rejected token, a status
    /// regression, or an identity mismatch is a hard error.
    pub async fn get_user(
        &mut self,
        email: Option<&str>,
        phone: Option<&str>,
        auth_provider: AuthProvider,
    ) -> Result<&User> {
        if self.user.is_some() {
            // Reborrow through the Option so the early return borrows
            // cleanly.
            return Ok(self.user.as_ref().expect("checked above"));
        }

        let envelope = self.store.load()?.ok_or(WalletError::NotSignedIn)?;
        let token = envelope
            .auth_token
            .clone()
            .ok_or(WalletError::NotSignedIn)?;

        let details = self.client.fetch_user_details(&token).await?;
        match details.status()? {
            WalletStatus::LoggedOut => {
                // Stale session: the envelope is useless without a valid
                // token.
                self.store.clear()?;
                Err(WalletError::NotSignedIn)
            }
            WalletStatus::LoggedInUninitialized => Err(WalletError::WalletUninitialized),
            WalletStatus::LoggedInInitialized => {
                if let Some(claim) = email {
                    if details.email.as_deref() != Some(claim) {
                        return Err(WalletError::IdentityMismatch);
                    }
                }
                if let Some(claim) = phone {
                    if details.phone.as_deref() != Some(claim) {
                        return Err(WalletError::IdentityMismatch);
                    }
                }
                if details
                    .auth_provider
                    .is_some_and(|reported| reported != auth_provider)
                {
                    return Err(WalletError::IdentityMismatch);
                }

                let auth_wire = self.client.fetch_auth_share(&token).await?;
                let device = Share::from_wire(&envelope.device_share)
                    .map_err(|_| WalletError::WalletUninitialized)?;
                let auth = Share::from_wire(&auth_wire)?;
                let secret = combine(&device, &auth)?;
                let account = PrivateKeyAccount::from_secret(&secret)?;

                if let Some(stored) = &details.address {
                    if !stored.eq_ignore_ascii_case(&account.address()) {
                        return Err(WalletError::ServerProtocol(format!(
                            "assembled address {} does not match enrolled address {stored}",
                            account.address()
                        )));
                    }
                }

                Ok(self.user.insert(User {
                    account,
                    email: details.email,
                    phone: details.phone,
                }))
            }
        }
    }

    /// Drop the in-memory account and delete the auth token from
    /// persistence.
    pub fn sign_out(&mut self) -> Result<()> {
        self.user = None;
        self.store.remove_auth_token()
    }
}

impl std::fmt::Debug for EmbeddedWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddedWallet")
            .field("signed_in", &self.user.is_some())
            .finish_non_exhaustive()
    }
}

/// Rebuild the account and a fresh device share from the two server-held
/// shares.
///
/// Pure share arithmetic, shared by the recovery flow and its tests.
fn assemble_recovered(
    auth_share_wire: &str,
    encrypted_recovery_share: &str,
    recovery_code: &str,
) -> Result<(PrivateKeyAccount, Share)> {
    let auth = Share::from_wire(auth_share_wire)?;
    let recovery = decrypt_share(encrypted_recovery_share, recovery_code)?;
    let secret = combine(&auth, &recovery)?;
    let account = PrivateKeyAccount::from_secret(&secret)?;
    let device = derive_share(DEVICE_SHARE_ID, &auth, &recovery)?;
    Ok((account, device))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_crypto::CryptoError;

    fn wallet_in(dir: &std::path::Path) -> EmbeddedWallet {
        EmbeddedWallet::new(
            AuthClient::new("http://127.0.0.1:1").unwrap(),
            LocalStore::with_dir(dir.to_path_buf()).unwrap(),
        )
    }

    /// The recovery round trip: the shares the server would return after
    /// enrollment rebuild the same account and the original device share.
    #[test]
    fn recovery_rebuilds_the_enrolled_account() {
        let secret = Secret::generate();
        let enrolled = PrivateKeyAccount::from_secret(&secret).unwrap();
        let shares = split(&secret);
        let encrypted = encrypt_share(&shares.recovery, "code").unwrap();

        let (account, device) =
            assemble_recovered(&shares.auth.to_wire(), &encrypted, "code").unwrap();

        assert_eq!(account.address(), enrolled.address());
        assert_eq!(device.to_wire(), shares.device.to_wire());
    }

    #[test]
    fn recovery_with_wrong_code_fails_without_side_effects() {
        let secret = Secret::generate();
        let shares = split(&secret);
        let encrypted = encrypt_share(&shares.recovery, "right").unwrap();

        let result = assemble_recovered(&shares.auth.to_wire(), &encrypted, "wrong");
        assert!(matches!(
            result,
            Err(WalletError::Crypto(CryptoError::WrongRecoveryCode))
        ));
    }

    #[tokio::test]
    async fn get_user_without_envelope_is_not_signed_in() {
        let dir = tempfile::tempdir().unwrap();
        let mut wallet = wallet_in(dir.path());
        let result = wallet.get_user(None, None, AuthProvider::Email).await;
        assert!(matches!(result, Err(WalletError::NotSignedIn)));
    }

    #[tokio::test]
    async fn get_user_without_token_is_not_signed_in() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::with_dir(dir.path().to_path_buf()).unwrap();
        store
            .save(&SessionEnvelope {
                auth_token: None,
                device_share: "1:00aa".into(),
                email: None,
                phone: None,
                wallet_user_id: "u-1".into(),
                auth_provider: AuthProvider::Email,
            })
            .unwrap();

        let mut wallet = wallet_in(dir.path());
        let result = wallet.get_user(None, None, AuthProvider::Email).await;
        assert!(matches!(result, Err(WalletError::NotSignedIn)));
    }

    #[test]
    fn sign_out_clears_token_and_memoized_user() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::with_dir(dir.path().to_path_buf()).unwrap();
        store
            .save(&SessionEnvelope {
                auth_token: Some("tok".into()),
                device_share: "1:00aa".into(),
                email: None,
                phone: None,
                wallet_user_id: "u-1".into(),
                auth_provider: AuthProvider::Email,
            })
            .unwrap();

        let mut wallet = wallet_in(dir.path());
        wallet.sign_out().unwrap();

        assert!(wallet.current_user().is_none());
        let reopened = LocalStore::with_dir(dir.path().to_path_buf()).unwrap();
        assert!(reopened.load().unwrap().unwrap().auth_token.is_none());
    }
}
