//! Typed client for the auth service.
//!
//! A thin adapter: every method is one HTTPS round trip with bearer auth,
//! and all response handling funnels through a single status-mapping choke
//! point. The client holds no session state beyond the base URL; tokens
//! are passed per call because the embedded-wallet core owns their
//! lifecycle.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WalletError};
use crate::types::{OtpChannel, UserWallet, VerifyOtpResult};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for the auth service.
#[derive(Clone)]
pub struct AuthClient {
    client: Client,
    base_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyOtpRequest<'a> {
    channel: OtpChannel,
    value: &'a str,
    code: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StoreSharesRequest<'a> {
    address: &'a str,
    auth_share: &'a str,
    encrypted_recovery_share: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SharesResponse {
    auth_share: String,
    #[serde(default)]
    encrypted_recovery_share: Option<String>,
}

#[derive(Deserialize)]
struct SiwePayloadResponse {
    payload: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifySiweRequest<'a> {
    payload: &'a str,
    signature: &'a str,
}

/// The error bodies the service emits, nested or flat.
#[derive(Deserialize)]
#[serde(untagged)]
enum ServerErrorBody {
    Nested { error: ServerErrorDetails },
    Flat { message: String },
}

#[derive(Deserialize)]
struct ServerErrorDetails {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

impl AuthClient {
    /// Build a client for the given service base URL.
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|_| WalletError::ServerUnreachable)?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Complete an OTP identity proof.
    pub async fn verify_otp(
        &self,
        channel: OtpChannel,
        contact: &str,
        code: &str,
    ) -> Result<VerifyOtpResult> {
        let request = self.client.post(self.url("/v1/otp/verify")).json(
            &VerifyOtpRequest {
                channel,
                value: contact,
                code,
            },
        );
        match send(request).await {
            Err(WalletError::ServerError(400, _)) => Err(WalletError::BadOtp),
            Err(WalletError::ServerError(410, _)) => Err(WalletError::OtpExpired),
            other => other,
        }
    }

    /// Fetch the authenticated user's wallet status and identity details.
    pub async fn fetch_user_details(&self, token: &str) -> Result<UserWallet> {
        send(self
            .client
            .get(self.url("/v1/wallet/user"))
            .bearer_auth(token))
        .await
    }

    /// Upload the enrollment artifacts: the wallet address, the auth
    /// share, and the encrypted recovery share.
    pub async fn store_address_and_shares(
        &self,
        address: &str,
        auth_share: &str,
        encrypted_recovery_share: &str,
        token: &str,
    ) -> Result<()> {
        let request = self
            .client
            .post(self.url("/v1/wallet/shares"))
            .bearer_auth(token)
            .json(&StoreSharesRequest {
                address,
                auth_share,
                encrypted_recovery_share,
            });
        send_no_body(request).await
    }

    /// Fetch both server-held shares for the recovery path.
    pub async fn fetch_auth_and_recovery_shares(
        &self,
        token: &str,
    ) -> Result<(String, String)> {
        let shares: SharesResponse = send(self
            .client
            .get(self.url("/v1/wallet/shares"))
            .bearer_auth(token))
        .await?;
        let encrypted = shares.encrypted_recovery_share.ok_or_else(|| {
            WalletError::ServerProtocol("response is missing encryptedRecoveryShare".into())
        })?;
        Ok((shares.auth_share, encrypted))
    }

    /// Fetch the auth share alone, for re-login with a device share.
    pub async fn fetch_auth_share(&self, token: &str) -> Result<String> {
        let shares: SharesResponse = send(self
            .client
            .get(self.url("/v1/wallet/shares/auth"))
            .bearer_auth(token))
        .await?;
        Ok(shares.auth_share)
    }

    /// Fetch the SIWE message for an address to sign.
    pub async fn fetch_siwe_payload(&self, address: &str) -> Result<String> {
        let response: SiwePayloadResponse = send(self
            .client
            .get(self.url("/v1/siwe/payload"))
            .query(&[("address", address)]))
        .await?;
        Ok(response.payload)
    }

    /// Verify a signed SIWE payload, completing the identity proof.
    pub async fn verify_siwe(&self, payload: &str, signature: &str) -> Result<VerifyOtpResult> {
        send(self
            .client
            .post(self.url("/v1/siwe/verify"))
            .json(&VerifySiweRequest { payload, signature }))
        .await
    }
}

impl std::fmt::Debug for AuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
    let response = request.send().await?;
    let response = check_status(response).await?;
    let status = response.status();
    response
        .json::<T>()
        .await
        .map_err(|e| WalletError::ServerProtocol(format!("HTTP {status}: {e}")))
}

async fn send_no_body(request: RequestBuilder) -> Result<()> {
    let response = request.send().await?;
    check_status(response).await.map(drop)
}

/// Map error statuses to wallet errors; success passes the response
/// through for body handling.
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(30);
        return Err(WalletError::Throttled {
            retry_after: Duration::from_secs(retry_after),
        });
    }

    let code = status.as_u16();
    let message = extract_error_message(response, code).await;
    tracing::debug!(code, %message, "auth service error");

    Err(match code {
        401 | 403 => WalletError::Unauthorized,
        404 => WalletError::NotFound(message),
        409 => WalletError::Conflict(message),
        _ => WalletError::ServerError(code, message),
    })
}

async fn extract_error_message(response: Response, status_code: u16) -> String {
    match response.json::<ServerErrorBody>().await.ok() {
        Some(ServerErrorBody::Nested { error }) => error
            .message
            .or(error.code)
            .unwrap_or_else(|| format!("HTTP {status_code}")),
        Some(ServerErrorBody::Flat { message }) => message,
        None => format!("HTTP {status_code}"),
    }
}
