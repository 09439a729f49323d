//! HTTP client for the remote authorization endpoint.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::ACCEPT;
use serde::Deserialize;
use url::Url;

use super::cache::{CredentialRefreshError, CredentialSource, FetchedCredential};

/// Default bound on one authorization request.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Where and how to request the outbound credential.
#[derive(Debug, Clone)]
pub struct ExternalAuthConfig {
    pub auth_url: Url,
    /// Long-lived client secret presented to the authorization endpoint.
    pub auth_key: String,
    pub scope: String,
    pub timeout: Duration,
    /// Extra PEM root certificate(s) to trust.
    pub ca_bundle: Option<PathBuf>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Seconds until the token expires
    expires_in: u64,
}

/// Fetches credentials with a form `POST` carrying the client secret.
pub struct HttpCredentialSource {
    client: reqwest::Client,
    auth_url: Url,
    auth_key: String,
    scope: String,
}

impl HttpCredentialSource {
    pub fn new(config: &ExternalAuthConfig) -> Result<Self, CredentialRefreshError> {
        let mut builder = reqwest::Client::builder().timeout(config.timeout);

        if let Some(path) = &config.ca_bundle {
            let pem = std::fs::read(path).map_err(|e| {
                CredentialRefreshError::Transport(format!(
                    "failed to read CA bundle {}: {e}",
                    path.display()
                ))
            })?;
            for certificate in reqwest::Certificate::from_pem_bundle(&pem)
                .map_err(|e| CredentialRefreshError::Transport(format!("invalid CA bundle: {e}")))?
            {
                builder = builder.add_root_certificate(certificate);
            }
        }

        let client = builder.build().map_err(|e| {
            CredentialRefreshError::Transport(format!("failed to create HTTP client: {e}"))
        })?;

        Ok(Self {
            client,
            auth_url: config.auth_url.clone(),
            auth_key: config.auth_key.clone(),
            scope: config.scope.clone(),
        })
    }
}

impl CredentialSource for HttpCredentialSource {
    async fn fetch(&self) -> Result<FetchedCredential, CredentialRefreshError> {
        let response = self
            .client
            .post(self.auth_url.clone())
            .bearer_auth(&self.auth_key)
            .header(ACCEPT, "application/json")
            .header("RqUID", uuid::Uuid::new_v4().to_string())
            .form(&[("scope", self.scope.as_str())])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CredentialRefreshError::Timeout
                } else {
                    CredentialRefreshError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CredentialRefreshError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| CredentialRefreshError::Malformed(e.to_string()))?;

        if token.access_token.is_empty() {
            return Err(CredentialRefreshError::Malformed(
                "empty access_token".to_string(),
            ));
        }

        Ok(FetchedCredential {
            bearer: token.access_token,
            expires_in: Duration::from_secs(token.expires_in),
        })
    }
}
