//! Token issuance collaborator: exchanges an identity token for a short-lived access token.
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::error::AuthError;

/// Access token as reported by the issuer.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct IssuedToken {
    pub access_token: String,
    // Lifetime in seconds from issuance.
    pub expires_in: u64,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl std::fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedToken")
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait TokenIssuer: Send + Sync {
    async fn issue_access_token(&self, identity_token: &str) -> Result<IssuedToken, AuthError>;
}

/// `POST {token_url}` with `Authorization: Bearer <identity token>`.
#[derive(Clone, Debug)]
pub struct HttpTokenIssuer {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpTokenIssuer {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::TokenIssuanceFailure(format!("http client: {e}")))?;

        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl TokenIssuer for HttpTokenIssuer {
    async fn issue_access_token(&self, identity_token: &str) -> Result<IssuedToken, AuthError> {
        debug!(endpoint = %self.endpoint, "requesting access token");

        let resp = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(identity_token)
            .send()
            .await
            .map_err(|e| AuthError::TokenIssuanceFailure(format!("{}: {e}", self.endpoint)))?;

        let status = resp.status();
        if !status.is_success() {
            warn!(status = %status, "access token request rejected");
            return Err(AuthError::TokenIssuanceFailure(format!(
                "{} returned {status}",
                self.endpoint
            )));
        }

        let issued = resp
            .json::<IssuedToken>()
            .await
            .map_err(|e| AuthError::TokenIssuanceFailure(format!("invalid token response: {e}")))?;

        if issued.access_token.is_empty() {
            return Err(AuthError::TokenIssuanceFailure(
                "empty access token in response".into(),
            ));
        }

        Ok(issued)
    }
}
