//! Remote source of the published verification key document (JWKS).
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use tracing::debug;
use url::Url;

use crate::error::AuthError;

/// Fetches the current key set on demand.
///
/// Implementations perform exactly one attempt per call; retry policy belongs
/// to whoever calls the cache.
#[async_trait]
pub trait KeySource: Send + Sync {
    async fn fetch(&self) -> Result<JwkSet, AuthError>;
}

/// HTTP(S) key source backed by `reqwest`.
#[derive(Clone, Debug)]
pub struct HttpKeySource {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpKeySource {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::KeyFetchFailure(format!("http client: {e}")))?;

        Ok(Self::with_client(client, endpoint))
    }

    pub fn with_client(client: reqwest::Client, endpoint: Url) -> Self {
        Self { client, endpoint }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl KeySource for HttpKeySource {
    async fn fetch(&self) -> Result<JwkSet, AuthError> {
        debug!(endpoint = %self.endpoint, "fetching verification keys");

        let resp = self
            .client
            .get(self.endpoint.clone())
            .send()
            .await
            .map_err(|e| AuthError::KeyFetchFailure(format!("{}: {e}", self.endpoint)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AuthError::KeyFetchFailure(format!(
                "{} returned {status}",
                self.endpoint
            )));
        }

        resp.json::<JwkSet>()
            .await
            .map_err(|e| AuthError::KeyFetchFailure(format!("invalid key document: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetches_and_parses_the_key_document() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "keys": [{
                    "kty": "OKP",
                    "crv": "Ed25519",
                    "x": "2kfW5G6jja3x5yjniFphFbuBaGFC8qPShgz1fv3YeTI",
                    "kid": "k1",
                    "alg": "EdDSA",
                    "use": "sig"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let endpoint = Url::parse(&format!("{}/v1/jwks", server.uri())).unwrap();
        let source = HttpKeySource::new(endpoint, Duration::from_secs(5)).unwrap();

        let set = source.fetch().await.expect("key set");
        assert_eq!(set.keys.len(), 1);
        assert!(set.find("k1").is_some());
    }

    #[tokio::test]
    async fn non_success_status_is_a_fetch_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let endpoint = Url::parse(&format!("{}/v1/jwks", server.uri())).unwrap();
        let source = HttpKeySource::new(endpoint, Duration::from_secs(5)).unwrap();

        let err = source.fetch().await.unwrap_err();
        assert!(matches!(err, AuthError::KeyFetchFailure(_)));
    }

    #[tokio::test]
    async fn garbage_body_is_a_fetch_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let endpoint = Url::parse(&server.uri()).unwrap();
        let source = HttpKeySource::new(endpoint, Duration::from_secs(5)).unwrap();

        let err = source.fetch().await.unwrap_err();
        assert!(matches!(err, AuthError::KeyFetchFailure(_)));
    }
}
