use std::sync::Arc;

use async_trait::async_trait;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use tracing::{debug, warn};

use crate::error::AuthError;
use crate::services::auth::claims::{Claims, TokenType};
use crate::services::auth::keys::KeyCache;

/// Anything that turns a bearer token string into verified [`Claims`].
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn validate(&self, token: &str) -> Result<Claims, AuthError>;
}

/// Knobs for [`TokenValidator`].
#[derive(Debug, Clone)]
pub struct ValidatorOptions {
    // Allowed clock skew for exp/nbf, seconds.
    pub leeway_seconds: u64,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    // Fall back to a stale key set when a refresh fails.
    pub allow_stale_keys: bool,
    // Reject tokens whose `ntt` differs.
    pub required_token_type: Option<TokenType>,
    pub algorithms: Vec<Algorithm>,
}

impl Default for ValidatorOptions {
    fn default() -> Self {
        Self {
            leeway_seconds: 60,
            issuer: None,
            audience: None,
            allow_stale_keys: false,
            required_token_type: None,
            algorithms: vec![
                Algorithm::RS256,
                Algorithm::RS384,
                Algorithm::RS512,
                Algorithm::ES256,
                Algorithm::ES384,
                Algorithm::EdDSA,
            ],
        }
    }
}

/// Bearer token verifier.
///
/// Signature against the key cache, then `exp`/`nbf`, then the claim mapping.
/// Unknown claims are ignored.
#[derive(Clone)]
pub struct TokenValidator {
    keys: Arc<KeyCache>,
    options: ValidatorOptions,
}

impl std::fmt::Debug for TokenValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Do not print key material
        f.debug_struct("TokenValidator")
            .field("options", &self.options)
            .finish()
    }
}

impl TokenValidator {
    pub fn new(keys: Arc<KeyCache>, options: ValidatorOptions) -> Self {
        Self { keys, options }
    }

    pub fn options(&self) -> &ValidatorOptions {
        &self.options
    }

    /// Verify `token` and map it into [`Claims`].
    pub async fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        let header = jsonwebtoken::decode_header(token).map_err(|e| {
            debug!(error = %e, "malformed token header");
            AuthError::invalid_token("malformed token")
        })?;

        if !self.options.algorithms.contains(&header.alg) {
            return Err(AuthError::invalid_token(format!(
                "unsupported algorithm {:?}",
                header.alg
            )));
        }

        let keys = self.key_set().await?;
        let jwk = match select_key(&keys, header.kid.as_deref()) {
            Some(jwk) => jwk.clone(),
            None => self.rotated_key(header.kid.as_deref()).await?,
        };

        let decoding_key = DecodingKey::from_jwk(&jwk).map_err(|e| {
            warn!(error = %e, kid = ?header.kid, "unusable verification key");
            AuthError::invalid_token("unusable verification key")
        })?;

        let validation = self.validation(header.alg);
        let data = jsonwebtoken::decode::<Claims>(token, &decoding_key, &validation)
            .map_err(map_jwt_error)?;

        self.check_claims(data.claims)
    }

    fn validation(&self, alg: Algorithm) -> Validation {
        let mut validation = Validation::new(alg);
        validation.leeway = self.options.leeway_seconds;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_required_spec_claims(&["exp", "sub"]);

        if let Some(issuer) = &self.options.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &self.options.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        validation
    }

    fn check_claims(&self, claims: Claims) -> Result<Claims, AuthError> {
        if claims.subject.trim().is_empty() {
            return Err(AuthError::invalid_token("empty 'sub' claim"));
        }
        if claims.organization.trim().is_empty() {
            return Err(AuthError::invalid_token("empty 'org' claim"));
        }
        if let Some(required) = self.options.required_token_type {
            if claims.token_type != required {
                return Err(AuthError::invalid_token(format!(
                    "unexpected token type {:?}",
                    claims.token_type
                )));
            }
        }

        Ok(claims)
    }

    async fn key_set(&self) -> Result<Arc<JwkSet>, AuthError> {
        match self.keys.get().await {
            Ok(keys) => Ok(keys),
            Err(err) if self.options.allow_stale_keys => match self.keys.stale().await {
                Some(keys) => {
                    warn!(error = %err, "key refresh failed; validating against stale keys");
                    Ok(keys)
                }
                None => Err(err),
            },
            Err(err) => Err(err),
        }
    }

    async fn rotated_key(&self, kid: Option<&str>) -> Result<Jwk, AuthError> {
        let Some(kid) = kid else {
            return Err(AuthError::invalid_token("token has no key id"));
        };

        // A rate-limited refresh still hands back the current set, which a
        // concurrent caller may have just updated.
        let keys = self.keys.refresh_for_unknown_kid().await?;
        keys.as_deref()
            .and_then(|keys| select_key(keys, Some(kid)))
            .cloned()
            .ok_or_else(|| AuthError::invalid_token(format!("unknown signing key '{kid}'")))
    }
}

#[async_trait]
impl TokenVerifier for TokenValidator {
    async fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        TokenValidator::validate(self, token).await
    }
}

// Without a kid we only accept an unambiguous single-key set.
fn select_key<'a>(keys: &'a JwkSet, kid: Option<&str>) -> Option<&'a Jwk> {
    match kid {
        Some(kid) => keys.find(kid),
        None if keys.keys.len() == 1 => keys.keys.first(),
        None => None,
    }
}

fn map_jwt_error(e: jsonwebtoken::errors::Error) -> AuthError {
    let reason = match e.kind() {
        ErrorKind::ExpiredSignature => "token expired".to_string(),
        ErrorKind::ImmatureSignature => "token not yet valid".to_string(),
        ErrorKind::InvalidSignature => "signature verification failed".to_string(),
        ErrorKind::MissingRequiredClaim(claim) => format!("missing required claim '{claim}'"),
        ErrorKind::InvalidIssuer => "issuer mismatch".to_string(),
        ErrorKind::InvalidAudience => "audience mismatch".to_string(),
        ErrorKind::InvalidAlgorithm => "algorithm does not match key".to_string(),
        ErrorKind::Json(err) => format!("invalid claim set: {err}"),
        _ => "malformed token".to_string(),
    };
    debug!(error = %e, reason = %reason, "token rejected");
    AuthError::InvalidToken(reason)
}
