/*
 * Responsibility
 * - 1 call 分の認証結果 (AuthInfo もしくは失敗理由) を運ぶ CallContext
 * - gate が一度だけ書き込み、以降の interceptor/handler は読み取るだけ
 *
 * Notes
 * - 「認証されていない」と「認証に失敗した」を区別する (どちらも認可失敗として扱う)
 */
use std::sync::Arc;

use tracing::Span;

use crate::error::AuthError;
use crate::services::auth::Claims;

/// Bearer token plus the claims it was validated into.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthInfo {
    pub access_token: String,
    pub claims: Claims,
}

impl std::fmt::Debug for AuthInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Do not print the credential
        f.debug_struct("AuthInfo")
            .field("claims", &self.claims)
            .finish_non_exhaustive()
    }
}

/// Per-call context threaded through the interceptor chain.
///
/// Never mutated in place: `with_auth*` consume the context and return the
/// augmented one.
#[derive(Clone, Debug)]
pub struct CallContext {
    span: Span,
    auth: Option<Result<Arc<AuthInfo>, AuthError>>,
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new(Span::none())
    }
}

impl CallContext {
    pub fn new(span: Span) -> Self {
        Self { span, auth: None }
    }

    /// The call's `rpc` span; audit annotations are recorded here.
    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn with_auth(self, info: AuthInfo) -> Self {
        self.with_auth_outcome(Ok(info))
    }

    pub fn with_auth_failure(self, err: AuthError) -> Self {
        self.with_auth_outcome(Err(err))
    }

    pub fn with_auth_outcome(self, outcome: Result<AuthInfo, AuthError>) -> Self {
        Self {
            auth: Some(outcome.map(Arc::new)),
            ..self
        }
    }

    /// The validated identity, the recorded failure, or `NoAuthInContext`.
    pub fn auth(&self) -> Result<&AuthInfo, AuthError> {
        match &self.auth {
            Some(Ok(info)) => Ok(info.as_ref()),
            Some(Err(err)) => Err(err.clone()),
            None => Err(AuthError::NoAuthInContext),
        }
    }

    /// Whether an authentication gate has run for this call (successfully or not).
    pub fn auth_attempted(&self) -> bool {
        self.auth.is_some()
    }
}

/// Record an authentication outcome; returns the augmented context.
pub fn set_auth(ctx: CallContext, outcome: Result<AuthInfo, AuthError>) -> CallContext {
    ctx.with_auth_outcome(outcome)
}

/// Read the authentication outcome recorded for this call.
pub fn get_auth(ctx: &CallContext) -> Result<&AuthInfo, AuthError> {
    ctx.auth()
}
