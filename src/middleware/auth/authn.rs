/*
 * Responsibility
 * - Bearer token の抽出 (Authorization → legacy header の順)
 * - TokenVerifier による検証と CallContext への記録 (成功・失敗どちらも記録する)
 * - 成功時に user / org を監査 annotation として残す
 *
 * Notes
 * - Required mode: 失敗したらここで Unauthenticated で止める
 * - Optional mode: 失敗を記録したまま次へ進む (後続の PermissionGate が fail closed する)
 */
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::header;
use tracing::{debug, info};

use crate::error::{AuthError, CallError};
use crate::rpc::annotate::{Annotator, SpanAnnotator, annotate_best_effort};
use crate::rpc::{AuthInfo, CallContext, Interceptor, InterceptorKind, Next, RpcCall, RpcResponse};
use crate::services::auth::TokenVerifier;

pub const DEFAULT_LEGACY_TOKEN_HEADER: &str = "x-imid-token";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Required,
    Optional,
}

pub struct AuthenticationGate {
    verifier: Arc<dyn TokenVerifier>,
    annotator: Arc<dyn Annotator>,
    legacy_header: String,
    mode: Mode,
}

impl std::fmt::Debug for AuthenticationGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticationGate")
            .field("legacy_header", &self.legacy_header)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl AuthenticationGate {
    pub fn new(verifier: Arc<dyn TokenVerifier>) -> Self {
        Self {
            verifier,
            annotator: Arc::new(SpanAnnotator),
            legacy_header: DEFAULT_LEGACY_TOKEN_HEADER.to_string(),
            mode: Mode::Required,
        }
    }

    pub fn with_annotator(mut self, annotator: Arc<dyn Annotator>) -> Self {
        self.annotator = annotator;
        self
    }

    pub fn with_legacy_header(mut self, name: impl Into<String>) -> Self {
        self.legacy_header = name.into().to_ascii_lowercase();
        self
    }

    /// Let unauthenticated calls through; the failure stays in the context.
    pub fn optional(mut self) -> Self {
        self.mode = Mode::Optional;
        self
    }

    /// First non-empty token from `Authorization: Bearer ..` or the legacy header.
    pub fn extract_token<'a>(&self, call: &'a RpcCall) -> Option<&'a str> {
        let bearer = call
            .header(header::AUTHORIZATION.as_str())
            .and_then(|value| {
                let (scheme, token) = value.trim().split_once(' ')?;
                scheme.eq_ignore_ascii_case("bearer").then_some(token.trim())
            })
            .filter(|token| !token.is_empty());

        bearer.or_else(|| {
            call.header(&self.legacy_header)
                .map(str::trim)
                .filter(|token| !token.is_empty())
        })
    }

    async fn authenticate(&self, call: &RpcCall) -> Result<AuthInfo, AuthError> {
        let token = self.extract_token(call).ok_or(AuthError::MissingToken)?;
        let claims = self.verifier.validate(token).await?;
        Ok(AuthInfo {
            access_token: token.to_string(),
            claims,
        })
    }
}

#[async_trait]
impl Interceptor for AuthenticationGate {
    fn kind(&self) -> InterceptorKind {
        InterceptorKind::Authentication
    }

    fn name(&self) -> &'static str {
        "authentication"
    }

    async fn handle(
        &self,
        ctx: CallContext,
        call: &RpcCall,
        next: Next<'_>,
    ) -> Result<RpcResponse, CallError> {
        match self.authenticate(call).await {
            Ok(info) => {
                annotate_best_effort(self.annotator.as_ref(), &ctx, "user", &info.claims.subject);
                annotate_best_effort(self.annotator.as_ref(), &ctx, "org", &info.claims.organization);
                debug!(user = %info.claims.subject, org = %info.claims.organization, "authenticated");

                next.run(ctx.with_auth(info), call).await
            }
            Err(err) => {
                match &err {
                    AuthError::MissingToken => info!(procedure = call.procedure(), "no access token in request"),
                    other => info!(procedure = call.procedure(), error = %other, "token validation failed"),
                }

                let ctx = ctx.with_auth_failure(err.clone());
                match self.mode {
                    Mode::Required => Err(err.into()),
                    Mode::Optional => next.run(ctx, call).await,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Code;
    use crate::rpc::annotate::AnnotationError;
    use crate::rpc::{Chain, handler_fn};
    use crate::services::auth::{Claims, Permissions, TokenType, Userinfo};
    use axum::http::HeaderMap;
    use std::sync::Mutex;

    /// Accepts exactly the token "good".
    struct FakeVerifier;

    #[async_trait]
    impl TokenVerifier for FakeVerifier {
        async fn validate(&self, token: &str) -> Result<Claims, AuthError> {
            if token != "good" {
                return Err(AuthError::invalid_token("signature verification failed"));
            }
            Ok(Claims {
                subject: "user-1".into(),
                organization: "acme".into(),
                groups: Default::default(),
                userinfo: Userinfo::default(),
                token_type: TokenType::Access,
                permissions: Permissions::default(),
            })
        }
    }

    #[derive(Default)]
    struct RecordingAnnotator(Mutex<Vec<(String, String)>>);

    impl Annotator for RecordingAnnotator {
        fn annotate(&self, _: &CallContext, key: &str, value: &str) -> Result<(), AnnotationError> {
            self.0.lock().unwrap().push((key.to_string(), value.to_string()));
            Ok(())
        }
    }

    fn call_with(headers: &[(&'static str, &str)]) -> RpcCall {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.insert(*name, value.parse().unwrap());
        }
        RpcCall::new("/test.v1.Svc/Do", map, Default::default())
    }

    fn gate() -> AuthenticationGate {
        AuthenticationGate::new(Arc::new(FakeVerifier))
    }

    /// Echoes the subject seen by the handler, or the auth error message.
    fn chain(gate: AuthenticationGate) -> Chain {
        Chain::builder()
            .with(gate)
            .handler(handler_fn(|ctx: CallContext, _| async move {
                let body = match ctx.auth() {
                    Ok(info) => info.claims.subject.clone(),
                    Err(err) => format!("anonymous: {err}"),
                };
                Ok(RpcResponse::new(body))
            }))
            .build()
            .unwrap()
    }

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        let call = call_with(&[("authorization", "bearer good")]);
        assert_eq!(gate().extract_token(&call), Some("good"));
    }

    #[test]
    fn falls_back_to_legacy_header() {
        let call = call_with(&[("authorization", "Basic Zm9v"), ("x-imid-token", "good")]);
        assert_eq!(gate().extract_token(&call), Some("good"));
    }

    #[test]
    fn empty_bearer_falls_back_to_legacy_header() {
        let call = call_with(&[("authorization", "Bearer  "), ("x-imid-token", "legacy")]);
        assert_eq!(gate().extract_token(&call), Some("legacy"));
    }

    #[test]
    fn bearer_wins_over_legacy_header() {
        let call = call_with(&[("authorization", "Bearer first"), ("x-imid-token", "second")]);
        assert_eq!(gate().extract_token(&call), Some("first"));
    }

    #[test]
    fn custom_legacy_header() {
        let call = call_with(&[("x-old-token", "good")]);
        let gate = gate().with_legacy_header("X-Old-Token");
        assert_eq!(gate.extract_token(&call), Some("good"));
    }

    #[tokio::test]
    async fn missing_token_is_unauthenticated() {
        let err = chain(gate()).call(call_with(&[])).await.unwrap_err();

        assert_eq!(err.code(), Code::Unauthenticated);
        assert_eq!(err.auth(), Some(&AuthError::MissingToken));
    }

    #[tokio::test]
    async fn invalid_token_is_unauthenticated_with_reason() {
        let call = call_with(&[("authorization", "Bearer bad")]);
        let err = chain(gate()).call(call).await.unwrap_err();

        assert_eq!(
            err.auth(),
            Some(&AuthError::invalid_token("signature verification failed"))
        );
    }

    #[tokio::test]
    async fn valid_token_populates_context_and_annotates() {
        let annotator = Arc::new(RecordingAnnotator::default());
        let gate = gate().with_annotator(annotator.clone());

        let call = call_with(&[("authorization", "Bearer good")]);
        let resp = chain(gate).call(call).await.unwrap();

        assert_eq!(resp.body, "user-1");
        assert_eq!(
            *annotator.0.lock().unwrap(),
            vec![
                ("user".to_string(), "user-1".to_string()),
                ("org".to_string(), "acme".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn optional_mode_records_failure_and_continues() {
        let resp = chain(gate().optional()).call(call_with(&[])).await.unwrap();
        assert_eq!(resp.body, "anonymous: authentication required");
    }
}
