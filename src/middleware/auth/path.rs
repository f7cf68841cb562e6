use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{AuthError, CallError};
use crate::rpc::{CallContext, Interceptor, InterceptorKind, Next, RpcCall, RpcResponse};

#[derive(Debug, Clone)]
pub struct PathRule {
    pub prefix: String,
    pub permissions: Vec<String>,
}

/// Per-procedure-prefix permission requirements.
///
/// The first rule whose prefix matches decides; every permission it lists
/// must be held at organization scope. No match lets the call through.
#[derive(Debug, Clone, Default)]
pub struct PathPermissionGate {
    rules: Vec<PathRule>,
}

impl PathPermissionGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule<I, S>(mut self, prefix: impl Into<String>, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rules.push(PathRule {
            prefix: prefix.into(),
            permissions: permissions.into_iter().map(Into::into).collect(),
        });
        self
    }

    fn matching(&self, procedure: &str) -> Option<&PathRule> {
        self.rules
            .iter()
            .find(|rule| procedure.starts_with(&rule.prefix))
    }

    pub fn check(&self, ctx: &CallContext, procedure: &str) -> Result<(), CallError> {
        let Some(rule) = self.matching(procedure) else {
            debug!(procedure, "no permission rule matched");
            return Ok(());
        };

        let auth = ctx.auth().map_err(CallError::unauthenticated)?;
        match rule
            .permissions
            .iter()
            .find(|p| !auth.claims.has_permission(p))
        {
            None => Ok(()),
            Some(missing) => {
                info!(
                    procedure,
                    prefix = %rule.prefix,
                    permission = %missing,
                    user = %auth.claims.subject,
                    "permission denied"
                );
                Err(AuthError::missing_permission(missing).into())
            }
        }
    }
}

#[async_trait]
impl Interceptor for PathPermissionGate {
    fn kind(&self) -> InterceptorKind {
        InterceptorKind::Authorization
    }

    fn name(&self) -> &'static str {
        "path_permission"
    }

    async fn handle(
        &self,
        ctx: CallContext,
        call: &RpcCall,
        next: Next<'_>,
    ) -> Result<RpcResponse, CallError> {
        self.check(&ctx, call.procedure())?;
        next.run(ctx, call).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::AuthInfo;
    use crate::services::auth::{Claims, Permissions, TokenType, Userinfo};

    fn ctx(org: &[&str]) -> CallContext {
        CallContext::default().with_auth(AuthInfo {
            access_token: "t".into(),
            claims: Claims {
                subject: "user-1".into(),
                organization: "acme".into(),
                groups: Default::default(),
                userinfo: Userinfo::default(),
                token_type: TokenType::Access,
                permissions: Permissions {
                    org: org.iter().map(|p| p.to_string()).collect(),
                    units: Default::default(),
                },
            },
        })
    }

    fn gate() -> PathPermissionGate {
        PathPermissionGate::new()
            .rule("/cms.v1.AdminService/", ["admin:manage", "content:read"])
            .rule("/cms.v1.", ["content:read"])
    }

    #[test]
    fn first_matching_rule_applies() {
        let reader = ctx(&["content:read"]);

        assert!(gate().check(&reader, "/cms.v1.ArticleService/Get").is_ok());
        assert_eq!(
            gate()
                .check(&reader, "/cms.v1.AdminService/Purge")
                .unwrap_err(),
            CallError::Auth(AuthError::missing_permission("admin:manage"))
        );
    }

    #[test]
    fn all_listed_permissions_are_required() {
        let admin_only = ctx(&["admin:manage"]);
        assert_eq!(
            gate()
                .check(&admin_only, "/cms.v1.AdminService/Purge")
                .unwrap_err(),
            CallError::Auth(AuthError::missing_permission("content:read"))
        );
    }

    #[test]
    fn unmatched_procedure_passes_even_without_auth() {
        assert!(gate()
            .check(&CallContext::default(), "/other.v1.Svc/Do")
            .is_ok());
    }

    #[test]
    fn matched_procedure_without_auth_is_unauthenticated() {
        assert_eq!(
            gate()
                .check(&CallContext::default(), "/cms.v1.ArticleService/Get")
                .unwrap_err(),
            CallError::Auth(AuthError::NoAuthInContext)
        );
    }

    #[test]
    fn recorded_outage_on_matched_procedure_is_unauthenticated() {
        let ctx = CallContext::default()
            .with_auth_failure(AuthError::TokenIssuanceFailure("issuer down".into()));
        let err = gate()
            .check(&ctx, "/cms.v1.ArticleService/Get")
            .unwrap_err();

        assert_eq!(err.code(), crate::error::Code::Unauthenticated);
        assert_eq!(
            err,
            CallError::Unauthenticated(AuthError::TokenIssuanceFailure("issuer down".into()))
        );
    }
}
