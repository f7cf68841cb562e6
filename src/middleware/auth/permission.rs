use async_trait::async_trait;
use tracing::info;

use crate::error::{AuthError, CallError};
use crate::rpc::{CallContext, Interceptor, InterceptorKind, Next, RpcCall, RpcResponse};

/// Requires one permission, either anywhere in the organization or in one unit.
///
/// Fails closed: a context without a successful authentication is
/// `Unauthenticated`, never "no permission needed".
#[derive(Debug, Clone)]
pub struct PermissionGate {
    permission: String,
    unit: Option<String>,
}

impl PermissionGate {
    /// Unscoped: an org grant or a grant in any unit satisfies it.
    pub fn new(permission: impl Into<String>) -> Self {
        Self {
            permission: permission.into(),
            unit: None,
        }
    }

    pub fn in_unit(unit: impl Into<String>, permission: impl Into<String>) -> Self {
        Self {
            permission: permission.into(),
            unit: Some(unit.into()),
        }
    }

    pub fn check(&self, ctx: &CallContext) -> Result<(), CallError> {
        let auth = ctx.auth().map_err(|err| {
            info!(error = %err, permission = %self.permission, "authentication required");
            CallError::unauthenticated(err)
        })?;
        let claims = &auth.claims;

        let granted = match &self.unit {
            Some(unit) => claims.has_permission_in_unit(unit, &self.permission),
            None => claims.has_permission_anywhere(&self.permission),
        };
        if granted {
            return Ok(());
        }

        info!(
            permission = %self.permission,
            unit = ?self.unit,
            user = %claims.subject,
            org = %claims.organization,
            "permission denied"
        );
        let err = match &self.unit {
            Some(unit) => AuthError::missing_unit_permission(unit, &self.permission),
            None => AuthError::missing_permission(&self.permission),
        };
        Err(err.into())
    }
}

#[async_trait]
impl Interceptor for PermissionGate {
    fn kind(&self) -> InterceptorKind {
        InterceptorKind::Authorization
    }

    fn name(&self) -> &'static str {
        "permission"
    }

    async fn handle(
        &self,
        ctx: CallContext,
        call: &RpcCall,
        next: Next<'_>,
    ) -> Result<RpcResponse, CallError> {
        self.check(&ctx)?;
        next.run(ctx, call).await
    }
}
