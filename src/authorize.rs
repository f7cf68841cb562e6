//! Authorization helpers for business handlers.
//!
//! Everything here reads the call's recorded authentication. The `Result`
//! returning helpers surface the recorded failure; the plain-value ones
//! (`user_names`, `email`, `has_permission`) treat an unauthenticated call as
//! empty / not permitted.
use serde::Serialize;

use crate::error::AuthError;
use crate::rpc::CallContext;

/// Flattened view of the caller for responses and audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthResult {
    pub user_id: String,
    pub organization: String,
    pub given_name: String,
    pub family_name: String,
    pub email: String,
    pub groups: Vec<String>,
    // org permissions first, then every unit's, deduplicated
    pub permissions: Vec<String>,
}

/// `AuthResult` for the caller, after an unscoped check of `permission`.
///
/// An empty `permission` skips the check.
pub fn authorize_with_details(ctx: &CallContext, permission: &str) -> Result<AuthResult, AuthError> {
    let auth = ctx.auth()?;
    if !permission.is_empty() && !auth.claims.has_permission_anywhere(permission) {
        return Err(AuthError::missing_permission(permission));
    }
    auth_result(ctx)
}

pub fn auth_result(ctx: &CallContext) -> Result<AuthResult, AuthError> {
    let claims = &ctx.auth()?.claims;

    let mut groups: Vec<String> = claims.groups.iter().cloned().collect();
    groups.sort();

    Ok(AuthResult {
        user_id: claims.subject.clone(),
        organization: claims.organization.clone(),
        given_name: claims.userinfo.given_name.clone(),
        family_name: claims.userinfo.family_name.clone(),
        email: claims.userinfo.email.clone(),
        groups,
        permissions: claims.all_permissions(),
    })
}

pub fn organization(ctx: &CallContext) -> Result<String, AuthError> {
    Ok(ctx.auth()?.claims.organization.clone())
}

/// `(given, family)`, empty when unauthenticated.
pub fn user_names(ctx: &CallContext) -> (String, String) {
    match ctx.auth() {
        Ok(auth) => (
            auth.claims.userinfo.given_name.clone(),
            auth.claims.userinfo.family_name.clone(),
        ),
        Err(_) => (String::new(), String::new()),
    }
}

pub fn email(ctx: &CallContext) -> String {
    ctx.auth()
        .map(|auth| auth.claims.userinfo.email.clone())
        .unwrap_or_default()
}

/// Unscoped check; `false` when unauthenticated.
pub fn has_permission(ctx: &CallContext, permission: &str) -> bool {
    ctx.auth()
        .map(|auth| auth.claims.has_permission_anywhere(permission))
        .unwrap_or(false)
}
