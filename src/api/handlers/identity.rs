/*
 * Responsibility
 * - 組み込み procedure (authgate.v1.IdentityService)
 *   - WhoAmI: 呼び出し元の AuthResult を返す
 *   - AccessToken: 呼び出し元の identity token から access token を発行 (refresh cache 経由)
 */
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::authorize::auth_result;
use crate::error::{CallError, Status};
use crate::rpc::{CallContext, Handler, RpcCall, RpcResponse};
use crate::services::auth::TokenRefresher;
use crate::services::cache::CacheClient;

pub const WHO_AM_I: &str = "/authgate.v1.IdentityService/WhoAmI";
pub const ACCESS_TOKEN: &str = "/authgate.v1.IdentityService/AccessToken";

fn json<T: Serialize>(value: &T) -> Result<RpcResponse, CallError> {
    RpcResponse::json(value).map_err(|e| Status::internal(format!("encode response: {e}")).into())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WhoAmI;

#[async_trait]
impl Handler for WhoAmI {
    async fn call(&self, ctx: CallContext, _: &RpcCall) -> Result<RpcResponse, CallError> {
        json(&auth_result(&ctx)?)
    }
}

#[derive(Serialize)]
struct AccessTokenResponse<'a> {
    access_token: &'a str,
}

/// Exchanges the caller's presented token for a cached access token.
pub struct AccessToken<C: CacheClient> {
    refresher: Arc<TokenRefresher<C>>,
}

impl<C: CacheClient> AccessToken<C> {
    pub fn new(refresher: Arc<TokenRefresher<C>>) -> Self {
        Self { refresher }
    }
}

#[async_trait]
impl<C: CacheClient> Handler for AccessToken<C> {
    async fn call(&self, ctx: CallContext, _: &RpcCall) -> Result<RpcResponse, CallError> {
        let identity_token = ctx.auth()?.access_token.clone();
        let access_token = self.refresher.get_access_token(&identity_token).await?;

        json(&AccessTokenResponse {
            access_token: &access_token,
        })
    }
}
