/*
 * Responsibility
 * - URL 構造を定義
 *   - GET /health
 *   - POST /{package.Service}/{Method} → interceptor chain
 * - chain の組み立て (logging → authentication → 必須 permission → procedures)
 */
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};

use crate::api::handlers::{
    health::health,
    identity::{ACCESS_TOKEN, AccessToken, WHO_AM_I, WhoAmI},
    rpc::dispatch,
};
use crate::middleware::{AuthenticationGate, LoggingInterceptor};
use crate::rpc::{Chain, ChainError, Procedures};
use crate::services::auth::{TokenRefresher, TokenVerifier};
use crate::services::cache::CacheClient;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/{*procedure}", post(dispatch))
}

/// Built-in procedures behind a required authentication gate.
///
/// `required_permissions` become unscoped permission gates applied to every
/// procedure.
pub fn build_chain<C: CacheClient>(
    verifier: Arc<dyn TokenVerifier>,
    refresher: Arc<TokenRefresher<C>>,
    legacy_token_header: &str,
    required_permissions: &[String],
) -> Result<Chain, ChainError> {
    let procedures = Procedures::new()
        .route(WHO_AM_I, WhoAmI)
        .route(ACCESS_TOKEN, AccessToken::new(refresher));

    let gate = AuthenticationGate::new(verifier).with_legacy_header(legacy_token_header);

    required_permissions
        .iter()
        .fold(
            Chain::builder().with(LoggingInterceptor).with(gate),
            |builder, permission| builder.require(permission.clone()),
        )
        .handler(procedures)
        .build()
}
