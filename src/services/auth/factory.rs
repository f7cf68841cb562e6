/// Factory: build the process-lifetime auth services from application `Config`.
use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::error::AuthError;
use crate::services::auth::{
    HttpKeySource, HttpTokenIssuer, KeyCache, TokenRefresher, TokenValidator, ValidatorOptions,
};
use crate::services::cache::{AnyCache, CacheError, MemoryCache, ValkeyClient};

pub fn build_validator(config: &Config) -> Result<Arc<TokenValidator>, AuthError> {
    let source = HttpKeySource::new(config.jwks_url.clone(), config.http_timeout)?;
    let keys = Arc::new(KeyCache::new(Arc::new(source), config.jwks_ttl));

    let options = ValidatorOptions {
        leeway_seconds: config.leeway_seconds,
        issuer: config.issuer.clone(),
        audience: config.audience.clone(),
        allow_stale_keys: config.allow_stale_keys,
        ..ValidatorOptions::default()
    };

    info!(
        jwks_url = %config.jwks_url,
        ttl_seconds = config.jwks_ttl.as_secs(),
        allow_stale_keys = config.allow_stale_keys,
        "token validator configured"
    );

    Ok(Arc::new(TokenValidator::new(keys, options)))
}

pub async fn build_refresher(config: &Config) -> anyhow::Result<Arc<TokenRefresher<AnyCache>>> {
    let issuer = HttpTokenIssuer::new(config.token_url.clone(), config.http_timeout)?;

    let cache = match config.refresh_cache_url.as_deref() {
        Some(url) => AnyCache::Valkey(ValkeyClient::new(url).await.map_err(|e: CacheError| {
            anyhow::anyhow!("refresh cache backend unavailable: {e}")
        })?),
        None => AnyCache::Memory(MemoryCache::new()),
    };

    let refresher = TokenRefresher::new(Arc::new(issuer), cache, config.refresh_buffer);

    info!(
        token_url = %config.token_url,
        refresher = ?refresher,
        "token refresher configured"
    );

    Ok(Arc::new(refresher))
}
