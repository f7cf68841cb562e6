/*
 * Responsibility
 * - tracing / panic hook の初期化
 * - Config 読み込み → 依存 (validator / refresher / chain) 生成 → Router 組み立て
 * - axum::serve() で起動
 */
use std::{panic, process};

use anyhow::{Context, Result};
use axum::Router;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::middleware::http::HttpLimits;
use crate::services::auth::{build_refresher, build_validator};
use crate::state::AppState;
use crate::{api, middleware};

fn init_tracing() {
    // RUST_LOG wins when set, e.g.
    // RUST_LOG=info,authgate=debug,tower_http=debug cargo run
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_panic_hook(abort_on_panic: bool) {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        // stderr may be hidden depending on how the process is launched
        tracing::error!(?info, "panic");

        if abort_on_panic {
            process::abort();
        } else {
            default_hook(info);
        }
    }))
}

pub async fn run() -> Result<()> {
    init_tracing();
    let config = Config::from_env()?;

    init_panic_hook(!config.app_env.is_production());

    tracing::info!(
        "starting authgate in {:?} mode on {}",
        config.app_env,
        config.addr
    );

    let state = build_state(&config).await?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("bind {}", config.addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Process-lifetime services are built once here and injected into the chain.
async fn build_state(config: &Config) -> Result<AppState> {
    let validator = build_validator(config)?;
    let refresher = build_refresher(config).await?;

    let chain = api::build_chain(
        validator,
        refresher,
        &config.legacy_token_header,
        &config.required_permissions,
    )?;
    tracing::info!(interceptors = ?chain.interceptor_names(), "interceptor chain ready");

    Ok(AppState::new(chain))
}

pub fn build_router(state: AppState) -> Router {
    let router = api::routes().with_state(state);
    middleware::http::apply(router, HttpLimits::default())
}
