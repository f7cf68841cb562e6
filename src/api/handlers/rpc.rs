/*
 * Responsibility
 * - POST /{package.Service}/{Method} を RpcCall に変換して chain に流す
 * - 成功: handler の body / headers をそのまま返す
 * - 失敗: CallError の JSON ({code, message}) と対応する HTTP status
 */
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
};

use crate::rpc::RpcCall;
use crate::state::AppState;

pub async fn dispatch(
    State(state): State<AppState>,
    Path(procedure): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let call = RpcCall::new(format!("/{procedure}"), headers, body);

    match state.chain.call(call).await {
        Ok(resp) => (resp.headers, resp.body).into_response(),
        Err(err) => err.into_response(),
    }
}
