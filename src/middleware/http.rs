//! HTTP-level layers in front of the RPC adapter.
//!
//! Responsibility:
//! - Request-Id generation + propagation (`x-request-id`); the id reaches the
//!   chain as an ordinary header
//! - Access logging (TraceLayer)
//! - Body size limit and a global timeout, reported with the same JSON error
//!   body the chain uses

use std::time::Duration;

use axum::error_handling::HandleErrorLayer;
use axum::http::header::HeaderName;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use tower::timeout::TimeoutLayer;
use tower::{BoxError, ServiceBuilder};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::error::{Code, ErrorBody};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Clone, Copy)]
pub struct HttpLimits {
    pub body_bytes: usize,
    pub timeout: Duration,
}

impl Default for HttpLimits {
    fn default() -> Self {
        Self {
            body_bytes: 1024 * 1024,
            timeout: Duration::from_secs(30),
        }
    }
}

async fn layer_error(err: BoxError) -> Response {
    let (code, message) = if err.is::<tower::timeout::error::Elapsed>() {
        (Code::Unavailable, "request timed out".to_string())
    } else {
        warn!(error = %err, "unhandled middleware error");
        (Code::Internal, "internal error".to_string())
    };

    (code.http_status(), Json(ErrorBody { code, message })).into_response()
}

pub fn apply(router: Router, limits: HttpLimits) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    let layers = ServiceBuilder::new()
        .layer(HandleErrorLayer::new(layer_error))
        .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
        .layer(PropagateRequestIdLayer::new(request_id))
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(limits.body_bytes))
        .layer(TimeoutLayer::new(limits.timeout));

    router.layer(layers)
}
