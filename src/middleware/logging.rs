use std::time::Instant;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::CallError;
use crate::middleware::http::REQUEST_ID_HEADER;
use crate::rpc::{CallContext, Interceptor, InterceptorKind, Next, RpcCall, RpcResponse};

/// Logs the start and outcome of every call with its duration.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingInterceptor;

#[async_trait]
impl Interceptor for LoggingInterceptor {
    fn kind(&self) -> InterceptorKind {
        InterceptorKind::Observability
    }

    fn name(&self) -> &'static str {
        "logging"
    }

    async fn handle(
        &self,
        ctx: CallContext,
        call: &RpcCall,
        next: Next<'_>,
    ) -> Result<RpcResponse, CallError> {
        let (service, method) = call.service_and_method();
        let request_id = call.header(REQUEST_ID_HEADER).unwrap_or("-");
        let started = Instant::now();

        info!(service, method, request_id, "rpc started");
        let result = next.run(ctx, call).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(_) => info!(service, method, request_id, duration_ms, "rpc completed"),
            Err(err) => warn!(
                service,
                method,
                request_id,
                duration_ms,
                code = %err.code(),
                error = %err,
                "rpc failed"
            ),
        }

        result
    }
}
