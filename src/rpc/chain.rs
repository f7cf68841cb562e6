/*
 * Responsibility
 * - Interceptor / Handler trait と、それらを順に呼ぶ Chain
 * - ChainBuilder が構築時に順序ルールを検証する
 *   - Authentication は Authorization より前 / Authentication は 1 つまで / handler 必須
 *
 * Notes
 * - 1 call = 1 "rpc" span。user/org はここでは空で宣言し、認証後に記録する
 */
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{Instrument, field};

use crate::error::CallError;
use crate::middleware::auth::PermissionGate;
use crate::rpc::call::{RpcCall, RpcResponse};
use crate::rpc::context::CallContext;

/// Role of an interceptor; the builder orders the chain by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptorKind {
    Authentication,
    Authorization,
    Observability,
}

#[async_trait]
pub trait Interceptor: Send + Sync {
    fn kind(&self) -> InterceptorKind;

    fn name(&self) -> &'static str;

    /// Either short-circuit with an error or call `next.run(..)`.
    async fn handle(
        &self,
        ctx: CallContext,
        call: &RpcCall,
        next: Next<'_>,
    ) -> Result<RpcResponse, CallError>;
}

/// Business handler at the end of the chain.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, ctx: CallContext, call: &RpcCall) -> Result<RpcResponse, CallError>;
}

/// Handler backed by an async closure.
pub struct FnHandler<F>(F);

pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(CallContext, RpcCall) -> Fut + Send + Sync,
    Fut: Future<Output = Result<RpcResponse, CallError>> + Send,
{
    FnHandler(f)
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(CallContext, RpcCall) -> Fut + Send + Sync,
    Fut: Future<Output = Result<RpcResponse, CallError>> + Send,
{
    async fn call(&self, ctx: CallContext, call: &RpcCall) -> Result<RpcResponse, CallError> {
        (self.0)(ctx, call.clone()).await
    }
}

/// The remainder of the chain after the current interceptor.
pub struct Next<'a> {
    rest: &'a [Arc<dyn Interceptor>],
    handler: &'a dyn Handler,
}

impl Next<'_> {
    pub async fn run(self, ctx: CallContext, call: &RpcCall) -> Result<RpcResponse, CallError> {
        match self.rest.split_first() {
            Some((current, rest)) => {
                let next = Next {
                    rest,
                    handler: self.handler,
                };
                current.handle(ctx, call, next).await
            }
            None => self.handler.call(ctx, call).await,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("authorization interceptor '{name}' at position {position} has no authentication interceptor before it")]
    AuthorizationBeforeAuthentication { name: &'static str, position: usize },
    #[error("more than one authentication interceptor ('{name}' at position {position})")]
    DuplicateAuthentication { name: &'static str, position: usize },
    #[error("chain has no handler")]
    MissingHandler,
}

/// An ordered, validated list of interceptors in front of one handler.
pub struct Chain {
    interceptors: Vec<Arc<dyn Interceptor>>,
    handler: Arc<dyn Handler>,
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.interceptors.iter().map(|i| i.name()).collect();
        f.debug_struct("Chain")
            .field("interceptors", &names)
            .finish_non_exhaustive()
    }
}

impl Chain {
    pub fn builder() -> ChainBuilder {
        ChainBuilder::default()
    }

    /// Run one call through the chain inside its own `rpc` span.
    pub async fn call(&self, call: RpcCall) -> Result<RpcResponse, CallError> {
        let (service, method) = call.service_and_method();
        let span = tracing::info_span!(
            "rpc",
            procedure = %call.procedure(),
            service = %service,
            method = %method,
            user = field::Empty,
            org = field::Empty,
        );

        let ctx = CallContext::new(span.clone());
        self.call_with_context(ctx, &call).instrument(span).await
    }

    /// Run with a caller-built context (no new span).
    pub async fn call_with_context(
        &self,
        ctx: CallContext,
        call: &RpcCall,
    ) -> Result<RpcResponse, CallError> {
        let next = Next {
            rest: &self.interceptors,
            handler: self.handler.as_ref(),
        };
        next.run(ctx, call).await
    }

    pub fn interceptor_names(&self) -> Vec<&'static str> {
        self.interceptors.iter().map(|i| i.name()).collect()
    }
}

#[derive(Default)]
pub struct ChainBuilder {
    interceptors: Vec<Arc<dyn Interceptor>>,
    handler: Option<Arc<dyn Handler>>,
}

impl ChainBuilder {
    pub fn with<I: Interceptor + 'static>(self, interceptor: I) -> Self {
        self.with_arc(Arc::new(interceptor))
    }

    pub fn with_arc(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Append an unscoped permission gate.
    pub fn require(self, permission: impl Into<String>) -> Self {
        self.with(PermissionGate::new(permission))
    }

    /// Append a permission gate scoped to `unit`.
    pub fn require_in_unit(self, unit: impl Into<String>, permission: impl Into<String>) -> Self {
        self.with(PermissionGate::in_unit(unit, permission))
    }

    pub fn handler<H: Handler + 'static>(mut self, handler: H) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn build(self) -> Result<Chain, ChainError> {
        let mut authenticated = false;
        for (position, interceptor) in self.interceptors.iter().enumerate() {
            match interceptor.kind() {
                InterceptorKind::Authentication if authenticated => {
                    return Err(ChainError::DuplicateAuthentication {
                        name: interceptor.name(),
                        position,
                    });
                }
                InterceptorKind::Authentication => authenticated = true,
                InterceptorKind::Authorization if !authenticated => {
                    return Err(ChainError::AuthorizationBeforeAuthentication {
                        name: interceptor.name(),
                        position,
                    });
                }
                InterceptorKind::Authorization | InterceptorKind::Observability => {}
            }
        }

        let handler = self.handler.ok_or(ChainError::MissingHandler)?;
        Ok(Chain {
            interceptors: self.interceptors,
            handler,
        })
    }
}
