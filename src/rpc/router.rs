use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{CallError, Status};
use crate::rpc::call::{RpcCall, RpcResponse};
use crate::rpc::chain::Handler;
use crate::rpc::context::CallContext;

/// Dispatches to a handler by full procedure name.
///
/// Unknown procedures fail with `Unimplemented`.
#[derive(Default, Clone)]
pub struct Procedures {
    routes: HashMap<String, Arc<dyn Handler>>,
}

impl std::fmt::Debug for Procedures {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("Procedures").field("routes", &names).finish()
    }
}

impl Procedures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route<H: Handler + 'static>(mut self, procedure: impl Into<String>, handler: H) -> Self {
        self.routes.insert(procedure.into(), Arc::new(handler));
        self
    }

    pub fn contains(&self, procedure: &str) -> bool {
        self.routes.contains_key(procedure)
    }
}

#[async_trait]
impl Handler for Procedures {
    async fn call(&self, ctx: CallContext, call: &RpcCall) -> Result<RpcResponse, CallError> {
        match self.routes.get(call.procedure()) {
            Some(handler) => handler.call(ctx, call).await,
            None => Err(Status::unimplemented(call.procedure()).into()),
        }
    }
}
