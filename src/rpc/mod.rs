/*
 * Responsibility
 * - transport 非依存の RPC 呼び出しモデル (call / context / chain / router)
 * - 監査用 annotation の出力先 (Annotator)
 */
pub mod annotate;
pub mod call;
pub mod chain;
pub mod context;
pub mod router;

pub use annotate::{Annotator, NoopAnnotator, SpanAnnotator};
pub use call::{RpcCall, RpcResponse};
pub use chain::{Chain, ChainBuilder, ChainError, Handler, Interceptor, InterceptorKind, Next, handler_fn};
pub use context::{AuthInfo, CallContext, get_auth, set_auth};
pub use router::Procedures;
