/*
 * Responsibility
 * - middleware の公開インターフェース (re-export)
 *   - rpc interceptor: 認証 / 認可 / logging
 *   - HTTP layer: request-id / limit / timeout / trace
 */
pub mod auth;
pub mod http;
pub mod logging;

pub use auth::{AuthenticationGate, PathPermissionGate, PermissionGate};
pub use logging::LoggingInterceptor;
