//! Bearer-token authentication and permission gates for RPC services.
//!
//! A [`rpc::Chain`] runs each call through interceptors: an
//! [`middleware::AuthenticationGate`] validates the caller's token against a
//! cached JWKS and records the outcome in the call's [`rpc::CallContext`];
//! [`middleware::PermissionGate`]s then check org- or unit-scoped permissions.
//! [`services::auth::TokenRefresher`] caches access tokens minted from identity
//! tokens.
pub mod api;
pub mod app;
pub mod authorize;
pub mod config;
pub mod error;
pub mod middleware;
pub mod rpc;
pub mod services;
pub mod state;

pub use error::{AuthError, CallError, Code, Status};
