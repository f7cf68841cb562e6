/*
 * Responsibility
 * - 認証 gate (AuthenticationGate) と認可 gate (PermissionGate / PathPermissionGate)
 */
pub mod authn;
pub mod path;
pub mod permission;

pub use authn::{AuthenticationGate, DEFAULT_LEGACY_TOKEN_HEADER};
pub use path::{PathPermissionGate, PathRule};
pub use permission::PermissionGate;
