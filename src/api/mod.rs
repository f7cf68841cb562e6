/*
 * Responsibility
 * - HTTP adapter の公開ポイント (routes() / build_chain() の re-export)
 */
pub mod handlers;
mod routes;

pub use routes::{build_chain, routes};
