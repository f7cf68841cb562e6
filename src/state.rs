/*
 * Responsibility
 * - Router に紐づける共有コンテキスト (AppState)
 *   - chain: 起動時に 1 度だけ組み立てた interceptor chain
 * - Clone 前提で持つ (内部は Arc)
 */
use std::sync::Arc;

use crate::rpc::Chain;

#[derive(Clone, Debug)]
pub struct AppState {
    pub chain: Arc<Chain>,
}

impl AppState {
    pub fn new(chain: Chain) -> Self {
        Self {
            chain: Arc::new(chain),
        }
    }
}
