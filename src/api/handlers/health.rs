/*
 * Responsibility
 * - GET /health (疎通用, chain を通さない)
 */
pub async fn health() -> &'static str {
    "ok"
}
