pub mod cache;
pub mod source;

pub use cache::KeyCache;
pub use source::{HttpKeySource, KeySource};
