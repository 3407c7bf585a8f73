pub mod backend;
pub mod fingerprint;
pub mod store;

pub use backend::{CacheBackend, RedisBackend};
pub use fingerprint::Fingerprint;
pub use store::ResponseCache;
