pub mod memory;
pub mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::Redis;

use crate::result::Result;

use async_trait::async_trait;
use std::collections::HashMap;

/// The key-value primitives the worker relies on. Each call is assumed to be
/// atomic on the store side; nothing here spans more than one command.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Non-blocking pop from the head of `queue`.
    async fn pop_front(&self, queue: &str) -> Result<Option<String>>;

    /// All fields of the hash at `key`. Empty when the record is absent.
    async fn get_record(&self, key: &str) -> Result<HashMap<String, String>>;

    async fn set_field(&self, key: &str, field: &str, value: &str) -> Result<()>;

    async fn insert_ranked(&self, index: &str, key: &str, score: i64) -> Result<()>;

    /// Members of `index` matching the glob `pattern`, in ascending score order.
    async fn scan_ranked(&self, index: &str, pattern: &str) -> Result<Vec<String>>;
}
