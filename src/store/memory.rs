//! 进程内存储，用于测试和本地开发；TTL 在读取时生效

use super::{KeyValueStore, StoreError, StoreResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 模拟后端不可用：之后的所有操作都返回错误
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().ok()?;
        entries
            .get(key)
            .filter(|e| e.is_live(Instant::now()))
            .map(|e| e.value.clone())
    }

    fn with_entries<T>(
        &self,
        f: impl FnOnce(&mut HashMap<String, Entry>, Instant) -> T,
    ) -> StoreResult<T> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store marked as failing".into()));
        }
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))?;
        Ok(f(&mut entries, Instant::now()))
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> StoreResult<u64> {
        self.with_entries(|entries, now| {
            let current = entries
                .get(key)
                .filter(|e| e.is_live(now))
                .and_then(|e| e.value.parse::<u64>().ok());

            match current {
                Some(n) => {
                    let next = n + 1;
                    if let Some(entry) = entries.get_mut(key) {
                        entry.value = next.to_string();
                    }
                    next
                }
                None => {
                    entries.insert(
                        key.to_string(),
                        Entry {
                            value: "1".to_string(),
                            expires_at: now + ttl,
                        },
                    );
                    1
                }
            }
        })
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        self.with_entries(|entries, now| {
            entries.insert(
                key.to_string(),
                Entry {
                    value: value.to_string(),
                    expires_at: now + ttl,
                },
            );
        })
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.with_entries(|entries, now| entries.get(key).is_some_and(|e| e.is_live(now)))
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<()> {
        self.with_entries(|entries, _| {
            for key in keys {
                entries.remove(key);
            }
        })
    }

    async fn ping(&self) -> StoreResult<()> {
        self.with_entries(|_, _| ())
    }
}
