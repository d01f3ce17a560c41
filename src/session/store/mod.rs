// src/session/store/mod.rs — Durable key-value store abstraction
//
// Two shapes live under a key: a field map (session metadata) or an ordered
// list (history). Every key may carry an expiry; an expired key reads as
// absent from every operation.

pub mod memory;
pub mod server;
pub mod sqlite;

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

pub use memory::MemoryStore;
pub use server::{spawn_store_server, StoreHandle};
pub use sqlite::SqliteKv;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Merge fields into the map at `key`, creating it if absent.
    async fn hset(&self, key: &str, fields: &[(String, String)]) -> anyhow::Result<()>;

    async fn hget(&self, key: &str, field: &str) -> anyhow::Result<Option<String>>;

    /// All fields of the map at `key`; empty when absent.
    async fn hgetall(&self, key: &str) -> anyhow::Result<HashMap<String, String>>;

    async fn exists(&self, key: &str) -> anyhow::Result<bool>;

    /// Set the key's time-to-live. Returns false when the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> anyhow::Result<bool>;

    /// Append to the list at `key`; returns the new length.
    async fn rpush(&self, key: &str, value: String) -> anyhow::Result<usize>;

    /// Inclusive range with negative indices counting from the end.
    async fn lrange(&self, key: &str, start: i64, stop: i64) -> anyhow::Result<Vec<String>>;

    async fn llen(&self, key: &str) -> anyhow::Result<usize>;

    /// Merge fields into a live hash and reset its expiry in one step.
    /// Returns false, writing nothing, when the key is absent or expired.
    async fn hset_existing(
        &self,
        key: &str,
        fields: &[(String, String)],
        ttl: Duration,
    ) -> anyhow::Result<bool>;

    /// Delete keys; returns how many existed.
    async fn delete(&self, keys: &[String]) -> anyhow::Result<usize>;

    /// Live keys starting with `prefix`.
    async fn keys(&self, prefix: &str) -> anyhow::Result<Vec<String>>;

    /// Drop expired keys eagerly. Backends that expire lazily may no-op.
    async fn purge_expired(&self) -> anyhow::Result<usize> {
        Ok(0)
    }
}

/// Resolve an inclusive, possibly negative `[start, stop]` against a list
/// of `len` items into a half-open slice range.
pub fn list_range(len: usize, start: i64, stop: i64) -> Option<std::ops::Range<usize>> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some(start as usize..(stop + 1) as usize)
}
