// src/session/store/memory.rs — In-process store with per-key expiry

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::{list_range, SessionStore};

#[derive(Debug, Clone)]
enum Value {
    Hash(HashMap<String, String>),
    List(Vec<String>),
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Volatile store used by tests and single-node deployments that accept
/// losing sessions on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Look up a live entry, evicting it first if it has expired.
fn live<'a>(map: &'a mut HashMap<String, Entry>, key: &str) -> Option<&'a mut Entry> {
    if map.get(key).is_some_and(|e| e.is_expired(Instant::now())) {
        map.remove(key);
    }
    map.get_mut(key)
}

/// Expiry instant for `ttl` from now; `None` (never) when it overflows.
fn expiry_after(ttl: Duration) -> Option<Instant> {
    Instant::now().checked_add(ttl)
}

fn wrong_type(key: &str) -> anyhow::Error {
    anyhow::anyhow!("WRONGTYPE operation against key '{key}' holding the wrong kind of value")
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn hset(&self, key: &str, fields: &[(String, String)]) -> anyhow::Result<()> {
        let mut map = self.lock();
        if live(&mut map, key).is_none() {
            map.insert(
                key.to_string(),
                Entry {
                    value: Value::Hash(HashMap::new()),
                    expires_at: None,
                },
            );
        }
        match map.get_mut(key).map(|e| &mut e.value) {
            Some(Value::Hash(h)) => {
                for (field, value) in fields {
                    h.insert(field.clone(), value.clone());
                }
                Ok(())
            }
            _ => Err(wrong_type(key)),
        }
    }

    async fn hget(&self, key: &str, field: &str) -> anyhow::Result<Option<String>> {
        let mut map = self.lock();
        match live(&mut map, key).map(|e| &e.value) {
            None => Ok(None),
            Some(Value::Hash(h)) => Ok(h.get(field).cloned()),
            Some(Value::List(_)) => Err(wrong_type(key)),
        }
    }

    async fn hgetall(&self, key: &str) -> anyhow::Result<HashMap<String, String>> {
        let mut map = self.lock();
        match live(&mut map, key).map(|e| &e.value) {
            None => Ok(HashMap::new()),
            Some(Value::Hash(h)) => Ok(h.clone()),
            Some(Value::List(_)) => Err(wrong_type(key)),
        }
    }

    async fn exists(&self, key: &str) -> anyhow::Result<bool> {
        let mut map = self.lock();
        Ok(live(&mut map, key).is_some())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> anyhow::Result<bool> {
        let mut map = self.lock();
        match live(&mut map, key) {
            Some(entry) => {
                entry.expires_at = expiry_after(ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn rpush(&self, key: &str, value: String) -> anyhow::Result<usize> {
        let mut map = self.lock();
        if live(&mut map, key).is_none() {
            map.insert(
                key.to_string(),
                Entry {
                    value: Value::List(Vec::new()),
                    expires_at: None,
                },
            );
        }
        match map.get_mut(key).map(|e| &mut e.value) {
            Some(Value::List(items)) => {
                items.push(value);
                Ok(items.len())
            }
            _ => Err(wrong_type(key)),
        }
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> anyhow::Result<Vec<String>> {
        let mut map = self.lock();
        match live(&mut map, key).map(|e| &e.value) {
            None => Ok(Vec::new()),
            Some(Value::List(items)) => Ok(list_range(items.len(), start, stop)
                .map(|r| items[r].to_vec())
                .unwrap_or_default()),
            Some(Value::Hash(_)) => Err(wrong_type(key)),
        }
    }

    async fn llen(&self, key: &str) -> anyhow::Result<usize> {
        let mut map = self.lock();
        match live(&mut map, key).map(|e| &e.value) {
            None => Ok(0),
            Some(Value::List(items)) => Ok(items.len()),
            Some(Value::Hash(_)) => Err(wrong_type(key)),
        }
    }

    async fn hset_existing(
        &self,
        key: &str,
        fields: &[(String, String)],
        ttl: Duration,
    ) -> anyhow::Result<bool> {
        let mut map = self.lock();
        let Some(entry) = live(&mut map, key) else {
            return Ok(false);
        };
        let Value::Hash(h) = &mut entry.value else {
            return Err(wrong_type(key));
        };
        for (field, value) in fields {
            h.insert(field.clone(), value.clone());
        }
        entry.expires_at = expiry_after(ttl);
        Ok(true)
    }

    async fn delete(&self, keys: &[String]) -> anyhow::Result<usize> {
        let mut map = self.lock();
        let mut removed = 0;
        for key in keys {
            if live(&mut map, key).is_some() {
                map.remove(key);
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn keys(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        let now = Instant::now();
        let map = self.lock();
        let mut keys: Vec<String> = map
            .iter()
            .filter(|(k, e)| k.starts_with(prefix) && !e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn purge_expired(&self) -> anyhow::Result<usize> {
        let now = Instant::now();
        let mut map = self.lock();
        let before = map.len();
        map.retain(|_, e| !e.is_expired(now));
        Ok(before - map.len())
    }
}
