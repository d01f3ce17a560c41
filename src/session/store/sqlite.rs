// src/session/store/sqlite.rs — SQLite-backed key-value operations

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use super::list_range;

/// A schema migration, applied once and recorded in `_migrations`.
struct Migration {
    version: u32,
    name: &'static str,
    up: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "kv_tables",
    up: "CREATE TABLE IF NOT EXISTS kv_hash (
             key   TEXT NOT NULL,
             field TEXT NOT NULL,
             value TEXT NOT NULL,
             PRIMARY KEY (key, field)
         );
         CREATE TABLE IF NOT EXISTS kv_list (
             key   TEXT NOT NULL,
             seq   INTEGER NOT NULL,
             value TEXT NOT NULL,
             PRIMARY KEY (key, seq)
         );
         CREATE TABLE IF NOT EXISTS kv_expiry (
             key        TEXT PRIMARY KEY,
             expires_at INTEGER NOT NULL
         );
         CREATE INDEX IF NOT EXISTS idx_kv_expiry_at ON kv_expiry(expires_at);",
}];

fn run_migrations(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current_version: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current_version) {
        info!(
            "Applying migration {}: {}",
            migration.version, migration.name
        );
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(migration.up)?;
        tx.execute(
            "INSERT INTO _migrations (version, name) VALUES (?1, ?2)",
            params![migration.version, migration.name],
        )?;
        tx.commit()?;
    }
    Ok(())
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Absolute expiry in epoch milliseconds, saturating for huge ttls.
fn expiry_ms(ttl: Duration) -> i64 {
    let ttl = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    now_ms().saturating_add(ttl)
}

/// Synchronous key-value operations over one SQLite connection.
/// Owned by the store server task; see `server.rs`.
pub struct SqliteKv {
    conn: Connection,
}

impl SqliteKv {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::with_connection(conn)
    }

    /// In-memory database (for testing).
    pub fn in_memory() -> anyhow::Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> anyhow::Result<Self> {
        run_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Drop `key` if its expiry has passed.
    fn evict_if_expired(&self, key: &str) -> anyhow::Result<()> {
        let expires_at: Option<i64> = self
            .conn
            .query_row(
                "SELECT expires_at FROM kv_expiry WHERE key = ?1",
                [key],
                |r| r.get(0),
            )
            .optional()?;
        if expires_at.is_some_and(|at| at <= now_ms()) {
            self.remove_key(key)?;
        }
        Ok(())
    }

    fn remove_key(&self, key: &str) -> anyhow::Result<bool> {
        let tx = self.conn.unchecked_transaction()?;
        let mut n = tx.execute("DELETE FROM kv_hash WHERE key = ?1", [key])?;
        n += tx.execute("DELETE FROM kv_list WHERE key = ?1", [key])?;
        tx.execute("DELETE FROM kv_expiry WHERE key = ?1", [key])?;
        tx.commit()?;
        Ok(n > 0)
    }

    fn kind(&self, key: &str) -> anyhow::Result<Option<&'static str>> {
        let in_hash: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM kv_hash WHERE key = ?1)",
            [key],
            |r| r.get(0),
        )?;
        if in_hash {
            return Ok(Some("hash"));
        }
        let in_list: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM kv_list WHERE key = ?1)",
            [key],
            |r| r.get(0),
        )?;
        Ok(in_list.then_some("list"))
    }

    fn ensure_kind(&self, key: &str, want: &str) -> anyhow::Result<bool> {
        match self.kind(key)? {
            None => Ok(false),
            Some(k) if k == want => Ok(true),
            Some(_) => anyhow::bail!(
                "WRONGTYPE operation against key '{key}' holding the wrong kind of value"
            ),
        }
    }

    pub fn hset(&self, key: &str, fields: &[(String, String)]) -> anyhow::Result<()> {
        self.evict_if_expired(key)?;
        if !self.ensure_kind(key, "hash")? {
            // stale expiry from a previous incarnation of the key
            self.conn
                .execute("DELETE FROM kv_expiry WHERE key = ?1", [key])?;
        }
        let tx = self.conn.unchecked_transaction()?;
        for (field, value) in fields {
            tx.execute(
                "INSERT INTO kv_hash (key, field, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key, field) DO UPDATE SET value = excluded.value",
                params![key, field, value],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn hget(&self, key: &str, field: &str) -> anyhow::Result<Option<String>> {
        self.evict_if_expired(key)?;
        if !self.ensure_kind(key, "hash")? {
            return Ok(None);
        }
        let value = self
            .conn
            .query_row(
                "SELECT value FROM kv_hash WHERE key = ?1 AND field = ?2",
                params![key, field],
                |r| r.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn hgetall(&self, key: &str) -> anyhow::Result<HashMap<String, String>> {
        self.evict_if_expired(key)?;
        if !self.ensure_kind(key, "hash")? {
            return Ok(HashMap::new());
        }
        let mut stmt = self
            .conn
            .prepare("SELECT field, value FROM kv_hash WHERE key = ?1")?;
        let rows = stmt.query_map([key], |r| Ok((r.get(0)?, r.get(1)?)))?;
        let mut out = HashMap::new();
        for row in rows {
            let (field, value): (String, String) = row?;
            out.insert(field, value);
        }
        Ok(out)
    }

    pub fn exists(&self, key: &str) -> anyhow::Result<bool> {
        self.evict_if_expired(key)?;
        Ok(self.kind(key)?.is_some())
    }

    pub fn expire(&self, key: &str, ttl: Duration) -> anyhow::Result<bool> {
        if !self.exists(key)? {
            return Ok(false);
        }
        self.conn.execute(
            "INSERT INTO kv_expiry (key, expires_at) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET expires_at = excluded.expires_at",
            params![key, expiry_ms(ttl)],
        )?;
        Ok(true)
    }

    pub fn hset_existing(
        &self,
        key: &str,
        fields: &[(String, String)],
        ttl: Duration,
    ) -> anyhow::Result<bool> {
        self.evict_if_expired(key)?;
        if !self.ensure_kind(key, "hash")? {
            return Ok(false);
        }
        let tx = self.conn.unchecked_transaction()?;
        for (field, value) in fields {
            tx.execute(
                "INSERT INTO kv_hash (key, field, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key, field) DO UPDATE SET value = excluded.value",
                params![key, field, value],
            )?;
        }
        tx.execute(
            "INSERT INTO kv_expiry (key, expires_at) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET expires_at = excluded.expires_at",
            params![key, expiry_ms(ttl)],
        )?;
        tx.commit()?;
        Ok(true)
    }

    pub fn rpush(&self, key: &str, value: &str) -> anyhow::Result<usize> {
        self.evict_if_expired(key)?;
        if !self.ensure_kind(key, "list")? {
            self.conn
                .execute("DELETE FROM kv_expiry WHERE key = ?1", [key])?;
        }
        self.conn.execute(
            "INSERT INTO kv_list (key, seq, value)
             VALUES (?1, (SELECT COALESCE(MAX(seq), 0) + 1 FROM kv_list WHERE key = ?1), ?2)",
            params![key, value],
        )?;
        self.llen(key)
    }

    pub fn lrange(&self, key: &str, start: i64, stop: i64) -> anyhow::Result<Vec<String>> {
        self.evict_if_expired(key)?;
        if !self.ensure_kind(key, "list")? {
            return Ok(Vec::new());
        }
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM kv_list WHERE key = ?1 ORDER BY seq ASC")?;
        let items = stmt
            .query_map([key], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(list_range(items.len(), start, stop)
            .map(|r| items[r].to_vec())
            .unwrap_or_default())
    }

    pub fn llen(&self, key: &str) -> anyhow::Result<usize> {
        self.evict_if_expired(key)?;
        if !self.ensure_kind(key, "list")? {
            return Ok(0);
        }
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM kv_list WHERE key = ?1",
            [key],
            |r| r.get(0),
        )?;
        Ok(n as usize)
    }

    pub fn delete(&self, keys: &[String]) -> anyhow::Result<usize> {
        let mut removed = 0;
        for key in keys {
            self.evict_if_expired(key)?;
            if self.remove_key(key)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub fn keys(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        self.purge_expired()?;
        let mut stmt = self.conn.prepare(
            "SELECT key FROM kv_hash WHERE substr(key, 1, length(?1)) = ?1
             UNION
             SELECT key FROM kv_list WHERE substr(key, 1, length(?1)) = ?1
             ORDER BY key",
        )?;
        let keys = stmt
            .query_map([prefix], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    pub fn purge_expired(&self) -> anyhow::Result<usize> {
        let expired: Vec<String> = {
            let mut stmt = self
                .conn
                .prepare("SELECT key FROM kv_expiry WHERE expires_at <= ?1")?;
            let rows = stmt.query_map([now_ms()], |r| r.get::<_, String>(0))?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        for key in &expired {
            self.remove_key(key)?;
        }
        Ok(expired.len())
    }

    /// Borrow the raw connection (tests, diagnostics).
    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}
