// src/session/store/server.rs — Async message passing for the SQLite store

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use super::{SessionStore, SqliteKv};

type Reply<T> = oneshot::Sender<anyhow::Result<T>>;

#[derive(Debug)]
pub enum StoreCommand {
    HSet {
        key: String,
        fields: Vec<(String, String)>,
        resp: Reply<()>,
    },
    HGet {
        key: String,
        field: String,
        resp: Reply<Option<String>>,
    },
    HGetAll {
        key: String,
        resp: Reply<HashMap<String, String>>,
    },
    Exists {
        key: String,
        resp: Reply<bool>,
    },
    Expire {
        key: String,
        ttl: Duration,
        resp: Reply<bool>,
    },
    HSetExisting {
        key: String,
        fields: Vec<(String, String)>,
        ttl: Duration,
        resp: Reply<bool>,
    },
    RPush {
        key: String,
        value: String,
        resp: Reply<usize>,
    },
    LRange {
        key: String,
        start: i64,
        stop: i64,
        resp: Reply<Vec<String>>,
    },
    LLen {
        key: String,
        resp: Reply<usize>,
    },
    Delete {
        keys: Vec<String>,
        resp: Reply<usize>,
    },
    Keys {
        prefix: String,
        resp: Reply<Vec<String>>,
    },
    PurgeExpired {
        resp: Reply<usize>,
    },
}

/// A cloneable handle to the store server task. The connection itself never
/// leaves the server, so all writes are serialized through one owner.
#[derive(Clone)]
pub struct StoreHandle {
    tx: mpsc::Sender<StoreCommand>,
}

impl StoreHandle {
    pub fn new(tx: mpsc::Sender<StoreCommand>) -> Self {
        Self { tx }
    }

    async fn call<T>(&self, make: impl FnOnce(Reply<T>) -> StoreCommand) -> anyhow::Result<T> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.tx
            .send(make(resp_tx))
            .await
            .map_err(|_| anyhow::anyhow!("store server has shut down"))?;
        resp_rx
            .await
            .map_err(|_| anyhow::anyhow!("store server dropped the request"))?
    }
}

#[async_trait]
impl SessionStore for StoreHandle {
    async fn hset(&self, key: &str, fields: &[(String, String)]) -> anyhow::Result<()> {
        let (key, fields) = (key.to_string(), fields.to_vec());
        self.call(|resp| StoreCommand::HSet { key, fields, resp })
            .await
    }

    async fn hget(&self, key: &str, field: &str) -> anyhow::Result<Option<String>> {
        let (key, field) = (key.to_string(), field.to_string());
        self.call(|resp| StoreCommand::HGet { key, field, resp })
            .await
    }

    async fn hgetall(&self, key: &str) -> anyhow::Result<HashMap<String, String>> {
        let key = key.to_string();
        self.call(|resp| StoreCommand::HGetAll { key, resp }).await
    }

    async fn exists(&self, key: &str) -> anyhow::Result<bool> {
        let key = key.to_string();
        self.call(|resp| StoreCommand::Exists { key, resp }).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> anyhow::Result<bool> {
        let key = key.to_string();
        self.call(|resp| StoreCommand::Expire { key, ttl, resp })
            .await
    }

    async fn hset_existing(
        &self,
        key: &str,
        fields: &[(String, String)],
        ttl: Duration,
    ) -> anyhow::Result<bool> {
        let (key, fields) = (key.to_string(), fields.to_vec());
        self.call(|resp| StoreCommand::HSetExisting {
            key,
            fields,
            ttl,
            resp,
        })
        .await
    }

    async fn rpush(&self, key: &str, value: String) -> anyhow::Result<usize> {
        let key = key.to_string();
        self.call(|resp| StoreCommand::RPush { key, value, resp })
            .await
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> anyhow::Result<Vec<String>> {
        let key = key.to_string();
        self.call(|resp| StoreCommand::LRange {
            key,
            start,
            stop,
            resp,
        })
        .await
    }

    async fn llen(&self, key: &str) -> anyhow::Result<usize> {
        let key = key.to_string();
        self.call(|resp| StoreCommand::LLen { key, resp }).await
    }

    async fn delete(&self, keys: &[String]) -> anyhow::Result<usize> {
        let keys = keys.to_vec();
        self.call(|resp| StoreCommand::Delete { keys, resp }).await
    }

    async fn keys(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        let prefix = prefix.to_string();
        self.call(|resp| StoreCommand::Keys { prefix, resp }).await
    }

    async fn purge_expired(&self) -> anyhow::Result<usize> {
        self.call(|resp| StoreCommand::PurgeExpired { resp }).await
    }
}

/// Helper to spawn the store server and return a handle.
pub fn spawn_store_server(kv: SqliteKv) -> (StoreHandle, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(256);
    let handle = StoreHandle::new(tx);
    let join_handle = tokio::spawn(run_store_server(kv, rx));
    (handle, join_handle)
}

/// Serve commands until every handle is dropped.
pub async fn run_store_server(kv: SqliteKv, mut rx: mpsc::Receiver<StoreCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            StoreCommand::HSet { key, fields, resp } => {
                let _ = resp.send(kv.hset(&key, &fields));
            }
            StoreCommand::HGet { key, field, resp } => {
                let _ = resp.send(kv.hget(&key, &field));
            }
            StoreCommand::HGetAll { key, resp } => {
                let _ = resp.send(kv.hgetall(&key));
            }
            StoreCommand::Exists { key, resp } => {
                let _ = resp.send(kv.exists(&key));
            }
            StoreCommand::Expire { key, ttl, resp } => {
                let _ = resp.send(kv.expire(&key, ttl));
            }
            StoreCommand::HSetExisting {
                key,
                fields,
                ttl,
                resp,
            } => {
                let _ = resp.send(kv.hset_existing(&key, &fields, ttl));
            }
            StoreCommand::RPush { key, value, resp } => {
                let _ = resp.send(kv.rpush(&key, &value));
            }
            StoreCommand::LRange {
                key,
                start,
                stop,
                resp,
            } => {
                let _ = resp.send(kv.lrange(&key, start, stop));
            }
            StoreCommand::LLen { key, resp } => {
                let _ = resp.send(kv.llen(&key));
            }
            StoreCommand::Delete { keys, resp } => {
                let _ = resp.send(kv.delete(&keys));
            }
            StoreCommand::Keys { prefix, resp } => {
                let _ = resp.send(kv.keys(&prefix));
            }
            StoreCommand::PurgeExpired { resp } => {
                let _ = resp.send(kv.purge_expired());
            }
        }
    }
    tracing::debug!("Session store server stopped");
}
