/*
 *
 *  *
 *  *      Copyright (c) 2018-2025, SnackCloud All rights reserved.
 *  *
 *  *   Redistribution and use in source and binary forms, with or without
 *  *   modification, are permitted provided that the following conditions are met:
 *  *
 *  *   Redistributions of source code must retain the above copyright notice,
 *  *   this list of conditions and the following disclaimer.
 *  *   Redistributions in binary form must reproduce the above copyright
 *  *   notice, this list of conditions and the following disclaimer in the
 *  *   documentation and/or other materials provided with the distribution.
 *  *   Neither the name of the www.snackcloud.cn developer nor the names of its
 *  *   contributors may be used to endorse or promote products derived from
 *  *   this software without specific prior written permission.
 *  *   Author: SnackCloud
 *  *
 *
 */
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::errors::VoteError;
use crate::lock::{LockCommand, LockExecutor, LockOp, Vote};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-memory stand-in for one Redis server, mirroring the three scripts'
/// semantics (batch refusal, value-guarded refresh, counted deletion).
pub(crate) struct MemoryServer {
    name: String,
    store: Mutex<HashMap<String, Entry>>,
    offline: AtomicBool,
    latency: Duration,
}

impl MemoryServer {
    pub(crate) fn new(name: &str) -> Arc<Self> {
        Self::with_latency(name, Duration::ZERO)
    }

    pub(crate) fn with_latency(name: &str, latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            store: Mutex::new(HashMap::new()),
            offline: AtomicBool::new(false),
            latency,
        })
    }

    /// While offline every command answers with a transport failure.
    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Release);
    }

    /// Seeds a key as if some other client held it.
    pub(crate) async fn insert(&self, key: &str, value: &str, ttl: Duration) {
        let mut store = self.store.lock().await;
        store.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub(crate) async fn value_of(&self, key: &str) -> Option<String> {
        let mut store = self.store.lock().await;
        purge(&mut store);
        store.get(key).map(|entry| entry.value.clone())
    }

    pub(crate) async fn ttl_of(&self, key: &str) -> Option<Duration> {
        let mut store = self.store.lock().await;
        purge(&mut store);
        let now = Instant::now();
        store
            .get(key)
            .map(|entry| entry.expires_at.saturating_duration_since(now))
    }
}

fn purge(store: &mut HashMap<String, Entry>) {
    let now = Instant::now();
    store.retain(|_, entry| entry.expires_at > now);
}

#[async_trait]
impl LockExecutor for MemoryServer {
    fn id(&self) -> &str {
        &self.name
    }

    async fn execute(&self, command: &LockCommand, keys: &[String]) -> Vote {
        if self.latency > Duration::ZERO {
            sleep(self.latency).await;
        }
        if self.offline.load(Ordering::Acquire) {
            return Vote::Against(VoteError::Transport("connection refused".to_string()));
        }

        let mut store = self.store.lock().await;
        purge(&mut store);

        match command.op {
            LockOp::Acquire { duration_ms } => {
                if keys.iter().any(|key| store.contains_key(key)) {
                    return Vote::Against(VoteError::ResourceLocked {
                        applied: 0,
                        requested: keys.len(),
                    });
                }
                let expires_at = Instant::now() + Duration::from_millis(duration_ms);
                for key in keys {
                    store.insert(
                        key.clone(),
                        Entry {
                            value: command.value.clone(),
                            expires_at,
                        },
                    );
                }
                Vote::For(keys.len() as i64)
            }
            LockOp::Extend { duration_ms } => {
                let held = keys
                    .iter()
                    .all(|key| store.get(key).is_some_and(|e| e.value == command.value));
                if !held {
                    return Vote::Against(VoteError::ResourceLocked {
                        applied: 0,
                        requested: keys.len(),
                    });
                }
                let expires_at = Instant::now() + Duration::from_millis(duration_ms);
                for key in keys {
                    store.insert(
                        key.clone(),
                        Entry {
                            value: command.value.clone(),
                            expires_at,
                        },
                    );
                }
                Vote::For(keys.len() as i64)
            }
            LockOp::Release => {
                let mut released = 0;
                for key in keys {
                    if store.get(key).is_some_and(|e| e.value == command.value) {
                        store.remove(key);
                        released += 1;
                    }
                }
                Vote::For(released)
            }
        }
    }
}

pub(crate) fn membership(servers: &[Arc<MemoryServer>]) -> Vec<Arc<dyn LockExecutor>> {
    servers
        .iter()
        .map(|server| Arc::clone(server) as Arc<dyn LockExecutor>)
        .collect()
}
