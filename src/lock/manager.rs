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
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use redis::{Client, IntoConnectionInfo};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::{validate_duration, LockSettings};
use crate::errors::{RedlockError, RedlockResult, VoteError};
use crate::lock::executor::{CommandKind, LockCommand, LockExecutor, ServerAdapter};
use crate::lock::retry;
use crate::lock::stats::ExecutionResult;
use crate::lock::Lock;
use crate::util::{calculate_drift, mint_lock_value};

const EVENT_CHANNEL_CAPACITY: usize = 128;

/// Emitted on the manager's event stream for every conflict or transport
/// error a server reports during an attempt.
#[derive(Debug, Clone)]
pub struct LockEvent {
    pub server: String,
    pub operation: CommandKind,
    pub error: VoteError,
}

/// Entry point of the crate: owns the server membership and mints, extends
/// and releases locks against it.
///
/// Cloning is cheap and every clone drives the same membership; a `Lock`
/// keeps one clone so its sugar methods can reach back here.
#[derive(Clone)]
pub struct LockManager {
    executors: Vec<Arc<dyn LockExecutor>>,
    settings: LockSettings,
    events: broadcast::Sender<LockEvent>,
    // Default subscriber: keeps the channel open so an unobserved error is
    // dropped instead of surfacing as a send failure.
    _observer: Arc<StdMutex<broadcast::Receiver<LockEvent>>>,
}

impl fmt::Debug for LockManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockManager")
            .field("membership", &self.executors.len())
            .field("settings", &self.settings)
            .finish()
    }
}

impl LockManager {
    /// Connects to the given server addresses, e.g.
    /// `"redis://127.0.0.1:6379"`.
    pub fn new<T: IntoConnectionInfo>(addrs: Vec<T>, settings: LockSettings) -> RedlockResult<Self> {
        let clients = addrs
            .into_iter()
            .map(Client::open)
            .collect::<Result<Vec<_>, _>>()?;
        Self::with_clients(clients, settings)
    }

    pub fn with_clients(clients: Vec<Client>, settings: LockSettings) -> RedlockResult<Self> {
        let mut names: HashSet<String> = HashSet::new();
        let mut executors: Vec<Arc<dyn LockExecutor>> = Vec::with_capacity(clients.len());
        for (index, client) in clients.into_iter().enumerate() {
            let mut name = client.get_connection_info().addr.to_string();
            // Tallies are keyed by name, so duplicates must not collapse.
            if !names.insert(name.clone()) {
                name = format!("{name}#{index}");
                names.insert(name.clone());
            }
            executors.push(Arc::new(ServerAdapter::new(name, client)?));
        }
        Self::with_executors(executors, settings)
    }

    /// Wires a custom membership. This is also the seam alternative
    /// backends implement.
    pub fn with_executors(
        executors: Vec<Arc<dyn LockExecutor>>,
        settings: LockSettings,
    ) -> RedlockResult<Self> {
        if executors.is_empty() {
            return Err(RedlockError::InvalidArgument(
                "at least one server is required".to_string(),
            ));
        }
        let (events, observer) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            executors,
            settings,
            events,
            _observer: Arc::new(StdMutex::new(observer)),
        })
    }

    pub fn settings(&self) -> &LockSettings {
        &self.settings
    }

    /// Subscribes to the error event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<LockEvent> {
        self.events.subscribe()
    }

    /// Acquires an exclusive hold on every named resource for `duration`.
    ///
    /// A failed acquisition sweeps the membership once with a best-effort
    /// release so a minority of servers is not left holding stray keys, then
    /// surfaces the original error.
    pub async fn acquire(
        &self,
        resources: &[&str],
        duration: Duration,
        settings: Option<LockSettings>,
    ) -> RedlockResult<Lock> {
        let settings = settings.unwrap_or_else(|| self.settings.clone());
        let duration_ms = validate_duration(duration)?;
        if resources.is_empty() {
            return Err(RedlockError::InvalidArgument(
                "at least one resource is required".to_string(),
            ));
        }

        let value = mint_lock_value();
        let keys: Vec<String> = resources.iter().map(|r| r.to_string()).collect();
        let command = LockCommand::acquire(settings.database(), value.clone(), duration_ms);

        match retry::execute(&self.executors, &command, &keys, &settings, &self.events).await {
            Ok(result) => {
                let expiration = drift_adjusted_expiration(&result, duration_ms, &settings);
                info!(resources = ?keys, duration_ms, "lock acquired");
                Ok(Lock::new(
                    self.clone(),
                    keys,
                    value,
                    result.attempts,
                    expiration,
                    settings,
                ))
            }
            Err(err) => {
                // Reap partial acquisitions on minority servers. Single
                // shot, outcome ignored; the TTL is the backstop.
                let sweep = settings.clone().with_retry_count(0);
                let release = LockCommand::release(settings.database(), value);
                let _ =
                    retry::execute(&self.executors, &release, &keys, &sweep, &self.events).await;
                Err(err)
            }
        }
    }

    /// Trades a live lock for one with a fresh lease.
    ///
    /// The old lock is tombstoned only after the membership has granted the
    /// extension; on failure it is left untouched and remains valid until
    /// its original expiration.
    pub async fn extend(
        &self,
        lock: &Lock,
        duration: Duration,
        settings: Option<LockSettings>,
    ) -> RedlockResult<Lock> {
        let settings = settings.unwrap_or_else(|| lock.settings().clone());
        let duration_ms = validate_duration(duration)?;
        if lock.is_expired() {
            return Err(RedlockError::ExecutionFailed {
                reason: "Cannot extend an already-expired lock".to_string(),
                attempts: Vec::new(),
            });
        }

        let command =
            LockCommand::extend(settings.database(), lock.value().to_owned(), duration_ms);
        let result = retry::execute(
            &self.executors,
            &command,
            lock.resources(),
            &settings,
            &self.events,
        )
        .await?;

        lock.tombstone();
        let expiration = drift_adjusted_expiration(&result, duration_ms, &settings);
        debug!(resources = ?lock.resources(), duration_ms, "lock extended");
        Ok(Lock::new(
            self.clone(),
            lock.resources().to_vec(),
            lock.value().to_owned(),
            result.attempts,
            expiration,
            settings,
        ))
    }

    /// Gives the lock up.
    ///
    /// The lock is tombstoned immediately whatever the servers say: the
    /// caller has declared the lease abandoned, and if the quorum release
    /// fails the remote TTLs expire it on their own.
    pub async fn release(
        &self,
        lock: &Lock,
        settings: Option<LockSettings>,
    ) -> RedlockResult<ExecutionResult> {
        let settings = settings.unwrap_or_else(|| lock.settings().clone());
        lock.tombstone();

        let command = LockCommand::release(settings.database(), lock.value().to_owned());
        let result = retry::execute(
            &self.executors,
            &command,
            lock.resources(),
            &settings,
            &self.events,
        )
        .await?;
        debug!(resources = ?lock.resources(), "lock released");
        Ok(result)
    }
}

/// The caller-visible lease ends drift short of the decisive attempt's
/// start plus the requested duration. A duration smaller than the drift
/// yields a lease that is already over.
fn drift_adjusted_expiration(
    result: &ExecutionResult,
    duration_ms: u64,
    settings: &LockSettings,
) -> Instant {
    let drift = calculate_drift(duration_ms, settings.drift_factor);
    result.started_at + Duration::from_millis(duration_ms.saturating_sub(drift))
}
