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
mod executor;
mod manager;
mod quorum;
mod retry;
mod scoped;
mod stats;

pub use executor::{CommandKind, LockCommand, LockExecutor, ServerAdapter, Vote};
#[cfg(test)]
pub(crate) use executor::LockOp;
pub use manager::{LockEvent, LockManager};
pub use scoped::ScopedSignal;
pub use stats::{AttemptStats, ExecutionResult, ExecutionStats};

use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::config::LockSettings;
use crate::errors::RedlockResult;

/// An exclusive hold on a set of resources, minted by a quorum of servers.
///
/// Identity is the resource keys plus a random value the servers use to
/// refuse extend/release from non-holders. The only mutable field is the
/// effective expiration; `None` marks a tombstone, written by release or by
/// a successful extension, after which the instance must not be used to
/// derive a new lease.
#[derive(Debug)]
pub struct Lock {
    manager: LockManager,
    resources: Vec<String>,
    value: String,
    attempts: Vec<Arc<AttemptStats>>,
    expiration: StdMutex<Option<Instant>>,
    settings: LockSettings,
}

impl Lock {
    pub(crate) fn new(
        manager: LockManager,
        resources: Vec<String>,
        value: String,
        attempts: Vec<Arc<AttemptStats>>,
        expiration: Instant,
        settings: LockSettings,
    ) -> Self {
        Self {
            manager,
            resources,
            value,
            attempts,
            expiration: StdMutex::new(Some(expiration)),
            settings,
        }
    }

    pub fn resources(&self) -> &[String] {
        &self.resources
    }

    /// The 32-hex-character lock value.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Per-attempt tallies from the operation that minted this lock.
    pub fn attempts(&self) -> &[Arc<AttemptStats>] {
        &self.attempts
    }

    /// Effective expiration on the monotonic clock; `None` once the lock has
    /// been released or superseded.
    pub fn expiration(&self) -> Option<Instant> {
        *self.expiration.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_expired(&self) -> bool {
        match self.expiration() {
            Some(expiration) => Instant::now() >= expiration,
            None => true,
        }
    }

    pub fn remaining_time(&self) -> Duration {
        self.expiration()
            .map(|expiration| expiration.saturating_duration_since(Instant::now()))
            .unwrap_or_default()
    }

    pub(crate) fn settings(&self) -> &LockSettings {
        &self.settings
    }

    pub(crate) fn tombstone(&self) {
        *self.expiration.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Sugar for [`LockManager::extend`] with this lock's settings.
    pub async fn extend(&self, duration: Duration) -> RedlockResult<Lock> {
        self.manager.extend(self, duration, None).await
    }

    /// Sugar for [`LockManager::release`] with this lock's settings.
    pub async fn release(&self) -> RedlockResult<ExecutionResult> {
        self.manager.release(self, None).await
    }
}
