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
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use tokio::sync::{watch, Mutex as TokioMutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use crate::config::{validate_duration, LockSettings};
use crate::errors::{RedlockError, RedlockResult};
use crate::lock::{Lock, LockManager};

type LockSlot = Arc<TokioMutex<Option<Lock>>>;
type ErrorSlot = Arc<StdMutex<Option<Arc<RedlockError>>>>;

/// Passive cancellation signal handed to a scoped routine.
///
/// The holder never cancels the routine; when it can no longer keep the
/// lease alive it records the error here and asserts abortion, and the
/// routine is expected to poll (or await) the signal at its own pace.
#[derive(Debug, Clone)]
pub struct ScopedSignal {
    aborted: watch::Receiver<bool>,
    error: ErrorSlot,
    extensions: Arc<AtomicUsize>,
}

impl ScopedSignal {
    pub fn is_aborted(&self) -> bool {
        *self.aborted.borrow()
    }

    /// Resolves once the holder has given up on keeping the lease alive.
    pub async fn aborted(&self) {
        let mut rx = self.aborted.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// The extension failure that triggered abortion, if any.
    pub fn error(&self) -> Option<Arc<RedlockError>> {
        self.error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of successful automatic extensions so far.
    pub fn extensions(&self) -> usize {
        self.extensions.load(Ordering::Acquire)
    }
}

/// Keeps a scoped lock's lease alive until told to stop.
struct AutoExtender {
    manager: LockManager,
    slot: LockSlot,
    duration: Duration,
    settings: LockSettings,
    abort: watch::Sender<bool>,
    error: ErrorSlot,
    extensions: Arc<AtomicUsize>,
}

impl AutoExtender {
    async fn run(self, mut stop: watch::Receiver<bool>) {
        let threshold = self.settings.automatic_extension_threshold;
        loop {
            let expiration = match self.slot.lock().await.as_ref() {
                Some(lock) => lock.expiration(),
                None => return,
            };
            let Some(expiration) = expiration else {
                return;
            };

            let wake_at = expiration.checked_sub(threshold).unwrap_or_else(Instant::now);
            tokio::select! {
                _ = stop.changed() => return,
                _ = sleep_until(wake_at) => {}
            }

            if !self.extend_once().await {
                return;
            }
        }
    }

    /// One extension pass, retried immediately while the lease is alive.
    /// Holds the slot mutex throughout so release cannot interleave.
    async fn extend_once(&self) -> bool {
        let mut slot = self.slot.lock().await;
        let Some(lock) = slot.take() else {
            return false;
        };

        loop {
            match self
                .manager
                .extend(&lock, self.duration, Some(self.settings.clone()))
                .await
            {
                Ok(extended) => {
                    *slot = Some(extended);
                    let count = self.extensions.fetch_add(1, Ordering::AcqRel) + 1;
                    debug!(count, "lease extended");
                    return true;
                }
                Err(err) => {
                    if !lock.is_expired() {
                        warn!(error = %err, "extension failed with lease still alive, retrying");
                        continue;
                    }
                    warn!(error = %err, "extension failed past expiration, aborting routine");
                    *slot = Some(lock);
                    *self.error.lock().unwrap_or_else(PoisonError::into_inner) =
                        Some(Arc::new(err));
                    self.abort.send_replace(true);
                    return false;
                }
            }
        }
    }
}

/// Releases the scoped lock on every exit path, including unwinding.
struct ReleaseGuard {
    manager: LockManager,
    slot: LockSlot,
    stop: Option<watch::Sender<bool>>,
    extender: Option<JoinHandle<()>>,
    armed: bool,
}

impl ReleaseGuard {
    /// Orderly exit: cancel the timer, let an in-flight extension settle,
    /// then release whatever lock is current.
    ///
    /// The guard stays armed across every await in here, and the lock stays
    /// in the slot until the release call has actually run; if this future
    /// is dropped mid-shutdown (caller timeout, `select!`), the drop
    /// fallback still finds the lock and releases it.
    async fn shutdown(mut self) -> RedlockResult<()> {
        if let Some(stop) = self.stop.take() {
            stop.send_replace(true);
        }
        if let Some(extender) = self.extender.take() {
            let _ = extender.await;
        }
        let mut slot = self.slot.lock().await;
        let result = match slot.as_ref() {
            Some(lock) => self.manager.release(lock, None).await.map(|_| ()),
            None => Ok(()),
        };
        *slot = None;
        drop(slot);
        self.armed = false;
        result
    }
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(stop) = self.stop.take() {
            stop.send_replace(true);
        }
        let manager = self.manager.clone();
        let slot = Arc::clone(&self.slot);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Some(lock) = slot.lock().await.take() {
                    let _ = manager.release(&lock, None).await;
                }
            });
        }
    }
}

impl LockManager {
    /// Scoped acquisition: acquires the resources, runs `routine` while an
    /// extension timer keeps the lease alive, and releases on every exit
    /// path.
    ///
    /// The routine's own result channel is its return value `T`; errors from
    /// this method are acquisition, precondition, or release failures. A
    /// failed release surfaces here even when the routine completed cleanly.
    pub async fn using<T, F, Fut>(
        &self,
        resources: &[&str],
        duration: Duration,
        settings: Option<LockSettings>,
        routine: F,
    ) -> RedlockResult<T>
    where
        F: FnOnce(ScopedSignal) -> Fut,
        Fut: Future<Output = T>,
    {
        let settings = settings.unwrap_or_else(|| self.settings().clone());
        validate_duration(duration)?;
        if settings.automatic_extension_threshold + Duration::from_millis(100) > duration {
            return Err(RedlockError::InvalidArgument(
                "automatic extension threshold must leave at least 100ms of lease headroom"
                    .to_string(),
            ));
        }

        let lock = self
            .acquire(resources, duration, Some(settings.clone()))
            .await?;
        let slot: LockSlot = Arc::new(TokioMutex::new(Some(lock)));

        let (stop_tx, stop_rx) = watch::channel(false);
        let (abort_tx, abort_rx) = watch::channel(false);
        let error: ErrorSlot = Arc::new(StdMutex::new(None));
        let extensions = Arc::new(AtomicUsize::new(0));

        let signal = ScopedSignal {
            aborted: abort_rx,
            error: Arc::clone(&error),
            extensions: Arc::clone(&extensions),
        };

        let extender = AutoExtender {
            manager: self.clone(),
            slot: Arc::clone(&slot),
            duration,
            settings,
            abort: abort_tx,
            error,
            extensions,
        };
        let extender = tokio::spawn(extender.run(stop_rx));

        let guard = ReleaseGuard {
            manager: self.clone(),
            slot,
            stop: Some(stop_tx),
            extender: Some(extender),
            armed: true,
        };

        let value = routine(signal).await;
        guard.shutdown().await?;
        Ok(value)
    }
}
