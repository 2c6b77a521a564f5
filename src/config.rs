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
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{RedlockError, RedlockResult};

/// Tuning knobs for lock operations.
///
/// A manager carries one instance as its defaults; every operation accepts an
/// optional per-call override, and a minted lock remembers the settings it
/// was acquired under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockSettings {
    /// Fraction of the lease duration subtracted from the caller-visible
    /// expiration to tolerate clock skew between client and servers.
    pub drift_factor: f64,
    /// Maximum additional attempts after the first; `-1` means unbounded.
    pub retry_count: i32,
    /// Base delay between attempts.
    pub retry_delay: Duration,
    /// Symmetric additive jitter bound applied to the retry delay.
    pub retry_jitter: Duration,
    /// How long before expiration the scoped holder schedules an extension.
    pub automatic_extension_threshold: Duration,
    /// Server-side database index (0-15). Out-of-range values select 0.
    pub db: i64,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            drift_factor: 0.01,
            retry_count: 10,
            retry_delay: Duration::from_millis(200),
            retry_jitter: Duration::from_millis(100),
            automatic_extension_threshold: Duration::from_millis(500),
            db: 0,
        }
    }
}

impl LockSettings {
    pub fn with_drift_factor(mut self, factor: f64) -> Self {
        self.drift_factor = factor;
        self
    }

    pub fn with_retry_count(mut self, count: i32) -> Self {
        self.retry_count = count;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_retry_jitter(mut self, jitter: Duration) -> Self {
        self.retry_jitter = jitter;
        self
    }

    pub fn with_automatic_extension_threshold(mut self, threshold: Duration) -> Self {
        self.automatic_extension_threshold = threshold;
        self
    }

    pub fn with_db(mut self, db: i64) -> Self {
        self.db = db;
        self
    }

    /// Database index actually sent to the servers.
    pub fn database(&self) -> i64 {
        if (0..=15).contains(&self.db) {
            self.db
        } else {
            0
        }
    }
}

/// A lease duration must be at least one whole millisecond.
pub(crate) fn validate_duration(duration: Duration) -> RedlockResult<u64> {
    let ms = duration.as_millis();
    if ms < 1 {
        return Err(RedlockError::InvalidArgument(
            "lock duration must be at least 1 millisecond".to_string(),
        ));
    }
    u64::try_from(ms).map_err(|_| {
        RedlockError::InvalidArgument("lock duration exceeds the representable range".to_string())
    })
}
