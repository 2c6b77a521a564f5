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

use rand::Rng;
use uuid::Uuid;

/// A fresh 128-bit random lock value, 32 lowercase hex characters.
pub(crate) fn mint_lock_value() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Strict majority of the membership.
pub(crate) fn calculate_quorum(membership: usize) -> usize {
    membership / 2 + 1
}

/// Conservative reduction of the caller-visible lease: server TTLs have 1ms
/// precision and the clocks involved are not the same clock.
pub(crate) fn calculate_drift(duration_ms: u64, drift_factor: f64) -> u64 {
    (drift_factor * duration_ms as f64).round() as u64 + 2
}

/// Base delay plus a uniform sample from `[-jitter, +jitter]`, clamped at
/// zero so a negative sample collapses to an immediate retry.
pub(crate) fn jitter_delay(base: Duration, jitter: Duration) -> Duration {
    let jitter_ms = jitter.as_millis() as i64;
    let offset = if jitter_ms == 0 {
        0
    } else {
        rand::thread_rng().gen_range(-jitter_ms..=jitter_ms)
    };
    let delay_ms = (base.as_millis() as i64 + offset).max(0);
    Duration::from_millis(delay_ms as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quorum_is_a_strict_majority() {
        assert_eq!(calculate_quorum(1), 1);
        assert_eq!(calculate_quorum(2), 2);
        assert_eq!(calculate_quorum(3), 2);
        assert_eq!(calculate_quorum(4), 3);
        assert_eq!(calculate_quorum(5), 3);
    }

    #[test]
    fn drift_rounds_and_pads() {
        assert_eq!(calculate_drift(1000, 0.01), 12);
        assert_eq!(calculate_drift(200, 0.01), 4);
        assert_eq!(calculate_drift(1, 0.01), 2);
    }

    #[test]
    fn lock_values_are_32_hex_chars() {
        let value = mint_lock_value();
        assert_eq!(value.len(), 32);
        assert!(value.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(value, mint_lock_value());
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let base = Duration::from_millis(200);
        let jitter = Duration::from_millis(100);
        for _ in 0..200 {
            let delay = jitter_delay(base, jitter);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(300));
        }
    }

    #[test]
    fn jitter_clamps_at_zero() {
        let base = Duration::from_millis(10);
        let jitter = Duration::from_millis(500);
        for _ in 0..200 {
            let delay = jitter_delay(base, jitter);
            assert!(delay <= Duration::from_millis(510));
        }
    }

    #[test]
    fn zero_jitter_is_exact() {
        let base = Duration::from_millis(200);
        assert_eq!(jitter_delay(base, Duration::ZERO), base);
    }
}
