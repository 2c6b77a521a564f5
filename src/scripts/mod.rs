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

use once_cell::sync::Lazy;
use redis::Script;

// Each script starts with a protected SELECT so deployments that refuse
// database selection (clusters) still run the rest of the script.

/// Creates every key with the lock value and a millisecond TTL, or refuses
/// the whole batch when any key already exists.
///
/// `KEYS=[k1..kn] ARGV=[db, value, durationMs]`; returns `#KEYS` on success,
/// `0` on conflict.
pub static ACQUIRE_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
        redis.pcall('select', ARGV[1])

        for _, key in ipairs(KEYS) do
            if redis.call('exists', key) == 1 then
                return 0
            end
        end

        for _, key in ipairs(KEYS) do
            redis.call('set', key, ARGV[2], 'PX', ARGV[3])
        end

        return #KEYS
    "#,
    )
});

/// Refreshes every key's TTL, or refuses the whole batch when any key's
/// value differs from the lock value (including keys that already expired).
///
/// `KEYS=[k1..kn] ARGV=[db, value, durationMs]`; returns `#KEYS` on success,
/// `0` on mismatch.
pub static EXTEND_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
        redis.pcall('select', ARGV[1])

        for _, key in ipairs(KEYS) do
            if redis.call('get', key) ~= ARGV[2] then
                return 0
            end
        end

        for _, key in ipairs(KEYS) do
            redis.call('set', key, ARGV[2], 'PX', ARGV[3])
        end

        return #KEYS
    "#,
    )
});

/// Deletes every key whose value matches the lock value.
///
/// `KEYS=[k1..kn] ARGV=[db, value]`; returns the number of keys deleted,
/// which may be 0 and is never a failure.
pub static RELEASE_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
        redis.pcall('select', ARGV[1])

        local released = 0
        for _, key in ipairs(KEYS) do
            if redis.call('get', key) == ARGV[2] then
                redis.call('del', key)
                released = released + 1
            end
        end

        return released
    "#,
    )
});
