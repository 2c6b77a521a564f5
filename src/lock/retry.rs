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
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::time::sleep;
use tracing::debug;

use crate::config::LockSettings;
use crate::errors::{RedlockError, RedlockResult};
use crate::lock::executor::{LockCommand, LockExecutor};
use crate::lock::manager::LockEvent;
use crate::lock::quorum::run_attempt;
use crate::lock::stats::{AttemptStats, ExecutionResult};
use crate::util::jitter_delay;

/// Drives attempts until one is granted or the retry budget runs out.
///
/// `retry_count` is the number of *additional* attempts after the first;
/// a negative count means the loop never gives up on its own. The sleep
/// between attempts is jittered and cancels with the caller's future.
pub(crate) async fn execute(
    executors: &[Arc<dyn LockExecutor>],
    command: &LockCommand,
    keys: &[String],
    settings: &LockSettings,
    events: &broadcast::Sender<LockEvent>,
) -> RedlockResult<ExecutionResult> {
    let mut budget: Option<u64> = if settings.retry_count < 0 {
        None
    } else {
        Some(settings.retry_count as u64 + 1)
    };
    let mut attempts: Vec<Arc<AttemptStats>> = Vec::new();

    loop {
        let outcome = run_attempt(executors, command, keys, events).await?;
        attempts.push(Arc::clone(&outcome.stats));

        if outcome.granted {
            return Ok(ExecutionResult {
                attempts,
                started_at: outcome.started_at,
            });
        }

        if let Some(remaining) = budget.as_mut() {
            *remaining -= 1;
            if *remaining == 0 {
                break;
            }
        }

        let delay = jitter_delay(settings.retry_delay, settings.retry_jitter);
        debug!(
            attempt = attempts.len(),
            delay_ms = delay.as_millis() as u64,
            op = %command.kind(),
            "attempt rejected, retrying"
        );
        sleep(delay).await;
    }

    Err(RedlockError::ExecutionFailed {
        reason: format!(
            "The operation was unable to achieve a quorum during its retry window ({} attempts)",
            attempts.len()
        ),
        attempts,
    })
}
