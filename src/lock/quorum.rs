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
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::debug;

use crate::errors::{RedlockError, RedlockResult};
use crate::lock::executor::{LockCommand, LockExecutor, Vote};
use crate::lock::manager::LockEvent;
use crate::lock::stats::AttemptStats;
use crate::util::calculate_quorum;

pub(crate) struct AttemptOutcome {
    pub(crate) granted: bool,
    pub(crate) stats: Arc<AttemptStats>,
    pub(crate) started_at: Instant,
}

/// One fan-out across the whole membership.
///
/// Every executor call runs in parallel; the attempt resolves the instant
/// either side reaches quorum, and the stragglers keep voting into the
/// shared tally from a background task until the handle settles.
pub(crate) async fn run_attempt(
    executors: &[Arc<dyn LockExecutor>],
    command: &LockCommand,
    keys: &[String],
    events: &broadcast::Sender<LockEvent>,
) -> RedlockResult<AttemptOutcome> {
    let membership = executors.len();
    let quorum = calculate_quorum(membership);
    let stats = Arc::new(AttemptStats::new(membership));
    let started_at = Instant::now();

    let mut votes: JoinSet<(String, Vote)> = JoinSet::new();
    for executor in executors {
        let executor = Arc::clone(executor);
        let command = command.clone();
        let keys = keys.to_vec();
        votes.spawn(async move {
            let vote = executor.execute(&command, &keys).await;
            (executor.id().to_owned(), vote)
        });
    }

    let mut granted = None;
    while let Some(next) = votes.join_next().await {
        // A panicking executor is a programmer error; dropping the set
        // aborts the attempt's remaining calls.
        let (server, vote) = next?;
        publish(events, command, &server, &vote);
        let (votes_for, votes_against) = stats.record(server, vote).await;
        if votes_for >= quorum {
            granted = Some(true);
            break;
        }
        if votes_against >= quorum {
            granted = Some(false);
            break;
        }
        if votes_for + votes_against == membership {
            // All votes landed without a quorum either way, which only an
            // even membership split can produce. The attempt cannot succeed.
            granted = Some(false);
            break;
        }
    }

    let Some(granted) = granted else {
        return Err(RedlockError::TaskFailure(
            "attempt finished without casting any votes".to_string(),
        ));
    };

    debug!(granted, quorum, membership, op = %command.kind(), "attempt resolved");

    if votes.is_empty() {
        stats.mark_settled();
    } else {
        let stats = Arc::clone(&stats);
        let command = command.clone();
        let events = events.clone();
        tokio::spawn(async move {
            let mut votes = votes;
            while let Some(next) = votes.join_next().await {
                match next {
                    Ok((server, vote)) => {
                        publish(&events, &command, &server, &vote);
                        stats.record(server, vote).await;
                    }
                    Err(err) => debug!(error = %err, "background vote task failed"),
                }
            }
            stats.mark_settled();
        });
    }

    Ok(AttemptOutcome {
        granted,
        stats,
        started_at,
    })
}

/// Every conflict and transport error is observable on the event stream.
fn publish(
    events: &broadcast::Sender<LockEvent>,
    command: &LockCommand,
    server: &str,
    vote: &Vote,
) {
    if let Vote::Against(error) = vote {
        let _ = events.send(LockEvent {
            server: server.to_string(),
            operation: command.kind(),
            error: error.clone(),
        });
    }
}
