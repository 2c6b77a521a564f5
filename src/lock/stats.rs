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
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{watch, RwLock};
use tokio::time::Instant;

use crate::errors::VoteError;
use crate::lock::executor::Vote;
use crate::util::calculate_quorum;

/// Vote tally of one attempt across the membership.
#[derive(Debug, Clone)]
pub struct ExecutionStats {
    pub membership_size: usize,
    pub quorum_size: usize,
    pub votes_for: HashSet<String>,
    pub votes_against: HashMap<String, VoteError>,
}

impl ExecutionStats {
    fn new(membership_size: usize) -> Self {
        Self {
            membership_size,
            quorum_size: calculate_quorum(membership_size),
            votes_for: HashSet::new(),
            votes_against: HashMap::new(),
        }
    }

    pub fn votes_cast(&self) -> usize {
        self.votes_for.len() + self.votes_against.len()
    }
}

/// Handle onto one attempt's tally.
///
/// The attempt resolves as soon as either threshold is crossed, but the
/// remaining RPCs keep voting in the background; the handle is marked
/// settled exactly once, after all of them have terminated. `snapshot` reads
/// whatever has landed so far, `settled` waits for the full tally.
#[derive(Debug)]
pub struct AttemptStats {
    stats: RwLock<ExecutionStats>,
    settled: watch::Sender<bool>,
}

impl AttemptStats {
    pub(crate) fn new(membership_size: usize) -> Self {
        let (settled, _) = watch::channel(false);
        Self {
            stats: RwLock::new(ExecutionStats::new(membership_size)),
            settled,
        }
    }

    pub async fn snapshot(&self) -> ExecutionStats {
        self.stats.read().await.clone()
    }

    pub fn is_settled(&self) -> bool {
        *self.settled.borrow()
    }

    /// Waits until every server's vote has landed, then returns the tally.
    pub async fn settled(&self) -> ExecutionStats {
        let mut rx = self.settled.subscribe();
        loop {
            if *rx.borrow_and_update() {
                break;
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
        self.snapshot().await
    }

    /// Returns the (for, against) counts after the vote is applied.
    pub(crate) async fn record(&self, server: String, vote: Vote) -> (usize, usize) {
        let mut stats = self.stats.write().await;
        match vote {
            Vote::For(_) => {
                stats.votes_for.insert(server);
            }
            Vote::Against(error) => {
                stats.votes_against.insert(server, error);
            }
        }
        (stats.votes_for.len(), stats.votes_against.len())
    }

    pub(crate) fn mark_settled(&self) {
        self.settled.send_replace(true);
    }
}

/// Bundle returned from a successful multi-attempt operation: one stats
/// handle per attempt made, plus the decisive attempt's start timestamp.
#[derive(Debug)]
pub struct ExecutionResult {
    pub attempts: Vec<Arc<AttemptStats>>,
    pub started_at: Instant,
}
