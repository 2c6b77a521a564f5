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

use redis::RedisError;
use thiserror::Error;

use crate::lock::AttemptStats;

pub type RedlockResult<T> = std::result::Result<T, RedlockError>;

#[derive(Error, Debug)]
pub enum RedlockError {
    #[error("Redis error: {0}")]
    RedisError(#[from] RedisError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Terminal multi-attempt failure: quorum was never reached within the
    /// retry budget. Carries every attempt's stats handle so callers can see
    /// which servers voted which way.
    #[error("{reason}")]
    ExecutionFailed {
        reason: String,
        attempts: Vec<Arc<AttemptStats>>,
    },

    /// An executor future panicked instead of answering with a vote. Not
    /// recoverable; the operation that observed it is aborted.
    #[error("Lock task failed: {0}")]
    TaskFailure(String),

    #[error("Connection pool error: {0}")]
    PoolError(String),
}

impl From<tokio::task::JoinError> for RedlockError {
    fn from(err: tokio::task::JoinError) -> Self {
        RedlockError::TaskFailure(err.to_string())
    }
}

impl From<deadpool::managed::BuildError> for RedlockError {
    fn from(err: deadpool::managed::BuildError) -> Self {
        RedlockError::PoolError(err.to_string())
    }
}

/// Why a single server voted against an attempt. Preserved per-server inside
/// `ExecutionStats::votes_against`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VoteError {
    #[error("The operation was applied to {applied} of {requested} requested resources")]
    ResourceLocked { applied: i64, requested: usize },

    #[error("Redis transport error: {0}")]
    Transport(String),
}
