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
use std::fmt;

use async_trait::async_trait;
use redis::{Client, Script};
use tracing::debug;

use crate::connection::{build_pool, ServerPool};
use crate::errors::{RedlockResult, VoteError};
use crate::scripts::{ACQUIRE_SCRIPT, EXTEND_SCRIPT, RELEASE_SCRIPT};

/// Which scripted operation an attempt is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Acquire,
    Extend,
    Release,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandKind::Acquire => write!(f, "acquire"),
            CommandKind::Extend => write!(f, "extend"),
            CommandKind::Release => write!(f, "release"),
        }
    }
}

/// One scripted operation, fanned out identically to every member.
#[derive(Debug, Clone)]
pub struct LockCommand {
    pub(crate) db: i64,
    pub(crate) value: String,
    pub(crate) op: LockOp,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum LockOp {
    Acquire { duration_ms: u64 },
    Extend { duration_ms: u64 },
    Release,
}

impl LockCommand {
    pub(crate) fn acquire(db: i64, value: String, duration_ms: u64) -> Self {
        Self {
            db,
            value,
            op: LockOp::Acquire { duration_ms },
        }
    }

    pub(crate) fn extend(db: i64, value: String, duration_ms: u64) -> Self {
        Self {
            db,
            value,
            op: LockOp::Extend { duration_ms },
        }
    }

    pub(crate) fn release(db: i64, value: String) -> Self {
        Self {
            db,
            value,
            op: LockOp::Release,
        }
    }

    pub fn kind(&self) -> CommandKind {
        match self.op {
            LockOp::Acquire { .. } => CommandKind::Acquire,
            LockOp::Extend { .. } => CommandKind::Extend,
            LockOp::Release => CommandKind::Release,
        }
    }

    fn script(&self) -> &'static Script {
        match self.op {
            LockOp::Acquire { .. } => &ACQUIRE_SCRIPT,
            LockOp::Extend { .. } => &EXTEND_SCRIPT,
            LockOp::Release => &RELEASE_SCRIPT,
        }
    }
}

/// One server's verdict on one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Vote {
    /// The operation applied cleanly; carries the server's integer reply.
    For(i64),
    /// Conflict or transport failure.
    Against(VoteError),
}

/// A single member of the lock membership.
///
/// Executors never fail: conflicts and transport errors alike are folded
/// into the vote, so the quorum engine only ever sees ballots.
#[async_trait]
pub trait LockExecutor: Send + Sync {
    /// Stable identifier used in vote tallies and events.
    fn id(&self) -> &str;

    async fn execute(&self, command: &LockCommand, keys: &[String]) -> Vote;
}

/// Drives the three scripted commands against one Redis server.
///
/// Scripts go over EVALSHA; the first use on a fresh server reloads the
/// script body on NOSCRIPT, so installation is lazy and idempotent.
pub struct ServerAdapter {
    name: String,
    pool: ServerPool,
}

impl ServerAdapter {
    pub(crate) fn new(name: String, client: Client) -> RedlockResult<Self> {
        Ok(Self {
            name,
            pool: build_pool(client)?,
        })
    }

    async fn invoke(&self, command: &LockCommand, keys: &[String]) -> Result<i64, VoteError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| VoteError::Transport(e.to_string()))?;

        let script = command.script();
        let mut invocation = script.prepare_invoke();
        for key in keys {
            invocation.key(key.as_str());
        }
        invocation.arg(command.db).arg(&command.value);
        if let LockOp::Acquire { duration_ms } | LockOp::Extend { duration_ms } = command.op {
            invocation.arg(duration_ms);
        }

        invocation
            .invoke_async::<i64>(&mut *conn)
            .await
            .map_err(|e| VoteError::Transport(e.to_string()))
    }
}

#[async_trait]
impl LockExecutor for ServerAdapter {
    fn id(&self) -> &str {
        &self.name
    }

    async fn execute(&self, command: &LockCommand, keys: &[String]) -> Vote {
        let requested = keys.len();
        match self.invoke(command, keys).await {
            Ok(applied) => match command.op {
                // A release reply is a count, not a verdict; 0 just means
                // the keys were already gone.
                LockOp::Release => Vote::For(applied),
                _ if applied == requested as i64 => Vote::For(applied),
                _ => {
                    let error = VoteError::ResourceLocked { applied, requested };
                    debug!(server = %self.name, op = %command.kind(), %error, "vote against");
                    Vote::Against(error)
                }
            },
            Err(error) => {
                debug!(server = %self.name, op = %command.kind(), %error, "vote against");
                Vote::Against(error)
            }
        }
    }
}
