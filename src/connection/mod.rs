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

use deadpool::managed::{Metrics, RecycleError, RecycleResult, Timeouts};
use deadpool::Runtime;
use redis::aio::MultiplexedConnection;
use redis::{Client, RedisError};

use crate::errors::RedlockResult;

const POOL_SIZE: usize = 8;
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(3);

pub(crate) type ServerPool = deadpool::managed::Pool<ServerConnectionManager>;

/// Hands out multiplexed connections to a single Redis server.
pub struct ServerConnectionManager {
    client: Client,
}

impl deadpool::managed::Manager for ServerConnectionManager {
    type Type = MultiplexedConnection;
    type Error = RedisError;

    async fn create(&self) -> Result<Self::Type, Self::Error> {
        self.client.get_multiplexed_async_connection().await
    }

    async fn recycle(
        &self,
        conn: &mut Self::Type,
        _metrics: &Metrics,
    ) -> RecycleResult<Self::Error> {
        match redis::cmd("PING").query_async::<String>(conn).await {
            Ok(pong) if pong == "PONG" => Ok(()),
            Ok(_) => Err(RecycleError::Message("Invalid PONG response".into())),
            Err(e) => Err(RecycleError::Backend(e)),
        }
    }
}

pub(crate) fn build_pool(client: Client) -> RedlockResult<ServerPool> {
    let pool = deadpool::managed::Pool::builder(ServerConnectionManager { client })
        .max_size(POOL_SIZE)
        .timeouts(Timeouts {
            wait: Some(CONNECTION_TIMEOUT),
            create: Some(CONNECTION_TIMEOUT),
            recycle: Some(Duration::from_secs(5)),
        })
        .runtime(Runtime::Tokio1)
        .build()?;

    Ok(pool)
}
