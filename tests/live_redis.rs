//! Boundary scenarios against a real Redis server.
//!
//! These tests are ignored by default; point `REDIS_URLS` at one or more
//! servers (comma separated, defaults to `redis://127.0.0.1:6379`) and run
//! `cargo test -- --ignored`.

use std::time::Duration;

use anyhow::Result;
use redlock::{LockManager, LockSettings, RedlockError};
use tokio::time::sleep;

fn addresses() -> Vec<String> {
    std::env::var("REDIS_URLS")
        .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
        .split(',')
        .map(String::from)
        .collect()
}

fn manager() -> Result<LockManager> {
    let settings = LockSettings::default()
        .with_retry_delay(Duration::from_millis(50))
        .with_retry_jitter(Duration::from_millis(20));
    Ok(LockManager::new(addresses(), settings)?)
}

async fn client() -> Result<redis::aio::MultiplexedConnection> {
    let client = redis::Client::open(addresses().remove(0))?;
    Ok(client.get_multiplexed_async_connection().await?)
}

async fn get(conn: &mut redis::aio::MultiplexedConnection, key: &str) -> Result<Option<String>> {
    Ok(redis::cmd("GET").arg(key).query_async(conn).await?)
}

async fn pttl(conn: &mut redis::aio::MultiplexedConnection, key: &str) -> Result<i64> {
    Ok(redis::cmd("PTTL").arg(key).query_async(conn).await?)
}

async fn clear(conn: &mut redis::aio::MultiplexedConnection, keys: &[&str]) -> Result<()> {
    for key in keys {
        let _: i64 = redis::cmd("DEL").arg(key).query_async(conn).await?;
    }
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running Redis server"]
async fn acquire_extend_release_round_trip() -> Result<()> {
    let mut conn = client().await?;
    clear(&mut conn, &["rl:t:round"]).await?;
    let manager = manager()?;

    let lock = manager
        .acquire(&["rl:t:round"], Duration::from_millis(1000), None)
        .await?;
    assert_eq!(lock.value().len(), 32);
    assert_eq!(
        get(&mut conn, "rl:t:round").await?.as_deref(),
        Some(lock.value())
    );
    let ttl = pttl(&mut conn, "rl:t:round").await?;
    assert!(ttl > 900 && ttl <= 1000, "unexpected PTTL {ttl}");

    let extended = lock.extend(Duration::from_millis(3000)).await?;
    let ttl = pttl(&mut conn, "rl:t:round").await?;
    assert!(ttl > 2900 && ttl <= 3000, "unexpected PTTL {ttl}");

    extended.release().await?;
    assert_eq!(get(&mut conn, "rl:t:round").await?, None);
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running Redis server"]
async fn a_lapsed_lease_frees_the_resource() -> Result<()> {
    let mut conn = client().await?;
    clear(&mut conn, &["rl:t:lapse"]).await?;
    let manager = manager()?;

    let first = manager
        .acquire(&["rl:t:lapse"], Duration::from_millis(200), None)
        .await?;
    sleep(Duration::from_millis(300)).await;

    let second = manager
        .acquire(&["rl:t:lapse"], Duration::from_millis(200), None)
        .await?;
    assert_ne!(first.value(), second.value());

    second.release().await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running Redis server"]
async fn overlapping_batches_do_not_leak_keys() -> Result<()> {
    let mut conn = client().await?;
    clear(&mut conn, &["rl:t:a", "rl:t:b", "rl:t:c"]).await?;
    let manager = manager()?;

    let first = manager
        .acquire(&["rl:t:a", "rl:t:b"], Duration::from_secs(10), None)
        .await?;

    let settings = manager.settings().clone().with_retry_count(0);
    let err = manager
        .acquire(&["rl:t:b", "rl:t:c"], Duration::from_secs(10), Some(settings))
        .await
        .unwrap_err();
    assert!(matches!(err, RedlockError::ExecutionFailed { .. }));

    // The losing batch must not leave its free key locked behind it.
    assert_eq!(get(&mut conn, "rl:t:c").await?, None);
    assert_eq!(
        get(&mut conn, "rl:t:a").await?.as_deref(),
        Some(first.value())
    );

    first.release().await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running Redis server"]
async fn scoped_routine_is_kept_alive_and_cleaned_up() -> Result<()> {
    let mut conn = client().await?;
    clear(&mut conn, &["rl:t:scoped"]).await?;
    let manager = manager()?;
    let settings = manager
        .settings()
        .clone()
        .with_automatic_extension_threshold(Duration::from_millis(200));

    let (aborted, extensions) = manager
        .using(
            &["rl:t:scoped"],
            Duration::from_millis(500),
            Some(settings),
            |signal| async move {
                sleep(Duration::from_millis(700)).await;
                (signal.is_aborted(), signal.extensions())
            },
        )
        .await?;

    assert!(!aborted);
    assert!(extensions >= 1);
    assert_eq!(get(&mut conn, "rl:t:scoped").await?, None);
    Ok(())
}
