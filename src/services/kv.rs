use std::collections::HashMap;
use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisError};
use tokio::time::timeout;

fn timed_out() -> RedisError {
    RedisError::from((redis::ErrorKind::IoError, "kv operation timed out"))
}

fn is_transient(err: &RedisError) -> bool {
    err.is_timeout() || err.is_connection_dropped() || err.is_io_error()
}

/// Pooled access to the key/value store. One multiplexed connection carries
/// all commands; pub/sub gets its own connection so subscriptions never sit
/// on the command path.
#[derive(Clone)]
pub struct KvStore {
    client: redis::Client,
    conn: ConnectionManager,
    op_timeout: Duration,
    retries: u32,
}

impl KvStore {
    pub async fn connect(url: &str, op_timeout_ms: u64, retries: u32) -> Result<Self, RedisError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client.clone()).await?;
        Ok(Self {
            client,
            conn,
            op_timeout: Duration::from_millis(op_timeout_ms),
            retries,
        })
    }

    /// Dedicated pub/sub connection.
    pub async fn pubsub(&self) -> Result<redis::aio::PubSub, RedisError> {
        self.client.get_async_pubsub().await
    }

    pub async fn ping(&self) -> bool {
        let mut conn = self.conn.clone();
        let reply: Result<String, RedisError> = redis::cmd("PING").query_async(&mut conn).await;
        matches!(reply.as_deref(), Ok("PONG"))
    }

    /// Runs an operation with a soft timeout; transient failures are retried
    /// with capped backoff, permanent failures surface to the caller.
    async fn with_retry<T, F, Fut>(&self, op: &'static str, f: F) -> Result<T, RedisError>
    where
        F: Fn(ConnectionManager) -> Fut,
        Fut: std::future::Future<Output = Result<T, RedisError>>,
    {
        let mut attempt: u32 = 0;
        let mut backoff = Duration::from_millis(50);
        loop {
            let result = match timeout(self.op_timeout, f(self.conn.clone())).await {
                Ok(reply) => reply,
                Err(_) => Err(timed_out()),
            };
            match result {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.retries && is_transient(&err) => {
                    tracing::warn!(op, attempt, error = %err, "kv operation failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(Duration::from_millis(500));
                    attempt += 1;
                }
                Err(err) => {
                    tracing::error!(op, error = %err, "kv operation failed");
                    return Err(err);
                }
            }
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, RedisError> {
        self.with_retry("get", |mut conn| async move { conn.get(key).await })
            .await
    }

    pub async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), RedisError> {
        self.with_retry("set_ex", |mut conn| async move {
            conn.set_ex(key, value, ttl_secs).await
        })
        .await
    }

    /// SET NX EX in one round trip; true when this call created the key.
    pub async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool, RedisError> {
        self.with_retry("set_nx_ex", |mut conn| async move {
            let reply: Option<String> = redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("NX")
                .arg("EX")
                .arg(ttl_secs)
                .query_async(&mut conn)
                .await?;
            Ok(reply.is_some())
        })
        .await
    }

    pub async fn del(&self, key: &str) -> Result<(), RedisError> {
        self.with_retry("del", |mut conn| async move { conn.del(key).await })
            .await
    }

    pub async fn del_many(&self, keys: &[String]) -> Result<(), RedisError> {
        if keys.is_empty() {
            return Ok(());
        }
        self.with_retry("del_many", |mut conn| async move {
            let mut pipe = redis::pipe();
            for key in keys {
                pipe.del(key).ignore();
            }
            pipe.query_async(&mut conn).await
        })
        .await
    }

    pub async fn incr(&self, key: &str) -> Result<i64, RedisError> {
        self.with_retry("incr", |mut conn| async move { conn.incr(key, 1).await })
            .await
    }

    pub async fn expire(&self, key: &str, ttl_secs: i64) -> Result<(), RedisError> {
        self.with_retry("expire", |mut conn| async move {
            conn.expire(key, ttl_secs).await
        })
        .await
    }

    pub async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, RedisError> {
        self.with_retry("hgetall", |mut conn| async move { conn.hgetall(key).await })
            .await
    }

    pub async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), RedisError> {
        self.with_retry("hset", |mut conn| async move {
            conn.hset(key, field, value).await
        })
        .await
    }

    /// HSETNX; true when the field was absent and has been written.
    pub async fn hset_nx(&self, key: &str, field: &str, value: &str) -> Result<bool, RedisError> {
        self.with_retry("hset_nx", |mut conn| async move {
            conn.hset_nx(key, field, value).await
        })
        .await
    }

    pub async fn hincr(&self, key: &str, field: &str, delta: i64) -> Result<i64, RedisError> {
        self.with_retry("hincr", |mut conn| async move {
            conn.hincr(key, field, delta).await
        })
        .await
    }

    pub async fn zadd(&self, key: &str, member: &str, score: i64) -> Result<(), RedisError> {
        self.with_retry("zadd", |mut conn| async move {
            conn.zadd(key, member, score).await
        })
        .await
    }

    pub async fn zcard(&self, key: &str) -> Result<i64, RedisError> {
        self.with_retry("zcard", |mut conn| async move { conn.zcard(key).await })
            .await
    }

    pub async fn zrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, RedisError> {
        self.with_retry("zrange", |mut conn| async move {
            conn.zrange(key, start, stop).await
        })
        .await
    }

    pub async fn zrange_withscores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(String, i64)>, RedisError> {
        self.with_retry("zrange_withscores", |mut conn| async move {
            conn.zrange_withscores(key, start, stop).await
        })
        .await
    }

    pub async fn zremrangebyrank(&self, key: &str, start: isize, stop: isize) -> Result<(), RedisError> {
        self.with_retry("zremrangebyrank", |mut conn| async move {
            conn.zremrangebyrank(key, start, stop).await
        })
        .await
    }

    pub async fn llen(&self, key: &str) -> Result<i64, RedisError> {
        self.with_retry("llen", |mut conn| async move { conn.llen(key).await })
            .await
    }

    /// Restartable cursor walk; returns all keys matching the pattern.
    pub async fn scan_match(&self, pattern: &str) -> Result<Vec<String>, RedisError> {
        let mut conn = self.conn.clone();
        let mut keys = Vec::new();
        let mut iter = conn.scan_match::<_, String>(pattern).await?;
        while let Some(key) = iter.next_item().await {
            keys.push(key);
        }
        Ok(keys)
    }

    pub async fn publish(&self, channel: &str, payload: &str) -> Result<(), RedisError> {
        self.with_retry("publish", |mut conn| async move {
            conn.publish(channel, payload).await
        })
        .await
    }

    /// Batches commands atomically on the server (MULTI/EXEC).
    pub async fn pipeline<T: redis::FromRedisValue>(
        &self,
        pipe: &redis::Pipeline,
    ) -> Result<T, RedisError> {
        self.with_retry("pipeline", |mut conn| {
            let pipe = pipe.clone();
            async move { pipe.query_async(&mut conn).await }
        })
        .await
    }
}
