//! C1: a thin wrapper over an external KV store (section 4, component
//! table). Offers exactly the atomic primitives spec section 5 says every
//! mutation must go through: `SET NX`, `EXPIRE`, `HSET`, list push/pop, and
//! pub/sub - no multi-key transactions are assumed.
//!
//! Modeled on the `redis::AsyncCommands` usage in the `rivet-dev-engine`
//! lobby worker (other_examples): a multiplexed async connection shared
//! behind a cheap `Clone`, with call sites doing one command at a time.

use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use crate::error::{CoordinatorError, Result};

#[derive(Clone)]
pub struct KvStore {
    conn: ConnectionManager,
}

impl KvStore {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| CoordinatorError::DownstreamUnavailable { context: e.to_string() })?;
        let conn = client.get_connection_manager().await?;
        Ok(KvStore { conn })
    }

    /// `SET key value NX EX ttl_secs`. Returns `true` if the key was newly
    /// set (we won the race), `false` if it already existed.
    pub async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool> {
        let mut conn = self.conn.clone();
        let ok: bool = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async::<Option<String>>(&mut conn)
            .await?
            .is_some();
        Ok(ok)
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.get(key).await?)
    }

    pub async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(key, value, ttl_secs).await?;
        Ok(())
    }

    pub async fn expire(&self, key: &str, ttl_secs: u64) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.expire(key, ttl_secs as i64).await?;
        Ok(())
    }

    pub async fn del(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        Ok(conn.exists(key).await?)
    }

    pub async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.hset(key, field, value).await?;
        Ok(())
    }

    pub async fn hget_all(&self, key: &str) -> Result<std::collections::HashMap<String, String>> {
        let mut conn = self.conn.clone();
        Ok(conn.hgetall(key).await?)
    }

    /// Appends to the tail of a list, used for the event outbox's FIFO.
    pub async fn rpush(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.rpush(key, value).await?;
        Ok(())
    }

    pub async fn lrange_all(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.lrange(key, 0, -1).await?)
    }

    /// Drops the first `count` elements from the head of the list (used to
    /// enforce the outbox's bounded cap by evicting the oldest entries).
    pub async fn ltrim_from_head(&self, key: &str, count: isize) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.ltrim(key, count, -1).await?;
        Ok(())
    }

    pub async fn llen(&self, key: &str) -> Result<usize> {
        let mut conn = self.conn.clone();
        Ok(conn.llen(key).await?)
    }

    pub async fn publish(&self, channel: &str, message: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.publish(channel, message).await?;
        Ok(())
    }
}
