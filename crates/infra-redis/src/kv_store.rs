// Redis KvStore Implementation

use async_trait::async_trait;
use conthesis_core::application::constants::{LOCK_ACQUIRE_RETRY, LOCK_LEASE, RECORD_TTL};
use conthesis_core::domain::Status;
use conthesis_core::error::{EngineError, Result};
use conthesis_core::port::kv_store::{job_key, lock_key, state_key, FIELD_STATE};
use conthesis_core::port::{FieldMap, JobLock, KvStore};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::info;

// Helper to convert redis::RedisError to EngineError at the boundary
fn map_redis_error(err: redis::RedisError) -> EngineError {
    EngineError::Store(format!("{}: {}", err.category(), err))
}

/// Release only the lease we took: compare the stored token before deleting.
const RELEASE_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
else
    return 0
end"#;

pub struct RedisKvStore {
    conn: ConnectionManager,
}

impl RedisKvStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

/// Connect and wrap a multiplexed connection with reconnect handling.
pub async fn connect(url: &str) -> Result<RedisKvStore> {
    let client = redis::Client::open(url).map_err(map_redis_error)?;
    let conn = client
        .get_connection_manager()
        .await
        .map_err(map_redis_error)?;
    Ok(RedisKvStore::new(conn))
}

pub struct RedisJobLock {
    conn: ConnectionManager,
    key: String,
    token: String,
    held: bool,
}

#[async_trait]
impl JobLock for RedisJobLock {
    async fn acquire(&mut self, blocking: bool) -> Result<bool> {
        loop {
            let taken: bool = redis::cmd("SET")
                .arg(&self.key)
                .arg(&self.token)
                .arg("NX")
                .arg("PX")
                .arg(LOCK_LEASE.as_millis() as u64)
                .query_async(&mut self.conn)
                .await
                .map_err(map_redis_error)?;
            if taken {
                self.held = true;
                return Ok(true);
            }
            if !blocking {
                return Ok(false);
            }
            tokio::time::sleep(LOCK_ACQUIRE_RETRY).await;
        }
    }

    async fn release(&mut self) -> Result<()> {
        if !self.held {
            return Ok(());
        }
        self.held = false;
        let script = redis::Script::new(RELEASE_SCRIPT);
        let _: i64 = script
            .key(&self.key)
            .arg(&self.token)
            .invoke_async(&mut self.conn)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }
}

#[async_trait]
impl KvStore for RedisKvStore {
    fn lock(&self, jid: &str) -> Box<dyn JobLock> {
        Box::new(RedisJobLock {
            conn: self.conn.clone(),
            key: lock_key(jid),
            token: uuid::Uuid::new_v4().to_string(),
            held: false,
        })
    }

    async fn set(&self, jid: &str, fields: FieldMap, src_state: Option<&str>) -> Result<()> {
        let mut conn = self.conn.clone();
        let key = job_key(jid);
        let dst = fields
            .get(FIELD_STATE)
            .map(|v| String::from_utf8_lossy(v).into_owned());

        let items: Vec<(&str, Vec<u8>)> = fields.into_iter().collect();
        if !items.is_empty() {
            let _: () = conn
                .hset_multiple(&key, &items)
                .await
                .map_err(map_redis_error)?;
            let _: () = conn
                .expire(&key, RECORD_TTL.as_secs() as i64)
                .await
                .map_err(map_redis_error)?;
        }

        if let Some(dst) = dst {
            match src_state {
                Some(src) if src != dst => {
                    info!(jid = %jid, from = %src, to = %dst, "job state altered");
                    let _: () = conn
                        .srem(state_key(src), jid)
                        .await
                        .map_err(map_redis_error)?;
                    let _: () = conn
                        .sadd(state_key(&dst), jid)
                        .await
                        .map_err(map_redis_error)?;
                }
                None => {
                    info!(jid = %jid, state = %dst, "job state recorded");
                    let _: () = conn
                        .sadd(state_key(&dst), jid)
                        .await
                        .map_err(map_redis_error)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    async fn get(&self, jid: &str, field: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn
            .hget(job_key(jid), field)
            .await
            .map_err(map_redis_error)?;
        Ok(value)
    }

    async fn random_sample(&self, state: Status, n: usize) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let jids: Vec<String> = redis::cmd("SRANDMEMBER")
            .arg(state_key(state.name()))
            .arg(n)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(jids)
    }
}

#[cfg(test)]
mod tests {
    use conthesis_core::port::kv_store::{job_key, lock_key, state_key};

    #[test]
    fn store_key_layout() {
        assert_eq!(job_key("j1"), "job-j1");
        assert_eq!(state_key("RUNNING"), "job-state-RUNNING");
        assert_eq!(lock_key("j1"), "job-lock-j1");
    }
}
