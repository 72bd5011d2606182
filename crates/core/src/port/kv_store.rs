// Key-Value Store Port (Interface)

use crate::domain::Status;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;

/// Fields of the per-job hash, stored under `job-{jid}`.
pub const FIELD_STATE: &str = "state";
pub const FIELD_TRIGGER: &str = "trigger";
pub const FIELD_ACTION: &str = "action";
pub const FIELD_VARIABLES: &str = "variables";
pub const FIELD_TIMESTAMP: &str = "timestamp";

/// A batch of hash fields written in one flush.
pub type FieldMap = HashMap<&'static str, Vec<u8>>;

pub fn job_key(jid: &str) -> String {
    format!("job-{jid}")
}

pub fn state_key(state: &str) -> String {
    format!("job-state-{state}")
}

pub fn lock_key(jid: &str) -> String {
    format!("job-lock-{jid}")
}

/// Distributed advisory lock scoped to one job. The lease is bounded so a
/// crashed holder cannot wedge the job forever.
#[async_trait]
pub trait JobLock: Send + Sync {
    /// Take the lock. With `blocking` the call waits for the current
    /// holder; without it, contention returns `false` immediately.
    async fn acquire(&mut self, blocking: bool) -> Result<bool>;

    async fn release(&mut self) -> Result<()>;
}

/// Shared external store holding job hashes, per-state index sets and
/// per-job locks.
#[async_trait]
pub trait KvStore: Send + Sync {
    fn lock(&self, jid: &str) -> Box<dyn JobLock>;

    /// Write `fields` of `job-{jid}` and refresh its TTL. When `state` is
    /// among the fields, the per-state index sets are maintained from
    /// `src_state`: remove-old/add-new when the state changed, add-only when
    /// `src_state` is null, untouched when they are equal.
    async fn set(&self, jid: &str, fields: FieldMap, src_state: Option<&str>) -> Result<()>;

    async fn get(&self, jid: &str, field: &str) -> Result<Option<Vec<u8>>>;

    /// Sample up to `n` members of the index set for `state`.
    async fn random_sample(&self, state: Status, n: usize) -> Result<Vec<String>>;
}

pub mod mocks {
    use super::*;
    use crate::application::constants::LOCK_ACQUIRE_RETRY;
    use crate::port::kv_store::FIELD_STATE;
    use std::collections::{BTreeSet, HashMap, HashSet};
    use std::sync::{Arc, Mutex};
    use tracing::info;

    #[derive(Default)]
    struct MemoryState {
        hashes: HashMap<String, HashMap<&'static str, Vec<u8>>>,
        sets: HashMap<String, BTreeSet<String>>,
        locks: HashSet<String>,
    }

    /// In-memory store with the full hash / index-set / lock contract.
    /// Sampling is deterministic (sorted order) so sweeper tests are stable.
    #[derive(Default)]
    pub struct MemoryKvStore {
        state: Arc<Mutex<MemoryState>>,
    }

    impl MemoryKvStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Direct read of an index set, for assertions.
        pub fn state_set(&self, state: Status) -> Vec<String> {
            let inner = self.state.lock().unwrap();
            inner
                .sets
                .get(&state_key(state.name()))
                .map(|s| s.iter().cloned().collect())
                .unwrap_or_default()
        }

        /// Seed a hash field without going through a session.
        pub fn put_field(&self, jid: &str, field: &'static str, value: Vec<u8>) {
            let mut inner = self.state.lock().unwrap();
            inner
                .hashes
                .entry(job_key(jid))
                .or_default()
                .insert(field, value);
        }
    }

    pub struct MemoryJobLock {
        state: Arc<Mutex<MemoryState>>,
        key: String,
        held: bool,
    }

    #[async_trait]
    impl JobLock for MemoryJobLock {
        async fn acquire(&mut self, blocking: bool) -> Result<bool> {
            loop {
                {
                    let mut inner = self.state.lock().unwrap();
                    if inner.locks.insert(self.key.clone()) {
                        self.held = true;
                        return Ok(true);
                    }
                }
                if !blocking {
                    return Ok(false);
                }
                tokio::time::sleep(LOCK_ACQUIRE_RETRY).await;
            }
        }

        async fn release(&mut self) -> Result<()> {
            if self.held {
                self.state.lock().unwrap().locks.remove(&self.key);
                self.held = false;
            }
            Ok(())
        }
    }

    #[async_trait]
    impl KvStore for MemoryKvStore {
        fn lock(&self, jid: &str) -> Box<dyn JobLock> {
            Box::new(MemoryJobLock {
                state: Arc::clone(&self.state),
                key: lock_key(jid),
                held: false,
            })
        }

        async fn set(&self, jid: &str, fields: FieldMap, src_state: Option<&str>) -> Result<()> {
            let mut inner = self.state.lock().unwrap();
            let dst = fields
                .get(FIELD_STATE)
                .map(|v| String::from_utf8_lossy(v).into_owned());
            inner
                .hashes
                .entry(job_key(jid))
                .or_default()
                .extend(fields);

            if let Some(dst) = dst {
                match src_state {
                    Some(src) if src != dst => {
                        info!(jid = %jid, from = %src, to = %dst, "job state altered");
                        if let Some(set) = inner.sets.get_mut(&state_key(src)) {
                            set.remove(jid);
                        }
                        inner
                            .sets
                            .entry(state_key(&dst))
                            .or_default()
                            .insert(jid.to_string());
                    }
                    None => {
                        info!(jid = %jid, state = %dst, "job state recorded");
                        inner
                            .sets
                            .entry(state_key(&dst))
                            .or_default()
                            .insert(jid.to_string());
                    }
                    _ => {}
                }
            }
            Ok(())
        }

        async fn get(&self, jid: &str, field: &str) -> Result<Option<Vec<u8>>> {
            let inner = self.state.lock().unwrap();
            Ok(inner
                .hashes
                .get(&job_key(jid))
                .and_then(|h| h.get(field))
                .cloned())
        }

        async fn random_sample(&self, state: Status, n: usize) -> Result<Vec<String>> {
            let inner = self.state.lock().unwrap();
            Ok(inner
                .sets
                .get(&state_key(state.name()))
                .map(|s| s.iter().take(n).cloned().collect())
                .unwrap_or_default())
        }
    }

}
