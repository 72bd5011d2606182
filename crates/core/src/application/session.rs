// Session - scoped lock-holding context around one job

use crate::application::actions::ActionService;
use crate::application::processor::JobProcessor;
use crate::application::record::JobRecord;
use crate::error::{EngineError, Result};
use crate::port::{JobLock, KvStore, TimeProvider};
use std::sync::Arc;
use tracing::{error, warn};

/// Holds the job lock for one processing pass. Callers must route every
/// pass through [`Session::finish`] so the final state write, the flush and
/// the lock release happen on success and error paths alike; [`settle`]
/// folds the two results together.
pub struct Session {
    lock: Box<dyn JobLock>,
    processor: JobProcessor,
}

impl Session {
    /// Acquire the job lock and hydrate a processor from the stored state.
    /// Contention in non-blocking mode surfaces as `UnableToAcquireLock`.
    pub async fn open(
        service: Arc<ActionService>,
        store: Arc<dyn KvStore>,
        time: Arc<dyn TimeProvider>,
        jid: &str,
        blocking: bool,
        src_state: Option<String>,
    ) -> Result<Session> {
        let mut lock = store.lock(jid);
        if !lock.acquire(blocking).await? {
            return Err(EngineError::UnableToAcquireLock);
        }

        let mut record = JobRecord::new(jid, store, src_state);
        let initial = match record.state().await {
            Ok(state) => state,
            Err(err) => {
                // The record never loaded; give the lock back before bailing.
                if let Err(release_err) = lock.release().await {
                    warn!(jid = %jid, error = %release_err, "lock release failed, lease will expire");
                }
                return Err(err);
            }
        };

        let processor = JobProcessor::new(record, service, time, initial);
        Ok(Session { lock, processor })
    }

    pub fn processor(&mut self) -> &mut JobProcessor {
        &mut self.processor
    }

    /// Write the processor's final state back, flush the record and release
    /// the lock. A failed release is logged only: the lease bounds it.
    pub async fn finish(mut self) -> Result<()> {
        let state = self.processor.state();
        self.processor.record_mut().set_state(state);
        let flushed = self.processor.record_mut().flush().await;

        if let Err(err) = self.lock.release().await {
            warn!(error = %err, "lock release failed, lease will expire");
        }
        flushed
    }
}

/// Fold a session body result with the close result, preferring the body
/// error when both failed.
pub fn settle<T>(body: Result<T>, closed: Result<()>) -> Result<T> {
    match (body, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(err)) => Err(err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(close_err)) => {
            error!(error = %close_err, "session close failed after processing error");
            Err(err)
        }
    }
}
