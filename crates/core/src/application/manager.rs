// Manager - event entry points and the periodic sweeper

use crate::application::actions::ActionService;
use crate::application::constants::{
    PROCESS_BUDGET, SWEEP_SAMPLE_SIZE, SWEEP_TICK, SWEEP_TICKS_PER_PASS,
};
use crate::application::processor::TimeBudget;
use crate::application::session::{settle, Session};
use crate::application::shutdown::ShutdownToken;
use crate::domain::{ActionTrigger, Status};
use crate::error::{EngineError, Result};
use crate::port::{KvStore, TimeProvider};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info};

/// Owns every way a job gets processed: bus events arrive through
/// [`Manager::register`] / [`Manager::resume`], the sweeper picks up
/// whatever the bus missed.
pub struct Manager {
    service: Arc<ActionService>,
    store: Arc<dyn KvStore>,
    time: Arc<dyn TimeProvider>,
}

impl Manager {
    pub fn new(
        service: Arc<ActionService>,
        store: Arc<dyn KvStore>,
        time: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            service,
            store,
            time,
        }
    }

    async fn open(&self, jid: &str, blocking: bool, src_state: Option<String>) -> Result<Session> {
        Session::open(
            Arc::clone(&self.service),
            Arc::clone(&self.store),
            Arc::clone(&self.time),
            jid,
            blocking,
            src_state,
        )
        .await
    }

    /// Store a fresh trigger and advance the job as far as the budget
    /// allows.
    pub async fn register(&self, trigger: ActionTrigger) -> Result<()> {
        let mut session = self.open(&trigger.jid, true, None).await?;
        let budget = TimeBudget::starting_now(PROCESS_BUDGET);
        let body = match session.processor().record_mut().set_trigger(&trigger) {
            Ok(()) => session.processor().process(&budget).await,
            Err(err) => Err(err),
        };
        settle(body, session.finish().await)
    }

    /// Apply a successful executor reply and keep processing.
    pub async fn resume(&self, jid: &str, data: serde_json::Value) -> Result<bool> {
        let mut session = self.open(jid, true, None).await?;
        let budget = TimeBudget::starting_now(PROCESS_BUDGET);
        let body = session
            .processor()
            .resume_and_process(&budget, "success", &data)
            .await;
        settle(body, session.finish().await)
    }

    /// One processing pass over an existing job. `src_state` is the state
    /// the caller observed the job in (index maintenance hint).
    pub async fn process(
        &self,
        jid: &str,
        src_state: Option<Status>,
        blocking: bool,
    ) -> Result<()> {
        let src = src_state.map(|s| s.name().to_string());
        let mut session = self.open(jid, blocking, src).await?;
        let budget = TimeBudget::starting_now(PROCESS_BUDGET);
        let body = session.processor().process(&budget).await;
        settle(body, session.finish().await)
    }

    /// Long-running sweeper task. Runs one pass every five ticks, sleeping a
    /// tick at a time so shutdown stays prompt.
    pub fn start_sweeper(self: &Arc<Self>, shutdown: ShutdownToken) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move { manager.sweep_loop(shutdown).await })
    }

    async fn sweep_loop(&self, mut shutdown: ShutdownToken) {
        info!("sweeper running");
        loop {
            if let Err(err) = self.sweep_once().await {
                error!(error = %err, "sweep pass failed");
            }
            for _ in 0..SWEEP_TICKS_PER_PASS {
                tokio::select! {
                    _ = sleep(SWEEP_TICK) => {}
                    _ = shutdown.wait() => {
                        info!("sweeper shutting down");
                        return;
                    }
                }
            }
        }
    }

    /// Sample jobs from every non-quiescent state and give each a
    /// non-blocking pass. Contended jobs belong to someone else right now;
    /// everything else that fails is logged and swept past.
    pub async fn sweep_once(&self) -> Result<()> {
        for state in [Status::Running, Status::Pending, Status::Retry] {
            let jids = self.store.random_sample(state, SWEEP_SAMPLE_SIZE).await?;
            if !jids.is_empty() {
                info!(count = jids.len(), state = %state, "found jobs to sweep");
            }
            for jid in jids {
                match self.process(&jid, Some(state), false).await {
                    Ok(()) => {}
                    Err(EngineError::UnableToAcquireLock) => {}
                    Err(err) => error!(jid = %jid, error = %err, "error sweeping job"),
                }
            }
        }
        Ok(())
    }
}
