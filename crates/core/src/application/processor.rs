// Job Processor - drives one job through the state machine

use crate::application::actions::ActionService;
use crate::application::constants::RUNNING_TIMEOUT_SECS;
use crate::application::machine::{find_transition, Hook, Trigger};
use crate::application::record::JobRecord;
use crate::domain::Status;
use crate::error::{EngineError, Result};
use crate::port::TimeProvider;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Wall-clock gate checked between transitions. It never interrupts an
/// in-flight store or bus call.
#[derive(Debug, Clone, Copy)]
pub struct TimeBudget {
    deadline: tokio::time::Instant,
}

impl TimeBudget {
    pub fn starting_now(limit: Duration) -> Self {
        Self {
            deadline: tokio::time::Instant::now() + limit,
        }
    }

    pub fn remaining(&self) -> bool {
        tokio::time::Instant::now() < self.deadline
    }
}

/// Drives a single job from its current state through as many transitions as
/// fit in the time budget. Lives inside a session; every mutation happens
/// under the job lock.
pub struct JobProcessor {
    jid: String,
    state: Status,
    record: JobRecord,
    service: Arc<ActionService>,
    time: Arc<dyn TimeProvider>,
}

impl JobProcessor {
    pub fn new(
        record: JobRecord,
        service: Arc<ActionService>,
        time: Arc<dyn TimeProvider>,
        initial: Option<Status>,
    ) -> Self {
        Self {
            jid: record.jid().to_string(),
            state: initial.unwrap_or(Status::Pending),
            record,
            service,
            time,
        }
    }

    pub fn state(&self) -> Status {
        self.state
    }

    pub fn record_mut(&mut self) -> &mut JobRecord {
        &mut self.record
    }

    /// Fire `trigger` against the transition table. Returns `false` when the
    /// trigger is not valid for the current state (silently ignored). A
    /// failing `before` hook aborts the transition; a failing `after` hook
    /// propagates with the state already at the destination.
    pub async fn fire(&mut self, trigger: Trigger) -> Result<bool> {
        let Some(def) = find_transition(trigger, self.state) else {
            debug!(jid = %self.jid, state = %self.state, trigger = ?trigger, "trigger ignored");
            return Ok(false);
        };
        if let Some(hook) = def.before {
            self.run_hook(hook).await?;
        }
        self.state = def.dest;
        if let Some(hook) = def.after {
            self.run_hook(hook).await?;
        }
        Ok(true)
    }

    async fn run_hook(&mut self, hook: Hook) -> Result<()> {
        match hook {
            Hook::LoadData => self.load_data().await,
            Hook::StartRun => self.start_run().await,
        }
    }

    /// Resolve the action and pin its variables for every later dispatch.
    async fn load_data(&mut self) -> Result<()> {
        let trigger = self
            .record
            .trigger()
            .await?
            .ok_or(EngineError::TriggerDataMissing)?;
        let action = self.service.get_action(&trigger).await?;
        self.record.set_action(&action)?;
        let variables = self
            .service
            .freeze_properties(&action.properties, &trigger.meta)
            .await?;
        self.record.set_variables(&variables)?;
        Ok(())
    }

    /// Resolve the frozen variables and hand the job to its executor queue.
    async fn start_run(&mut self) -> Result<()> {
        let action = self.record.action().await?;
        let variables = self.record.variables().await?;
        let resolved = self.service.resolve_properties(&variables).await?;
        self.service
            .dispatch(&self.jid, &action.kind, &resolved)
            .await?;
        self.record.set_timestamp(self.time.now_secs());
        Ok(())
    }

    /// Walk `proceed` transitions until the job needs an external event
    /// (RUNNING awaits an executor reply, RETRY awaits expiry) or a proceed
    /// is rejected. Returns `false` only when the time budget ran out.
    pub async fn proceed_many(&mut self, budget: &TimeBudget) -> Result<bool> {
        while budget.remaining() {
            if matches!(self.state, Status::Running | Status::Retry) {
                return Ok(true);
            }
            if !self.fire(Trigger::Proceed).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// A missing timestamp is repaired in place and counts as fresh.
    pub async fn has_timed_out(&mut self) -> Result<bool> {
        let Some(timestamp) = self.record.timestamp().await? else {
            self.record.set_timestamp(self.time.now_secs());
            return Ok(false);
        };
        Ok(self.time.now_secs() - timestamp > RUNNING_TIMEOUT_SECS)
    }

    /// One processing pass: advance as far as possible, then apply timeout
    /// and expiry rules. Missing input data revokes the job instead of
    /// propagating.
    pub async fn process(&mut self, budget: &TimeBudget) -> Result<()> {
        match self.proceed_many(budget).await {
            Ok(true) => {}
            Ok(false) => return Ok(()),
            Err(err) if err.is_data_missing() => {
                error!(jid = %self.jid, error = %err, "job data missing, revoking");
                self.fire(Trigger::Revoke).await?;
                return Ok(());
            }
            Err(err) => return Err(err),
        }

        if self.state == Status::Running && self.has_timed_out().await? {
            warn!(jid = %self.jid, "running job timed out");
            self.fire(Trigger::Error).await?;
        }
        if self.state == Status::Retry {
            self.fire(Trigger::Expired).await?;
        }
        Ok(())
    }

    /// Apply an executor result. Returns `false` when out of budget or the
    /// result names no known outcome.
    pub async fn resume(&mut self, budget: &TimeBudget, result: &str, data: &Value) -> Result<bool> {
        if !budget.remaining() {
            return Ok(false);
        }
        debug!(jid = %self.jid, result = %result, data = %data, "resuming job");
        match result {
            "suspend" => self.fire(Trigger::Suspend).await,
            "success" => self.fire(Trigger::Succeeded).await,
            "error" => self.fire(Trigger::Error).await,
            other => {
                warn!(jid = %self.jid, result = %other, "unknown executor result");
                Ok(false)
            }
        }
    }

    pub async fn resume_and_process(
        &mut self,
        budget: &TimeBudget,
        result: &str,
        data: &Value,
    ) -> Result<bool> {
        if !self.resume(budget, result, data).await? {
            return Ok(false);
        }
        self.process(budget).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::constants::PROCESS_BUDGET;
    use crate::domain::{ActionSource, ActionTrigger, Meta};
    use crate::port::entity_store::mocks::MockEntityStore;
    use crate::port::kv_store::mocks::MemoryKvStore;
    use crate::port::message_bus::mocks::MockBus;
    use crate::port::time_provider::mocks::MockTimeProvider;
    use crate::port::{EntityStore, KvStore, MessageBus};
    use serde_json::json;

    struct Harness {
        store: Arc<MemoryKvStore>,
        bus: Arc<MockBus>,
        time: Arc<MockTimeProvider>,
        service: Arc<ActionService>,
    }

    impl Harness {
        fn new() -> Self {
            let store = Arc::new(MemoryKvStore::new());
            let bus = Arc::new(MockBus::new());
            let entities = Arc::new(MockEntityStore::new());
            let time = Arc::new(MockTimeProvider::new(1_000));
            let service = Arc::new(ActionService::new(
                Arc::clone(&bus) as Arc<dyn MessageBus>,
                entities as Arc<dyn EntityStore>,
            ));
            Self {
                store,
                bus,
                time,
                service,
            }
        }

        async fn processor_for(&self, jid: &str) -> JobProcessor {
            let mut record = JobRecord::new(
                jid,
                Arc::clone(&self.store) as Arc<dyn KvStore>,
                None,
            );
            let initial = record.state().await.unwrap();
            JobProcessor::new(
                record,
                Arc::clone(&self.service),
                Arc::clone(&self.time) as Arc<dyn TimeProvider>,
                initial,
            )
        }
    }

    fn identity_trigger(jid: &str) -> ActionTrigger {
        ActionTrigger {
            jid: jid.to_string(),
            meta: Meta::new(),
            action_source: ActionSource::Literal,
            action: json!({
                "kind": "identity",
                "properties": [{"name": "x", "kind": "LITERAL", "value": "hello"}],
            }),
        }
    }

    fn budget() -> TimeBudget {
        TimeBudget::starting_now(PROCESS_BUDGET)
    }

    #[tokio::test]
    async fn process_walks_pending_to_running_and_dispatches() {
        let harness = Harness::new();
        let mut processor = harness.processor_for("j1").await;
        processor
            .record_mut()
            .set_trigger(&identity_trigger("j1"))
            .unwrap();

        processor.process(&budget()).await.unwrap();

        assert_eq!(processor.state(), Status::Running);
        let sent = harness.bus.messages_for("conthesis.action.identity");
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].reply.as_deref(),
            Some("conthesis.actions.responses.j1")
        );
    }

    #[tokio::test]
    async fn process_without_trigger_revokes() {
        let harness = Harness::new();
        let mut processor = harness.processor_for("j2").await;

        processor.process(&budget()).await.unwrap();

        assert_eq!(processor.state(), Status::Revoked);
        assert_eq!(harness.bus.publish_count(), 0);
    }

    #[tokio::test]
    async fn process_is_idempotent_at_running() {
        let harness = Harness::new();
        let mut processor = harness.processor_for("j1").await;
        processor
            .record_mut()
            .set_trigger(&identity_trigger("j1"))
            .unwrap();
        processor.process(&budget()).await.unwrap();

        // A second pass must not re-dispatch while the executor is out.
        processor.process(&budget()).await.unwrap();
        assert_eq!(processor.state(), Status::Running);
        assert_eq!(harness.bus.messages_for("conthesis.action.identity").len(), 1);
    }

    #[tokio::test]
    async fn timeout_walks_running_to_failure() {
        let harness = Harness::new();
        let mut processor = harness.processor_for("j1").await;
        processor
            .record_mut()
            .set_trigger(&identity_trigger("j1"))
            .unwrap();
        processor.process(&budget()).await.unwrap();
        assert_eq!(processor.state(), Status::Running);

        harness.time.advance(31);
        processor.process(&budget()).await.unwrap();
        assert_eq!(processor.state(), Status::Failure);
    }

    #[tokio::test]
    async fn fresh_running_job_does_not_time_out() {
        let harness = Harness::new();
        let mut processor = harness.processor_for("j1").await;
        processor
            .record_mut()
            .set_trigger(&identity_trigger("j1"))
            .unwrap();
        processor.process(&budget()).await.unwrap();

        harness.time.advance(RUNNING_TIMEOUT_SECS);
        assert!(!processor.has_timed_out().await.unwrap());
        harness.time.advance(1);
        assert!(processor.has_timed_out().await.unwrap());
    }

    #[tokio::test]
    async fn missing_timestamp_is_repaired_not_expired() {
        let harness = Harness::new();
        let mut processor = harness.processor_for("j1").await;
        assert!(!processor.has_timed_out().await.unwrap());
        assert_eq!(
            processor.record_mut().timestamp().await.unwrap(),
            Some(1_000)
        );
    }

    #[tokio::test]
    async fn resume_success_completes_the_job() {
        let harness = Harness::new();
        let mut processor = harness.processor_for("j1").await;
        processor
            .record_mut()
            .set_trigger(&identity_trigger("j1"))
            .unwrap();
        processor.process(&budget()).await.unwrap();

        let resumed = processor
            .resume_and_process(&budget(), "success", &json!({"x": "hello"}))
            .await
            .unwrap();
        assert!(resumed);
        assert_eq!(processor.state(), Status::Success);
    }

    #[tokio::test]
    async fn resume_error_expires_to_failure() {
        let harness = Harness::new();
        let mut processor = harness.processor_for("j1").await;
        processor
            .record_mut()
            .set_trigger(&identity_trigger("j1"))
            .unwrap();
        processor.process(&budget()).await.unwrap();

        processor
            .resume_and_process(&budget(), "error", &Value::Null)
            .await
            .unwrap();
        assert_eq!(processor.state(), Status::Failure);
    }

    #[tokio::test]
    async fn resume_suspend_parks_the_job() {
        let harness = Harness::new();
        let mut processor = harness.processor_for("j1").await;
        processor
            .record_mut()
            .set_trigger(&identity_trigger("j1"))
            .unwrap();
        processor.process(&budget()).await.unwrap();

        processor
            .resume_and_process(&budget(), "suspend", &Value::Null)
            .await
            .unwrap();
        assert_eq!(processor.state(), Status::Suspended);
    }

    #[tokio::test]
    async fn resume_with_unknown_result_is_rejected() {
        let harness = Harness::new();
        let mut processor = harness.processor_for("j1").await;
        let resumed = processor
            .resume_and_process(&budget(), "partial", &Value::Null)
            .await
            .unwrap();
        assert!(!resumed);
        assert_eq!(processor.state(), Status::Pending);
    }

    #[tokio::test]
    async fn expired_budget_stops_the_walk() {
        let harness = Harness::new();
        let mut processor = harness.processor_for("j1").await;
        processor
            .record_mut()
            .set_trigger(&identity_trigger("j1"))
            .unwrap();

        tokio::time::pause();
        let budget = TimeBudget::starting_now(Duration::from_secs(3));
        tokio::time::advance(Duration::from_secs(4)).await;

        assert!(!processor.proceed_many(&budget).await.unwrap());
        assert_eq!(processor.state(), Status::Pending);
    }
}
