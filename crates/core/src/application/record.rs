// Job Record - write-buffered typed view over one job's hash fields

use crate::domain::{decode_variables, encode_variables, Action, ActionProperty, ActionTrigger, Status};
use crate::error::{EngineError, Result};
use crate::port::kv_store::{
    FieldMap, KvStore, FIELD_ACTION, FIELD_STATE, FIELD_TIMESTAMP, FIELD_TRIGGER, FIELD_VARIABLES,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::error;

/// Buffers mutations of a single job hash so one flush commits them all.
/// Reads are served from the cache after first load; only dirty fields are
/// written back.
pub struct JobRecord {
    jid: String,
    store: Arc<dyn KvStore>,
    cached: HashMap<&'static str, Option<Vec<u8>>>,
    dirty: HashSet<&'static str>,
    src_state: Option<String>,
    flushing: bool,
}

impl JobRecord {
    /// `src_state` is the caller's hint of the state the job was observed in
    /// (the sweeper passes the index set it sampled from). Without a hint the
    /// first read of `state` captures it.
    pub fn new(jid: impl Into<String>, store: Arc<dyn KvStore>, src_state: Option<String>) -> Self {
        Self {
            jid: jid.into(),
            store,
            cached: HashMap::new(),
            dirty: HashSet::new(),
            src_state,
            flushing: false,
        }
    }

    pub fn jid(&self) -> &str {
        &self.jid
    }

    pub async fn get(&mut self, field: &'static str) -> Result<Option<Vec<u8>>> {
        if let Some(value) = self.cached.get(field) {
            return Ok(value.clone());
        }
        let value = self.store.get(&self.jid, field).await?;
        self.cached.insert(field, value.clone());
        if self.src_state.is_none() && field == FIELD_STATE {
            self.src_state = value
                .as_deref()
                .map(|v| String::from_utf8_lossy(v).into_owned());
        }
        Ok(value)
    }

    pub fn set(&mut self, field: &'static str, value: Vec<u8>) {
        self.dirty.insert(field);
        self.cached.insert(field, Some(value));
    }

    /// Write all dirty fields in one store call and drop the buffer. The
    /// captured `src_state` survives the flush so a later state write still
    /// maintains the index sets correctly.
    pub async fn flush(&mut self) -> Result<()> {
        if self.flushing {
            return Err(EngineError::FlushInProgress);
        }
        self.flushing = true;

        let mut fields = FieldMap::new();
        for field in &self.dirty {
            if let Some(Some(value)) = self.cached.get(field) {
                fields.insert(*field, value.clone());
            }
        }
        let result = self
            .store
            .set(&self.jid, fields, self.src_state.as_deref())
            .await;

        self.cached.clear();
        self.dirty.clear();
        self.flushing = false;
        result
    }

    /// Decode failures are logged and read as "trigger missing"; the
    /// processor revokes such jobs rather than crash on poisoned input.
    pub async fn trigger(&mut self) -> Result<Option<ActionTrigger>> {
        let Some(data) = self.get(FIELD_TRIGGER).await? else {
            return Ok(None);
        };
        match ActionTrigger::from_bytes(&data) {
            Ok(trigger) => Ok(Some(trigger)),
            Err(err) => {
                error!(jid = %self.jid, error = %err, "trigger field held invalid JSON");
                Ok(None)
            }
        }
    }

    pub fn set_trigger(&mut self, trigger: &ActionTrigger) -> Result<()> {
        self.set(FIELD_TRIGGER, trigger.to_bytes()?);
        Ok(())
    }

    pub async fn action(&mut self) -> Result<Action> {
        let data = self
            .get(FIELD_ACTION)
            .await?
            .ok_or_else(|| EngineError::Internal(format!("action field missing for {}", self.jid)))?;
        Action::from_bytes(&data)
    }

    pub fn set_action(&mut self, action: &Action) -> Result<()> {
        self.set(FIELD_ACTION, action.to_bytes()?);
        Ok(())
    }

    pub async fn variables(&mut self) -> Result<Vec<ActionProperty>> {
        let data = self
            .get(FIELD_VARIABLES)
            .await?
            .ok_or(EngineError::VariablesDataMissing)?;
        decode_variables(&data).map_err(|_| EngineError::VariablesDataMissing)
    }

    pub fn set_variables(&mut self, variables: &[ActionProperty]) -> Result<()> {
        self.set(FIELD_VARIABLES, encode_variables(variables)?);
        Ok(())
    }

    /// Unix seconds of the last RUNNING entry, stored as a decimal string.
    pub async fn timestamp(&mut self) -> Result<Option<i64>> {
        let Some(raw) = self.get(FIELD_TIMESTAMP).await? else {
            return Ok(None);
        };
        let text = String::from_utf8_lossy(&raw);
        match text.parse::<i64>() {
            Ok(secs) => Ok(Some(secs)),
            Err(_) => {
                error!(jid = %self.jid, raw = %text, "timestamp field was not an integer");
                Ok(None)
            }
        }
    }

    pub fn set_timestamp(&mut self, secs: i64) {
        self.set(FIELD_TIMESTAMP, secs.to_string().into_bytes());
    }

    pub async fn state(&mut self) -> Result<Option<Status>> {
        let Some(raw) = self.get(FIELD_STATE).await? else {
            return Ok(None);
        };
        Ok(Status::from_name(&String::from_utf8_lossy(&raw)))
    }

    pub fn set_state(&mut self, state: Status) {
        self.set(FIELD_STATE, state.name().as_bytes().to_vec());
    }
}
