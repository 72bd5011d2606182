// Action resolution and executor dispatch

use crate::application::constants::DISPATCH_TIMEOUT;
use crate::domain::{Action, ActionProperty, ActionSource, ActionTrigger, Meta, PropertySource};
use crate::error::{EngineError, Result};
use crate::port::{EntityStore, MessageBus};
use futures::future::try_join_all;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Prefix of the per-kind executor queues.
pub const ACTION_SUBJECT_PREFIX: &str = "conthesis.action.";
/// Prefix of the per-job reply subjects.
pub const RESPONSE_SUBJECT_PREFIX: &str = "conthesis.actions.responses.";

pub fn action_subject(kind: &str) -> String {
    format!("{ACTION_SUBJECT_PREFIX}{kind}")
}

pub fn response_subject(jid: &str) -> String {
    format!("{RESPONSE_SUBJECT_PREFIX}{jid}")
}

/// Resolves actions and their input properties against the entity store and
/// hands the work to executor queues on the bus.
pub struct ActionService {
    bus: Arc<dyn MessageBus>,
    entities: Arc<dyn EntityStore>,
}

impl ActionService {
    pub fn new(bus: Arc<dyn MessageBus>, entities: Arc<dyn EntityStore>) -> Self {
        Self { bus, entities }
    }

    /// Resolve the trigger's action, inline or through the entity store.
    /// Anything unreadable counts as missing input data and revokes the job.
    pub async fn get_action(&self, trigger: &ActionTrigger) -> Result<Action> {
        match trigger.action_source {
            ActionSource::Literal => {
                serde_json::from_value(trigger.action.clone()).map_err(|err| {
                    error!(jid = %trigger.jid, error = %err, "inline action was invalid");
                    EngineError::TriggerDataMissing
                })
            }
            ActionSource::Path => {
                let path = trigger.action.as_str().ok_or_else(|| {
                    error!(jid = %trigger.jid, "action path was not a string");
                    EngineError::TriggerDataMissing
                })?;
                let value = self
                    .entities
                    .fetch_json(path)
                    .await?
                    .ok_or(EngineError::TriggerDataMissing)?;
                serde_json::from_value(value).map_err(|err| {
                    error!(jid = %trigger.jid, path = %path, error = %err, "fetched action was invalid");
                    EngineError::TriggerDataMissing
                })
            }
        }
    }

    /// Pin one property for storage: simplify against `meta`, then either
    /// late-bind the path or materialise the value now. A path whose link
    /// resolves elsewhere stays a path (the link target is pinned); a path
    /// that resolves to itself is fetched immediately.
    async fn freeze_property(&self, prop: &ActionProperty, meta: &Meta) -> Result<ActionProperty> {
        let simplified = prop.simplify(meta);
        let PropertySource::Path {
            value: path,
            data_format,
        } = &simplified.source
        else {
            return Ok(simplified);
        };

        let resolved = self.entities.readlink(path).await?;
        if resolved != *path {
            return Ok(simplified.with_source(PropertySource::Path {
                value: resolved,
                data_format: *data_format,
            }));
        }
        let value = match self.entities.fetch_path(path).await? {
            Some(data) => data_format.decode(&data)?,
            None => {
                warn!(name = %simplified.name, path = %path, "frozen path had no contents");
                Value::Null
            }
        };
        Ok(simplified.with_source(PropertySource::Literal { value }))
    }

    /// Freeze the whole property list concurrently.
    pub async fn freeze_properties(
        &self,
        properties: &[ActionProperty],
        meta: &Meta,
    ) -> Result<Vec<ActionProperty>> {
        try_join_all(properties.iter().map(|p| self.freeze_property(p, meta))).await
    }

    async fn resolve_value(&self, prop: &ActionProperty) -> Result<Value> {
        match &prop.source {
            PropertySource::Literal { value } => Ok(value.clone()),
            PropertySource::Path {
                value: path,
                data_format,
            } => match self.entities.fetch_path(path).await? {
                Some(data) => data_format.decode(&data),
                None => Ok(Value::Null),
            },
            PropertySource::MetaField { .. } | PropertySource::MetaEntity { .. } => Err(
                EngineError::Internal(format!("meta property {} survived freezing", prop.name)),
            ),
        }
    }

    /// Materialise every property into the executor's input map.
    pub async fn resolve_properties(
        &self,
        properties: &[ActionProperty],
    ) -> Result<Map<String, Value>> {
        let values = try_join_all(properties.iter().map(|p| self.resolve_value(p))).await?;
        Ok(properties
            .iter()
            .map(|p| p.name.clone())
            .zip(values)
            .collect())
    }

    /// Hand the job to its executor queue, pointing the reply at the job's
    /// response subject.
    pub async fn dispatch(
        &self,
        jid: &str,
        kind: &str,
        resolved: &Map<String, Value>,
    ) -> Result<()> {
        let payload = serde_json::to_vec(resolved)?;
        self.bus
            .publish_with_reply(&action_subject(kind), &response_subject(jid), payload.into())
            .await?;
        info!(jid = %jid, kind = %kind, "action dispatched");
        Ok(())
    }

    /// Synchronous compute path: one request/reply cycle against the
    /// executor queue. A silent executor reads as `{"error": true}`; an
    /// empty reply reads as null.
    pub async fn perform_action(&self, kind: &str, resolved: &Map<String, Value>) -> Result<Value> {
        let payload = serde_json::to_vec(resolved)?;
        match self
            .bus
            .request(&action_subject(kind), payload.into(), DISPATCH_TIMEOUT)
            .await
        {
            Ok(reply) if reply.is_empty() => Ok(Value::Null),
            Ok(reply) => Ok(serde_json::from_slice(&reply)?),
            Err(EngineError::DispatchTimeout(_)) => {
                warn!(kind = %kind, "executor did not reply in time");
                Ok(serde_json::json!({ "error": true }))
            }
            Err(err) => Err(err),
        }
    }
}
