// Bus message handlers
//
// Every failure here is logged and swallowed: the bus connection survives
// bad messages, and malformed input never mutates job state.

use bytes::Bytes;
use conthesis_core::application::{ActionService, Manager};
use conthesis_core::domain::ActionTrigger;
use conthesis_core::error::Result;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error};

/// Everything after the final `.` of a response subject is the jid.
pub(crate) fn jid_from_subject(subject: &str) -> Option<&str> {
    match subject.rsplit('.').next() {
        Some(jid) if !jid.is_empty() => Some(jid),
        _ => None,
    }
}

pub(crate) async fn handle_trigger_async(
    client: &async_nats::Client,
    manager: &Arc<Manager>,
    message: async_nats::Message,
) {
    let trigger = match ActionTrigger::from_bytes(&message.payload) {
        Ok(trigger) => trigger,
        Err(err) => {
            error!(subject = %message.subject, error = %err, "malformed trigger");
            return;
        }
    };

    let jid = trigger.jid.clone();
    if let Err(err) = manager.register(trigger).await {
        error!(jid = %jid, error = %err, "failed to register trigger");
        return;
    }
    if let Some(reply) = message.reply {
        if let Err(err) = client.publish(reply, Bytes::from_static(b"{}")).await {
            error!(jid = %jid, error = %err, "failed to ack trigger");
        }
    }
}

pub(crate) async fn handle_action_response(manager: &Arc<Manager>, message: async_nats::Message) {
    let Some(jid) = jid_from_subject(message.subject.as_str()) else {
        error!(subject = %message.subject, "response subject carried no jid");
        return;
    };
    let data: Value = match serde_json::from_slice(&message.payload) {
        Ok(value) => value,
        Err(err) => {
            error!(jid = %jid, error = %err, "malformed executor response");
            return;
        }
    };
    match manager.resume(jid, data).await {
        Ok(true) => {}
        Ok(false) => debug!(jid = %jid, "response arrived for a job that cannot resume"),
        Err(err) => error!(jid = %jid, error = %err, "failed to resume job"),
    }
}

pub(crate) async fn handle_trigger_sync(
    client: &async_nats::Client,
    service: &Arc<ActionService>,
    message: async_nats::Message,
) {
    let result = match compute(service, &message.payload).await {
        Ok(value) => value,
        Err(err) => {
            error!(subject = %message.subject, error = %err, "synchronous action failed");
            return;
        }
    };
    let Some(reply) = message.reply else {
        debug!(subject = %message.subject, "synchronous trigger had no reply subject");
        return;
    };
    let body = match serde_json::to_vec(&result) {
        Ok(body) => body,
        Err(err) => {
            error!(error = %err, "action result was not serializable");
            return;
        }
    };
    if let Err(err) = client.publish(reply, body.into()).await {
        error!(error = %err, "failed to reply to synchronous trigger");
    }
}

/// One in-request resolve and request/reply cycle; no job state involved.
async fn compute(service: &ActionService, payload: &[u8]) -> Result<Value> {
    let trigger = ActionTrigger::from_bytes(payload)?;
    let action = service.get_action(&trigger).await?;
    let simplified: Vec<_> = action
        .properties
        .iter()
        .map(|p| p.simplify(&trigger.meta))
        .collect();
    let resolved = service.resolve_properties(&simplified).await?;
    service.perform_action(&action.kind, &resolved).await
}
