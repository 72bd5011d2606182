// Bus subscriptions

use crate::handlers;
use conthesis_core::application::{ActionService, Manager};
use conthesis_core::error::{EngineError, Result};
use futures::StreamExt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Inbound subjects (exact wire strings).
pub const TRIGGER_ASYNC_SUBJECT: &str = "conthesis.action.TriggerAsyncAction";
pub const TRIGGER_SYNC_SUBJECT: &str = "conthesis.action.TriggerAction";
pub const RESPONSES_WILDCARD: &str = "conthesis.actions.responses.*";

/// Subscribes the three inbound subjects and fans deliveries out to the
/// handlers. Handler failures are logged and swallowed; a bad message never
/// tears a subscription down.
pub struct BusListener {
    client: async_nats::Client,
    manager: Arc<Manager>,
    service: Arc<ActionService>,
}

impl BusListener {
    pub fn new(client: async_nats::Client, manager: Arc<Manager>, service: Arc<ActionService>) -> Self {
        Self {
            client,
            manager,
            service,
        }
    }

    /// Subscribe everything and spawn one drain task per subscription.
    /// The tasks run until the connection drains or the handles are aborted.
    pub async fn setup(&self) -> Result<Vec<JoinHandle<()>>> {
        let mut handles = Vec::new();

        let mut triggers = self.subscribe(TRIGGER_ASYNC_SUBJECT).await?;
        let client = self.client.clone();
        let manager = Arc::clone(&self.manager);
        handles.push(tokio::spawn(async move {
            while let Some(message) = triggers.next().await {
                handlers::handle_trigger_async(&client, &manager, message).await;
            }
        }));

        let mut responses = self.subscribe(RESPONSES_WILDCARD).await?;
        let manager = Arc::clone(&self.manager);
        handles.push(tokio::spawn(async move {
            while let Some(message) = responses.next().await {
                handlers::handle_action_response(&manager, message).await;
            }
        }));

        let mut computes = self.subscribe(TRIGGER_SYNC_SUBJECT).await?;
        let client = self.client.clone();
        let service = Arc::clone(&self.service);
        handles.push(tokio::spawn(async move {
            while let Some(message) = computes.next().await {
                handlers::handle_trigger_sync(&client, &service, message).await;
            }
        }));

        info!("bus subscriptions established");
        Ok(handles)
    }

    async fn subscribe(&self, subject: &'static str) -> Result<async_nats::Subscriber> {
        self.client
            .subscribe(subject)
            .await
            .map_err(|err| EngineError::Bus(format!("subscribe {subject}: {err}")))
    }
}
