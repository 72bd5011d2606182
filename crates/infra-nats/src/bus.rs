// NATS MessageBus Implementation

use async_trait::async_trait;
use bytes::Bytes;
use conthesis_core::error::{EngineError, Result};
use conthesis_core::port::MessageBus;
use std::time::Duration;

pub struct NatsBus {
    client: async_nats::Client,
}

impl NatsBus {
    pub fn new(client: async_nats::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MessageBus for NatsBus {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<()> {
        self.client
            .publish(subject.to_string(), payload)
            .await
            .map_err(|err| EngineError::Bus(err.to_string()))
    }

    async fn publish_with_reply(&self, subject: &str, reply: &str, payload: Bytes) -> Result<()> {
        self.client
            .publish_with_reply(subject.to_string(), reply.to_string(), payload)
            .await
            .map_err(|err| EngineError::Bus(err.to_string()))
    }

    async fn request(&self, subject: &str, payload: Bytes, timeout: Duration) -> Result<Bytes> {
        let request = self.client.request(subject.to_string(), payload);
        match tokio::time::timeout(timeout, request).await {
            Err(_) => Err(EngineError::DispatchTimeout(timeout)),
            Ok(Ok(message)) => Ok(message.payload),
            Ok(Err(err)) => Err(EngineError::Bus(err.to_string())),
        }
    }
}
