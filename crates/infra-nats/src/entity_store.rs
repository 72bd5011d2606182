// NATS EntityStore Implementation (CFS request/reply subjects)

use async_trait::async_trait;
use bytes::Bytes;
use conthesis_core::error::{EngineError, Result};
use conthesis_core::port::EntityStore;
use tracing::debug;

const CFS_GET: &str = "conthesis.cfs.get";
const CFS_READLINK: &str = "conthesis.cfs.readlink";

pub struct NatsEntityStore {
    client: async_nats::Client,
}

impl NatsEntityStore {
    pub fn new(client: async_nats::Client) -> Self {
        Self { client }
    }

    async fn request(&self, subject: &str, path: &str) -> Result<Bytes> {
        let payload = Bytes::copy_from_slice(path.as_bytes());
        let reply = self
            .client
            .request(subject.to_string(), payload)
            .await
            .map_err(|err| EngineError::Bus(err.to_string()))?;
        Ok(reply.payload)
    }
}

#[async_trait]
impl EntityStore for NatsEntityStore {
    async fn fetch_path(&self, path: &str) -> Result<Option<Bytes>> {
        let data = self.request(CFS_GET, path).await?;
        if data.is_empty() {
            debug!(path = %path, "entity not found");
            return Ok(None);
        }
        Ok(Some(data))
    }

    async fn readlink(&self, path: &str) -> Result<String> {
        let data = self.request(CFS_READLINK, path).await?;
        Ok(String::from_utf8_lossy(&data).into_owned())
    }
}
