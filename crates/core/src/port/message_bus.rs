// Message Bus Port (Interface)

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

/// Publish/subscribe bus with request/reply. Subscription handling lives in
/// the driving adapter; the engine only publishes and requests.
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<()>;

    /// Publish expecting the consumer to answer on `reply`.
    async fn publish_with_reply(&self, subject: &str, reply: &str, payload: Bytes) -> Result<()>;

    /// Request/reply with a per-call timeout. Elapsed timeouts surface as
    /// [`crate::EngineError::DispatchTimeout`].
    async fn request(&self, subject: &str, payload: Bytes, timeout: Duration) -> Result<Bytes>;
}

pub mod mocks {
    use super::*;
    use crate::error::EngineError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// One recorded outbound message.
    #[derive(Debug, Clone)]
    pub struct PublishedMessage {
        pub subject: String,
        pub reply: Option<String>,
        pub payload: Bytes,
    }

    /// Records published messages and answers requests from canned replies;
    /// a request with no canned reply behaves like an absent executor and
    /// times out.
    #[derive(Default)]
    pub struct MockBus {
        published: Mutex<Vec<PublishedMessage>>,
        replies: Mutex<HashMap<String, Bytes>>,
    }

    impl MockBus {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_reply(&self, subject: &str, payload: Bytes) {
            self.replies
                .lock()
                .unwrap()
                .insert(subject.to_string(), payload);
        }

        pub fn published(&self) -> Vec<PublishedMessage> {
            self.published.lock().unwrap().clone()
        }

        pub fn messages_for(&self, subject: &str) -> Vec<PublishedMessage> {
            self.published
                .lock()
                .unwrap()
                .iter()
                .filter(|m| m.subject == subject)
                .cloned()
                .collect()
        }

        pub fn publish_count(&self) -> usize {
            self.published.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl MessageBus for MockBus {
        async fn publish(&self, subject: &str, payload: Bytes) -> Result<()> {
            self.published.lock().unwrap().push(PublishedMessage {
                subject: subject.to_string(),
                reply: None,
                payload,
            });
            Ok(())
        }

        async fn publish_with_reply(
            &self,
            subject: &str,
            reply: &str,
            payload: Bytes,
        ) -> Result<()> {
            self.published.lock().unwrap().push(PublishedMessage {
                subject: subject.to_string(),
                reply: Some(reply.to_string()),
                payload,
            });
            Ok(())
        }

        async fn request(&self, subject: &str, payload: Bytes, timeout: Duration) -> Result<Bytes> {
            self.published.lock().unwrap().push(PublishedMessage {
                subject: subject.to_string(),
                reply: None,
                payload,
            });
            match self.replies.lock().unwrap().get(subject) {
                Some(reply) => Ok(reply.clone()),
                None => Err(EngineError::DispatchTimeout(timeout)),
            }
        }
    }
}
