// Entity Store Port (Interface)

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;

/// External content-addressed store, addressed by path.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Read the blob at `path`. Absent or empty entries map to `None`.
    async fn fetch_path(&self, path: &str) -> Result<Option<Bytes>>;

    /// Resolve `path` through links. Returns the canonical path, which may
    /// equal the input when there is nothing to follow.
    async fn readlink(&self, path: &str) -> Result<String>;

    async fn fetch_json(&self, path: &str) -> Result<Option<Value>> {
        match self.fetch_path(path).await? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }
}

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Path-keyed blob map with an alias table backing `readlink`.
    #[derive(Default)]
    pub struct MockEntityStore {
        blobs: Mutex<HashMap<String, Bytes>>,
        links: Mutex<HashMap<String, String>>,
    }

    impl MockEntityStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn put(&self, path: &str, data: impl Into<Bytes>) {
            self.blobs
                .lock()
                .unwrap()
                .insert(path.to_string(), data.into());
        }

        pub fn put_json(&self, path: &str, value: &Value) {
            self.put(path, serde_json::to_vec(value).expect("serializable value"));
        }

        pub fn link(&self, path: &str, target: &str) {
            self.links
                .lock()
                .unwrap()
                .insert(path.to_string(), target.to_string());
        }
    }

    #[async_trait]
    impl EntityStore for MockEntityStore {
        async fn fetch_path(&self, path: &str) -> Result<Option<Bytes>> {
            Ok(self.blobs.lock().unwrap().get(path).cloned())
        }

        async fn readlink(&self, path: &str) -> Result<String> {
            Ok(self
                .links
                .lock()
                .unwrap()
                .get(path)
                .cloned()
                .unwrap_or_else(|| path.to_string()))
        }
    }
}
