//! Object store trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::{BackendError, Result};

/// Trait for the external object store (avatars, product images).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Uploads a file to the given path.
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<()>;

    /// Returns the public URL for a stored path.
    fn public_url(&self, path: &str) -> String;
}

#[derive(Debug, Default)]
struct InMemoryObjectState {
    objects: HashMap<String, Vec<u8>>,
    fail_on_upload: bool,
}

/// In-memory object store for testing.
#[derive(Debug, Clone)]
pub struct InMemoryObjectStore {
    base_url: String,
    state: Arc<RwLock<InMemoryObjectState>>,
}

impl InMemoryObjectStore {
    /// Creates a new in-memory object store serving URLs under `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            state: Arc::default(),
        }
    }

    /// Configures the store to fail upload calls.
    pub fn set_fail_on_upload(&self, fail: bool) {
        self.state.write().unwrap().fail_on_upload = fail;
    }

    /// Returns the number of stored objects.
    pub fn object_count(&self) -> usize {
        self.state.read().unwrap().objects.len()
    }

    /// Returns true if an object exists at the given path.
    pub fn has_object(&self, path: &str) -> bool {
        self.state.read().unwrap().objects.contains_key(path)
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new("https://storage.test")
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<()> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_upload {
            return Err(BackendError::Storage("upload rejected".to_string()));
        }
        state.objects.insert(path.to_string(), bytes);
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_and_url() {
        let store = InMemoryObjectStore::new("https://cdn.example.com/");
        store.upload("avatars/u1.png", vec![1, 2, 3]).await.unwrap();

        assert_eq!(store.object_count(), 1);
        assert!(store.has_object("avatars/u1.png"));
        assert_eq!(
            store.public_url("avatars/u1.png"),
            "https://cdn.example.com/avatars/u1.png"
        );
    }

    #[tokio::test]
    async fn test_fail_on_upload() {
        let store = InMemoryObjectStore::default();
        store.set_fail_on_upload(true);

        let result = store.upload("x", vec![]).await;
        assert!(matches!(result, Err(BackendError::Storage(_))));
        assert_eq!(store.object_count(), 0);
    }
}
