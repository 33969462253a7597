//! In-memory [`ObjectStore`] for tests and dry runs.

use std::collections::BTreeMap;

use arxiv_common::{EtlError, EtlResult};
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::ObjectStore;

/// Bucket backed by a sorted map, with the same listing rules as S3.
#[derive(Default)]
pub struct MemoryStore {
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All keys currently stored, sorted
    pub async fn keys(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, key: &str) -> EtlResult<Option<Vec<u8>>> {
        Ok(self.objects.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> EtlResult<()> {
        self.objects.write().await.insert(key.to_string(), data);
        Ok(())
    }

    async fn exists(&self, key: &str) -> EtlResult<bool> {
        Ok(self.objects.read().await.contains_key(key))
    }

    async fn delete(&self, key: &str) -> EtlResult<()> {
        self.objects.write().await.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> EtlResult<Vec<String>> {
        let objects = self.objects.read().await;
        Ok(objects
            .keys()
            .filter(|key| {
                key.strip_prefix(prefix)
                    .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
            })
            .cloned()
            .collect())
    }

    async fn copy(&self, source_key: &str, dest_key: &str) -> EtlResult<()> {
        let mut objects = self.objects.write().await;
        let data = objects
            .get(source_key)
            .cloned()
            .ok_or_else(|| EtlError::Storage(format!("no such key: {source_key}")))?;
        objects.insert(dest_key.to_string(), data);
        Ok(())
    }
}
