//! Advisory run lock
//!
//! A zero-byte object whose existence means "a run is in progress". The
//! check and the create are two separate requests, so two runs started at
//! the same moment can both succeed. It only guards against a scheduled run
//! overlapping one that is still going, or one that failed and needs an
//! operator.

use std::sync::Arc;

use arxiv_common::{EtlError, EtlResult};
use tracing::{info, warn};

use crate::storage::ObjectStore;

pub const DEFAULT_LOCK_KEY: &str = "importer.lock";

#[derive(Clone)]
pub struct RunLock {
    store: Arc<dyn ObjectStore>,
    key: String,
}

impl RunLock {
    pub fn new(store: Arc<dyn ObjectStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Create the sentinel, or fail with `AlreadyLocked` if it exists.
    pub async fn acquire(&self) -> EtlResult<()> {
        if self.store.exists(&self.key).await? {
            warn!(key = %self.key, "Run lock is already held");
            return Err(EtlError::AlreadyLocked {
                key: self.key.clone(),
            });
        }

        self.store.put(&self.key, Vec::new()).await?;
        info!(key = %self.key, "Run lock acquired");
        Ok(())
    }

    /// Delete the sentinel, whoever created it.
    pub async fn release(&self) -> EtlResult<()> {
        self.store.delete(&self.key).await?;
        info!(key = %self.key, "Run lock released");
        Ok(())
    }

    pub async fn is_held(&self) -> EtlResult<bool> {
        self.store.exists(&self.key).await
    }
}
