//! Applying staged files to the relational store
//!
//! All update files are applied before any deletion file, each group in
//! (date, page) order. A file is moved to its archive prefix once its rows
//! are committed, so whatever is still staged after a failure is exactly
//! what the next run has to apply.

pub mod postgres;
pub mod repository;

use std::sync::Arc;

use arxiv_common::EtlResult;
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::staging::{archive_key, pending_keys, read_deletions, read_updates, StagedKind};
use crate::storage::ObjectStore;

pub use postgres::{PgArticleRepository, TableCounts};
pub use repository::{ArticleRepository, BatchOutcome};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadStats {
    pub update_files: usize,
    pub deletion_files: usize,
    pub articles: u64,
    pub authorships: u64,
    pub affiliations: u64,
    pub replaced: u64,
    pub deleted: u64,
}

pub struct Loader {
    store: Arc<dyn ObjectStore>,
    repository: Arc<dyn ArticleRepository>,
}

impl Loader {
    pub fn new(store: Arc<dyn ObjectStore>, repository: Arc<dyn ArticleRepository>) -> Self {
        Self { store, repository }
    }

    /// Staged keys of one kind, in application order
    pub async fn pending(&self, kind: StagedKind) -> EtlResult<Vec<String>> {
        pending_keys(self.store.as_ref(), kind).await
    }

    /// Apply every staged update file, then every staged deletion file.
    ///
    /// Stops at the first failing file and leaves it staged.
    #[instrument(skip(self))]
    pub async fn run(&self) -> EtlResult<LoadStats> {
        let mut stats = LoadStats::default();

        let updates = self.pending(StagedKind::Updates).await?;
        info!(files = updates.len(), "Applying staged update files");
        for key in &updates {
            self.apply_update_file(key, &mut stats)
                .await
                .inspect_err(|e| error!(key = %key, error = %e, "Failed to apply update file"))?;
        }

        let deletions = self.pending(StagedKind::Deletions).await?;
        info!(files = deletions.len(), "Applying staged deletion files");
        for key in &deletions {
            self.apply_deletion_file(key, &mut stats)
                .await
                .inspect_err(|e| error!(key = %key, error = %e, "Failed to apply deletion file"))?;
        }

        info!(
            update_files = stats.update_files,
            deletion_files = stats.deletion_files,
            articles = stats.articles,
            deleted = stats.deleted,
            "Load finished"
        );
        Ok(stats)
    }

    async fn apply_update_file(&self, key: &str, stats: &mut LoadStats) -> EtlResult<()> {
        let Some(batch) = read_updates(self.store.as_ref(), key).await? else {
            warn!(key = %key, "Staged file disappeared before it was applied");
            return Ok(());
        };

        let outcome = self.repository.apply_batch(&batch).await?;
        self.archive(StagedKind::Updates, key).await?;

        stats.update_files += 1;
        stats.articles += outcome.articles;
        stats.authorships += outcome.authorships;
        stats.affiliations += outcome.affiliations;
        stats.replaced += outcome.replaced;

        info!(
            key = %key,
            articles = outcome.articles,
            replaced = outcome.replaced,
            "Applied update file"
        );
        Ok(())
    }

    async fn apply_deletion_file(&self, key: &str, stats: &mut LoadStats) -> EtlResult<()> {
        let Some(markers) = read_deletions(self.store.as_ref(), key).await? else {
            warn!(key = %key, "Staged file disappeared before it was applied");
            return Ok(());
        };

        let identifiers: Vec<String> = markers.into_iter().map(|m| m.identifier).collect();
        let deleted = self.repository.apply_deletions(&identifiers).await?;
        self.archive(StagedKind::Deletions, key).await?;

        stats.deletion_files += 1;
        stats.deleted += deleted;

        info!(
            key = %key,
            markers = identifiers.len(),
            deleted,
            "Applied deletion file"
        );
        Ok(())
    }

    async fn archive(&self, kind: StagedKind, key: &str) -> EtlResult<()> {
        let destination = archive_key(kind, key);
        self.store.rename(key, &destination).await
    }
}
