use arxiv_common::types::UpdateBatch;
use arxiv_common::EtlResult;
use async_trait::async_trait;
use serde::Serialize;

/// Rows touched by one `apply_batch`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    /// Articles that existed before and were replaced
    pub replaced: u64,
    pub articles: u64,
    pub authorships: u64,
    pub affiliations: u64,
}

/// Relational store for articles, authorships and affiliations.
///
/// Deleting an article must remove its authorships and their affiliations.
#[async_trait]
pub trait ArticleRepository: Send + Sync {
    /// Delete every row of `batch.identifiers`, then insert the batch rows.
    ///
    /// Applying the same batch twice leaves the same rows as applying it once.
    async fn apply_batch(&self, batch: &UpdateBatch) -> EtlResult<BatchOutcome>;

    /// Delete the articles with these identifiers; returns how many existed.
    async fn apply_deletions(&self, identifiers: &[String]) -> EtlResult<u64>;
}
