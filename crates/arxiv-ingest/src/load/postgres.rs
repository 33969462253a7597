//! Postgres implementation of [`ArticleRepository`]
//!
//! Each table is written in its own transaction: articles (after deleting
//! the batch identifiers), then authorships, then affiliations. A crash
//! between two of them leaves an article without its authors until the file
//! is applied again, which deletes the article first and repairs it.

use arxiv_common::types::{AffiliationRow, ArticleRow, AuthorshipRow, UpdateBatch};
use arxiv_common::{EtlError, EtlResult};
use async_trait::async_trait;
use serde::Serialize;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use tracing::{debug, info, instrument};

use super::repository::{ArticleRepository, BatchOutcome};
use crate::db::DbError;
use crate::names::derive_name_parts;

/// Rows per INSERT, kept well below the 65535 bind parameter limit
const ARTICLE_CHUNK_SIZE: usize = 2_000;
const AUTHORSHIP_CHUNK_SIZE: usize = 5_000;
const AFFILIATION_CHUNK_SIZE: usize = 10_000;
const BACKFILL_CHUNK_SIZE: usize = 10_000;

fn db_error(err: sqlx::Error) -> EtlError {
    DbError::from(err).into()
}

/// Row counts of the three tables
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TableCounts {
    pub articles: i64,
    pub authorships: i64,
    pub affiliations: i64,
}

#[derive(Clone)]
pub struct PgArticleRepository {
    pool: PgPool,
}

impl PgArticleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn insert_articles(
        tx: &mut Transaction<'_, Postgres>,
        articles: &[ArticleRow],
    ) -> EtlResult<u64> {
        let mut inserted = 0;

        for chunk in articles.chunks(ARTICLE_CHUNK_SIZE) {
            let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
                r#"
                INSERT INTO arxiv_articles (
                    identifier,
                    title,
                    created,
                    categories,
                    datestamp,
                    set_spec,
                    abstract,
                    msc_class,
                    acm_class,
                    comments,
                    updated,
                    journal_ref,
                    report_no,
                    doi
                )
                "#,
            );

            query_builder.push_values(chunk, |mut b, article| {
                b.push_bind(&article.identifier)
                    .push_bind(&article.title)
                    .push_bind(article.created)
                    .push_bind(&article.categories)
                    .push_bind(article.datestamp)
                    .push_bind(&article.set_spec)
                    .push_bind(&article.abstract_text)
                    .push_bind(&article.msc_class)
                    .push_bind(&article.acm_class)
                    .push_bind(&article.comments)
                    .push_bind(article.updated)
                    .push_bind(&article.journal_ref)
                    .push_bind(&article.report_no)
                    .push_bind(&article.doi);
            });

            inserted += query_builder
                .build()
                .execute(&mut **tx)
                .await
                .map_err(db_error)?
                .rows_affected();
        }

        Ok(inserted)
    }

    async fn insert_authorships(
        tx: &mut Transaction<'_, Postgres>,
        authorships: &[AuthorshipRow],
    ) -> EtlResult<u64> {
        let mut inserted = 0;

        for chunk in authorships.chunks(AUTHORSHIP_CHUNK_SIZE) {
            let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO arxiv_authorship \
                 (article_id, author_pos, keyname, forenames, suffix, first_name, middle_name) ",
            );

            query_builder.push_values(chunk, |mut b, author| {
                b.push_bind(&author.article_id)
                    .push_bind(author.author_pos)
                    .push_bind(&author.keyname)
                    .push_bind(&author.forenames)
                    .push_bind(&author.suffix)
                    .push_bind(&author.first_name)
                    .push_bind(&author.middle_name);
            });

            inserted += query_builder
                .build()
                .execute(&mut **tx)
                .await
                .map_err(db_error)?
                .rows_affected();
        }

        Ok(inserted)
    }

    async fn insert_affiliations(
        tx: &mut Transaction<'_, Postgres>,
        affiliations: &[AffiliationRow],
    ) -> EtlResult<u64> {
        let mut inserted = 0;

        for chunk in affiliations.chunks(AFFILIATION_CHUNK_SIZE) {
            let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO arxiv_affiliations (article_id, author_pos, affiliation) ",
            );

            query_builder.push_values(chunk, |mut b, affiliation| {
                b.push_bind(&affiliation.article_id)
                    .push_bind(affiliation.author_pos)
                    .push_bind(&affiliation.affiliation);
            });

            inserted += query_builder
                .build()
                .execute(&mut **tx)
                .await
                .map_err(db_error)?
                .rows_affected();
        }

        Ok(inserted)
    }

    /// Recompute `first_name` and `middle_name` from `forenames` for every
    /// stored author. Returns the number of rows updated.
    #[instrument(skip(self))]
    pub async fn backfill_name_parts(&self) -> EtlResult<u64> {
        let forenames: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT forenames FROM arxiv_authorship WHERE forenames IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        info!(distinct_forenames = forenames.len(), "Backfilling name parts");

        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let mut updated = 0;

        for chunk in forenames.chunks(BACKFILL_CHUNK_SIZE) {
            let (first_names, middle_names): (Vec<Option<String>>, Vec<Option<String>>) = chunk
                .iter()
                .map(|f| derive_name_parts(Some(f.as_str())))
                .unzip();

            updated += sqlx::query(
                r#"
                UPDATE arxiv_authorship AS a
                SET first_name = n.first_name,
                    middle_name = n.middle_name
                FROM UNNEST($1::text[], $2::text[], $3::text[])
                    AS n(forenames, first_name, middle_name)
                WHERE a.forenames = n.forenames
                "#,
            )
            .bind(chunk)
            .bind(&first_names)
            .bind(&middle_names)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?
            .rows_affected();
        }

        tx.commit().await.map_err(db_error)?;

        info!(updated, "Name parts backfilled");
        Ok(updated)
    }

    async fn count_rows(&self, table: &str) -> EtlResult<i64> {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)
    }

    pub async fn counts(&self) -> EtlResult<TableCounts> {
        Ok(TableCounts {
            articles: self.count_rows("arxiv_articles").await?,
            authorships: self.count_rows("arxiv_authorship").await?,
            affiliations: self.count_rows("arxiv_affiliations").await?,
        })
    }
}

#[async_trait]
impl ArticleRepository for PgArticleRepository {
    #[instrument(skip(self, batch), fields(articles = batch.articles.len()))]
    async fn apply_batch(&self, batch: &UpdateBatch) -> EtlResult<BatchOutcome> {
        if batch.is_empty() {
            return Ok(BatchOutcome::default());
        }

        // Cascades to authorships and affiliations.
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let replaced = sqlx::query("DELETE FROM arxiv_articles WHERE identifier = ANY($1)")
            .bind(&batch.identifiers)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?
            .rows_affected();
        let articles = Self::insert_articles(&mut tx, &batch.articles).await?;
        tx.commit().await.map_err(db_error)?;

        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let authorships = Self::insert_authorships(&mut tx, &batch.authorships).await?;
        tx.commit().await.map_err(db_error)?;

        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let affiliations = Self::insert_affiliations(&mut tx, &batch.affiliations).await?;
        tx.commit().await.map_err(db_error)?;

        debug!(replaced, articles, authorships, affiliations, "Applied update batch");

        Ok(BatchOutcome {
            replaced,
            articles,
            authorships,
            affiliations,
        })
    }

    #[instrument(skip(self, identifiers), fields(identifiers = identifiers.len()))]
    async fn apply_deletions(&self, identifiers: &[String]) -> EtlResult<u64> {
        if identifiers.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let deleted = sqlx::query("DELETE FROM arxiv_articles WHERE identifier = ANY($1)")
            .bind(identifiers)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?
            .rows_affected();
        tx.commit().await.map_err(db_error)?;

        debug!(deleted, "Applied deletions");
        Ok(deleted)
    }
}
