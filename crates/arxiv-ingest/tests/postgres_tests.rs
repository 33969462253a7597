//! PgArticleRepository tests against a real PostgreSQL
//!
//! Each test starts its own container and applies the migrations.

use anyhow::Result;
use arxiv_common::types::UpdateBatch;
use arxiv_ingest::db::{self, DbConfig};
use arxiv_ingest::load::{ArticleRepository, PgArticleRepository, TableCounts};
use arxiv_ingest::normalize::normalize_page;
use arxiv_ingest::oai::response::parse_list_records;
use serial_test::serial;
use testcontainers::{core::IntoContainerPort, runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tracing::info;

mod common;
use common::{author, init_tracing, list_records_xml, record_xml, TestAuthor};

async fn start_postgres() -> Result<(ContainerAsync<Postgres>, PgArticleRepository)> {
    let container = Postgres::default().with_tag("16-alpine").start().await?;
    let host = container.get_host().await?;
    let port = container.get_host_port_ipv4(5432.tcp()).await?;

    let config = DbConfig {
        url: format!("postgresql://postgres:postgres@{host}:{port}/postgres"),
        ..Default::default()
    };
    let pool = db::create_pool(&config).await?;
    db::run_migrations(&pool).await?;
    db::health_check(&pool).await?;

    Ok((container, PgArticleRepository::new(pool)))
}

/// Two articles, three authors, two affiliations
fn sample_batch() -> Result<UpdateBatch> {
    let berger = TestAuthor {
        keyname: "Berger",
        forenames: Some("Edmond L."),
        affiliations: &["Argonne National Laboratory", "University of Chicago"],
    };
    let xml = list_records_xml(
        &[
            record_xml(
                "oai:arXiv.org:0704.0001",
                "2024-01-15",
                "Calculation of prompt diphoton production",
                &[author("Balázs", "C."), berger],
            ),
            record_xml(
                "oai:arXiv.org:0704.0002",
                "2024-01-15",
                "Sparsity-certifying graph decompositions",
                &[author("Streinu", "Ileana")],
            ),
        ],
        None,
    );

    let page = parse_list_records(&xml)?;
    Ok(normalize_page(page.records).updates)
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_apply_batch_is_idempotent() -> Result<()> {
    init_tracing();
    let (_container, repository) = start_postgres().await?;
    let batch = sample_batch()?;

    let first = repository.apply_batch(&batch).await?;
    assert_eq!(first.replaced, 0);
    assert_eq!(first.articles, 2);

    let after_first = repository.counts().await?;
    let second = repository.apply_batch(&batch).await?;
    let after_second = repository.counts().await?;

    info!(?after_second, "Row counts after reapplying");
    assert_eq!(second.replaced, 2);
    assert_eq!(after_first, after_second);
    assert_eq!(
        after_second,
        TableCounts {
            articles: 2,
            authorships: 3,
            affiliations: 2,
        }
    );

    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_update_replaces_authors_of_previous_version() -> Result<()> {
    init_tracing();
    let (_container, repository) = start_postgres().await?;
    repository.apply_batch(&sample_batch()?).await?;

    let mut revised = sample_batch()?;
    revised.articles.retain(|a| a.identifier == "oai:arXiv.org:0704.0001");
    revised.authorships.retain(|a| a.article_id == "oai:arXiv.org:0704.0001" && a.author_pos == 1);
    revised.affiliations.clear();
    revised.identifiers = vec!["oai:arXiv.org:0704.0001".to_string()];
    revised.articles[0].title = "Calculation of prompt diphoton production (revised)".to_string();

    repository.apply_batch(&revised).await?;

    let title: String =
        sqlx::query_scalar("SELECT title FROM arxiv_articles WHERE identifier = $1")
            .bind("oai:arXiv.org:0704.0001")
            .fetch_one(repository.pool())
            .await?;
    assert!(title.ends_with("(revised)"));

    assert_eq!(
        repository.counts().await?,
        TableCounts {
            articles: 2,
            authorships: 2,
            affiliations: 0,
        }
    );

    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_deletions_cascade_to_authors_and_affiliations() -> Result<()> {
    init_tracing();
    let (_container, repository) = start_postgres().await?;
    repository.apply_batch(&sample_batch()?).await?;

    let deleted = repository
        .apply_deletions(&[
            "oai:arXiv.org:0704.0001".to_string(),
            "oai:arXiv.org:9999.9999".to_string(),
        ])
        .await?;

    assert_eq!(deleted, 1);
    assert_eq!(
        repository.counts().await?,
        TableCounts {
            articles: 1,
            authorships: 1,
            affiliations: 0,
        }
    );

    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_backfill_name_parts() -> Result<()> {
    init_tracing();
    let (_container, repository) = start_postgres().await?;
    repository.apply_batch(&sample_batch()?).await?;

    sqlx::query(
        "UPDATE arxiv_authorship SET forenames = $1, first_name = NULL, middle_name = NULL \
         WHERE article_id = $2",
    )
    .bind("J\"urgen Hans")
    .bind("oai:arXiv.org:0704.0002")
    .execute(repository.pool())
    .await?;

    let updated = repository.backfill_name_parts().await?;
    assert!(updated >= 1);

    let (first, middle): (Option<String>, Option<String>) = sqlx::query_as(
        "SELECT first_name, middle_name FROM arxiv_authorship WHERE article_id = $1",
    )
    .bind("oai:arXiv.org:0704.0002")
    .fetch_one(repository.pool())
    .await?;

    assert_eq!(first.as_deref(), Some("jürgen"));
    assert_eq!(middle.as_deref(), Some("hans"));

    Ok(())
}
