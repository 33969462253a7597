//! Shared fixtures for arxiv-ingest integration tests
//!
//! - OAI-PMH response builders for wiremock
//! - An in-memory [`ArticleRepository`] with cascading deletes
//! - Tracing setup that writes through the test harness

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use arxiv_common::types::{AffiliationRow, ArticleRow, AuthorshipRow, UpdateBatch};
use arxiv_common::{EtlError, EtlResult};
use arxiv_ingest::config::OaiConfig;
use arxiv_ingest::load::{ArticleRepository, BatchOutcome};
use async_trait::async_trait;
use tokio::sync::Mutex;

/// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,arxiv_ingest=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Client settings pointing at a mock server
pub fn oai_config(base_url: &str, request_delay_secs: f64) -> OaiConfig {
    OaiConfig {
        base_url: base_url.to_string(),
        request_delay_secs,
        timeout_secs: 5,
        ..Default::default()
    }
}

// ============================================================================
// OAI-PMH fixtures
// ============================================================================

pub struct TestAuthor<'a> {
    pub keyname: &'a str,
    pub forenames: Option<&'a str>,
    pub affiliations: &'a [&'a str],
}

pub fn author<'a>(keyname: &'a str, forenames: &'a str) -> TestAuthor<'a> {
    TestAuthor {
        keyname,
        forenames: Some(forenames),
        affiliations: &[],
    }
}

/// A `<record>` with an arXiv metadata block
pub fn record_xml(identifier: &str, datestamp: &str, title: &str, authors: &[TestAuthor]) -> String {
    let authors: String = authors
        .iter()
        .map(|a| {
            let forenames = a
                .forenames
                .map(|f| format!("<forenames>{f}</forenames>"))
                .unwrap_or_default();
            let affiliations: String = a
                .affiliations
                .iter()
                .map(|aff| format!("<affiliation>{aff}</affiliation>"))
                .collect();
            format!(
                "<author><keyname>{}</keyname>{forenames}{affiliations}</author>",
                a.keyname
            )
        })
        .collect();

    format!(
        r#"<record>
  <header>
    <identifier>{identifier}</identifier>
    <datestamp>{datestamp}</datestamp>
    <setSpec>physics:hep-ph</setSpec>
  </header>
  <metadata>
    <arXiv xmlns="http://arxiv.org/OAI/arXiv/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:schemaLocation="http://arxiv.org/OAI/arXiv/ http://arxiv.org/OAI/arXiv.xsd">
      <id>{identifier}</id>
      <created>2007-04-02</created>
      <authors>{authors}</authors>
      <title>{title}</title>
      <categories>hep-ph</categories>
      <comments>37 pages, 15 figures</comments>
      <abstract>  An abstract
  spanning lines.  </abstract>
    </arXiv>
  </metadata>
</record>"#
    )
}

/// A `<record>` whose header is marked deleted
pub fn deleted_record_xml(identifier: &str, datestamp: &str) -> String {
    format!(
        r#"<record>
  <header status="deleted">
    <identifier>{identifier}</identifier>
    <datestamp>{datestamp}</datestamp>
    <setSpec>physics:hep-ph</setSpec>
  </header>
</record>"#
    )
}

fn envelope(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<OAI-PMH xmlns="http://www.openarchives.org/OAI/2.0/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:schemaLocation="http://www.openarchives.org/OAI/2.0/ http://www.openarchives.org/OAI/2.0/OAI-PMH.xsd">
  <responseDate>2024-01-16T10:00:00Z</responseDate>
  <request verb="ListRecords" metadataPrefix="arXiv">http://export.arxiv.org/oai2</request>
  {body}
</OAI-PMH>"#
    )
}

/// A ListRecords page, with a resumption token if more pages follow
pub fn list_records_xml(records: &[String], resumption_token: Option<&str>) -> String {
    let token = resumption_token
        .map(|t| format!(r#"<resumptionToken cursor="0" completeListSize="3">{t}</resumptionToken>"#))
        .unwrap_or_default();
    envelope(&format!("<ListRecords>{}{token}</ListRecords>", records.join("\n")))
}

pub fn oai_error_xml(code: &str, message: &str) -> String {
    envelope(&format!(r#"<error code="{code}">{message}</error>"#))
}

// ============================================================================
// In-memory repository
// ============================================================================

#[derive(Debug, Default)]
struct Tables {
    articles: BTreeMap<String, ArticleRow>,
    authorships: Vec<AuthorshipRow>,
    affiliations: Vec<AffiliationRow>,
}

impl Tables {
    /// Delete articles with cascading authorships and affiliations
    fn delete(&mut self, identifiers: &[String]) -> u64 {
        let mut deleted = 0;
        for identifier in identifiers {
            if self.articles.remove(identifier).is_some() {
                deleted += 1;
            }
        }
        self.authorships
            .retain(|a| !identifiers.contains(&a.article_id));
        self.affiliations
            .retain(|a| !identifiers.contains(&a.article_id));
        deleted
    }
}

/// Stand-in for Postgres with the same cascade and primary key rules
#[derive(Debug, Default)]
pub struct MemoryRepository {
    tables: Mutex<Tables>,
    fail: AtomicBool,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following call fail with a database error
    pub fn fail_from_now_on(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub async fn article(&self, identifier: &str) -> Option<ArticleRow> {
        self.tables.lock().await.articles.get(identifier).cloned()
    }

    pub async fn article_ids(&self) -> Vec<String> {
        self.tables.lock().await.articles.keys().cloned().collect()
    }

    pub async fn authorships_of(&self, identifier: &str) -> Vec<AuthorshipRow> {
        self.tables
            .lock()
            .await
            .authorships
            .iter()
            .filter(|a| a.article_id == identifier)
            .cloned()
            .collect()
    }

    pub async fn affiliation_count(&self) -> usize {
        self.tables.lock().await.affiliations.len()
    }

    fn check(&self) -> EtlResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(EtlError::Database("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ArticleRepository for MemoryRepository {
    async fn apply_batch(&self, batch: &UpdateBatch) -> EtlResult<BatchOutcome> {
        self.check()?;
        let mut tables = self.tables.lock().await;

        let replaced = tables.delete(&batch.identifiers);
        for article in &batch.articles {
            if tables.articles.contains_key(&article.identifier) {
                return Err(EtlError::Database(format!(
                    "duplicate key {}",
                    article.identifier
                )));
            }
            tables
                .articles
                .insert(article.identifier.clone(), article.clone());
        }
        tables.authorships.extend(batch.authorships.iter().cloned());
        tables.affiliations.extend(batch.affiliations.iter().cloned());

        Ok(BatchOutcome {
            replaced,
            articles: batch.articles.len() as u64,
            authorships: batch.authorships.len() as u64,
            affiliations: batch.affiliations.len() as u64,
        })
    }

    async fn apply_deletions(&self, identifiers: &[String]) -> EtlResult<u64> {
        self.check()?;
        Ok(self.tables.lock().await.delete(identifiers))
    }
}
