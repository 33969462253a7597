//! Layout of staged and archived batch files in the bucket
//!
//! ```text
//! metadata/<date>_<suffix>.json             UpdateBatch, waiting for load
//! missing_metadata/<date>_<suffix>.json     [DeletionMarker], waiting for load
//! finished_metadata/...                     applied update files
//! finished_missing_metadata/...             applied deletion files
//! ```
//!
//! `<suffix>` is `0` for the first page of a day and the last `|` separated
//! component of the resumption token for every following page.

use std::cmp::Ordering;

use arxiv_common::types::{DeletionMarker, NormalizedPage, UpdateBatch};
use arxiv_common::EtlResult;
use chrono::NaiveDate;
use tracing::info;

use crate::storage::ObjectStore;

pub const METADATA_PREFIX: &str = "metadata/";
pub const DELETIONS_PREFIX: &str = "missing_metadata/";
pub const ARCHIVE_METADATA_PREFIX: &str = "finished_metadata/";
pub const ARCHIVE_DELETIONS_PREFIX: &str = "finished_missing_metadata/";

pub const FIRST_PAGE_SUFFIX: &str = "0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagedKind {
    Updates,
    Deletions,
}

impl StagedKind {
    pub fn staging_prefix(self) -> &'static str {
        match self {
            StagedKind::Updates => METADATA_PREFIX,
            StagedKind::Deletions => DELETIONS_PREFIX,
        }
    }

    pub fn archive_prefix(self) -> &'static str {
        match self {
            StagedKind::Updates => ARCHIVE_METADATA_PREFIX,
            StagedKind::Deletions => ARCHIVE_DELETIONS_PREFIX,
        }
    }
}

/// File name suffix for the page fetched with `resumption_token`.
///
/// Characters that could nest the key or break the file name are replaced
/// with `-`, so every staged file stays directly under its prefix.
pub fn page_suffix(resumption_token: Option<&str>) -> String {
    match resumption_token {
        None => FIRST_PAGE_SUFFIX.to_string(),
        Some(token) => token
            .rsplit('|')
            .next()
            .unwrap_or(token)
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' { c } else { '-' })
            .collect(),
    }
}

pub fn staged_key(kind: StagedKind, date: NaiveDate, suffix: &str) -> String {
    format!(
        "{}{}_{}.json",
        kind.staging_prefix(),
        date.format("%Y-%m-%d"),
        suffix
    )
}

/// Archive key for a staged key, keeping the file name
pub fn archive_key(kind: StagedKind, staged_key: &str) -> String {
    let file_name = staged_key.rsplit('/').next().unwrap_or(staged_key);
    format!("{}{}", kind.archive_prefix(), file_name)
}

/// Sort position of a staged file: its day, then its page number
#[derive(Debug, Clone, PartialEq, Eq)]
struct StagedOrder<'a> {
    date: Option<NaiveDate>,
    page: Option<u64>,
    key: &'a str,
}

impl<'a> StagedOrder<'a> {
    fn of(key: &'a str) -> Self {
        let stem = key
            .rsplit('/')
            .next()
            .unwrap_or(key)
            .trim_end_matches(".json");
        let (date, page) = match stem.split_once('_') {
            Some((date, page)) => (
                NaiveDate::parse_from_str(date, "%Y-%m-%d").ok(),
                page.parse().ok(),
            ),
            None => (NaiveDate::parse_from_str(stem, "%Y-%m-%d").ok(), None),
        };
        Self { date, page, key }
    }
}

impl Ord for StagedOrder<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Unparseable names go last, in key order.
        let rank = |o: &Self| (o.date.is_none(), o.date, o.page.is_none(), o.page);
        rank(self)
            .cmp(&rank(other))
            .then_with(|| self.key.cmp(other.key))
    }
}

impl PartialOrd for StagedOrder<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Order staged keys by (date, numeric page suffix).
///
/// Plain key order would put `2024-01-01_10001` before `2024-01-01_2001`.
pub fn sort_staged_keys(mut keys: Vec<String>) -> Vec<String> {
    keys.sort_by(|a, b| StagedOrder::of(a).cmp(&StagedOrder::of(b)));
    keys
}

/// Staged keys of one kind, in application order
pub async fn pending_keys(store: &dyn ObjectStore, kind: StagedKind) -> EtlResult<Vec<String>> {
    let keys = store.list(kind.staging_prefix()).await?;
    Ok(sort_staged_keys(
        keys.into_iter().filter(|k| k.ends_with(".json")).collect(),
    ))
}

/// Files written for one page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagedPage {
    pub update_key: Option<String>,
    pub deletion_key: Option<String>,
}

impl StagedPage {
    pub fn files_written(&self) -> usize {
        usize::from(self.update_key.is_some()) + usize::from(self.deletion_key.is_some())
    }
}

/// Write the non-empty halves of a normalized page.
pub async fn write_page(
    store: &dyn ObjectStore,
    date: NaiveDate,
    suffix: &str,
    page: &NormalizedPage,
) -> EtlResult<StagedPage> {
    let mut staged = StagedPage::default();

    if !page.updates.is_empty() {
        let key = staged_key(StagedKind::Updates, date, suffix);
        store.put(&key, serde_json::to_vec(&page.updates)?).await?;
        info!(
            key = %key,
            articles = page.updates.articles.len(),
            authorships = page.updates.authorships.len(),
            "Staged update batch"
        );
        staged.update_key = Some(key);
    }

    if !page.deletions.is_empty() {
        let key = staged_key(StagedKind::Deletions, date, suffix);
        store.put(&key, serde_json::to_vec(&page.deletions)?).await?;
        info!(key = %key, deletions = page.deletions.len(), "Staged deletion markers");
        staged.deletion_key = Some(key);
    }

    Ok(staged)
}

pub async fn read_updates(store: &dyn ObjectStore, key: &str) -> EtlResult<Option<UpdateBatch>> {
    match store.get(key).await? {
        Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
        None => Ok(None),
    }
}

pub async fn read_deletions(
    store: &dyn ObjectStore,
    key: &str,
) -> EtlResult<Option<Vec<DeletionMarker>>> {
    match store.get(key).await? {
        Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
        None => Ok(None),
    }
}
