//! Normalized rows and staged batch formats

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ============================================================================
// Relational Rows
// ============================================================================

/// One row of `arxiv_articles`.
///
/// `identifier` is the primary key. Everything up to `abstract_text` is
/// required by the schema, the rest is nullable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRow {
    pub identifier: String,
    pub title: String,
    pub created: NaiveDate,
    /// Space separated arXiv categories, kept as delivered
    pub categories: String,
    pub datestamp: NaiveDate,
    /// Space separated set memberships from the record header
    pub set_spec: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub msc_class: Option<String>,
    pub acm_class: Option<String>,
    pub comments: Option<String>,
    pub updated: Option<NaiveDate>,
    pub journal_ref: Option<String>,
    pub report_no: Option<String>,
    pub doi: Option<String>,
}

/// One row of `arxiv_authorship`, keyed by `(article_id, author_pos)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorshipRow {
    pub article_id: String,
    /// 1-based position in the author list
    pub author_pos: i32,
    pub keyname: String,
    pub forenames: Option<String>,
    pub suffix: Option<String>,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
}

/// One row of `arxiv_affiliations`, pointing at an authorship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffiliationRow {
    pub article_id: String,
    pub author_pos: i32,
    pub affiliation: String,
}

// ============================================================================
// Staged Files
// ============================================================================

/// A record the endpoint reported without metadata, i.e. a removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionMarker {
    pub identifier: String,
    pub datestamp: String,
    #[serde(default)]
    pub set_specs: Vec<String>,
}

/// Content of one `metadata/<date>_<suffix>.json` file.
///
/// `identifiers` lists the identifiers of the articles in the file, one per
/// article after deduplication. The loader deletes all of them before
/// inserting the rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateBatch {
    pub identifiers: Vec<String>,
    pub articles: Vec<ArticleRow>,
    pub authorships: Vec<AuthorshipRow>,
    pub affiliations: Vec<AffiliationRow>,
}

impl UpdateBatch {
    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty() && self.articles.is_empty()
    }
}

/// Output of normalizing one harvested page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedPage {
    pub updates: UpdateBatch,
    pub deletions: Vec<DeletionMarker>,
}
