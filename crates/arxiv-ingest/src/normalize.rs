//! Records of one harvested page to relational rows
//!
//! Each page becomes an [`UpdateBatch`] (articles, authorships, affiliations)
//! plus a list of [`DeletionMarker`]s. When an identifier occurs more than
//! once in a page only its last occurrence is kept. This trusts the endpoint
//! to list versions in ascending order, which is not guaranteed by the
//! protocol.

use std::collections::HashMap;

use arxiv_common::types::{
    AffiliationRow, ArticleRow, AuthorshipRow, DeletionMarker, NormalizedPage, UpdateBatch,
};
use arxiv_common::{EtlError, EtlResult};
use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::names::derive_name_parts;
use crate::oai::models::{
    to_present_vec, to_vec, ArxivMetadata, Author, Authors, MetadataBlock, RawRecord,
    RecordHeader,
};

/// Rows derived from one record
#[derive(Debug, Clone, PartialEq, Eq)]
struct NormalizedRecord {
    article: ArticleRow,
    authorships: Vec<AuthorshipRow>,
    affiliations: Vec<AffiliationRow>,
}

/// Keep only the last occurrence of every identifier, in page order.
pub fn dedup_keep_last(records: Vec<RawRecord>) -> Vec<RawRecord> {
    let last_index: HashMap<String, usize> = records
        .iter()
        .enumerate()
        .map(|(i, r)| (r.identifier().to_string(), i))
        .collect();

    records
        .into_iter()
        .enumerate()
        .filter(|(i, r)| last_index.get(r.identifier()) == Some(i))
        .map(|(_, r)| r)
        .collect()
}

/// Normalize one page. Never fails: unreadable records become deletions.
pub fn normalize_page(records: Vec<RawRecord>) -> NormalizedPage {
    let total = records.len();
    let records = dedup_keep_last(records);
    if records.len() < total {
        debug!(
            duplicates = total - records.len(),
            "Dropped superseded record versions"
        );
    }

    let mut page = NormalizedPage::default();

    for record in records {
        if record.header.is_deleted() || record.metadata.is_none() {
            page.deletions.push(deletion_marker(&record.header));
            continue;
        }

        match normalize_record(&record) {
            Ok(rows) => push_rows(&mut page.updates, rows),
            Err(e) => {
                warn!(identifier = %record.identifier(), error = %e, "Treating malformed record as deletion");
                page.deletions.push(deletion_marker(&record.header));
            },
        }
    }

    page
}

fn push_rows(batch: &mut UpdateBatch, rows: NormalizedRecord) {
    batch.identifiers.push(rows.article.identifier.clone());
    batch.articles.push(rows.article);
    batch.authorships.extend(rows.authorships);
    batch.affiliations.extend(rows.affiliations);
}

fn deletion_marker(header: &RecordHeader) -> DeletionMarker {
    DeletionMarker {
        identifier: header.identifier.clone(),
        datestamp: header.datestamp.clone(),
        set_specs: header.set_specs(),
    }
}

fn malformed(identifier: &str, reason: impl Into<String>) -> EtlError {
    EtlError::MalformedRecord {
        identifier: identifier.to_string(),
        reason: reason.into(),
    }
}

fn normalize_record(record: &RawRecord) -> EtlResult<NormalizedRecord> {
    let identifier = record.identifier();
    let metadata = record
        .metadata
        .clone()
        .ok_or_else(|| malformed(identifier, "no metadata block"))?;
    let block: MetadataBlock =
        serde_json::from_value(metadata).map_err(|e| malformed(identifier, e.to_string()))?;

    let article = build_article(&record.header, &block.arxiv)?;
    let (authorships, affiliations) = build_authors(identifier, block.arxiv.authors);

    Ok(NormalizedRecord {
        article,
        authorships,
        affiliations,
    })
}

/// Collapse runs of whitespace and line breaks into single spaces
pub fn clean_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn optional_text(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_date(identifier: &str, field: &str, value: &str) -> EtlResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|e| malformed(identifier, format!("{field} '{value}': {e}")))
}

fn required<'a>(identifier: &str, field: &str, value: &'a Option<String>) -> EtlResult<&'a str> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| malformed(identifier, format!("missing {field}")))
}

fn build_article(header: &RecordHeader, meta: &ArxivMetadata) -> EtlResult<ArticleRow> {
    let id = header.identifier.as_str();

    let updated = match optional_text(&meta.updated) {
        Some(updated) => Some(parse_date(id, "updated", &updated)?),
        None => None,
    };

    Ok(ArticleRow {
        identifier: header.identifier.clone(),
        title: clean_whitespace(required(id, "title", &meta.title)?),
        created: parse_date(id, "created", required(id, "created", &meta.created)?)?,
        categories: required(id, "categories", &meta.categories)?.trim().to_string(),
        datestamp: parse_date(id, "datestamp", &header.datestamp)?,
        set_spec: header.set_specs().join(" "),
        abstract_text: clean_whitespace(required(id, "abstract", &meta.abstract_text)?),
        msc_class: optional_text(&meta.msc_class),
        acm_class: optional_text(&meta.acm_class),
        comments: optional_text(&meta.comments).map(|c| clean_whitespace(&c)),
        updated,
        journal_ref: optional_text(&meta.journal_ref),
        report_no: optional_text(&meta.report_no),
        doi: optional_text(&meta.doi),
    })
}

fn build_authors(
    identifier: &str,
    authors: Option<Authors>,
) -> (Vec<AuthorshipRow>, Vec<AffiliationRow>) {
    let authors: Vec<Author> = authors.map(|a| to_vec(a.author)).unwrap_or_default();

    let mut authorships = Vec::with_capacity(authors.len());
    let mut affiliations = Vec::new();

    for (index, author) in authors.into_iter().enumerate() {
        let author_pos = (index + 1) as i32;
        let forenames = optional_text(&author.forenames);
        let (first_name, middle_name) = derive_name_parts(forenames.as_deref());

        affiliations.extend(
            to_present_vec(author.affiliation)
                .into_iter()
                .map(|a| clean_whitespace(&a))
                .filter(|a| !a.is_empty())
                .map(|affiliation| AffiliationRow {
                    article_id: identifier.to_string(),
                    author_pos,
                    affiliation,
                }),
        );

        authorships.push(AuthorshipRow {
            article_id: identifier.to_string(),
            author_pos,
            keyname: author.keyname.trim().to_string(),
            forenames,
            suffix: optional_text(&author.suffix),
            first_name,
            middle_name,
        });
    }

    (authorships, affiliations)
}
