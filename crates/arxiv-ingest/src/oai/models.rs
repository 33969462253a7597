//! Typed views over the converted OAI-PMH tree

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An element that may occur once or several times.
///
/// The XML tree keeps a single occurrence as a bare value and only turns
/// repeats into a list, so every repeatable element goes through this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

/// Normalize an optional repeatable element into a list
pub fn to_vec<T>(value: Option<OneOrMany<T>>) -> Vec<T> {
    value.map(OneOrMany::into_vec).unwrap_or_default()
}

/// Like [`to_vec`] for repeatable text elements, dropping empty occurrences.
///
/// An empty element converts to `null`, so `<a>x</a><a/>` arrives as
/// `["x", null]`.
pub fn to_present_vec<T>(value: Option<OneOrMany<Option<T>>>) -> Vec<T> {
    to_vec(value).into_iter().flatten().collect()
}

/// `<header>` of an OAI-PMH record
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RecordHeader {
    pub identifier: String,
    pub datestamp: String,
    #[serde(rename = "setSpec", default)]
    pub set_spec: Option<OneOrMany<Option<String>>>,
    #[serde(rename = "@status", default)]
    pub status: Option<String>,
}

impl RecordHeader {
    pub fn is_deleted(&self) -> bool {
        self.status.as_deref() == Some("deleted")
    }

    pub fn set_specs(&self) -> Vec<String> {
        to_present_vec(self.set_spec.clone())
    }
}

/// One `<record>` as returned by ListRecords.
///
/// `metadata` stays untyped here; the normalizer decides per record whether
/// it can be read, so one broken record never fails the page.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawRecord {
    pub header: RecordHeader,
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl RawRecord {
    pub fn identifier(&self) -> &str {
        &self.header.identifier
    }
}

/// The `<metadata>` block for the `arXiv` metadata format
#[derive(Debug, Clone, Deserialize)]
pub struct MetadataBlock {
    #[serde(rename = "arXiv")]
    pub arxiv: ArxivMetadata,
}

/// `<arXiv>` element of the arXiv metadata format
#[derive(Debug, Clone, Deserialize)]
pub struct ArxivMetadata {
    pub id: Option<String>,
    pub created: Option<String>,
    pub updated: Option<String>,
    #[serde(default)]
    pub authors: Option<Authors>,
    pub title: Option<String>,
    pub categories: Option<String>,
    pub comments: Option<String>,
    #[serde(rename = "report-no")]
    pub report_no: Option<String>,
    #[serde(rename = "msc-class")]
    pub msc_class: Option<String>,
    #[serde(rename = "acm-class")]
    pub acm_class: Option<String>,
    #[serde(rename = "journal-ref")]
    pub journal_ref: Option<String>,
    pub doi: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Authors {
    #[serde(default)]
    pub author: Option<OneOrMany<Author>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Author {
    pub keyname: String,
    pub forenames: Option<String>,
    pub suffix: Option<String>,
    #[serde(default)]
    pub affiliation: Option<OneOrMany<Option<String>>>,
}
