//! HTTP client for the OAI-PMH endpoint

use std::time::Duration;

use arxiv_common::{EtlError, EtlResult};
use chrono::NaiveDate;
use reqwest::Client;
use tracing::{debug, info, instrument};

use super::response::{parse_list_records, parse_list_sets, ListRecordsPage};
use crate::config::OaiConfig;

/// Query of one ListRecords request.
///
/// A resumption token replaces every other argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListRecordsRequest {
    Window {
        from: NaiveDate,
        until: NaiveDate,
        metadata_prefix: String,
        set: Option<String>,
    },
    Resume {
        token: String,
    },
}

impl ListRecordsRequest {
    /// Records whose datestamp is exactly `date`
    pub fn for_day(date: NaiveDate, metadata_prefix: impl Into<String>, set: Option<String>) -> Self {
        ListRecordsRequest::Window {
            from: date,
            until: date,
            metadata_prefix: metadata_prefix.into(),
            set,
        }
    }

    pub fn resume(token: impl Into<String>) -> Self {
        ListRecordsRequest::Resume {
            token: token.into(),
        }
    }

    pub fn resumption_token(&self) -> Option<&str> {
        match self {
            ListRecordsRequest::Resume { token } => Some(token),
            ListRecordsRequest::Window { .. } => None,
        }
    }

    pub fn query(&self) -> Vec<(&'static str, String)> {
        match self {
            ListRecordsRequest::Window {
                from,
                until,
                metadata_prefix,
                set,
            } => {
                let mut query = vec![
                    ("verb", "ListRecords".to_string()),
                    ("from", from.format("%Y-%m-%d").to_string()),
                    ("until", until.format("%Y-%m-%d").to_string()),
                    ("metadataPrefix", metadata_prefix.clone()),
                ];
                if let Some(set) = set {
                    query.push(("set", set.clone()));
                }
                query
            },
            ListRecordsRequest::Resume { token } => vec![
                ("verb", "ListRecords".to_string()),
                ("resumptionToken", token.clone()),
            ],
        }
    }
}

pub struct OaiClient {
    client: Client,
    base_url: String,
    request_delay: Duration,
}

impl OaiClient {
    pub fn new(config: &OaiConfig) -> EtlResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| EtlError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            request_delay: config.request_delay(),
        })
    }

    #[instrument(skip(self))]
    async fn fetch(&self, query: &[(&'static str, String)]) -> EtlResult<String> {
        debug!(url = %self.base_url, ?query, "Requesting OAI-PMH page");

        let response = self
            .client
            .get(&self.base_url)
            .query(query)
            .send()
            .await
            .map_err(|e| EtlError::Network(format!("request to {} failed: {e}", self.base_url)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EtlError::Network(format!(
                "{} answered HTTP {}",
                self.base_url, status
            )));
        }

        response
            .text()
            .await
            .map_err(|e| EtlError::Network(format!("failed to read response body: {e}")))
    }

    /// Fetch and parse one ListRecords page
    pub async fn list_records(&self, request: &ListRecordsRequest) -> EtlResult<ListRecordsPage> {
        let body = self.fetch(&request.query()).await?;
        let page = parse_list_records(&body)?;

        debug!(
            records = page.records.len(),
            has_more = !page.is_complete(),
            "Parsed ListRecords page"
        );
        Ok(page)
    }

    /// All set specs the endpoint offers, following resumption tokens
    pub async fn list_sets(&self) -> EtlResult<Vec<String>> {
        let mut set_specs = Vec::new();
        let mut query = vec![("verb", "ListSets".to_string())];

        loop {
            let page = parse_list_sets(&self.fetch(&query).await?)?;
            set_specs.extend(page.set_specs);

            match page.resumption_token {
                Some(token) => {
                    tokio::time::sleep(self.request_delay).await;
                    query = vec![
                        ("verb", "ListSets".to_string()),
                        ("resumptionToken", token),
                    ];
                },
                None => break,
            }
        }

        info!(sets = set_specs.len(), "Listed sets");
        Ok(set_specs)
    }
}
