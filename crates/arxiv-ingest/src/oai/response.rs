//! OAI-PMH response parsing

use super::models::{OneOrMany, RawRecord};
use super::xml::{to_value, TEXT_KEY};
use arxiv_common::{EtlError, EtlResult};
use serde_json::Value;
use tracing::warn;

/// Error code the protocol uses for an empty, but valid, result
pub const NO_RECORDS_MATCH: &str = "noRecordsMatch";

/// One page of a ListRecords response
#[derive(Debug, Clone, Default)]
pub struct ListRecordsPage {
    pub records: Vec<RawRecord>,
    pub resumption_token: Option<String>,
}

impl ListRecordsPage {
    pub fn is_complete(&self) -> bool {
        self.resumption_token.is_none()
    }
}

/// One page of a ListSets response
#[derive(Debug, Clone, Default)]
pub struct ListSetsPage {
    pub set_specs: Vec<String>,
    pub resumption_token: Option<String>,
}

/// Text content of a converted element, whether it carried attributes or not
pub fn text_of(value: &Value) -> Option<&str> {
    let text = match value {
        Value::String(s) => s.as_str(),
        Value::Object(map) => map.get(TEXT_KEY)?.as_str()?,
        _ => return None,
    };
    let text = text.trim();
    (!text.is_empty()).then_some(text)
}

/// Strip the envelope and surface protocol errors.
///
/// Returns `None` for `noRecordsMatch`, which is how the endpoint reports an
/// empty day.
fn verb_body<'a>(root: &'a Value, verb: &str) -> EtlResult<Option<&'a Value>> {
    let envelope = root
        .get("OAI-PMH")
        .ok_or_else(|| EtlError::MalformedResponse("missing OAI-PMH root element".to_string()))?;

    if let Some(error) = envelope.get("error") {
        let first = match error {
            Value::Array(errors) => errors.first(),
            other => Some(other),
        };
        let code = first
            .and_then(|e| e.get("@code"))
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();

        if code == NO_RECORDS_MATCH {
            return Ok(None);
        }

        return Err(EtlError::Protocol {
            code,
            message: first.and_then(text_of).unwrap_or_default().to_string(),
        });
    }

    envelope
        .get(verb)
        .map(Some)
        .ok_or_else(|| EtlError::MalformedResponse(format!("response has no {verb} element")))
}

fn resumption_token(body: &Value) -> Option<String> {
    body.get("resumptionToken")
        .and_then(text_of)
        .map(str::to_string)
}

/// Parse a ListRecords response body
pub fn parse_list_records(xml: &str) -> EtlResult<ListRecordsPage> {
    let root = to_value(xml)?;

    let Some(body) = verb_body(&root, "ListRecords")? else {
        return Ok(ListRecordsPage::default());
    };

    let raw = match body.get("record") {
        Some(Value::Null) | None => Vec::new(),
        Some(value) => serde_json::from_value::<OneOrMany<Value>>(value.clone())?.into_vec(),
    };

    let mut records = Vec::with_capacity(raw.len());
    for value in raw {
        match serde_json::from_value::<RawRecord>(value) {
            Ok(record) => records.push(record),
            Err(e) => warn!(error = %e, "Skipping record without a readable header"),
        }
    }

    Ok(ListRecordsPage {
        records,
        resumption_token: resumption_token(body),
    })
}

/// Parse a ListSets response body
pub fn parse_list_sets(xml: &str) -> EtlResult<ListSetsPage> {
    let root = to_value(xml)?;

    let Some(body) = verb_body(&root, "ListSets")? else {
        return Ok(ListSetsPage::default());
    };

    let sets = match body.get("set") {
        Some(Value::Null) | None => Vec::new(),
        Some(value) => serde_json::from_value::<OneOrMany<Value>>(value.clone())?.into_vec(),
    };

    let set_specs = sets
        .iter()
        .filter_map(|set| set.get("setSpec").and_then(text_of))
        .map(str::to_string)
        .collect();

    Ok(ListSetsPage {
        set_specs,
        resumption_token: resumption_token(body),
    })
}
