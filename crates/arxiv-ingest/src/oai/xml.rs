//! XML document to nested key/value tree
//!
//! OAI-PMH responses are converted into a `serde_json::Value` so that the
//! interesting parts can be deserialized with serde:
//!
//! - child elements become object keys, namespace prefixes dropped
//! - repeated sibling names become arrays, a single child stays a bare value
//! - text-only elements become strings, empty elements become `null`
//! - attributes become `@name` keys (namespace declarations are skipped)
//! - text next to child elements or attributes is kept under `#text`

use arxiv_common::EtlError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Value};
use thiserror::Error;

pub const TEXT_KEY: &str = "#text";

#[derive(Error, Debug)]
pub enum XmlError {
    #[error("XML syntax error: {0}")]
    Syntax(#[from] quick_xml::Error),

    #[error("Unexpected closing tag </{0}>")]
    UnbalancedEnd(String),

    #[error("Document ended inside <{0}>")]
    UnexpectedEof(String),

    #[error("Document has no root element")]
    Empty,
}

impl From<XmlError> for EtlError {
    fn from(err: XmlError) -> Self {
        EtlError::MalformedResponse(err.to_string())
    }
}

struct Frame {
    name: String,
    children: Map<String, Value>,
    text: String,
}

impl Frame {
    fn open(start: &BytesStart<'_>) -> Result<Self, XmlError> {
        let mut children = Map::new();

        for attr in start.attributes() {
            let attr = attr.map_err(quick_xml::Error::from)?;
            if attr.key.as_namespace_binding().is_some() {
                continue;
            }
            let name = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            children.insert(format!("@{name}"), Value::String(value));
        }

        Ok(Self {
            name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
            children,
            text: String::new(),
        })
    }

    fn close(self) -> (String, Value) {
        let value = if self.children.is_empty() {
            if self.text.is_empty() {
                Value::Null
            } else {
                Value::String(self.text)
            }
        } else {
            let mut children = self.children;
            if !self.text.is_empty() {
                children.insert(TEXT_KEY.to_string(), Value::String(self.text));
            }
            Value::Object(children)
        };
        (self.name, value)
    }

    fn add_child(&mut self, name: String, value: Value) {
        match self.children.get_mut(&name) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            },
            None => {
                self.children.insert(name, value);
            },
        }
    }
}

/// Convert an XML document into a nested value rooted at its document element.
pub fn to_value(xml: &str) -> Result<Value, XmlError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut document = Map::new();
    let mut stack: Vec<Frame> = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(start) => stack.push(Frame::open(&start)?),
            Event::Empty(start) => {
                let (name, value) = Frame::open(&start)?.close();
                match stack.last_mut() {
                    Some(parent) => parent.add_child(name, value),
                    None => {
                        document.insert(name, value);
                    },
                }
            },
            Event::End(end) => {
                let frame = stack.pop().ok_or_else(|| {
                    XmlError::UnbalancedEnd(
                        String::from_utf8_lossy(end.local_name().as_ref()).into_owned(),
                    )
                })?;
                let (name, value) = frame.close();
                match stack.last_mut() {
                    Some(parent) => parent.add_child(name, value),
                    None => {
                        document.insert(name, value);
                    },
                }
            },
            Event::Text(text) => {
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&text.unescape()?);
                }
            },
            Event::CData(data) => {
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            },
            Event::Eof => break,
            _ => {},
        }
    }

    if let Some(open) = stack.pop() {
        return Err(XmlError::UnexpectedEof(open.name));
    }
    if document.is_empty() {
        return Err(XmlError::Empty);
    }

    Ok(Value::Object(document))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_and_repeated_children() {
        let value = to_value(
            r#"<authors>
                 <author><keyname>Doe</keyname></author>
               </authors>"#,
        )
        .unwrap();
        assert_eq!(value, json!({"authors": {"author": {"keyname": "Doe"}}}));

        let value = to_value(
            r#"<authors>
                 <author><keyname>Doe</keyname></author>
                 <author><keyname>Roe</keyname></author>
               </authors>"#,
        )
        .unwrap();
        assert_eq!(
            value,
            json!({"authors": {"author": [{"keyname": "Doe"}, {"keyname": "Roe"}]}})
        );
    }

    #[test]
    fn test_attributes_and_text() {
        let value = to_value(
            r#"<OAI-PMH xmlns="http://www.openarchives.org/OAI/2.0/">
                 <error code="badArgument">Illegal date</error>
                 <resumptionToken cursor="0" completeListSize="3"/>
               </OAI-PMH>"#,
        )
        .unwrap();
        assert_eq!(
            value,
            json!({"OAI-PMH": {
                "error": {"@code": "badArgument", "#text": "Illegal date"},
                "resumptionToken": {"@cursor": "0", "@completeListSize": "3"}
            }})
        );
    }

    #[test]
    fn test_namespace_prefixes_are_dropped() {
        let value = to_value(
            r#"<oai:record xmlns:oai="urn:x" xmlns:xsi="urn:y" xsi:schemaLocation="loc">
                 <oai:id>0704.0001</oai:id>
                 <oai:comments/>
               </oai:record>"#,
        )
        .unwrap();
        assert_eq!(
            value,
            json!({"record": {"@schemaLocation": "loc", "id": "0704.0001", "comments": null}})
        );
    }

    #[test]
    fn test_entities_are_unescaped() {
        let value = to_value("<title>Q &amp; A &lt;b&gt;</title>").unwrap();
        assert_eq!(value, json!({"title": "Q & A <b>"}));
    }

    #[test]
    fn test_truncated_document_is_rejected() {
        assert!(to_value("<OAI-PMH><ListRecords>").is_err());
        assert!(matches!(to_value("   ").unwrap_err(), XmlError::Empty));
        assert!(to_value("<a></b>").is_err());
    }
}
