//! OAI-PMH protocol access
//!
//! [`client::OaiClient`] issues the requests, [`xml`] turns responses into a
//! nested tree, [`response`] reads pages and protocol errors out of it and
//! [`models`] gives typed access to the records.

pub mod client;
pub mod models;
pub mod response;
pub mod xml;

pub use client::{ListRecordsRequest, OaiClient};
pub use models::{OneOrMany, RawRecord, RecordHeader};
pub use response::{ListRecordsPage, ListSetsPage};
