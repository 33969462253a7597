//! arXiv Ingest Library
//!
//! Incremental harvesting of arXiv metadata over OAI-PMH into Postgres.
//!
//! # Stages
//!
//! - **Harvest**: fetch one day of `ListRecords` pages, normalize each page
//!   and stage it to the bucket as JSON
//! - **Load**: apply staged update files, then staged deletion files, and
//!   archive each file once its rows are committed
//!
//! Both stages run under an advisory lock object, and harvesting progress is
//! kept in a checkpoint object holding the last completed day.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use arxiv_ingest::config::Config;
//! use arxiv_ingest::harvest::{Checkpoint, Harvester};
//! use arxiv_ingest::storage::{ObjectStore, Storage};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let store: Arc<dyn ObjectStore> = Arc::new(Storage::new(config.storage.clone()).await?);
//!     let checkpoint = Checkpoint::new(store.clone(), "last_batch_date.txt", None);
//!     let harvester = Harvester::new(&config.oai, store, checkpoint)?;
//!
//!     let today = chrono::Utc::now().date_naive();
//!     harvester.run(today, Some(1)).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod db;
pub mod harvest;
pub mod load;
pub mod lock;
pub mod names;
pub mod normalize;
pub mod oai;
pub mod pipeline;
pub mod staging;
pub mod storage;
