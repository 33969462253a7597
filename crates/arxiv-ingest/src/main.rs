//! arXiv Ingest - OAI-PMH harvester and Postgres loader

use std::sync::Arc;

use anyhow::{Context, Result};
use arxiv_common::logging::{init_logging, LogConfig, LogLevel};
use arxiv_ingest::config::Config;
use arxiv_ingest::db;
use arxiv_ingest::harvest::{Checkpoint, Harvester};
use arxiv_ingest::load::{Loader, PgArticleRepository};
use arxiv_ingest::lock::RunLock;
use arxiv_ingest::oai::OaiClient;
use arxiv_ingest::pipeline::{self, Pipeline, RunMode, RunOptions};
use arxiv_ingest::storage::{ObjectStore, Storage};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "arxiv-ingest")]
#[command(author, version, about = "arXiv OAI-PMH harvester and loader")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Harvest every pending day, then load the staged files
    Run {
        /// Harvest at most this many days
        #[arg(long)]
        max_days: Option<u32>,
    },

    /// Harvest and stage without loading
    Harvest {
        /// Harvest only this day (YYYY-MM-DD); the checkpoint is not moved
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Harvest at most this many days
        #[arg(long)]
        max_days: Option<u32>,
    },

    /// Apply staged files to the database
    Load,

    /// Create or upgrade the database schema
    InitDb,

    /// Recompute first and middle names of stored authors
    BackfillNames,

    /// List the sets offered by the OAI-PMH endpoint
    ListSets,

    /// Show checkpoint, lock and staged backlog
    Status,

    /// Remove a stale run lock
    Unlock,
}

struct App {
    config: Config,
    store: Arc<dyn ObjectStore>,
}

impl App {
    async fn new(config: Config) -> Result<Self> {
        let store: Arc<dyn ObjectStore> = Arc::new(
            Storage::new(config.storage.clone())
                .await
                .context("Failed to initialize object storage")?,
        );
        Ok(Self { config, store })
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint::new(
            self.store.clone(),
            self.config.pipeline.checkpoint_key.clone(),
            self.config.pipeline.initial_checkpoint,
        )
    }

    fn lock(&self) -> RunLock {
        RunLock::new(self.store.clone(), self.config.pipeline.lock_key.clone())
    }

    fn harvester(&self) -> Result<Harvester> {
        Ok(Harvester::new(
            &self.config.oai,
            self.store.clone(),
            self.checkpoint(),
        )?)
    }

    async fn repository(&self) -> Result<PgArticleRepository> {
        let pool = db::create_pool(&self.config.database)
            .await
            .context("Failed to connect to the database")?;
        Ok(PgArticleRepository::new(pool))
    }

    async fn loader(&self) -> Result<Loader> {
        let repository = Arc::new(self.repository().await?);
        Ok(Loader::new(self.store.clone(), repository))
    }

    async fn run(&self, mode: RunMode, options: RunOptions) -> Result<()> {
        let mut pipeline = Pipeline::new(self.lock());
        if mode.harvests() {
            pipeline = pipeline.with_harvester(self.harvester()?);
        }
        if mode.loads() {
            pipeline = pipeline.with_loader(self.loader().await?);
        }

        let report = pipeline.run(mode, options).await?;
        info!(report = %serde_json::to_string(&report)?, "Run report");
        Ok(())
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env()?;
    if cli.verbose {
        log_config.level = LogLevel::Debug;
    }
    init_logging(&log_config)?;

    let config = Config::load()?;
    config.validate()?;

    match cli.command {
        Command::Run { max_days } => {
            let app = App::new(config).await?;
            let options = RunOptions {
                max_days: max_days.or(app.config.pipeline.max_days),
                ..RunOptions::until(today())
            };
            app.run(RunMode::Full, options).await?;
        },
        Command::Harvest { date, max_days } => {
            let app = App::new(config).await?;
            let options = RunOptions {
                today: today(),
                max_days: max_days.or(app.config.pipeline.max_days),
                date,
            };
            app.run(RunMode::Harvest, options).await?;
        },
        Command::Load => {
            let app = App::new(config).await?;
            app.run(RunMode::Load, RunOptions::until(today())).await?;
        },
        Command::InitDb => {
            let pool = db::create_pool(&config.database).await?;
            db::run_migrations(&pool).await?;
            db::health_check(&pool).await?;
            info!("Database schema is up to date");
        },
        Command::BackfillNames => {
            let pool = db::create_pool(&config.database).await?;
            let updated = PgArticleRepository::new(pool).backfill_name_parts().await?;
            info!(updated, "Backfill complete");
        },
        Command::ListSets => {
            let client = OaiClient::new(&config.oai)?;
            for set_spec in client.list_sets().await? {
                println!("{set_spec}");
            }
        },
        Command::Status => {
            let app = App::new(config).await?;
            let status = pipeline::status(app.store.clone(), &app.checkpoint(), &app.lock()).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        },
        Command::Unlock => {
            let app = App::new(config).await?;
            let lock = app.lock();
            if lock.is_held().await? {
                lock.release().await?;
            } else {
                info!(key = %lock.key(), "Run lock was not held");
            }
        },
    }

    Ok(())
}
