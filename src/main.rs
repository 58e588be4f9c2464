use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use tracing::{error, info, Instrument};
use uuid::Uuid;

mod config;
mod db;
mod error;
mod fetch;
mod literal;
mod logging;
mod mirror;
mod models;
mod normalize;
mod notify;
mod passback;
mod persist;
mod pipeline;
mod report;
mod store;

use config::{DbConfig, LogConfig, RunConfig};
use db::PgStore;

#[derive(Parser)]
#[command(name = "attempt-stats-etl")]
#[command(about = "Daily ETL for learning-activity attempt statistics", long_about = None)]
struct Cli {
    #[command(flatten)]
    db: DbConfig,

    #[command(flatten)]
    log: LogConfig,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Fetch, load, mirror and report once
    Run(RunConfig),
    /// Print the daily aggregate without changing anything
    Report {
        /// Report date, defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = logging::init_logging(&cli.log)?;
    std::panic::set_hook(Box::new(|panic| {
        error!(%panic, "unhandled panic");
    }));

    let store = PgStore::connect_lazy(&cli.db.database_url)?;
    let result = match cli.command {
        Commands::InitDb => store.init_db().await.map(|()| {
            println!("Schema ready.");
        }),
        Commands::Run(config) => {
            let span = tracing::info_span!("run", run_id = %Uuid::new_v4());
            async {
                info!("run started");
                if !pipeline::run_guarded(&config, &store).await {
                    error!("run ended early");
                }
                info!("run finished");
            }
            .instrument(span)
            .await;
            Ok(())
        }
        Commands::Report { date, json } => {
            let date = date.unwrap_or_else(|| Local::now().date_naive());
            print_report(&store, date, json).await
        }
    };

    store.close().await;
    result
}

async fn print_report(store: &PgStore, date: NaiveDate, json: bool) -> anyhow::Result<()> {
    let report = report::aggregate_on(store, date)
        .await
        .context("failed to compute the daily report")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report::render_text(&report));
    }
    Ok(())
}
