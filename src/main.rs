//! Health SQL CLI
//!
//! Command-line interface over a directory of health metric exports:
//! - Run SQL-subset queries
//! - Read raw records for a date range
//! - List metrics, files and the available date span

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use health_sql::config::{generate_default_config, Config, LoggingConfig};
use health_sql::query::{OutputFormat, QueryExecutor, QueryOptions, Row};
use health_sql::storage::{parse_timestamp, DateRange, TimeSeriesStore, Zone};

#[derive(Parser)]
#[command(name = "health-sql")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "SQL-subset queries over per-day health metric CSV exports")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search the standard locations)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the exports
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a query
    Query {
        /// Query text, e.g. "SELECT * FROM health_data LIMIT 10"
        sql: String,
        /// Range start (default: earliest data)
        #[arg(long)]
        start: Option<String>,
        /// Range end (default: latest data)
        #[arg(long)]
        end: Option<String>,
        /// Output format (json, csv, summary)
        #[arg(short, long)]
        format: Option<String>,
    },

    /// Print the records of a date range
    Range {
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
    },

    /// List all metric names
    Metrics,

    /// Show the span of available data
    Dates,

    /// Print the first non-null samples of a metric
    Sample {
        metric: String,
        /// Number of samples
        #[arg(short = 'n', long, default_value = "10")]
        count: usize,
    },

    /// List discovered export files
    Files,

    /// Print a default config file
    Config {
        /// Write to this path instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    if let Some(dir) = &cli.data_dir {
        config.storage.data_dir = Some(dir.to_string_lossy().into_owned());
    }

    init_logging(&config.logging);

    match cli.command {
        Commands::Query {
            sql,
            start,
            end,
            format,
        } => {
            let (store, zone) = open_store(&config)?;
            let format = match format {
                Some(f) => f.parse::<OutputFormat>()?,
                None => config.query.default_format,
            };
            let range = match (start, end) {
                (None, None) => None,
                (start, end) => Some(DateRange::new(
                    optional_time(start.as_deref(), &zone)?.unwrap_or(DateTime::<Utc>::MIN_UTC),
                    optional_time(end.as_deref(), &zone)?.unwrap_or_else(Utc::now),
                )),
            };

            let executor = QueryExecutor::new(store);
            let result = executor
                .execute_str(&sql, range, QueryOptions::new(format))
                .await?;

            match format {
                OutputFormat::Csv => print!("{}", result.to_csv_string()?),
                OutputFormat::Json | OutputFormat::Summary => print_json(&result)?,
            }
        }

        Commands::Range { start, end } => {
            let (store, zone) = open_store(&config)?;
            let range = DateRange::new(parse_time(&start, &zone)?, parse_time(&end, &zone)?);
            let records = store.get_data_in_range(&range).await?;

            let rows: Vec<_> = records.iter().map(|r| Row::from_record(r).values).collect();
            print_json(&rows)?;
        }

        Commands::Metrics => {
            let (store, _) = open_store(&config)?;
            print_json(&store.metric_names().await?)?;
        }

        Commands::Dates => {
            let (store, _) = open_store(&config)?;
            print_json(&store.date_summary().await?)?;
        }

        Commands::Sample { metric, count } => {
            let (store, _) = open_store(&config)?;
            print_json(&store.sample_metric(&metric, count).await?)?;
        }

        Commands::Files => {
            let (store, _) = open_store(&config)?;
            let files: Vec<_> = store
                .discover_files()?
                .into_iter()
                .map(|path| match store.file_date(&path) {
                    Ok(date) => json!({ "path": path, "date": date.to_string() }),
                    Err(e) => json!({ "path": path, "error": e.to_string() }),
                })
                .collect();
            print_json(&files)?;
        }

        Commands::Config { output } => {
            let content = generate_default_config();
            match output {
                Some(path) => {
                    std::fs::write(&path, content)
                        .with_context(|| format!("writing config to {}", path.display()))?;
                    eprintln!("Wrote default config to {}", path.display());
                }
                None => print!("{}", content),
            }
        }
    }

    Ok(())
}

fn open_store(config: &Config) -> anyhow::Result<(Arc<TimeSeriesStore>, Zone)> {
    let store_config = config.storage.store_config()?;
    tracing::debug!("Data directory: {:?}", store_config.data_dir);

    let zone = store_config.zone;
    Ok((Arc::new(TimeSeriesStore::new(store_config)?), zone))
}

/// Install the tracing subscriber; logs go to stderr, results to stdout
fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("health_sql={}", logging.level)));
    let registry = tracing_subscriber::registry().with(filter);

    if logging.format.eq_ignore_ascii_case("json") {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn parse_time(raw: &str, zone: &Zone) -> anyhow::Result<DateTime<Utc>> {
    parse_timestamp(raw, zone).with_context(|| format!("invalid time {:?}", raw))
}

fn optional_time(raw: Option<&str>, zone: &Zone) -> anyhow::Result<Option<DateTime<Utc>>> {
    raw.map(|r| parse_time(r, zone)).transpose()
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
