//! damwatch binary.
//!
//! Reads `damwatch.toml` (or the path given with `--config`) plus any
//! `DAMWATCH_*` environment overrides, opens the SQLite store and runs one
//! job.
//!
//! ```text
//! damwatch dams add 203042 "Toonumbar Dam"
//! damwatch run
//! damwatch verify --limit 5
//! ```

use std::{path::PathBuf, process::ExitCode};

use anyhow::Context as _;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use damwatch::{
  AnalysisSource, FsBlobStore, JobReport, Pipeline, PipelineConfig, Verification,
};
use damwatch_core::resource::Dam;
use damwatch_fetch::{Collector, Fetcher, WaterInsightsClient};
use damwatch_store_sqlite::SqliteStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Dam storage telemetry pipeline")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "damwatch.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Fetch every registered dam and stage the batch.
  Collect,
  /// Apply the staged batch to `latest_data` and `dam_resources`.
  Load,
  /// Write windowed averages to the analysis tables.
  Analyze {
    #[arg(long, value_enum, default_value_t = Source::History)]
    source: Source,
    /// Evaluation date (YYYY-MM-DD). Defaults to today (UTC).
    #[arg(long)]
    as_of:  Option<NaiveDate>,
  },
  /// Collect, load and analyze in sequence.
  Run {
    #[arg(long)]
    as_of: Option<NaiveDate>,
  },
  /// Manage the dam registry.
  Dams {
    #[command(subcommand)]
    action: DamsCommand,
  },
  /// Print the most recent snapshot and history rows.
  Verify {
    #[arg(long, default_value_t = 10)]
    limit: usize,
  },
}

#[derive(Subcommand)]
enum DamsCommand {
  List,
  Add { dam_id: String, dam_name: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum Source {
  History,
  Staging,
}

impl From<Source> for AnalysisSource {
  fn from(source: Source) -> Self {
    match source {
      Source::History => AnalysisSource::History,
      Source::Staging => AnalysisSource::Staging,
    }
  }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let config = PipelineConfig::load(&cli.config)
    .with_context(|| format!("failed to load configuration from {:?}", cli.config))?;
  config.validate()?;
  let collecting = matches!(cli.command, Command::Collect | Command::Run { .. });
  if collecting {
    config.validate_for_collect()?;
  }

  let store = SqliteStore::open(&config.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", config.store_path))?;
  let pipeline = Pipeline::new(
    store,
    FsBlobStore::new(&config.staging.dir),
    config.staging.key.clone(),
  )
  .with_job_timeout(config.job_timeout())
  .with_analysis_dams(config.analysis.dam_ids.clone());

  let today = Utc::now().date_naive();

  let reports = match cli.command {
    Command::Collect => vec![pipeline.collect(&collector(&config).await?).await],
    Command::Load => vec![pipeline.load().await],
    Command::Analyze { source, as_of } => {
      vec![pipeline.analyze(source.into(), as_of.unwrap_or(today)).await]
    }
    Command::Run { as_of } => {
      pipeline
        .run_all(&collector(&config).await?, as_of.unwrap_or(today))
        .await
    }
    Command::Dams { action: DamsCommand::List } => {
      let dams = pipeline.list_dams().await.context("failed to list dams")?;
      if dams.is_empty() {
        println!("no dams registered");
      }
      for dam in dams {
        println!("{}\t{}", dam.dam_id, dam.dam_name);
      }
      return Ok(ExitCode::SUCCESS);
    }
    Command::Dams { action: DamsCommand::Add { dam_id, dam_name } } => {
      pipeline
        .add_dam(Dam { dam_id, dam_name })
        .await
        .context("failed to register dam")?;
      return Ok(ExitCode::SUCCESS);
    }
    Command::Verify { limit } => {
      let verification = pipeline.verify(limit).await.context("failed to read tables")?;
      print_verification(&verification);
      return Ok(ExitCode::SUCCESS);
    }
  };

  Ok(exit_code(&reports))
}

/// Build the upstream client and the collector around it.
async fn collector(config: &PipelineConfig) -> anyhow::Result<Collector<WaterInsightsClient>> {
  let client = WaterInsightsClient::connect(&config.api)
    .await
    .context("failed to connect to the WaterInsights API")?;
  Ok(Collector::new(
    Fetcher::new(client, config.retry.clone()),
    config.collect.concurrency,
  ))
}

fn exit_code(reports: &[JobReport]) -> ExitCode {
  for report in reports {
    println!("{report}");
  }
  if reports.iter().any(JobReport::is_failure) {
    ExitCode::FAILURE
  } else {
    ExitCode::SUCCESS
  }
}

fn print_verification(v: &Verification) {
  let metric = |m: Option<f64>| m.map_or_else(|| "-".to_owned(), |x| x.to_string());

  println!("latest_data ({} rows)", v.snapshot.len());
  for row in &v.snapshot {
    let r = &row.record;
    println!(
      "  {}\t{}\t{}\tvolume={} full={} inflow={} release={}",
      r.date,
      r.dam_id,
      row.dam_name,
      metric(r.storage_volume),
      metric(r.percentage_full),
      metric(r.storage_inflow),
      metric(r.storage_release),
    );
  }

  println!("dam_resources ({} rows)", v.history.len());
  for r in &v.history {
    println!(
      "  {}\t{}\tvolume={} full={} inflow={} release={}",
      r.date,
      r.dam_id,
      metric(r.storage_volume),
      metric(r.percentage_full),
      metric(r.storage_inflow),
      metric(r.storage_release),
    );
  }
}
