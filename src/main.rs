use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, ContentArrangement, Table};
use log::{debug, error};
use statcollect::{
    collect_source, runs_remaining, CollectorError, Config, DataSource, RunConfig, RunSummary,
    Store,
};
use std::path::PathBuf;

const DEFAULT_LOGGING_LEVEL: &str = "info";

/// Incrementally collect weather, air quality and economic statistics into SQLite.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Configuration file (defaults to <config dir>/statcollect/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database file, overriding the configured path
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Collect current weather for the configured cities
    Weather(RunArgs),
    /// Collect latest pollutant readings from monitoring stations
    AirQuality(RunArgs),
    /// Collect yearly economic indicators
    Economic(RunArgs),
    /// Run every source in turn, each with its own budget
    All(RunArgs),
    /// Show progress towards each source's target
    Status,
    /// Print per-country averages joined across all sources
    Summary {
        /// Include synthetic placeholder rows in the averages
        #[arg(long)]
        include_synthetic: bool,
    },
    /// Delete every stored row of one source
    Reset {
        #[arg(value_enum)]
        source: SourceArg,
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

/// Overrides for the configured run limits.
#[derive(Args, Debug)]
struct RunArgs {
    /// Maximum number of new rows this run may add
    #[arg(long)]
    per_run_cap: Option<usize>,

    /// Total rows after which collection is complete
    #[arg(long)]
    target_total: Option<usize>,

    /// Store labelled placeholder rows when a source has no data
    #[arg(long)]
    allow_synthetic_fill: bool,
}

impl RunArgs {
    fn apply(&self, run: &mut RunConfig) {
        if let Some(cap) = self.per_run_cap {
            run.per_run_cap = cap.max(1);
        }
        if let Some(target) = self.target_total {
            run.target_total = target;
        }
        if self.allow_synthetic_fill {
            run.allow_synthetic_fill = true;
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SourceArg {
    Weather,
    AirQuality,
    Economic,
}

impl From<SourceArg> for DataSource {
    fn from(value: SourceArg) -> Self {
        match value {
            SourceArg::Weather => DataSource::Weather,
            SourceArg::AirQuality => DataSource::AirQuality,
            SourceArg::Economic => DataSource::Economic,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", DEFAULT_LOGGING_LEVEL);
    }
    pretty_env_logger::init_timed();

    let args = Cli::parse();
    debug!("args: {args:?}");
    let mut config =
        Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(database) = args.database {
        config.database_path = database;
    }

    match args.command {
        Command::Weather(run) => {
            run.apply(&mut config.weather.run);
            collect(&config, &[DataSource::Weather]).await
        }
        Command::AirQuality(run) => {
            run.apply(&mut config.air_quality.run);
            collect(&config, &[DataSource::AirQuality]).await
        }
        Command::Economic(run) => {
            run.apply(&mut config.economic.run);
            collect(&config, &[DataSource::Economic]).await
        }
        Command::All(run) => {
            run.apply(&mut config.weather.run);
            run.apply(&mut config.air_quality.run);
            run.apply(&mut config.economic.run);
            collect(&config, &DataSource::ALL).await
        }
        Command::Status => status(&config),
        Command::Summary { include_synthetic } => summary(&config, include_synthetic),
        Command::Reset { source, yes } => reset(&config, source.into(), yes),
    }
}

fn open_store(config: &Config) -> Result<Store> {
    let mut store = Store::open(&config.database_path).with_context(|| {
        format!("Failed to open database {}", config.database_path.display())
    })?;
    store
        .ensure_schema(&config.countries)
        .context("Failed to prepare database schema")?;
    Ok(store)
}

fn open_existing_store(config: &Config) -> Result<Store> {
    if !config.database_path.exists() {
        bail!(
            "Database {} does not exist yet; run a collection first",
            config.database_path.display()
        );
    }
    Store::open_read_only(&config.database_path)
        .with_context(|| format!("Failed to open database {}", config.database_path.display()))
}

async fn collect(config: &Config, sources: &[DataSource]) -> Result<()> {
    let store = open_store(config)?;
    let mut summaries: Vec<RunSummary> = Vec::new();
    for &source in sources {
        match collect_source(config, &store, source).await {
            Ok(summary) => summaries.push(summary),
            Err(e @ CollectorError::Store(_)) => {
                return Err(e).with_context(|| format!("Collecting {source} failed"));
            }
            Err(e) => error!("Skipping {source}: {e}"),
        }
    }
    for summary in summaries {
        println!("{summary}");
    }
    Ok(())
}

fn run_config(config: &Config, source: DataSource) -> &RunConfig {
    match source {
        DataSource::Weather => &config.weather.run,
        DataSource::AirQuality => &config.air_quality.run,
        DataSource::Economic => &config.economic.run,
    }
}

fn status(config: &Config) -> Result<()> {
    let store = open_existing_store(config)?;
    let counts = store
        .source_counts()
        .context("Failed to count stored rows")?;

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            ["Source", "Real", "Synthetic", "Target", "Runs remaining"]
                .into_iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold)),
        );
    for count in counts {
        let run = run_config(config, count.source);
        table.add_row(vec![
            Cell::new(count.source),
            Cell::new(count.real).set_alignment(CellAlignment::Right),
            Cell::new(count.synthetic).set_alignment(CellAlignment::Right),
            Cell::new(run.target_total).set_alignment(CellAlignment::Right),
            Cell::new(runs_remaining(count.total(), run.target_total, run.per_run_cap))
                .set_alignment(CellAlignment::Right),
        ]);
    }
    println!("{table}");
    Ok(())
}

fn summary(config: &Config, include_synthetic: bool) -> Result<()> {
    let store = open_existing_store(config)?;
    let rows = store
        .country_summary(include_synthetic)
        .context("Failed to query country summary")?;
    if rows.is_empty() {
        println!("No country has data from every source yet.");
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            ["Country", "Code", "Avg temp (°C)", "Avg PM2.5", "Avg GDP per capita"]
                .into_iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold)),
        );
    for row in rows {
        table.add_row(vec![
            Cell::new(row.country_name),
            Cell::new(row.country_code),
            Cell::new(format!("{:.1}", row.avg_temperature)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.1}", row.avg_pm25)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.0}", row.avg_indicator_value))
                .set_alignment(CellAlignment::Right),
        ]);
    }
    println!("{table}");
    Ok(())
}

fn reset(config: &Config, source: DataSource, confirmed: bool) -> Result<()> {
    if !confirmed {
        bail!("Refusing to delete all {source} rows; run again with --yes to confirm");
    }
    let store = open_store(config)?;
    let removed = store
        .reset(source)
        .with_context(|| format!("Failed to reset {source}"))?;
    println!("Deleted {removed} {source} rows");
    Ok(())
}
