use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context;
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use console::style;
use epiflow::config::{DEFAULT_CONFIG_FILE, Settings, StorageSettings};
use epiflow::flow::{Countries, create_flow};
use epiflow::source::{DataSource, FileSource, HttpSource};
use epiflow::storage::{HttpStorage, LocalStorage, Storage};
use epiflow::{CheckpointCache, Engine, Mode, RunContext, TaskStatus};
use serde_json::Value;
use tracing::info;

/// Case report pipeline: download, filter, aggregate, upload.
#[derive(Parser, Debug)]
#[command(name = "epiflow", version)]
struct Cli {
    /// Settings file, used when it exists.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: Utf8PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the pipeline on this machine.
    Run(RunArgs),
    /// Print the task graph as a Mermaid diagram.
    Inspect,
    /// Manage stored checkpoints.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    /// Remove every checkpoint.
    Clear,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Country to keep. Repeat to keep several.
    #[arg(short, long = "country", value_name = "NAME")]
    country: Vec<String>,

    /// Bucket receiving the CSV.
    #[arg(short, long)]
    bucket: Option<String>,

    /// Run one task at a time.
    #[arg(long, conflicts_with = "workers")]
    sequential: bool,

    /// Worker threads for the parallel run.
    #[arg(short, long)]
    workers: Option<usize>,

    /// Read records from this file instead of downloading them.
    #[arg(long, value_name = "PATH")]
    source_file: Option<Utf8PathBuf>,

    /// Neither read nor write checkpoints.
    #[arg(long)]
    no_cache: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    epiflow::init_logging()?;

    let settings = Settings::load_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config))?;

    match cli.command {
        Command::Run(args) => run(settings, args),
        Command::Inspect => inspect(&settings),
        Command::Cache {
            action: CacheAction::Clear,
        } => clear(&settings),
    }
}

fn source(settings: &Settings) -> Arc<dyn DataSource> {
    match &settings.source_file {
        Some(path) => Arc::new(FileSource::new(path.clone())),
        None => Arc::new(HttpSource::new(&settings.source_url)),
    }
}

fn storage(settings: &Settings) -> Arc<dyn Storage> {
    match &settings.storage {
        StorageSettings::Local { root } => Arc::new(LocalStorage::new(root.clone())),
        StorageSettings::Http { endpoint } => Arc::new(HttpStorage::new(endpoint)),
    }
}

fn run(mut settings: Settings, args: RunArgs) -> anyhow::Result<()> {
    if let Some(path) = args.source_file {
        settings.source_file = Some(path);
    }

    let flow = create_flow(source(&settings), storage(&settings))?;

    let country = match args.country.as_slice() {
        [] => settings.country.clone(),
        [one] => Countries::One(one.clone()),
        many => Countries::Many(many.to_vec()),
    };
    let bucket = args.bucket.unwrap_or_else(|| settings.bucket.clone());

    let overrides = BTreeMap::from([
        ("country".to_string(), serde_json::to_value(&country)?),
        ("bucket".to_string(), Value::String(bucket)),
    ]);
    let params = flow.graph.resolve(&overrides)?;

    let mode = match (args.sequential, args.workers.or(settings.workers)) {
        (true, _) => Mode::Sequential,
        (false, Some(workers)) => Mode::Parallel { workers },
        (false, None) => Mode::default(),
    };

    let engine = if args.no_cache {
        Engine::new()
    } else {
        Engine::with_cache(CheckpointCache::on_disk(settings.cache_dir.clone()))
    };

    info!(?mode, countries = ?country.names(), "Starting pipeline");
    let outputs = engine.run(&flow.graph, &params, &RunContext::now(), mode)?;

    for (name, report) in outputs.reports() {
        let status = match report.status {
            TaskStatus::Computed => style("computed").green(),
            TaskStatus::Cached => style("cached").blue(),
        };
        eprintln!("{:>20} {:<10} {:.2?}", name, status, report.duration);
    }

    let cached = outputs
        .reports()
        .filter(|(_, report)| report.status == TaskStatus::Cached)
        .count();
    info!(tasks = outputs.len(), cached, "Pipeline finished");

    let payload = outputs
        .get(flow.upload)
        .context("the upload task produced no payload")?;

    println!(
        "{} {}/{}",
        style("Uploaded").green().bold(),
        payload.bucket,
        payload.object_name
    );

    Ok(())
}

fn inspect(settings: &Settings) -> anyhow::Result<()> {
    let flow = create_flow(source(settings), storage(settings))?;

    for (name, default) in flow.graph.params().defaults() {
        println!("%% {name} = {default}");
    }
    print!("{}", flow.graph);

    Ok(())
}

fn clear(settings: &Settings) -> anyhow::Result<()> {
    let removed = CheckpointCache::on_disk(settings.cache_dir.clone()).clear()?;
    info!(dir = %settings.cache_dir, removed, "Cleared checkpoints");

    println!(
        "{} {} checkpoint(s) from {}",
        style("Removed").yellow().bold(),
        removed,
        settings.cache_dir
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "epiflow", "run", "-c", "Germany", "-c", "Austria", "--workers", "3", "--no-cache",
        ])
        .unwrap();

        let Command::Run(args) = cli.command else {
            panic!("expected the run command");
        };
        assert_eq!(args.country, ["Germany", "Austria"]);
        assert_eq!(args.workers, Some(3));
        assert!(args.no_cache);
        assert_eq!(cli.config.as_str(), DEFAULT_CONFIG_FILE);
    }

    #[test]
    fn test_sequential_conflicts_with_workers() {
        assert!(Cli::try_parse_from(["epiflow", "run", "--sequential", "--workers", "2"]).is_err());
    }
}
