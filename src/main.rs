//! RAG Bench CLI
//!
//! Runs the golden dataset against every configured QnA pipeline and writes
//! the comparison report.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use rag_bench::{
    client::QnaClient,
    config::Config,
    dataset::{Dataset, create_sample_dataset},
    logging,
    report::{RESULTS_JSON, create_run_dir, format_table, load_results_json, write_report},
    runner::BenchmarkRunner,
};
use std::path::PathBuf;
use tracing::info;

/// RAG Bench - compare RAG pipelines against a golden dataset
#[derive(Parser)]
#[command(name = "rag-bench")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Options shared by the commands that run a benchmark.
#[derive(clap::Args)]
struct RunArgs {
    /// Config file (defaults to ~/.config/rag-bench/config.yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Only evaluate the first N rows
    #[arg(long)]
    limit: Option<usize>,

    /// Pairs in flight at once
    #[arg(long)]
    concurrency: Option<usize>,

    /// Directory receiving the timestamped run directory
    #[arg(short, long, default_value = "benchmark_results")]
    output_dir: PathBuf,

    /// Suffix of the run directory name
    #[arg(long, default_value = "DTWZ")]
    label: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Benchmark the configured pipelines on a dataset
    Run {
        /// Golden dataset (CSV with question, gt_answer, gt-context, source; or JSON)
        dataset: PathBuf,

        #[command(flatten)]
        args: RunArgs,
    },

    /// Benchmark on the built-in sample dataset (for smoke runs)
    Sample {
        #[command(flatten)]
        args: RunArgs,
    },

    /// Validate the configuration and show how a dataset would be routed
    Check {
        /// Config file (defaults to ~/.config/rag-bench/config.yaml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Dataset to route
        #[arg(short, long)]
        dataset: Option<PathBuf>,
    },

    /// Print the comparison table of a finished run
    Show {
        /// Run directory or its results.json
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { dataset, args } => {
            let dataset = Dataset::load(&dataset)
                .with_context(|| format!("Failed to load dataset {}", dataset.display()))?;
            cmd_run(dataset, args, cli.verbose).await
        }
        Commands::Sample { args } => cmd_run(create_sample_dataset(), args, cli.verbose).await,
        Commands::Check { config, dataset } => cmd_check(config, dataset, cli.verbose),
        Commands::Show { path } => cmd_show(path),
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    Config::load_from(path.map(|p| p.as_path())).context("Failed to load configuration")
}

async fn cmd_run(dataset: Dataset, args: RunArgs, verbose: u8) -> Result<()> {
    let mut config = load_config(args.config.as_ref())?;
    if let Some(limit) = args.limit {
        config.run.limit = Some(limit);
    }
    if let Some(concurrency) = args.concurrency {
        config.run.concurrency = concurrency;
    }
    config.validate().context("Invalid configuration")?;

    let started = Utc::now();
    let run_dir = create_run_dir(&args.output_dir, started, &args.label)
        .context("Failed to create run directory")?;
    let _guard = logging::init(verbose, Some(&run_dir));

    info!(
        service = %config.service.service_url,
        dataset = %dataset.name,
        rows = dataset.len(),
        run_dir = %run_dir.display(),
        "loaded configuration"
    );

    let client = QnaClient::new(config.service.clone())?;
    let runner = BenchmarkRunner::from_config(client, &config)?;

    let result = runner.run(&dataset).await?;

    write_report(&result, &run_dir).context("Failed to write report")?;
    println!("{}", format_table(&result));
    println!("Results saved to {}", run_dir.display());

    // Reported above; still an error for the operator.
    result.verify()?;

    Ok(())
}

fn cmd_check(config_path: Option<PathBuf>, dataset_path: Option<PathBuf>, verbose: u8) -> Result<()> {
    let _guard = logging::init(verbose, None);

    let config = load_config(config_path.as_ref())?;
    config.validate().context("Invalid configuration")?;

    let pipelines = config.resolved_pipelines()?;
    let routing = config.routing();

    println!("Service: {}", config.service.service_url);
    println!("Pipelines:");
    for p in &pipelines {
        println!(
            "  {:<32} system {}  provider {}",
            p.name, p.pipeline_id, p.llm_provider_id
        );
    }

    if let Some(path) = dataset_path {
        let dataset = Dataset::load(&path)
            .with_context(|| format!("Failed to load dataset {}", path.display()))?;
        println!("\nDataset: {} ({} rows)", dataset.name, dataset.len());
        for source in dataset.sources() {
            let rows = dataset.rows.iter().filter(|r| r.source == source).count();
            let routed: Vec<&str> = routing
                .route(source, &pipelines)
                .into_iter()
                .map(|p| p.name.as_str())
                .collect();
            println!(
                "  {:<20} {:>5} rows -> {}",
                if source.is_empty() { "(none)" } else { source },
                rows,
                if routed.is_empty() {
                    "(not routed)".to_string()
                } else {
                    routed.join(", ")
                }
            );
        }
    }

    Ok(())
}

fn cmd_show(path: PathBuf) -> Result<()> {
    let file = if path.is_dir() {
        path.join(RESULTS_JSON)
    } else {
        path
    };
    let result = load_results_json(&file)
        .with_context(|| format!("Failed to read results from {}", file.display()))?;
    println!("{}", format_table(&result));
    Ok(())
}
