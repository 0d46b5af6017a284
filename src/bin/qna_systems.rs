//! QnA system discovery.
//!
//! Usage:
//!   qna-systems list                 # All QnA systems on the service
//!   qna-systems details <system-id>  # One system's configuration
//!   qna-systems providers <system-id> # LLM providers usable by a system
//!
//! The ids printed here go into the `pipelines` section of the config file.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rag_bench::{client::QnaClient, config::Config, logging};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "qna-systems")]
#[command(about = "Look up QnA system and LLM provider ids", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ~/.config/rag-bench/config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List QnA systems
    List,

    /// Show one QnA system
    Details {
        /// QnA system id
        system_id: String,
    },

    /// List LLM providers of one QnA system
    Providers {
        /// QnA system id
        system_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let _guard = logging::init(0, None);

    let config = Config::load_from(cli.config.as_deref()).context("Failed to load configuration")?;
    config.validate_service().context("Invalid configuration")?;

    let client = QnaClient::new(config.service)?;

    let value = match &cli.command {
        Commands::List => client.list_systems().await.context("No QnA systems found")?,
        Commands::Details { system_id } => client
            .system_details(system_id)
            .await
            .with_context(|| format!("No details for QnA system {}", system_id))?,
        Commands::Providers { system_id } => client
            .llm_providers(system_id)
            .await
            .with_context(|| format!("No LLM providers for QnA system {}", system_id))?,
    };

    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
