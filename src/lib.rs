//! RAG Bench - compare RAG question-answering pipelines on a golden dataset.
//!
//! Every question of the dataset is put to each configured pipeline through
//! the QnA service. The answer and the retrieved passages are scored against
//! the golden answer and context, and the scores are collected per pipeline
//! for a side-by-side comparison table.
//!
//! # Quick Start
//!
//! ```no_run
//! use rag_bench::{
//!     config::Config,
//!     dataset::Dataset,
//!     client::QnaClient,
//!     runner::BenchmarkRunner,
//!     report::{create_run_dir, format_table, write_report},
//! };
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Load configuration (service credentials, pipelines, routing)
//!     let config = Config::load()?;
//!     config.validate()?;
//!
//!     // Create the QnA client and the runner
//!     let client = QnaClient::new(config.service.clone())?;
//!     let runner = BenchmarkRunner::from_config(client, &config)?;
//!
//!     // Load the golden dataset and run
//!     let dataset = Dataset::load(Path::new("data/legalbench_qa_data.csv"))?;
//!     let result = runner.run(&dataset).await?;
//!
//!     // Persist and print
//!     let dir = create_run_dir(Path::new("benchmark_results"), result.started_at, "DTWZ")?;
//!     write_report(&result, &dir)?;
//!     println!("{}", format_table(&result));
//!
//!     // Fail if a pipeline never answered
//!     result.verify()?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Dataset**: ordered golden rows loaded from CSV or JSON
//! - **PipelineClient**: capability to ask a pipeline a question; `QnaClient` is the HTTP one
//! - **Evaluator**: pure, deterministic answer and retrieval metrics
//! - **BenchmarkRunner**: routes rows to pipelines, isolates failures, keeps row order
//! - **Report**: comparison table, CSV and JSON files per run

pub mod client;
pub mod config;
pub mod dataset;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod report;
pub mod runner;

// Re-export commonly used types
pub use client::{PipelineClient, PipelineResponse, QnaClient};
pub use config::{Config, PipelineSpec, RoutingPolicy};
pub use dataset::{Dataset, GoldenRow};
pub use error::{BenchError, Result};
pub use metrics::{AnswerSimilarity, Evaluator, Scores};
pub use runner::{BenchmarkResult, BenchmarkRunner, MetricRecord, RecordStatus};
