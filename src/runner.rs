//! Benchmark runner: drives every (row, pipeline) pair through the client and
//! the evaluator and collects one record per pair.
//!
//! A pair moves `Pending -> Called -> Scored` or ends in `Failed`. A failed
//! pair becomes a record with an error and no scores; the run carries on.

use crate::client::{PipelineClient, PipelineResponse};
use crate::config::{Config, PipelineSpec, RoutingPolicy, RunConfig};
use crate::dataset::{Dataset, GoldenRow};
use crate::error::{BenchError, Result};
use crate::metrics::{Evaluator, Scores};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Lifecycle of a single (row, pipeline) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairState {
    Pending,
    Called,
    Scored,
    Failed,
}

/// Final state recorded for a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Scored,
    Failed,
}

/// Outcome of one (row, pipeline) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricRecord {
    /// Position of the row in the dataset.
    pub row_index: usize,
    pub question: String,
    pub source: String,
    pub pipeline: String,
    pub status: RecordStatus,
    /// Pipeline answer, when the call succeeded.
    pub answer: Option<String>,
    /// Scores; `None` for failed pairs.
    pub scores: Option<Scores>,
    /// Wall time of the pipeline call.
    pub latency_ms: u64,
    pub error: Option<String>,
}

impl MetricRecord {
    pub fn is_scored(&self) -> bool {
        self.status == RecordStatus::Scored
    }
}

/// Records of one pipeline, in dataset row order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub name: String,
    pub records: Vec<MetricRecord>,
}

impl PipelineRun {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            records: Vec::new(),
        }
    }

    pub fn scored(&self) -> usize {
        self.records.iter().filter(|r| r.is_scored()).count()
    }

    pub fn failed(&self) -> usize {
        self.records.len() - self.scored()
    }

    /// At least one pair was attempted and none succeeded.
    pub fn all_failed(&self) -> bool {
        !self.records.is_empty() && self.scored() == 0
    }
}

/// Results of a complete run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub dataset_name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// One entry per configured pipeline, in configuration order.
    pub pipelines: Vec<PipelineRun>,
}

impl BenchmarkResult {
    /// Records of the named pipeline.
    pub fn records(&self, pipeline: &str) -> Option<&[MetricRecord]> {
        self.pipelines
            .iter()
            .find(|p| p.name == pipeline)
            .map(|p| p.records.as_slice())
    }

    /// Total number of records across pipelines.
    pub fn total_records(&self) -> usize {
        self.pipelines.iter().map(|p| p.records.len()).sum()
    }

    /// Pipelines whose every pair failed.
    pub fn all_failed_pipelines(&self) -> Vec<String> {
        self.pipelines
            .iter()
            .filter(|p| p.all_failed())
            .map(|p| p.name.clone())
            .collect()
    }

    /// Error out if any pipeline produced no scored record.
    ///
    /// Call after reporting so the other pipelines' results are kept.
    pub fn verify(&self) -> Result<()> {
        let pipelines = self.all_failed_pipelines();
        if pipelines.is_empty() {
            Ok(())
        } else {
            Err(BenchError::AllFailed { pipelines })
        }
    }
}

/// Enforces a minimum gap between the start of two calls.
struct Throttle {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl Throttle {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    async fn wait(&self) {
        if self.interval.is_zero() {
            return;
        }
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            tokio::time::sleep_until(prev + self.interval).await;
        }
        *last = Some(Instant::now());
    }
}

/// Benchmark runner.
pub struct BenchmarkRunner<C> {
    client: C,
    evaluator: Evaluator,
    pipelines: Vec<PipelineSpec>,
    routing: RoutingPolicy,
    concurrency: usize,
    throttle: Duration,
    call_timeout: Duration,
    limit: Option<usize>,
}

impl<C: PipelineClient> BenchmarkRunner<C> {
    /// Create a runner for a fixed set of pipelines.
    pub fn new(
        client: C,
        pipelines: Vec<PipelineSpec>,
        routing: RoutingPolicy,
        run: &RunConfig,
    ) -> Result<Self> {
        if pipelines.is_empty() {
            return Err(BenchError::Config("No pipelines to benchmark".to_string()));
        }

        let mut names = HashSet::new();
        for pipeline in &pipelines {
            if !names.insert(pipeline.name.as_str()) {
                return Err(BenchError::Config(format!(
                    "Duplicate pipeline name '{}'",
                    pipeline.name
                )));
            }
            if pipeline.pipeline_id.trim().is_empty() || pipeline.llm_provider_id.trim().is_empty() {
                return Err(BenchError::Config(format!(
                    "Pipeline '{}' needs both a pipeline_id and an llm_provider_id",
                    pipeline.name
                )));
            }
        }
        routing.validate(&pipelines)?;

        if run.concurrency == 0 {
            return Err(BenchError::Config("Concurrency must be at least 1".to_string()));
        }

        Ok(Self {
            client,
            evaluator: Evaluator::from_config(run),
            pipelines,
            routing,
            concurrency: run.concurrency,
            throttle: run.throttle(),
            call_timeout: run.call_timeout(),
            limit: run.limit,
        })
    }

    /// Create a runner from a validated application config.
    pub fn from_config(client: C, config: &Config) -> Result<Self> {
        Self::new(
            client,
            config.resolved_pipelines()?,
            config.routing(),
            &config.run,
        )
    }

    /// Replace the evaluator.
    pub fn with_evaluator(mut self, evaluator: Evaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Override the per-pair timeout.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Run the benchmark on a dataset.
    pub async fn run(&self, dataset: &Dataset) -> Result<BenchmarkResult> {
        let started_at = Utc::now();

        let limited;
        let dataset = match self.limit {
            Some(max) if max < dataset.len() => {
                limited = dataset.take(max);
                &limited
            }
            _ => dataset,
        };
        let rows = &dataset.rows;

        let mut pairs = Vec::new();
        for (row_index, row) in rows.iter().enumerate() {
            let slots = self.routing.route_slots(&row.source, &self.pipelines);
            if slots.is_empty() {
                warn!(row_index, source = %row.source, "row is not routed to any pipeline");
            }
            for slot in slots {
                pairs.push((row_index, row, slot));
            }
        }

        let total = pairs.len();
        info!(
            dataset = %dataset.name,
            rows = rows.len(),
            pipelines = self.pipelines.len(),
            pairs = total,
            concurrency = self.concurrency,
            "starting benchmark"
        );

        let throttle = Throttle::new(self.throttle);
        let throttle = &throttle;
        let mut done = 0usize;

        // `buffered` yields in submission order, so each pipeline's records
        // come out in row order whatever the call latencies.
        let finished: Vec<(usize, MetricRecord)> = stream::iter(pairs)
            .map(|(row_index, row, slot)| async move {
                throttle.wait().await;
                let record = self.process_pair(row_index, row, &self.pipelines[slot]).await;
                (slot, record)
            })
            .buffered(self.concurrency)
            .inspect(|(_, record)| {
                done += 1;
                info!(
                    done,
                    total,
                    pipeline = %record.pipeline,
                    row_index = record.row_index,
                    status = ?record.status,
                    latency_ms = record.latency_ms,
                    "pair finished"
                );
            })
            .collect()
            .await;

        let mut runs: Vec<PipelineRun> = self
            .pipelines
            .iter()
            .map(|p| PipelineRun::new(&p.name))
            .collect();
        for (slot, record) in finished {
            runs[slot].records.push(record);
        }

        let result = BenchmarkResult {
            dataset_name: dataset.name.clone(),
            started_at,
            finished_at: Utc::now(),
            pipelines: runs,
        };

        for run in &result.pipelines {
            if run.all_failed() {
                error!(pipeline = %run.name, pairs = run.records.len(), "every call for pipeline failed");
            } else {
                info!(
                    pipeline = %run.name,
                    scored = run.scored(),
                    failed = run.failed(),
                    "pipeline finished"
                );
            }
        }

        Ok(result)
    }

    /// Ask the pipeline, bounded by the call timeout.
    async fn call(&self, pipeline: &PipelineSpec, question: &str) -> Result<PipelineResponse> {
        match tokio::time::timeout(self.call_timeout, self.client.ask(pipeline, question)).await {
            Ok(response) => response,
            Err(_) => Err(BenchError::Transport(format!(
                "call timed out after {:?}",
                self.call_timeout
            ))),
        }
    }

    /// Process a single (row, pipeline) pair. Never fails: errors become a failed record.
    async fn process_pair(
        &self,
        row_index: usize,
        row: &GoldenRow,
        pipeline: &PipelineSpec,
    ) -> MetricRecord {
        debug!(row_index, pipeline = %pipeline.name, state = ?PairState::Pending, "asking pipeline");

        let mut record = MetricRecord {
            row_index,
            question: row.question.clone(),
            source: row.source.clone(),
            pipeline: pipeline.name.clone(),
            status: RecordStatus::Failed,
            answer: None,
            scores: None,
            latency_ms: 0,
            error: None,
        };

        let start = Instant::now();
        let response = self.call(pipeline, &row.question).await;
        record.latency_ms = start.elapsed().as_millis() as u64;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                if e.is_recoverable() {
                    warn!(
                        row_index,
                        pipeline = %pipeline.name,
                        state = ?PairState::Failed,
                        error = %e,
                        "pipeline call failed"
                    );
                } else {
                    error!(
                        row_index,
                        pipeline = %pipeline.name,
                        state = ?PairState::Failed,
                        error = %e,
                        "pipeline call failed with a non-transport error"
                    );
                }
                record.error = Some(e.to_string());
                return record;
            }
        };
        debug!(
            row_index,
            pipeline = %pipeline.name,
            state = ?PairState::Called,
            passages = response.retrieved_context.len(),
            "pipeline answered"
        );

        let scores = self.evaluator.evaluate(
            &row.question,
            &row.ground_truth_answer,
            &row.ground_truth_context,
            &response.answer,
            &response.retrieved_context,
        );
        record.answer = Some(response.answer);

        match scores {
            Ok(scores) => {
                debug!(row_index, pipeline = %pipeline.name, state = ?PairState::Scored, "pair scored");
                record.status = RecordStatus::Scored;
                record.scores = Some(scores);
            }
            Err(e) => {
                warn!(
                    row_index,
                    question = %row.question,
                    pipeline = %pipeline.name,
                    state = ?PairState::Failed,
                    error = %e,
                    "evaluation failed"
                );
                record.error = Some(e.to_string());
            }
        }

        record
    }
}
