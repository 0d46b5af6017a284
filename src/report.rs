//! Result reporting: comparison table, per-row CSV, summary CSV and JSON dump.
//!
//! Every run writes into its own `{timestamp}_{label}` directory.

use crate::error::{BenchError, Result};
use crate::metrics::Scores;
use crate::runner::{BenchmarkResult, MetricRecord};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt::Write;
use std::fs;
use std::path::{Path, PathBuf};

/// Per-row results file.
pub const RESULTS_CSV: &str = "results.csv";
/// Per-(pipeline, source) means.
pub const STATS_CSV: &str = "stats.csv";
/// Full result dump.
pub const RESULTS_JSON: &str = "results.json";
/// Comparison table as markdown.
pub const SUMMARY_MD: &str = "summary.md";

/// Mean metrics over the scored records of one pipeline (optionally one source).
#[derive(Debug, Clone, Serialize)]
pub struct SummaryRow {
    pub pipeline: String,
    /// `None` for the all-sources row.
    pub source: Option<String>,
    pub scored: usize,
    pub failed: usize,
    pub mean_latency_ms: f64,
    /// Means aligned with [`Scores::NAMES`]; `None` when nothing was scored.
    pub means: Vec<Option<f64>>,
}

impl SummaryRow {
    fn from_records<'a>(
        pipeline: &str,
        source: Option<&str>,
        records: impl Iterator<Item = &'a MetricRecord>,
    ) -> Self {
        let mut sums = [0.0; Scores::NAMES.len()];
        let mut scored = 0usize;
        let mut failed = 0usize;
        let mut latency = 0u64;

        for record in records {
            latency += record.latency_ms;
            match &record.scores {
                Some(scores) => {
                    scored += 1;
                    for (sum, value) in sums.iter_mut().zip(scores.values()) {
                        *sum += value;
                    }
                }
                None => failed += 1,
            }
        }

        let attempted = scored + failed;
        Self {
            pipeline: pipeline.to_string(),
            source: source.map(str::to_string),
            scored,
            failed,
            mean_latency_ms: if attempted == 0 {
                0.0
            } else {
                latency as f64 / attempted as f64
            },
            means: sums
                .iter()
                .map(|sum| (scored > 0).then(|| sum / scored as f64))
                .collect(),
        }
    }

    /// Mean of a named metric.
    pub fn mean(&self, metric: &str) -> Option<f64> {
        Scores::NAMES
            .iter()
            .position(|n| *n == metric)
            .and_then(|idx| self.means[idx])
    }
}

/// One row per pipeline across all sources.
pub fn summarize(result: &BenchmarkResult) -> Vec<SummaryRow> {
    result
        .pipelines
        .iter()
        .map(|run| SummaryRow::from_records(&run.name, None, run.records.iter()))
        .collect()
}

/// One row per (pipeline, source) that has records.
pub fn summarize_by_source(result: &BenchmarkResult) -> Vec<SummaryRow> {
    let mut rows = Vec::new();
    for run in &result.pipelines {
        let sources: BTreeSet<&str> = run.records.iter().map(|r| r.source.as_str()).collect();
        for source in sources {
            rows.push(SummaryRow::from_records(
                &run.name,
                Some(source),
                run.records.iter().filter(|r| r.source == source),
            ));
        }
    }
    rows
}

fn fmt_mean(value: Option<f64>) -> String {
    value.map(|v| format!("{:.3}", v)).unwrap_or_else(|| "-".to_string())
}

/// Markdown comparison table: one column per pipeline, one row per metric.
pub fn format_table(result: &BenchmarkResult) -> String {
    let summaries = summarize(result);
    let mut out = String::new();

    let _ = writeln!(out, "# Benchmark: {}", result.dataset_name);
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Run: {} -> {}",
        result.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
        result.finished_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    let _ = writeln!(out);

    let _ = write!(out, "| metric |");
    for s in &summaries {
        let _ = write!(out, " {} |", s.pipeline);
    }
    let _ = writeln!(out);
    let _ = write!(out, "|---|");
    for _ in &summaries {
        let _ = write!(out, "---|");
    }
    let _ = writeln!(out);

    for (idx, name) in Scores::NAMES.iter().enumerate() {
        let _ = write!(out, "| {} |", name);
        for s in &summaries {
            let _ = write!(out, " {} |", fmt_mean(s.means[idx]));
        }
        let _ = writeln!(out);
    }

    let _ = write!(out, "| mean_latency_ms |");
    for s in &summaries {
        let _ = write!(out, " {:.0} |", s.mean_latency_ms);
    }
    let _ = writeln!(out);
    let _ = write!(out, "| scored / failed |");
    for s in &summaries {
        let _ = write!(out, " {} / {} |", s.scored, s.failed);
    }
    let _ = writeln!(out);

    let failed = result.all_failed_pipelines();
    if !failed.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "All calls failed for: {}", failed.join(", "));
    }

    out
}

/// Name of the directory for a run.
pub fn run_dir_name(timestamp: DateTime<Utc>, label: &str) -> String {
    format!("{}_{}", timestamp.format("%Y-%m-%d_%H-%M-%S"), label)
}

/// Create `{output_dir}/{timestamp}_{label}` and return its path.
pub fn create_run_dir(output_dir: &Path, timestamp: DateTime<Utc>, label: &str) -> Result<PathBuf> {
    let dir = output_dir.join(run_dir_name(timestamp, label));
    fs::create_dir_all(&dir).map_err(|e| BenchError::io(&dir, e))?;
    Ok(dir)
}

fn csv_writer(path: &Path) -> Result<csv::Writer<fs::File>> {
    csv::Writer::from_path(path)
        .map_err(|e| BenchError::Serialization(format!("{}: {}", path.display(), e)))
}

fn csv_err(path: &Path) -> impl Fn(csv::Error) -> BenchError + '_ {
    move |e| BenchError::Serialization(format!("{}: {}", path.display(), e))
}

/// Write one line per record.
pub fn write_results_csv(result: &BenchmarkResult, path: &Path) -> Result<()> {
    let mut wtr = csv_writer(path)?;

    let mut header = vec![
        "row_index",
        "source",
        "pipeline",
        "question",
        "status",
        "answer",
        "latency_ms",
        "error",
    ];
    header.extend(Scores::NAMES);
    wtr.write_record(&header).map_err(csv_err(path))?;

    for run in &result.pipelines {
        for record in &run.records {
            let mut line = vec![
                record.row_index.to_string(),
                record.source.clone(),
                record.pipeline.clone(),
                record.question.clone(),
                if record.is_scored() { "scored" } else { "failed" }.to_string(),
                record.answer.clone().unwrap_or_default(),
                record.latency_ms.to_string(),
                record.error.clone().unwrap_or_default(),
            ];
            match &record.scores {
                Some(scores) => line.extend(scores.values().iter().map(|v| format!("{:.6}", v))),
                None => line.extend(Scores::NAMES.iter().map(|_| String::new())),
            }
            wtr.write_record(&line).map_err(csv_err(path))?;
        }
    }

    wtr.flush().map_err(|e| BenchError::io(path, e))
}

/// Write the per-(pipeline, source) means.
pub fn write_stats_csv(result: &BenchmarkResult, path: &Path) -> Result<()> {
    let mut wtr = csv_writer(path)?;

    let mut header = vec!["source", "pipeline", "scored", "failed", "mean_latency_ms"];
    header.extend(Scores::NAMES);
    wtr.write_record(&header).map_err(csv_err(path))?;

    for row in summarize_by_source(result) {
        let mut line = vec![
            row.source.clone().unwrap_or_default(),
            row.pipeline.clone(),
            row.scored.to_string(),
            row.failed.to_string(),
            format!("{:.1}", row.mean_latency_ms),
        ];
        line.extend(
            row.means
                .iter()
                .map(|m| m.map(|v| format!("{:.6}", v)).unwrap_or_default()),
        );
        wtr.write_record(&line).map_err(csv_err(path))?;
    }

    wtr.flush().map_err(|e| BenchError::io(path, e))
}

/// Write the full result as pretty JSON.
pub fn write_results_json(result: &BenchmarkResult, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(result)?;
    fs::write(path, json).map_err(|e| BenchError::io(path, e))
}

/// Write every report file into `dir`.
pub fn write_report(result: &BenchmarkResult, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| BenchError::io(dir, e))?;

    write_results_csv(result, &dir.join(RESULTS_CSV))?;
    write_stats_csv(result, &dir.join(STATS_CSV))?;
    write_results_json(result, &dir.join(RESULTS_JSON))?;

    let summary = dir.join(SUMMARY_MD);
    fs::write(&summary, format_table(result)).map_err(|e| BenchError::io(&summary, e))
}

/// Load a result previously written with [`write_results_json`].
pub fn load_results_json(path: &Path) -> Result<BenchmarkResult> {
    let content = fs::read_to_string(path).map_err(|e| BenchError::io(path, e))?;
    serde_json::from_str(&content).map_err(|e| BenchError::Serialization(e.to_string()))
}
