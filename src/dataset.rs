//! Golden dataset loading.
//!
//! Supports:
//! - CSV with `question, gt_answer, gt-context, source` columns
//! - JSON in the crate's own format

use crate::error::{BenchError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// A single golden question/answer/context row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoldenRow {
    /// The question sent to every routed pipeline.
    pub question: String,
    /// Reference answer.
    pub ground_truth_answer: String,
    /// Reference passage the answer is grounded on.
    pub ground_truth_context: String,
    /// Benchmark the row comes from; used for routing.
    pub source: String,
}

impl GoldenRow {
    pub fn new(
        question: impl Into<String>,
        ground_truth_answer: impl Into<String>,
        ground_truth_context: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            question: question.into(),
            ground_truth_answer: ground_truth_answer.into(),
            ground_truth_context: ground_truth_context.into(),
            source: source.into(),
        }
    }
}

/// An ordered collection of golden rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    /// Dataset name.
    pub name: String,
    /// Rows, in the order they are benchmarked.
    pub rows: Vec<GoldenRow>,
}

/// Row layout of the CSV files produced for the legal and finance benchmarks.
#[derive(Debug, Deserialize)]
struct CsvRow {
    question: String,
    gt_answer: String,
    #[serde(rename = "gt-context", alias = "gt_context", default)]
    gt_context: Option<String>,
    #[serde(default)]
    source: Option<String>,
}

impl Dataset {
    /// Create a new empty dataset.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            rows: Vec::new(),
        }
    }

    /// Add a row to the dataset.
    pub fn add_row(&mut self, row: GoldenRow) {
        self.rows.push(row);
    }

    /// Number of rows in the dataset.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if dataset is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Get the first `n` rows (for quick runs).
    pub fn take(&self, n: usize) -> Self {
        Self {
            name: self.name.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }

    /// Distinct sources, sorted.
    pub fn sources(&self) -> BTreeSet<&str> {
        self.rows.iter().map(|r| r.source.as_str()).collect()
    }

    /// Load a dataset, picking the format from the file extension.
    pub fn load(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::load_json(path),
            _ => Self::load_csv(path),
        }
    }

    /// Load from a CSV file with a header row.
    ///
    /// A missing or empty `gt-context` falls back to `gt_answer`, which is how
    /// datasets without reference passages are scored.
    pub fn load_csv(path: &Path) -> Result<Self> {
        let file = fs::File::open(path).map_err(|e| BenchError::io(path, e))?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("dataset");
        Self::from_csv_reader(name, file)
    }

    /// Parse CSV rows from any reader.
    pub fn from_csv_reader(name: &str, reader: impl std::io::Read) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::Headers)
            .from_reader(reader);

        let mut dataset = Dataset::new(name);
        for (idx, record) in rdr.deserialize::<CsvRow>().enumerate() {
            // Header is line 1.
            let raw = record
                .map_err(|e| BenchError::Dataset(format!("CSV row {}: {}", idx + 2, e)))?;

            let context = raw
                .gt_context
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| raw.gt_answer.clone());

            dataset.add_row(GoldenRow {
                question: raw.question,
                ground_truth_answer: raw.gt_answer,
                ground_truth_context: context,
                source: raw.source.unwrap_or_default(),
            });
        }

        Ok(dataset)
    }

    /// Load from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| BenchError::io(path, e))?;
        serde_json::from_str(&content)
            .map_err(|e| BenchError::Dataset(format!("Failed to parse dataset JSON: {}", e)))
    }

    /// Save to a JSON file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).map_err(|e| BenchError::io(path, e))
    }
}

/// Create a sample dataset for smoke runs.
pub fn create_sample_dataset() -> Dataset {
    let mut dataset = Dataset::new("sample");

    dataset.add_row(GoldenRow::new(
        "Does the agreement allow the receiving party to share confidential information with its employees?",
        "Yes, the receiving party may share confidential information with employees who need to know it.",
        "The Receiving Party may disclose Confidential Information to its employees who have a need to know such information for the Purpose.",
        "contractnli",
    ));

    dataset.add_row(GoldenRow::new(
        "What was the company's total revenue in fiscal year 2022?",
        "Total revenue in fiscal year 2022 was $4.2 billion.",
        "For fiscal year 2022, total revenue was $4.2 billion, an increase of 8% compared to the prior year.",
        "finance_bench",
    ));

    dataset.add_row(GoldenRow::new(
        "Does the privacy policy state that user data is sold to third parties?",
        "No, the policy states that user data is not sold to third parties.",
        "We do not sell your personal information to third parties.",
        "privacy_qa",
    ));

    dataset
}
