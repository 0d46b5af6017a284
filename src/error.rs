//! Error types for the benchmark harness.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our custom error.
pub type Result<T> = std::result::Result<T, BenchError>;

/// Errors that can occur while benchmarking pipelines.
#[derive(Error, Debug)]
pub enum BenchError {
    /// Error reading or writing files.
    #[error("I/O error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error during serialization/deserialization.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The dataset could not be read or has the wrong shape.
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Missing credential, service URL, pipeline identifier or bad routing.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network, HTTP status or timeout failure for a single pipeline call.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The pipeline answered without the fields we need.
    #[error("Malformed pipeline response: {0}")]
    MalformedResponse(String),

    /// The evaluator rejected its input.
    #[error("Evaluation error: {0}")]
    Evaluation(String),

    /// Every routed pair of these pipelines failed.
    #[error("All calls failed for pipeline(s): {}", pipelines.join(", "))]
    AllFailed { pipelines: Vec<String> },
}

impl BenchError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error only affects a single (row, pipeline) pair.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            BenchError::Transport(_) | BenchError::MalformedResponse(_) | BenchError::Evaluation(_)
        )
    }
}

impl From<reqwest::Error> for BenchError {
    fn from(err: reqwest::Error) -> Self {
        BenchError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for BenchError {
    fn from(err: serde_json::Error) -> Self {
        BenchError::Serialization(err.to_string())
    }
}

impl From<csv::Error> for BenchError {
    fn from(err: csv::Error) -> Self {
        BenchError::Dataset(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_errors() {
        assert!(BenchError::Transport("timeout".into()).is_recoverable());
        assert!(BenchError::MalformedResponse("no answer".into()).is_recoverable());
        assert!(BenchError::Evaluation("empty".into()).is_recoverable());
        assert!(!BenchError::Config("no token".into()).is_recoverable());
    }

    #[test]
    fn test_all_failed_message() {
        let err = BenchError::AllFailed {
            pipelines: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(err.to_string(), "All calls failed for pipeline(s): a, b");
    }
}
