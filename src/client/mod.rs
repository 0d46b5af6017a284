//! Access to the QA pipelines under test.
//!
//! The runner only sees the [`PipelineClient`] trait; [`QnaClient`] is the
//! HTTP implementation for the QnA service.

mod qna;

pub use qna::QnaClient;

use crate::config::PipelineSpec;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// What a pipeline returned for one question.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PipelineResponse {
    /// Generated answer.
    pub answer: String,
    /// Retrieved passages, in rank order.
    pub retrieved_context: Vec<String>,
}

/// Anything that can put a question to a pipeline.
#[async_trait]
pub trait PipelineClient: Send + Sync {
    /// Ask `question` to `pipeline` using its configured LLM provider.
    async fn ask(&self, pipeline: &PipelineSpec, question: &str) -> Result<PipelineResponse>;
}

#[async_trait]
impl<T: PipelineClient + ?Sized> PipelineClient for std::sync::Arc<T> {
    async fn ask(&self, pipeline: &PipelineSpec, question: &str) -> Result<PipelineResponse> {
        (**self).ask(pipeline, question).await
    }
}
