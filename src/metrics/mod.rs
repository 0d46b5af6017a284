//! Deterministic scoring of pipeline answers and retrieved context.
//!
//! The [`Evaluator`] is a pure function of its inputs: no network, no
//! filesystem, and identical inputs always produce identical scores. Every
//! score lies in `[0, 1]`, higher is better.

pub mod answer;
pub mod retrieval;
pub mod text;

pub use answer::AnswerScores;
pub use retrieval::ContextScores;

use crate::config::RunConfig;
use crate::error::{BenchError, Result};
use serde::{Deserialize, Serialize};

/// Similarity used for the headline answer-correctness score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSimilarity {
    /// Stop-word-filtered token overlap F1.
    #[default]
    TokenOverlap,
    /// ROUGE-L F1 over all tokens.
    RougeL,
}

/// All scores for one (row, pipeline) pair.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Scores {
    pub answer: AnswerScores,
    pub context: ContextScores,
}

impl Scores {
    /// Metric names, in report column order.
    pub const NAMES: [&'static str; 15] = [
        "answer_correctness",
        "token_overlap_precision",
        "token_overlap_recall",
        "token_overlap_f1",
        "rouge_l_precision",
        "rouge_l_recall",
        "rouge_l_f1",
        "bleu",
        "faithfulness",
        "context_precision",
        "context_recall",
        "context_f1",
        "average_precision",
        "reciprocal_rank",
        "ndcg",
    ];

    /// Metric values, aligned with [`Scores::NAMES`].
    pub fn values(&self) -> [f64; 15] {
        let a = &self.answer;
        let c = &self.context;
        [
            a.correctness,
            a.token_overlap_precision,
            a.token_overlap_recall,
            a.token_overlap_f1,
            a.rouge_l_precision,
            a.rouge_l_recall,
            a.rouge_l_f1,
            a.bleu,
            a.faithfulness,
            c.precision,
            c.recall,
            c.f1,
            c.average_precision,
            c.reciprocal_rank,
            c.ndcg,
        ]
    }
}

/// Scores a pipeline response against the golden row.
#[derive(Debug, Clone, Copy)]
pub struct Evaluator {
    similarity: AnswerSimilarity,
    chunk_match_threshold: f64,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(AnswerSimilarity::default(), 0.7)
    }
}

impl Evaluator {
    /// Create an evaluator with an explicit strategy and passage threshold.
    pub fn new(similarity: AnswerSimilarity, chunk_match_threshold: f64) -> Self {
        Self {
            similarity,
            chunk_match_threshold: chunk_match_threshold.clamp(0.0, 1.0),
        }
    }

    /// Create from run settings.
    pub fn from_config(config: &RunConfig) -> Self {
        Self::new(config.answer_similarity, config.chunk_match_threshold)
    }

    /// Score one pipeline response.
    ///
    /// An empty pipeline answer or context scores zero on the affected
    /// metrics. Golden values without any word are rejected, since nothing
    /// can be measured against them.
    pub fn evaluate(
        &self,
        question: &str,
        ground_truth_answer: &str,
        ground_truth_context: &str,
        pipeline_answer: &str,
        pipeline_context: &[String],
    ) -> Result<Scores> {
        if text::tokenize(question).is_empty() {
            return Err(BenchError::Evaluation("question has no words".to_string()));
        }
        if text::tokenize(ground_truth_answer).is_empty() {
            return Err(BenchError::Evaluation(
                "ground truth answer has no words".to_string(),
            ));
        }
        if text::tokenize(ground_truth_context).is_empty() {
            return Err(BenchError::Evaluation(
                "ground truth context has no words".to_string(),
            ));
        }

        let mut answer = answer::score_answer(pipeline_answer, ground_truth_answer, pipeline_context);
        answer.correctness = match self.similarity {
            AnswerSimilarity::TokenOverlap => answer.token_overlap_f1,
            AnswerSimilarity::RougeL => answer.rouge_l_f1,
        };

        let context = retrieval::score_context(
            pipeline_context,
            ground_truth_context,
            self.chunk_match_threshold,
        );

        Ok(Scores { answer, context })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUESTION: &str = "Does the policy allow selling user data?";
    const GT_ANSWER: &str = "No, user data is never sold to third parties.";
    const GT_CONTEXT: &str = "We never sell user data to third parties or advertisers.";

    fn in_bounds(scores: &Scores) -> bool {
        scores.values().iter().all(|v| (0.0..=1.0).contains(v))
    }

    #[test]
    fn test_deterministic() {
        let evaluator = Evaluator::default();
        let ctx = vec![GT_CONTEXT.to_string(), "Cookies are used for analytics.".to_string()];
        let first = evaluator
            .evaluate(QUESTION, GT_ANSWER, GT_CONTEXT, "User data is not sold.", &ctx)
            .unwrap();
        for _ in 0..5 {
            let again = evaluator
                .evaluate(QUESTION, GT_ANSWER, GT_CONTEXT, "User data is not sold.", &ctx)
                .unwrap();
            assert_eq!(first, again);
        }
        assert!(in_bounds(&first));
    }

    #[test]
    fn test_identical_answer_is_max_for_both_strategies() {
        for similarity in [AnswerSimilarity::TokenOverlap, AnswerSimilarity::RougeL] {
            let evaluator = Evaluator::new(similarity, 0.7);
            let scores = evaluator
                .evaluate(QUESTION, GT_ANSWER, GT_CONTEXT, GT_ANSWER, &[])
                .unwrap();
            assert_eq!(scores.answer.correctness, 1.0);
        }
    }

    #[test]
    fn test_empty_context_is_worst_case_not_error() {
        let scores = Evaluator::default()
            .evaluate(QUESTION, GT_ANSWER, GT_CONTEXT, "Some answer", &[])
            .unwrap();
        assert_eq!(scores.context, ContextScores::default());
        assert_eq!(scores.answer.faithfulness, 0.0);
        assert!(in_bounds(&scores));
    }

    #[test]
    fn test_empty_answer_is_worst_case_not_error() {
        let ctx = vec![GT_CONTEXT.to_string()];
        let scores = Evaluator::default()
            .evaluate(QUESTION, GT_ANSWER, GT_CONTEXT, "   ", &ctx)
            .unwrap();
        assert_eq!(scores.answer, AnswerScores::default());
        assert_eq!(scores.context.recall, 1.0);
    }

    #[test]
    fn test_blank_ground_truth_is_evaluation_error() {
        let err = Evaluator::default()
            .evaluate(QUESTION, "", GT_CONTEXT, "answer", &[])
            .unwrap_err();
        assert!(matches!(err, BenchError::Evaluation(_)));

        let err = Evaluator::default()
            .evaluate(QUESTION, GT_ANSWER, " - ", "answer", &[])
            .unwrap_err();
        assert!(matches!(err, BenchError::Evaluation(_)));
    }

    #[test]
    fn test_stop_word_golden_context_is_not_worst_case() {
        let ctx = vec!["It is.".to_string()];
        let scores = Evaluator::default()
            .evaluate(QUESTION, GT_ANSWER, "It is.", GT_ANSWER, &ctx)
            .unwrap();
        assert_eq!(scores.context.precision, 1.0);
        assert_eq!(scores.context.recall, 1.0);
    }

    #[test]
    fn test_names_align_with_values() {
        assert_eq!(Scores::NAMES.len(), Scores::default().values().len());
    }

    #[test]
    fn test_similarity_deserializes_snake_case() {
        let s: AnswerSimilarity = serde_yaml::from_str("rouge_l").unwrap();
        assert_eq!(s, AnswerSimilarity::RougeL);
    }
}
