//! Retrieval metrics: how well the retrieved passages cover the golden context.

use super::text::{content_tokens, f1, ratio, rouge_l, tokenize};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Scores comparing retrieved passages with the golden context.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ContextScores {
    /// Relevant passages over retrieved passages.
    pub precision: f64,
    /// Share of golden-context tokens found in any retrieved passage.
    pub recall: f64,
    pub f1: f64,
    pub average_precision: f64,
    pub reciprocal_rank: f64,
    pub ndcg: f64,
}

/// Whether a passage covers the golden context closely enough to count as relevant.
///
/// Relevance is the ROUGE-L recall of the golden tokens in the passage, over
/// all tokens, so a short fragment of the golden context is not a match.
pub fn is_relevant(passage: &str, golden: &[String], threshold: f64) -> bool {
    let tokens = tokenize(passage);
    if tokens.is_empty() || golden.is_empty() {
        return false;
    }
    rouge_l(&tokens, golden).recall >= threshold
}

/// Tokens compared for golden-context coverage. Stop words are dropped
/// unless that leaves the golden context empty.
fn coverage_tokens(golden_context: &str) -> (Vec<String>, fn(&str) -> Vec<String>) {
    let content = content_tokens(golden_context);
    if content.is_empty() {
        (tokenize(golden_context), tokenize)
    } else {
        (content, content_tokens)
    }
}

/// Mean of precision@k over the ranks holding a relevant passage.
pub fn average_precision(relevance: &[bool]) -> f64 {
    let mut hits = 0usize;
    let mut sum = 0.0;
    for (rank, relevant) in relevance.iter().enumerate() {
        if *relevant {
            hits += 1;
            sum += hits as f64 / (rank + 1) as f64;
        }
    }
    if hits == 0 { 0.0 } else { sum / hits as f64 }
}

/// Inverse rank of the first relevant passage.
pub fn reciprocal_rank(relevance: &[bool]) -> f64 {
    relevance
        .iter()
        .position(|r| *r)
        .map(|idx| 1.0 / (idx + 1) as f64)
        .unwrap_or(0.0)
}

/// Binary-relevance NDCG over the full retrieved list.
pub fn ndcg(relevance: &[bool]) -> f64 {
    let gain = |idx: usize| 1.0 / ((idx + 2) as f64).log2();

    let dcg: f64 = relevance
        .iter()
        .enumerate()
        .filter(|(_, r)| **r)
        .map(|(idx, _)| gain(idx))
        .sum();

    let hits = relevance.iter().filter(|r| **r).count();
    let ideal: f64 = (0..hits).map(gain).sum();

    if ideal == 0.0 { 0.0 } else { (dcg / ideal).min(1.0) }
}

/// Compute every retrieval metric.
pub fn score_context(passages: &[String], golden_context: &str, threshold: f64) -> ContextScores {
    let golden = tokenize(golden_context);
    if passages.is_empty() || golden.is_empty() {
        return ContextScores::default();
    }

    let relevance: Vec<bool> = passages
        .iter()
        .map(|p| is_relevant(p, &golden, threshold))
        .collect();
    let precision = ratio(relevance.iter().filter(|r| **r).count(), relevance.len());

    let (golden_terms, terms_of) = coverage_tokens(golden_context);
    let retrieved: HashSet<String> = passages.iter().flat_map(|p| terms_of(p)).collect();
    let unique_golden: HashSet<&String> = golden_terms.iter().collect();
    let covered = unique_golden.iter().filter(|t| retrieved.contains(**t)).count();
    let recall = ratio(covered, unique_golden.len());

    ContextScores {
        precision,
        recall,
        f1: f1(precision, recall),
        average_precision: average_precision(&relevance),
        reciprocal_rank: reciprocal_rank(&relevance),
        ndcg: ndcg(&relevance),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOLDEN: &str = "The Receiving Party may disclose Confidential Information to its employees who need to know.";

    #[test]
    fn test_ranked_metrics() {
        let rel = [false, true, false, true];
        assert!((average_precision(&rel) - (0.5 + 0.5) / 2.0).abs() < 1e-9);
        assert_eq!(reciprocal_rank(&rel), 0.5);
        assert!(ndcg(&rel) > 0.0 && ndcg(&rel) < 1.0);
        assert_eq!(ndcg(&[true, true, false]), 1.0);
        assert_eq!(average_precision(&[false, false]), 0.0);
        assert_eq!(reciprocal_rank(&[]), 0.0);
    }

    #[test]
    fn test_exact_passage_is_relevant() {
        let passages = vec![
            "Payment terms are net 30 days.".to_string(),
            GOLDEN.to_string(),
        ];
        let scores = score_context(&passages, GOLDEN, 0.7);
        assert_eq!(scores.precision, 0.5);
        assert_eq!(scores.recall, 1.0);
        assert_eq!(scores.reciprocal_rank, 0.5);
    }

    #[test]
    fn test_empty_context_scores_zero() {
        assert_eq!(score_context(&[], GOLDEN, 0.7), ContextScores::default());
    }

    #[test]
    fn test_short_fragment_is_not_relevant() {
        let golden = tokenize(GOLDEN);
        assert!(!is_relevant("may disclose Confidential Information", &golden, 0.7));
        assert!(!is_relevant("the of and", &golden, 0.7));

        let passages = vec!["Confidential".to_string(), "the employees".to_string()];
        let scores = score_context(&passages, GOLDEN, 0.7);
        assert_eq!(scores.precision, 0.0);
        assert_eq!(scores.average_precision, 0.0);
        assert_eq!(scores.reciprocal_rank, 0.0);
        assert_eq!(scores.ndcg, 0.0);
        assert!(scores.recall > 0.0 && scores.recall < 0.5);
    }

    #[test]
    fn test_passage_containing_golden_is_relevant() {
        let golden = tokenize(GOLDEN);
        let passage = format!("Section 4. {} Such employees are bound by this Agreement.", GOLDEN);
        assert!(is_relevant(&passage, &golden, 0.7));
    }

    #[test]
    fn test_stop_word_golden_context_still_scores() {
        let passages = vec!["It is.".to_string()];
        let scores = score_context(&passages, "It is.", 0.7);
        assert_eq!(scores.precision, 1.0);
        assert_eq!(scores.recall, 1.0);
        assert_eq!(scores.f1, 1.0);
        assert_eq!(scores.ndcg, 1.0);
    }
}
