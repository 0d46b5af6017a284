//! Deterministic answer metrics: token overlap, ROUGE-L, BLEU and faithfulness.

use super::text::{Prf, content_tokens, counts, ratio, rouge_l, tokenize};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Highest n-gram order used by BLEU.
const BLEU_MAX_ORDER: usize = 4;

/// Scores comparing a pipeline answer with the golden answer.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AnswerScores {
    /// Headline score picked by the configured similarity.
    pub correctness: f64,
    pub token_overlap_precision: f64,
    pub token_overlap_recall: f64,
    pub token_overlap_f1: f64,
    pub rouge_l_precision: f64,
    pub rouge_l_recall: f64,
    pub rouge_l_f1: f64,
    pub bleu: f64,
    /// Share of answer tokens that also occur in the retrieved context.
    pub faithfulness: f64,
}

/// Stop-word-filtered tokens for both sides, or plain tokens when filtering
/// empties either side (e.g. a bare "Yes").
fn overlap_tokens(candidate: &str, reference: &str) -> (Vec<String>, Vec<String>) {
    let cand = content_tokens(candidate);
    let refs = content_tokens(reference);
    if cand.is_empty() || refs.is_empty() {
        (tokenize(candidate), tokenize(reference))
    } else {
        (cand, refs)
    }
}

/// Clipped unigram overlap between candidate and reference.
pub fn token_overlap(candidate: &str, reference: &str) -> Prf {
    let (cand, refs) = overlap_tokens(candidate, reference);
    let cand_counts = counts(&cand);
    let ref_counts = counts(&refs);

    let common: usize = cand_counts
        .iter()
        .map(|(tok, n)| (*n).min(ref_counts.get(tok).copied().unwrap_or(0)))
        .sum();

    Prf::new(ratio(common, cand.len()), ratio(common, refs.len()))
}

fn ngrams(tokens: &[String], n: usize) -> HashMap<&[String], usize> {
    let mut map = HashMap::new();
    if tokens.len() >= n {
        for window in tokens.windows(n) {
            *map.entry(window).or_insert(0) += 1;
        }
    }
    map
}

/// Sentence BLEU with add-one smoothing on orders above one.
pub fn bleu(candidate: &[String], reference: &[String]) -> f64 {
    if candidate.is_empty() || reference.is_empty() {
        return 0.0;
    }

    let mut log_sum = 0.0;
    for n in 1..=BLEU_MAX_ORDER {
        let cand = ngrams(candidate, n);
        let refs = ngrams(reference, n);

        let total: usize = cand.values().sum();
        let matched: usize = cand
            .iter()
            .map(|(gram, count)| (*count).min(refs.get(gram).copied().unwrap_or(0)))
            .sum();

        let precision = if n == 1 {
            ratio(matched, total)
        } else {
            (matched + 1) as f64 / (total + 1) as f64
        };

        if precision == 0.0 {
            return 0.0;
        }
        log_sum += precision.ln();
    }

    let c = candidate.len() as f64;
    let r = reference.len() as f64;
    let brevity = if c >= r { 1.0 } else { (1.0 - r / c).exp() };

    (brevity * (log_sum / BLEU_MAX_ORDER as f64).exp()).clamp(0.0, 1.0)
}

/// Share of answer tokens supported by the retrieved passages.
pub fn faithfulness(answer: &str, context: &[String]) -> f64 {
    let mut answer_tokens = content_tokens(answer);
    if answer_tokens.is_empty() {
        answer_tokens = tokenize(answer);
    }
    if answer_tokens.is_empty() {
        return 0.0;
    }

    let context_tokens: HashSet<String> = context.iter().flat_map(|c| tokenize(c)).collect();
    let supported = answer_tokens
        .iter()
        .filter(|t| context_tokens.contains(*t))
        .count();

    ratio(supported, answer_tokens.len())
}

/// Compute every answer metric.
pub fn score_answer(answer: &str, reference: &str, context: &[String]) -> AnswerScores {
    let answer_tokens = tokenize(answer);
    if answer_tokens.is_empty() {
        return AnswerScores::default();
    }
    let reference_tokens = tokenize(reference);

    let overlap = token_overlap(answer, reference);
    let rouge = rouge_l(&answer_tokens, &reference_tokens);

    AnswerScores {
        correctness: overlap.f1,
        token_overlap_precision: overlap.precision,
        token_overlap_recall: overlap.recall,
        token_overlap_f1: overlap.f1,
        rouge_l_precision: rouge.precision,
        rouge_l_recall: rouge.recall,
        rouge_l_f1: rouge.f1,
        bleu: bleu(&answer_tokens, &reference_tokens),
        faithfulness: faithfulness(answer, context),
    }
}
