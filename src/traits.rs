//! Traits for pluggable matching, confirmation, and baseline loading

use async_trait::async_trait;

use crate::types::{BaselineFrames, ReconcileResult, StandardRecord};

/// Strategy deciding whether two normalized remarks describe the same
/// transaction.
///
/// Inputs are the cached normalized forms (lowercase, whitespace and
/// punctuation stripped). Implementations must be deterministic; the engine
/// calls this from refund pairing and baseline dedup.
pub trait RemarkSimilarity: Send + Sync {
    fn is_similar(&self, a: &str, b: &str) -> bool;
}

/// Default similarity: substring containment, then character-bigram overlap.
///
/// Bigrams rather than whitespace tokens so CJK remarks compare without word
/// segmentation; a single-character remark degrades to that character.
pub struct TokenOverlapSimilarity {
    /// Minimum overlap ratio in `[0, 1]` against the smaller bigram set.
    pub threshold: f64,
}

impl TokenOverlapSimilarity {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    fn bigrams(text: &str) -> Vec<(char, char)> {
        let chars: Vec<char> = text.chars().collect();
        if chars.len() < 2 {
            return chars.first().map(|c| (*c, *c)).into_iter().collect();
        }
        chars.windows(2).map(|w| (w[0], w[1])).collect()
    }
}

impl Default for TokenOverlapSimilarity {
    fn default() -> Self {
        Self::new(0.5)
    }
}

impl RemarkSimilarity for TokenOverlapSimilarity {
    fn is_similar(&self, a: &str, b: &str) -> bool {
        if a.is_empty() || b.is_empty() {
            return false;
        }
        if a == b || a.contains(b) || b.contains(a) {
            return true;
        }
        let left = Self::bigrams(a);
        let right = Self::bigrams(b);
        let smaller = left.len().min(right.len());
        if smaller == 0 {
            return false;
        }
        let overlap = left.iter().filter(|bigram| right.contains(bigram)).count();
        (overlap as f64) / (smaller as f64) >= self.threshold
    }
}

/// Remarks match only when their normalized forms are equal.
pub struct ExactRemarkSimilarity;

impl RemarkSimilarity for ExactRemarkSimilarity {
    fn is_similar(&self, a: &str, b: &str) -> bool {
        !a.is_empty() && a == b
    }
}

/// Outcome of a single confirm prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmDecision {
    /// Import this record.
    Accept,
    /// Skip this record (`SkipReason::UserDeclined`).
    Decline,
    /// Import this record and every remaining one without asking.
    AcceptAll,
    /// Skip this record and every remaining one without asking.
    DeclineAll,
    /// Stop deciding; remaining records stay pending.
    Abort,
}

/// Boundary to the interactive accept/skip loop.
///
/// The engine drives this strictly sequentially over actionable records in
/// input order; implementations may block on a human prompt. Reconciliation
/// decisions made before the gate (locks, refunds, dedup) are never offered
/// for confirmation.
pub trait ConfirmGate {
    fn decide(&mut self, record: &StandardRecord) -> ConfirmDecision;
}

/// Gate that accepts every record; used for non-interactive runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoConfirm;

impl ConfirmGate for AutoConfirm {
    fn decide(&mut self, _record: &StandardRecord) -> ConfirmDecision {
        ConfirmDecision::Accept
    }
}

/// Boundary to the baseline-loading collaborator.
///
/// The engine never reads files itself; a source materializes the full set
/// of baseline frames up front (missing sheets as empty tables), and the
/// engine treats the result as immutable for the rest of the run.
#[async_trait]
pub trait BaselineSource: Send + Sync {
    async fn load_baseline(&self) -> ReconcileResult<BaselineFrames>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_overlap_containment() {
        let matcher = TokenOverlapSimilarity::default();
        assert!(matcher.is_similar("taxi", "taxiride"));
        assert!(matcher.is_similar("taxiride", "taxi"));
        assert!(matcher.is_similar("订单a", "订单a"));
    }

    #[test]
    fn test_token_overlap_partial() {
        let matcher = TokenOverlapSimilarity::default();
        // "外卖订单午餐" vs "外卖订单晚餐" share most bigrams.
        assert!(matcher.is_similar("外卖订单午餐", "外卖订单晚餐"));
        assert!(!matcher.is_similar("打车", "电影票"));
    }

    #[test]
    fn test_token_overlap_empty_never_matches() {
        let matcher = TokenOverlapSimilarity::default();
        assert!(!matcher.is_similar("", "taxi"));
        assert!(!matcher.is_similar("", ""));
    }

    #[test]
    fn test_exact_similarity() {
        let matcher = ExactRemarkSimilarity;
        assert!(matcher.is_similar("taxi", "taxi"));
        assert!(!matcher.is_similar("taxi", "taxiride"));
        assert!(!matcher.is_similar("", ""));
    }
}
