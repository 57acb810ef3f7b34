// deid-core/src/summary.rs
//! The Confidence Aggregator: rolls per-span confidences up into the
//! response summary.
//!
//! The overall score is the length-weighted mean of the resolved spans'
//! confidences, so long, certain spans dominate short, doubtful ones.
//! Callers use the score to drive their own manual-review thresholds; the
//! engine only reports it.
//!
//! License: MIT OR APACHE 2.0

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::spans::DetectedSpan;

/// The detection summary returned with every response.
///
/// `by_type` is a `BTreeMap` so serialization order is stable and
/// repeated calls produce byte-identical summaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_detected: usize,
    /// Length-weighted mean confidence, in [0, 1].
    pub confidence_score: f64,
    pub by_type: BTreeMap<String, usize>,
}

/// Aggregates resolved spans into a [`Summary`].
///
/// With no spans there is nothing to doubt: the score is 1.0, so clean
/// documents do not trip review thresholds.
pub fn aggregate(spans: &[DetectedSpan]) -> Summary {
    let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
    for span in spans {
        *by_type.entry(span.category.as_str().to_string()).or_insert(0) += 1;
    }

    let total_weight: f64 = spans.iter().map(|s| s.char_len() as f64).sum();
    let confidence_score = if total_weight == 0.0 {
        1.0
    } else {
        let weighted: f64 = spans
            .iter()
            .map(|s| s.confidence * s.char_len() as f64)
            .sum();
        (weighted / total_weight).clamp(0.0, 1.0)
    };

    Summary {
        total_detected: spans.len(),
        confidence_score,
        by_type,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::PhiCategory;

    fn span(category: PhiCategory, len: usize, confidence: f64) -> DetectedSpan {
        DetectedSpan {
            category,
            start: 0,
            end: len,
            raw_value: "x".repeat(len),
            confidence,
            matcher: "test".to_string(),
            priority: 10,
            byte_start: 0,
            byte_end: len,
        }
    }

    #[test]
    fn test_empty_spans_score_one() {
        let summary = aggregate(&[]);
        assert_eq!(summary.total_detected, 0);
        assert_eq!(summary.confidence_score, 1.0);
        assert!(summary.by_type.is_empty());
    }

    #[test]
    fn test_counts_by_category_sum_to_total() {
        let spans = vec![
            span(PhiCategory::Email, 10, 0.9),
            span(PhiCategory::Email, 12, 0.9),
            span(PhiCategory::Phone, 8, 0.8),
        ];
        let summary = aggregate(&spans);
        assert_eq!(summary.total_detected, 3);
        assert_eq!(summary.by_type["EMAIL"], 2);
        assert_eq!(summary.by_type["PHONE"], 1);
        let sum: usize = summary.by_type.values().sum();
        assert_eq!(sum, summary.total_detected);
    }

    #[test]
    fn test_longer_spans_dominate_the_score() {
        let spans = vec![
            span(PhiCategory::Name, 30, 0.9),
            span(PhiCategory::Date, 3, 0.3),
        ];
        let summary = aggregate(&spans);
        // 30 chars at 0.9 against 3 chars at 0.3: well above the plain mean.
        let expected = (30.0 * 0.9 + 3.0 * 0.3) / 33.0;
        assert!((summary.confidence_score - expected).abs() < 1e-12);
        assert!(summary.confidence_score > 0.6);
    }

    #[test]
    fn test_score_stays_in_bounds() {
        let spans = vec![span(PhiCategory::Email, 5, 0.99)];
        let summary = aggregate(&spans);
        assert!(summary.confidence_score >= 0.0 && summary.confidence_score <= 1.0);
    }
}
