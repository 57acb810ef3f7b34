// deid-core/src/resolver.rs
//! The Span Resolver: turns an arbitrary candidate set into the final
//! non-overlapping, offset-ordered span list.
//!
//! Candidates are sorted by `(start, -confidence, -length, -priority,
//! matcher name)`; the trailing rule name keeps the order total, so
//! resolution is deterministic even between candidates that tie on every
//! ranked attribute. A single greedy left-to-right pass then keeps the
//! first candidate at each position and drops everything overlapping it.
//! Conflicts are local, so this restricted form of weighted interval
//! scheduling needs no lookahead.
//!
//! License: MIT OR APACHE 2.0

use std::cmp::Ordering;

use crate::spans::DetectedSpan;

/// Resolves overlaps among `candidates`, producing a list that satisfies:
/// for all adjacent spans `i`, `i+1`: `span[i].end <= span[i+1].start`.
///
/// On overlap the highest-confidence candidate wins; ties go to the
/// longer match, then to the higher matcher priority.
pub fn resolve_spans(mut candidates: Vec<DetectedSpan>) -> Vec<DetectedSpan> {
    candidates.sort_by(compare_candidates);

    let mut resolved: Vec<DetectedSpan> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        match resolved.last() {
            // Kept spans are non-overlapping and start-ordered, so their
            // ends are strictly increasing: checking the last one suffices.
            Some(last) if candidate.start < last.end => continue,
            _ => resolved.push(candidate),
        }
    }
    resolved
}

fn compare_candidates(a: &DetectedSpan, b: &DetectedSpan) -> Ordering {
    a.start
        .cmp(&b.start)
        .then_with(|| b.confidence.partial_cmp(&a.confidence).unwrap_or(Ordering::Equal))
        .then_with(|| b.char_len().cmp(&a.char_len()))
        .then_with(|| b.priority.cmp(&a.priority))
        .then_with(|| a.matcher.cmp(&b.matcher))
}
