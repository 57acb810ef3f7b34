// deid-core/src/spans.rs
//! Provides core data structures and utility functions for managing
//! detected identifier spans and PHI-safe debug logging within the
//! `deid-core` library.

use crate::category::PhiCategory;

use hex;
use lazy_static::lazy_static;
use log::debug;
use sha2::{Digest, Sha256};

lazy_static! {
    /// A static boolean that is initialized once to determine if PHI is
    /// allowed in debug logs.
    static ref PHI_DEBUG_ALLOWED: bool = {
        std::env::var("DEID_ALLOW_DEBUG_PII")
            .map(|s| s.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    };
}

/// A single candidate (or resolved) identifier occurrence.
///
/// Offsets are CHARACTER offsets into the input, Unicode-correct; byte
/// offsets are carried alongside for replacement slicing. Spans are
/// transient: they exist only within one engine call and are never
/// serialized or persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedSpan {
    /// The Safe Harbor category of the match.
    pub category: PhiCategory,
    /// Character offset of the first matched character.
    pub start: usize,
    /// Character offset one past the last matched character.
    pub end: usize,
    /// The matched text. PHI: must never reach logs or error messages.
    pub raw_value: String,
    /// Combined pattern + context confidence, in (0, 1).
    pub confidence: f64,
    /// Name of the rule that produced this span.
    pub matcher: String,
    /// Rule priority, used as an overlap tie-break.
    pub priority: u32,
    /// Byte offset of the match start in the input.
    pub byte_start: usize,
    /// Byte offset of the match end in the input.
    pub byte_end: usize,
}

impl DetectedSpan {
    /// Match length in characters; used for length-weighted scoring and
    /// overlap tie-breaks.
    pub fn char_len(&self) -> usize {
        self.end - self.start
    }
}

/// Collapses a sensitive string into a loggable placeholder.
pub fn redact_sensitive(s: &str) -> String {
    const MAX_LEN: usize = 8;
    if s.len() <= MAX_LEN {
        "[REDACTED]".to_string()
    } else {
        format!("[REDACTED: {} chars]", s.len())
    }
}

fn get_loggable_content(sensitive_content: &str) -> String {
    if *PHI_DEBUG_ALLOWED {
        sensitive_content.to_string()
    } else {
        redact_sensitive(sensitive_content)
    }
}

/// Debug-logs a candidate span without leaking its raw value.
pub fn log_span_debug(module_path: &str, span: &DetectedSpan) {
    debug!(
        "{} Candidate span: rule='{}' category={} chars={}..{} conf={:.2} value='{}'",
        module_path,
        span.matcher,
        span.category,
        span.start,
        span.end,
        span.confidence,
        get_loggable_content(&span.raw_value)
    );
}

/// Stable content hash for a matched value, bound to its rule.
/// Used for deduplication and audit correlation, never reversed.
pub fn canonical_sample_hash(rule_id: &str, snippet: &str) -> String {
    let normalized = snippet
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    let mut hasher = Sha256::new();
    hasher.update(rule_id.as_bytes());
    hasher.update(b":");
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}
