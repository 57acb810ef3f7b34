// deid-core/src/headless.rs

//! `headless.rs`
//! Convenience wrappers for using the engine in one-shot mode (no
//! collaborators, no reversibility).
//! Provides helper functions for a full, single-call de-identification of
//! strings using the built-in pattern library.

use crate::config::PatternConfig;
use crate::engine::{DeidResponse, SafeHarborEngine};
use crate::errors::DeidError;

/// Fully de-identifies an input string with the built-in Safe Harbor
/// pattern library. This function is the primary entry point for
/// non-interactive, non-reversible use.
///
/// No vault and no audit sink are involved, so the call is pure CPU work
/// and synchronous. Callers needing reversibility, auditing, or custom
/// patterns should construct a [`SafeHarborEngine`] directly.
///
/// # Arguments
///
/// * `content` - The string to be de-identified.
pub fn deidentify_text(content: &str) -> Result<DeidResponse, DeidError> {
    let config =
        PatternConfig::load_default_patterns().map_err(|e| DeidError::Config(e.to_string()))?;
    let engine = SafeHarborEngine::new(config)?;
    engine.scrub(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deidentify_text_redacts_emails() {
        let content = "My email is test@example.com, and another is another@example.net.";
        let response = deidentify_text(content).unwrap();

        assert_eq!(
            response.deidentified,
            "My email is [EMAIL_1], and another is [EMAIL_2]."
        );
        assert_eq!(response.summary.by_type["EMAIL"], 2);
    }

    #[test]
    fn test_deidentify_text_rejects_empty_input() {
        assert!(deidentify_text("").is_err());
    }
}
