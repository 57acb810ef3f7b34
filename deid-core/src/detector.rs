// deid-core/src/detector.rs
//! The Span Detector: runs every compiled matcher over the input text and
//! yields candidate [`DetectedSpan`]s with Unicode-correct character
//! offsets and context-boosted confidences.
//!
//! Detection is purely deterministic: identical input and matcher set
//! always produce an identical candidate list, independent of call order
//! or concurrency. Each matcher is isolated: a rule that exceeds its
//! candidate budget is dropped for the call with a recorded warning, and
//! the remaining matchers continue.
//!
//! License: MIT OR APACHE 2.0

use log::warn;

use crate::config::EngineLimits;
use crate::matchers::compiler::{CompiledMatcher, CompiledMatchers};
use crate::spans::{log_span_debug, DetectedSpan};
use crate::validators;

/// Added to a candidate's base confidence when its rule's context labels
/// match in the window preceding the candidate.
pub const CONTEXT_BOOST: f64 = 0.15;

/// Confidence ceiling: pattern matching never yields certainty.
pub const MAX_CONFIDENCE: f64 = 0.99;

/// A bidirectional byte/character offset map built once per call.
///
/// The regex engine reports byte offsets; the public span contract uses
/// character offsets. All reported byte offsets fall on character
/// boundaries, so a sorted boundary table answers both directions.
#[derive(Debug)]
pub(crate) struct CharIndex {
    /// Byte offset of each character, plus a trailing sentinel at text.len().
    byte_of_char: Vec<usize>,
}

impl CharIndex {
    pub(crate) fn new(text: &str) -> Self {
        let mut byte_of_char: Vec<usize> = text.char_indices().map(|(b, _)| b).collect();
        byte_of_char.push(text.len());
        Self { byte_of_char }
    }

    /// Character offset of the character starting at `byte`.
    pub(crate) fn char_at_byte(&self, byte: usize) -> usize {
        match self.byte_of_char.binary_search(&byte) {
            Ok(i) => i,
            // Regex offsets land on boundaries; clamp defensively anyway.
            Err(i) => i.saturating_sub(1),
        }
    }

    /// Byte offset of character `ch` (the sentinel for one-past-the-end).
    pub(crate) fn byte_at_char(&self, ch: usize) -> usize {
        let idx = ch.min(self.byte_of_char.len() - 1);
        self.byte_of_char[idx]
    }
}

fn run_programmatic_validator(matcher: &CompiledMatcher, original_str: &str) -> bool {
    if !matcher.programmatic_validation {
        return true;
    }
    match matcher.name.as_str() {
        "curp" => validators::is_valid_curp(original_str),
        "cpf_formatted" | "cpf_bare" => validators::is_valid_cpf(original_str),
        "ssn" => validators::is_valid_ssn(original_str),
        "imei" => validators::is_valid_imei(original_str),
        "vin" => validators::is_plausible_vin(original_str),
        _ => true,
    }
}

/// Checks the rule's context labels against the window of
/// `limits.context_window` characters preceding the candidate.
fn context_matches(
    matcher: &CompiledMatcher,
    text: &str,
    index: &CharIndex,
    char_start: usize,
    window: usize,
) -> bool {
    let Some(context) = &matcher.context else {
        return false;
    };
    if char_start == 0 {
        return false;
    }
    let window_start_char = char_start.saturating_sub(window);
    let window_start_byte = index.byte_at_char(window_start_char);
    let span_start_byte = index.byte_at_char(char_start);
    context.is_match(&text[window_start_byte..span_start_byte])
}

/// Runs all matchers over `content` and returns every surviving candidate.
///
/// Candidates are collected in matcher order (priority descending, then
/// rule name) and match order within each matcher, which makes the output
/// deterministic. Warnings for dropped matchers are appended to
/// `warnings`.
pub fn detect_spans(
    content: &str,
    matchers: &CompiledMatchers,
    limits: &EngineLimits,
    warnings: &mut Vec<String>,
) -> Vec<DetectedSpan> {
    let index = CharIndex::new(content);
    let mut candidates: Vec<DetectedSpan> = Vec::new();

    for matcher in &matchers.matchers {
        let mut rule_candidates: Vec<DetectedSpan> = Vec::new();
        let mut over_budget = false;

        for m in matcher.regex.find_iter(content) {
            if m.start() == m.end() {
                continue;
            }
            if rule_candidates.len() >= limits.max_candidates_per_rule {
                over_budget = true;
                break;
            }

            let raw_value = m.as_str();
            if !run_programmatic_validator(matcher, raw_value) {
                continue;
            }
            if matcher.category == crate::category::PhiCategory::Name
                && validators::is_clinical_stop_term(raw_value)
            {
                continue;
            }

            let char_start = index.char_at_byte(m.start());
            let char_end = index.char_at_byte(m.end());

            let mut confidence = matcher.base_confidence;
            if context_matches(matcher, content, &index, char_start, limits.context_window) {
                confidence = (confidence + CONTEXT_BOOST).min(MAX_CONFIDENCE);
            }

            let span = DetectedSpan {
                category: matcher.category,
                start: char_start,
                end: char_end,
                raw_value: raw_value.to_string(),
                confidence,
                matcher: matcher.name.clone(),
                priority: matcher.priority,
                byte_start: m.start(),
                byte_end: m.end(),
            };
            log_span_debug(module_path!(), &span);
            rule_candidates.push(span);
        }

        if over_budget {
            // One runaway pattern must not poison the call: drop this
            // rule's candidates entirely and keep going.
            warn!(
                "Rule '{}' exceeded its candidate budget ({}); dropping its matches for this call.",
                matcher.name, limits.max_candidates_per_rule
            );
            warnings.push(format!(
                "rule '{}' exceeded its candidate budget and was skipped for this call",
                matcher.name
            ));
            continue;
        }

        candidates.extend(rule_candidates);
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PatternConfig, PatternRule};
    use crate::category::PhiCategory;
    use crate::matchers::compiler::compile_matchers;

    fn limits() -> EngineLimits {
        EngineLimits::default()
    }

    fn email_rule() -> PatternRule {
        PatternRule {
            name: "email".to_string(),
            category: PhiCategory::Email,
            pattern: r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b".to_string(),
            priority: 80,
            base_confidence: 0.8,
            context_labels: Some("correo|e-?mail".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_detects_with_character_offsets() {
        let compiled = compile_matchers(&[email_rule()]).unwrap();
        // 'Ñ' is two bytes; char offsets must ignore that.
        let text = "Ñandú: ana@clinic.mx";
        let mut warnings = Vec::new();
        let spans = detect_spans(text, &compiled, &limits(), &mut warnings);

        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].raw_value, "ana@clinic.mx");
        assert_eq!(spans[0].start, 7);
        assert_eq!(spans[0].end, 20);
        assert!(spans[0].byte_start > spans[0].start);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_context_label_boosts_confidence() {
        let compiled = compile_matchers(&[email_rule()]).unwrap();
        let mut warnings = Vec::new();

        let plain = detect_spans("write to ana@clinic.mx", &compiled, &limits(), &mut warnings);
        let labeled = detect_spans("correo: ana@clinic.mx", &compiled, &limits(), &mut warnings);

        assert_eq!(plain[0].confidence, 0.8);
        assert!((labeled[0].confidence - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_is_capped() {
        let mut rule = email_rule();
        rule.base_confidence = 0.98;
        let compiled = compile_matchers(&[rule]).unwrap();
        let mut warnings = Vec::new();
        let spans = detect_spans("correo: ana@clinic.mx", &compiled, &limits(), &mut warnings);
        assert_eq!(spans[0].confidence, MAX_CONFIDENCE);
    }

    #[test]
    fn test_over_budget_rule_is_dropped_with_warning() {
        let rule = PatternRule {
            name: "digit".to_string(),
            category: PhiCategory::OtherUniqueId,
            pattern: r"\d".to_string(),
            base_confidence: 0.5,
            ..Default::default()
        };
        let compiled = compile_matchers(&[rule, email_rule()]).unwrap();
        let mut small = limits();
        small.max_candidates_per_rule = 3;

        let text = "1 2 3 4 5 ana@clinic.mx";
        let mut warnings = Vec::new();
        let spans = detect_spans(text, &compiled, &small, &mut warnings);

        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("digit"));
        // The email matcher still ran.
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].matcher, "email");
    }

    #[test]
    fn test_programmatic_validation_filters_matches() {
        let rule = PatternRule {
            name: "ssn".to_string(),
            category: PhiCategory::NationalId,
            pattern: r"\b\d{3}-\d{2}-\d{4}\b".to_string(),
            programmatic_validation: true,
            base_confidence: 0.9,
            ..Default::default()
        };
        let compiled = compile_matchers(&[rule]).unwrap();
        let mut warnings = Vec::new();
        let spans = detect_spans(
            "good 123-45-6789 bad 666-45-6789",
            &compiled,
            &limits(),
            &mut warnings,
        );
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].raw_value, "123-45-6789");
    }

    #[test]
    fn test_clinical_stop_terms_are_not_names() {
        let rule = PatternRule {
            name: "name_full_sequence".to_string(),
            category: PhiCategory::Name,
            pattern: r"\b[A-ZÁÉÍÓÚÜÑ][a-záéíóúüñ]+\s+[A-ZÁÉÍÓÚÜÑ][a-záéíóúüñ]+\b".to_string(),
            base_confidence: 0.6,
            ..Default::default()
        };
        let compiled = compile_matchers(&[rule]).unwrap();
        let mut warnings = Vec::new();
        let spans = detect_spans(
            "Dx: Diabetes Mellitus. Vista por Laura Mendes.",
            &compiled,
            &limits(),
            &mut warnings,
        );
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].raw_value, "Laura Mendes");
    }

    #[test]
    fn test_detection_is_deterministic() {
        let config = PatternConfig::load_default_patterns().unwrap();
        let compiled = compile_matchers(&config.rules).unwrap();
        let text = "Paciente con CURP GOGM850312MDFNRR05, tel +52 55 1234 5678.";
        let mut w1 = Vec::new();
        let mut w2 = Vec::new();
        let first = detect_spans(text, &compiled, &config.limits, &mut w1);
        let second = detect_spans(text, &compiled, &config.limits, &mut w2);
        assert_eq!(first, second);
    }
}
