//! Configuration management for `deid-core`.
//!
//! This module defines the declarative side of the identifier pattern
//! library: [`PatternRule`]s describing how each Safe Harbor category is
//! recognized, and [`PatternConfig`] which bundles the rules with engine
//! limits. It handles serialization/deserialization of YAML configurations
//! and provides utilities for loading, merging, and validating these
//! configs.
//!
//! The built-in library (`config/default_patterns.yaml`) covers all 18
//! Safe Harbor categories with Spanish and Portuguese locale variants.
//! Callers may overlay their own rules on top of it by name.
//!
//! License: MIT OR Apache-2.0

use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::path::Path;

use crate::category::PhiCategory;

/// Maximum allowed length for a regex pattern string.
pub const MAX_PATTERN_LENGTH: usize = 500;

/// Represents a single declarative matcher for one PHI category.
///
/// Rules are pure data; the `matchers::compiler` module turns them into
/// compiled regexes. Higher `priority` wins ties during overlap
/// resolution, so specific shapes (CURP, VIN, IMEI) outrank generic
/// numeric matchers.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PatternRule {
    /// Unique identifier for the rule (e.g., "curp").
    pub name: String,
    /// The Safe Harbor category this rule detects.
    pub category: PhiCategory,
    /// Human-readable description of what the rule targets.
    pub description: Option<String>,
    /// The regex pattern string.
    pub pattern: String,
    /// Locale hint ("es", "pt") or `None` for locale-independent rules.
    pub locale: Option<String>,
    /// Tie-break rank during overlap resolution; higher is more specific.
    pub priority: u32,
    /// Confidence assigned to a bare match, before context boosting.
    pub base_confidence: f64,
    /// Regex matched against the window preceding a candidate; a hit
    /// boosts the candidate's confidence (e.g. "Tel:" before a number).
    pub context_labels: Option<String>,
    /// If true, the pattern is compiled case-insensitively.
    pub case_insensitive: bool,
    /// If true, matches are additionally checked by `validators` (CURP
    /// check digit, CPF check digits, SSN structure, IMEI Luhn).
    pub programmatic_validation: bool,
    /// Explicit override for enabling/disabling the rule.
    pub enabled: Option<bool>,
    pub version: String,
}

impl Default for PatternRule {
    fn default() -> Self {
        Self {
            name: String::new(),
            category: PhiCategory::OtherUniqueId,
            description: None,
            pattern: String::new(),
            locale: None,
            priority: 10,
            base_confidence: 0.5,
            context_labels: None,
            case_insensitive: false,
            programmatic_validation: false,
            enabled: None,
            version: "1.0.0".to_string(),
        }
    }
}

impl Hash for PatternRule {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.category.hash(state);
        self.description.hash(state);
        self.pattern.hash(state);
        self.locale.hash(state);
        self.priority.hash(state);
        self.base_confidence.to_bits().hash(state);
        self.context_labels.hash(state);
        self.case_insensitive.hash(state);
        self.programmatic_validation.hash(state);
        self.enabled.hash(state);
        self.version.hash(state);
    }
}

/// Per-call resource limits enforced by the detection stage.
#[derive(Debug, Clone, PartialEq, Hash, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineLimits {
    /// Inputs larger than this are rejected before detection.
    pub max_input_bytes: usize,
    /// How many characters before a candidate are scanned for context labels.
    pub context_window: usize,
    /// A rule producing more candidates than this is dropped for the call.
    pub max_candidates_per_rule: usize,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            max_input_bytes: 1 << 20,
            context_window: 32,
            max_candidates_per_rule: 2_000,
        }
    }
}

/// Represents the top-level configuration structure for the engine.
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct PatternConfig {
    /// The declarative matcher library.
    pub rules: Vec<PatternRule>,
    /// Detection-stage resource limits.
    #[serde(default)]
    pub limits: EngineLimits,
    /// Optional token template overriding `[{category}_{index}]`.
    #[serde(default)]
    pub token_format: Option<String>,
}

impl PatternConfig {
    /// Loads pattern rules from a YAML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading custom pattern rules from: {}", path.display());
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pattern config file {}", path.display()))?;
        let config: PatternConfig = serde_yml::from_str(&text)
            .with_context(|| format!("Failed to parse pattern config file {}", path.display()))?;

        validate_rules(&config.rules)?;
        info!("Loaded {} rules from file {}.", config.rules.len(), path.display());

        Ok(config)
    }

    /// Loads the built-in Safe Harbor pattern library from the embedded
    /// configuration.
    pub fn load_default_patterns() -> Result<Self> {
        debug!("Loading default patterns from embedded string...");
        let default_yaml = include_str!("../config/default_patterns.yaml");
        let config: PatternConfig =
            serde_yml::from_str(default_yaml).context("Failed to parse default patterns")?;

        validate_rules(&config.rules)?;
        debug!("Loaded {} default pattern rules.", config.rules.len());
        Ok(config)
    }

    /// Filters active rules based on enable/disable lists provided by the
    /// caller. Unknown names are warned about, not treated as errors.
    pub fn set_active_rules(&mut self, enable_rules: &[String], disable_rules: &[String]) {
        let enable_set: HashSet<&str> = enable_rules.iter().map(String::as_str).collect();
        let disable_set: HashSet<&str> = disable_rules.iter().map(String::as_str).collect();

        debug!("Initial rules count before filtering: {}", self.rules.len());

        let all_rule_names: HashSet<&str> = self.rules.iter().map(|r| r.name.as_str()).collect();

        for rule_name in enable_set.difference(&all_rule_names) {
            warn!("Rule '{}' in `enable_rules` list does not exist.", rule_name);
        }

        for rule_name in disable_set.difference(&all_rule_names) {
            warn!("Rule '{}' in `disable_rules` list does not exist.", rule_name);
        }

        for rule in self.rules.iter_mut() {
            if disable_set.contains(rule.name.as_str()) {
                rule.enabled = Some(false);
            } else if enable_set.contains(rule.name.as_str()) {
                rule.enabled = Some(true);
            }
        }
    }

    /// The set of categories this configuration can detect.
    pub fn covered_categories(&self) -> HashSet<PhiCategory> {
        self.rules
            .iter()
            .filter(|r| r.enabled != Some(false))
            .map(|r| r.category)
            .collect()
    }
}

/// Merges user-defined rules and limits with the defaults.
///
/// User rules replace default rules of the same name. The merged rule list
/// is sorted by name so downstream compilation and detection order is
/// deterministic regardless of map iteration order.
pub fn merge_patterns(
    default_config: PatternConfig,
    user_config: Option<PatternConfig>,
) -> PatternConfig {
    debug!(
        "merge_patterns called. Initial default rules count: {}",
        default_config.rules.len()
    );

    let mut final_rules_map: HashMap<String, PatternRule> = default_config
        .rules
        .into_iter()
        .map(|rule| (rule.name.clone(), rule))
        .collect();

    let mut final_limits = default_config.limits;
    let mut final_token_format = default_config.token_format;

    if let Some(user_cfg) = user_config {
        debug!("User config provided. Merging {} user rules.", user_cfg.rules.len());
        for user_rule in user_cfg.rules {
            final_rules_map.insert(user_rule.name.clone(), user_rule);
        }
        if user_cfg.limits != EngineLimits::default() {
            debug!("Overriding engine limits with user values.");
            final_limits = user_cfg.limits;
        }
        if user_cfg.token_format.is_some() {
            final_token_format = user_cfg.token_format;
        }
    }

    let mut final_rules: Vec<PatternRule> = final_rules_map.into_values().collect();
    final_rules.sort_by(|a, b| a.name.cmp(&b.name));
    debug!("Final total rules after merge: {}", final_rules.len());

    PatternConfig {
        rules: final_rules,
        limits: final_limits,
        token_format: final_token_format,
    }
}

/// Validates rule integrity (unique names, compilable patterns, sane
/// confidence values).
pub(crate) fn validate_rules(rules: &[PatternRule]) -> Result<()> {
    let mut rule_names = HashSet::new();
    let mut errors = Vec::new();

    for rule in rules {
        if rule.name.is_empty() {
            errors.push("A rule has an empty `name` field.".to_string());
        } else if !rule_names.insert(rule.name.clone()) {
            errors.push(format!("Duplicate rule name found: '{}'.", rule.name));
        }

        if rule.pattern.is_empty() {
            errors.push(format!("Rule '{}' has an empty `pattern` field.", rule.name));
            continue;
        }

        if rule.pattern.len() > MAX_PATTERN_LENGTH {
            errors.push(format!(
                "Rule '{}': pattern length ({}) exceeds maximum allowed ({}).",
                rule.name,
                rule.pattern.len(),
                MAX_PATTERN_LENGTH
            ));
            continue;
        }

        if let Err(e) = Regex::new(&rule.pattern) {
            errors.push(format!("Rule '{}' has an invalid regex pattern: {}", rule.name, e));
        }

        if let Some(labels) = &rule.context_labels {
            if let Err(e) = Regex::new(labels) {
                errors.push(format!(
                    "Rule '{}' has an invalid `context_labels` pattern: {}",
                    rule.name, e
                ));
            }
        }

        if !(rule.base_confidence > 0.0 && rule.base_confidence <= 1.0) {
            errors.push(format!(
                "Rule '{}': `base_confidence` must be in (0, 1], got {}.",
                rule.name, rule.base_confidence
            ));
        }
    }

    if !errors.is_empty() {
        let full_error_message = format!("Rule validation failed:\n{}", errors.join("\n"));
        Err(anyhow!(full_error_message))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(name: &str, pattern: &str) -> PatternRule {
        PatternRule {
            name: name.to_string(),
            pattern: pattern.to_string(),
            category: PhiCategory::Email,
            base_confidence: 0.9,
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_rejects_duplicate_names() {
        let rules = vec![rule("email", r"a@b"), rule("email", r"c@d")];
        assert!(validate_rules(&rules).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_regex() {
        let rules = vec![rule("broken", r"([unclosed")];
        assert!(validate_rules(&rules).is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_confidence() {
        let mut bad = rule("email", r"a@b");
        bad.base_confidence = 1.5;
        assert!(validate_rules(&[bad]).is_err());
    }

    #[test]
    fn test_merge_replaces_rule_by_name() {
        let default_cfg = PatternConfig {
            rules: vec![rule("email", r"a@b"), rule("phone", r"\d+")],
            ..Default::default()
        };
        let user_cfg = PatternConfig {
            rules: vec![rule("email", r"override@pattern")],
            ..Default::default()
        };

        let merged = merge_patterns(default_cfg, Some(user_cfg));
        assert_eq!(merged.rules.len(), 2);
        let email = merged.rules.iter().find(|r| r.name == "email").unwrap();
        assert_eq!(email.pattern, "override@pattern");
    }

    #[test]
    fn test_merge_output_is_sorted_by_name() {
        let default_cfg = PatternConfig {
            rules: vec![rule("zeta", r"z"), rule("alpha", r"a")],
            ..Default::default()
        };
        let merged = merge_patterns(default_cfg, None);
        let names: Vec<&str> = merged.rules.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_set_active_rules_disables_by_name() {
        let mut cfg = PatternConfig {
            rules: vec![rule("email", r"a@b"), rule("phone", r"\d+")],
            ..Default::default()
        };
        cfg.set_active_rules(&[], &["phone".to_string()]);
        let phone = cfg.rules.iter().find(|r| r.name == "phone").unwrap();
        assert_eq!(phone.enabled, Some(false));
        assert!(!cfg.covered_categories().is_empty());
    }
}
