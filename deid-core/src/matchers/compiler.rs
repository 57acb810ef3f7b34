//! compiler.rs - Manages the compilation and caching of pattern rules.
//!
//! This module provides a thread-safe, cached mechanism to convert a
//! `PatternConfig` into `CompiledMatchers`, which are optimized for
//! efficient detection. It uses a global, shared cache to avoid
//! redundant compilation.
//!
//! A rule that fails to compile is skipped with a recorded warning rather
//! than failing the whole set: one bad pattern must not take the engine
//! down with it. The warnings travel with the compiled set so the facade
//! can surface them in response metadata.
//!
//! License: MIT OR APACHE 2.0

use lazy_static::lazy_static;
use log::{debug, warn};
use regex::{Regex, RegexBuilder};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, RwLock};

use crate::category::PhiCategory;
use crate::config::{PatternConfig, PatternRule, MAX_PATTERN_LENGTH};
use crate::errors::DeidError;

/// Represents a single compiled pattern rule.
///
/// This struct holds a compiled regular expression along with the metadata
/// detection needs: category, priority, base confidence, and the optional
/// context-label regex used for confidence boosting.
#[derive(Debug)]
pub struct CompiledMatcher {
    /// The compiled regular expression used for matching.
    pub regex: Regex,
    /// The compiled context-label regex, if the rule declares one.
    pub context: Option<Regex>,
    /// The unique name of the pattern rule.
    pub name: String,
    /// The Safe Harbor category this matcher detects.
    pub category: PhiCategory,
    /// Tie-break rank during overlap resolution.
    pub priority: u32,
    /// Confidence assigned before context boosting.
    pub base_confidence: f64,
    /// A flag indicating if matches require programmatic validation.
    pub programmatic_validation: bool,
}

/// Represents a collection of all compiled matchers for one configuration.
#[derive(Debug)]
pub struct CompiledMatchers {
    /// Matchers in deterministic scan order (priority descending, then name).
    pub matchers: Vec<CompiledMatcher>,
    /// Human-readable warnings for rules that were skipped at compile time.
    pub skipped: Vec<String>,
}

lazy_static! {
    /// A thread-safe, global cache for compiled matcher sets.
    /// The key is a hash of the `PatternConfig`.
    static ref COMPILED_MATCHERS_CACHE: RwLock<HashMap<u64, Arc<CompiledMatchers>>> =
        RwLock::new(HashMap::new());
}

/// Hashes the `PatternConfig` to create a stable, unique key for the cache.
///
/// To ensure determinism, the rules are sorted by name before hashing.
fn hash_config(config: &PatternConfig) -> u64 {
    let mut hasher = DefaultHasher::new();
    let mut rules_to_hash = config.rules.clone();

    rules_to_hash.sort_by(|a, b| a.name.cmp(&b.name));
    rules_to_hash.hash(&mut hasher);
    config.limits.hash(&mut hasher);
    config.token_format.hash(&mut hasher);
    hasher.finish()
}

fn compile_one(rule: &PatternRule) -> Result<CompiledMatcher, DeidError> {
    if rule.pattern.len() > MAX_PATTERN_LENGTH {
        return Err(DeidError::PatternLengthExceeded(
            rule.name.clone(),
            rule.pattern.len(),
            MAX_PATTERN_LENGTH,
        ));
    }

    let regex = RegexBuilder::new(&rule.pattern)
        .case_insensitive(rule.case_insensitive)
        .size_limit(10 * (1 << 20)) // 10 MB limit for compiled regex
        .build()
        .map_err(|e| DeidError::RuleCompilationError(rule.name.clone(), e))?;

    // Context labels are matched against prose preceding a candidate, so
    // they are always compiled case-insensitively.
    let context = match &rule.context_labels {
        Some(labels) => Some(
            RegexBuilder::new(labels)
                .case_insensitive(true)
                .build()
                .map_err(|e| DeidError::RuleCompilationError(rule.name.clone(), e))?,
        ),
        None => None,
    };

    Ok(CompiledMatcher {
        regex,
        context,
        name: rule.name.clone(),
        category: rule.category,
        priority: rule.priority,
        base_confidence: rule.base_confidence,
        programmatic_validation: rule.programmatic_validation,
    })
}

/// Compiles a list of `PatternRule`s into `CompiledMatchers`.
///
/// Disabled rules are ignored. Rules that fail to compile are skipped and
/// reported via `CompiledMatchers::skipped`; compilation succeeds as long
/// as at least one rule survives.
pub fn compile_matchers(rules_to_compile: &[PatternRule]) -> Result<CompiledMatchers, DeidError> {
    debug!("Starting compilation of {} rules.", rules_to_compile.len());

    let mut compiled = Vec::new();
    let mut skipped = Vec::new();

    for rule in rules_to_compile {
        if rule.enabled == Some(false) {
            debug!("Rule '{}' is disabled; skipping compilation.", rule.name);
            continue;
        }
        match compile_one(rule) {
            Ok(matcher) => compiled.push(matcher),
            Err(e) => {
                warn!("Skipping rule '{}': {}", rule.name, e);
                skipped.push(format!("rule '{}' disabled: {}", rule.name, e));
            }
        }
    }

    if compiled.is_empty() {
        return Err(DeidError::Config(format!(
            "No usable pattern rules: all {} rules were disabled or failed to compile.",
            rules_to_compile.len()
        )));
    }

    // Deterministic scan order: most specific first, name as total tie-break.
    compiled.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.name.cmp(&b.name)));

    debug!(
        "Finished compiling matchers. Compiled: {}, skipped: {}.",
        compiled.len(),
        skipped.len()
    );
    Ok(CompiledMatchers { matchers: compiled, skipped })
}

/// Gets a `CompiledMatchers` instance from the cache or compiles them if
/// not found.
///
/// This is the public entry point for retrieving compiled matchers. It
/// returns an `Arc` to a `CompiledMatchers` instance, allowing for cheap
/// sharing between concurrently running engine calls.
pub fn get_or_compile_matchers(config: &PatternConfig) -> Result<Arc<CompiledMatchers>, DeidError> {
    let cache_key = hash_config(config);

    {
        let cache = COMPILED_MATCHERS_CACHE.read().unwrap();
        if let Some(matchers) = cache.get(&cache_key) {
            debug!("Serving compiled matchers from cache for key: {}", &cache_key);
            return Ok(Arc::clone(matchers));
        }
    } // Read lock is released here.

    debug!("Compiled matchers not found in cache. Compiling now.");
    let compiled = compile_matchers(&config.rules)?;
    let compiled_arc = Arc::new(compiled);

    COMPILED_MATCHERS_CACHE
        .write()
        .unwrap()
        .insert(cache_key, Arc::clone(&compiled_arc));

    debug!("Successfully compiled and cached matchers for key: {}", &cache_key);
    Ok(compiled_arc)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(name: &str, pattern: &str, priority: u32) -> PatternRule {
        PatternRule {
            name: name.to_string(),
            pattern: pattern.to_string(),
            priority,
            base_confidence: 0.9,
            ..Default::default()
        }
    }

    #[test]
    fn test_compile_orders_by_priority_then_name() {
        let rules = vec![
            rule("generic", r"\d+", 10),
            rule("curp", r"[A-Z]{4}", 95),
            rule("aaa", r"x", 95),
        ];
        let compiled = compile_matchers(&rules).unwrap();
        let names: Vec<&str> = compiled.matchers.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["aaa", "curp", "generic"]);
    }

    #[test]
    fn test_compile_isolates_bad_rules() {
        let rules = vec![rule("good", r"\d+", 10), rule("broken", r"([", 10)];
        let compiled = compile_matchers(&rules).unwrap();
        assert_eq!(compiled.matchers.len(), 1);
        assert_eq!(compiled.skipped.len(), 1);
        assert!(compiled.skipped[0].contains("broken"));
    }

    #[test]
    fn test_compile_fails_when_nothing_survives() {
        let rules = vec![rule("broken", r"([", 10)];
        assert!(compile_matchers(&rules).is_err());
    }

    #[test]
    fn test_disabled_rules_are_not_compiled() {
        let mut disabled = rule("off", r"\d+", 10);
        disabled.enabled = Some(false);
        let rules = vec![rule("on", r"\w+", 10), disabled];
        let compiled = compile_matchers(&rules).unwrap();
        assert_eq!(compiled.matchers.len(), 1);
        assert_eq!(compiled.matchers[0].name, "on");
        assert!(compiled.skipped.is_empty());
    }

    #[test]
    fn test_cache_returns_same_instance() {
        let config = PatternConfig {
            rules: vec![rule("cached", r"\d{4}", 10)],
            ..Default::default()
        };
        let first = get_or_compile_matchers(&config).unwrap();
        let second = get_or_compile_matchers(&config).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
