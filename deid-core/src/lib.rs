// deid-core/src/lib.rs
//! # Deid Core Library
//!
//! `deid-core` implements HIPAA Safe Harbor de-identification of clinical
//! free text. Given a text blob, it detects occurrences of the 18 Safe
//! Harbor identifier categories (with Spanish and Portuguese locale
//! variants), replaces each with a stable, non-reversible-by-default
//! token, optionally seals a reversible token map under authenticated
//! encryption, and reports a confidence-scored summary.
//!
//! The library is stateless across calls: all counters and tables live
//! within a single invocation, so many requests can run the engine in
//! parallel without coordination. It has no knowledge of screens, routes,
//! or sessions: callers hand it text and options and render the result.
//!
//! ## Modules
//!
//! * `category`: The closed set of Safe Harbor identifier categories.
//! * `config`: Declarative `PatternRule`s and `PatternConfig` for specifying identifier patterns.
//! * `matchers`: Compilation and caching of pattern rules.
//! * `validators`: Programmatic validation for specific identifier types (CURP, CPF, SSN, IMEI).
//! * `spans`: Data structures for detected identifier occurrences and PHI-safe logging.
//! * `detector`: The span detector (character offsets, context boosting, matcher isolation).
//! * `resolver`: Deterministic overlap resolution.
//! * `tokenizer`: Stable per-category token minting and replacement.
//! * `vault`: The reversible token map, sealed with AES-256-GCM.
//! * `summary`: Confidence aggregation and per-category counts.
//! * `audit`: Content-free audit records and the external sink seam.
//! * `engine`: The `SafeHarborEngine` facade composing the fixed pipeline.
//! * `headless`: Convenience wrappers for one-shot, non-reversible use.
//!
//! ## Usage Example
//!
//! ```rust
//! use deid_core::deidentify_text;
//! use anyhow::Result;
//!
//! fn main() -> Result<()> {
//!     let input = "Paciente María González García, correo maria.gonzalez@correo.mx.";
//!     let response = deidentify_text(input)?;
//!
//!     assert!(!response.deidentified.contains("maria.gonzalez@correo.mx"));
//!     println!("{}", response.deidentified);
//!     println!("detected: {}", response.summary.total_detected);
//!     Ok(())
//! }
//! ```
//!
//! ## Failure Semantics
//!
//! Reversible mode is fail-closed: if the caller's key cannot be resolved
//! or any entry fails to seal, the whole call errors and no redacted text
//! is returned. Audit writes are fail-open: sink failures become
//! `metadata.warnings` and never withhold the result. A single
//! misbehaving pattern rule is isolated and skipped, never fatal.
//!
//! PHI never appears in error messages or log output; debug logging of
//! matched values is gated behind the `DEID_ALLOW_DEBUG_PII` environment
//! variable and redacted otherwise.
//!
//! ## Design Principles
//!
//! * **Flat matcher library:** patterns are independent, declarative
//!   rules tagged by category, with no matcher class hierarchy.
//! * **Stateless:** no module-level mutable state; per-call state flows
//!   through the pipeline explicitly.
//! * **Explicit keys:** encryption keys are resolved per call through an
//!   opaque handle and zeroized after use, never embedded or cached.
//! * **Deterministic:** identical input and configuration produce
//!   byte-identical redacted output and summaries.
//!
//! ---
//! License: MIT OR Apache-2.0

// All modules must be declared before they can be used.
pub mod audit;
pub mod category;
pub mod config;
pub mod detector;
pub mod engine;
pub mod errors;
pub mod headless;
pub mod matchers;
pub mod resolver;
pub mod spans;
pub mod summary;
pub mod tokenizer;
pub mod validators;
pub mod vault;

/// Re-exports the category vocabulary shared by rules, spans, and tokens.
pub use category::{PhiCategory, ALL_CATEGORIES};

/// Re-exports the public configuration types and functions for managing
/// pattern rules.
pub use config::{merge_patterns, EngineLimits, PatternConfig, PatternRule, MAX_PATTERN_LENGTH};

/// Re-exports the custom error type for clear error reporting.
pub use errors::DeidError;

/// Re-exports the engine facade and its request/response types.
pub use engine::{
    DeidOptions, DeidResponse, ResponseMetadata, SafeHarborEngine, DEID_METHOD, ENGINE_VERSION,
};

/// Re-exports types for detected spans and PHI-safe reporting.
pub use spans::{canonical_sample_hash, redact_sensitive, DetectedSpan};

/// Re-exports the detection summary.
pub use summary::Summary;

/// Re-exports the tokenizer's public pieces.
pub use tokenizer::{format_token, normalize_value, TokenAssignment, DEFAULT_TOKEN_FORMAT};

/// Re-exports the reversible vault surface.
pub use vault::{
    open_token_map, seal_token_map, KeyHandle, KeyProvider, SecretKey, StaticKeyProvider,
    TokenMapEntry, TokenMapExport,
};

/// Re-exports the audit recorder surface.
pub use audit::{AuditRecord, AuditSink, HttpAuditSink, MemoryAuditSink};

/// Re-exports types and functions for one-shot, non-interactive use.
pub use headless::deidentify_text;

// Re-export key types from the matchers::compiler module for advanced
// usage (inspection of the compiled rule set).
pub use matchers::compiler::{compile_matchers, CompiledMatcher, CompiledMatchers};
