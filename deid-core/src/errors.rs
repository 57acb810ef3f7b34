//! errors.rs - Custom error types for the deid-core library.
//!
//! This module defines a structured error enum for the library, providing
//! specific, actionable error types that can be handled programmatically.
//! Error messages identify rules and stages by name and never carry matched
//! text: nothing that reaches a caller's error channel or a log line may
//! contain PHI.
//!
//! License: MIT OR APACHE 2.0

use thiserror::Error;

/// This enum represents all possible error types in the `deid-core` library.
///
/// By using `#[non_exhaustive]`, we signal to consumers of this library that
/// new variants may be added in future versions. This prevents them from
/// matching all variants exhaustively, thus avoiding breaking changes.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DeidError {
    /// Empty input or input exceeding the configured maximum size. Raised
    /// before detection starts; the call performs no work.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A single matcher failed or blew its candidate budget. Normally this
    /// is isolated per matcher and surfaced as a response warning; the
    /// variant exists for the degenerate case where no matcher survives.
    #[error("Pattern engine failure in rule '{0}': {1}")]
    PatternEngine(String, String),

    /// Reversible mode was requested but the key could not be resolved, or
    /// sealing the token map failed. Fail-closed: the caller receives no
    /// redacted text and no partial token map.
    #[error("Encryption failure: {0}")]
    Encryption(String),

    /// An audit sink append failed. Never propagated out of the facade;
    /// converted into a `metadata.warnings` entry (fail-open).
    #[error("Audit write failure: {0}")]
    AuditWrite(String),

    #[error("Failed to compile pattern rule '{0}': {1}")]
    RuleCompilationError(String, regex::Error),

    #[error("Rule '{0}': pattern length ({1}) exceeds maximum allowed ({2})")]
    PatternLengthExceeded(String, usize, usize),

    /// Pattern configuration failed to load or validate.
    #[error("Pattern configuration error: {0}")]
    Config(String),

    #[error("An unexpected I/O error occurred: {0}")]
    IoError(#[from] std::io::Error),

    #[error("A critical system error occurred: {0}")]
    AnyhowWrapper(#[from] anyhow::Error),
}
