// deid-core/src/engine.rs
//! The API facade: one stateless transform composing detection,
//! resolution, tokenization, the optional vault, aggregation, and audit
//! into a single call.
//!
//! The pipeline is fixed (Detect, Resolve, Tokenize with optional Vault,
//! Aggregate, Audit, Respond) and every invocation is fully
//! self-contained: counters and tables are per-call locals, so any number
//! of calls may run concurrently over one engine. The response is
//! assembled only after every stage completes; a caller cancelling the
//! future never observes a half-redacted document.
//!
//! License: MIT OR APACHE 2.0

use chrono::Utc;
use log::{debug, info};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::audit::{input_hash, AuditRecord, AuditSink, AUDIT_WRITE_TIMEOUT};
use crate::config::PatternConfig;
use crate::detector::detect_spans;
use crate::errors::DeidError;
use crate::matchers::compiler::{get_or_compile_matchers, CompiledMatchers};
use crate::resolver::resolve_spans;
use crate::spans::DetectedSpan;
use crate::summary::{aggregate, Summary};
use crate::tokenizer::{tokenize_spans, TokenTable};
use crate::vault::{seal_token_map, KeyProvider, SecretKey, TokenMapExport};

/// The de-identification method recorded on every response and audit record.
pub const DEID_METHOD: &str = "HIPAA_SAFE_HARBOR";

/// Engine version, stamped into responses and audit records.
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct DeidOptions {
    /// Produce an encrypted, reversible token map. Requires `key` and a
    /// configured [`KeyProvider`]; fails closed when either is missing.
    pub reversible: bool,
    /// Append a content-free [`AuditRecord`] to the configured sink.
    pub audit_log: bool,
    /// Opaque handle to the encryption key for reversible mode.
    pub key: Option<crate::vault::KeyHandle>,
    /// Stable per-document/session seed. When present, identical values
    /// receive identical tokens across calls sharing the seed.
    pub session_seed: Option<String>,
}

/// Response envelope metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub method: String,
    pub version: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<String>>,
}

/// The result of one de-identification call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeidResponse {
    pub deidentified: String,
    pub summary: Summary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_map_export: Option<TokenMapExport>,
    pub metadata: ResponseMetadata,
}

/// The HIPAA Safe Harbor de-identification engine.
///
/// Construction compiles (or fetches from cache) the pattern library;
/// the engine itself is immutable afterwards and safe to share across
/// threads. External collaborators (key provider and audit sink) are
/// optional and must themselves be `Send + Sync`.
pub struct SafeHarborEngine {
    config: PatternConfig,
    matchers: Arc<CompiledMatchers>,
    key_provider: Option<Arc<dyn KeyProvider>>,
    audit_sink: Option<Arc<dyn AuditSink>>,
}

impl SafeHarborEngine {
    /// Builds an engine over the given pattern configuration.
    pub fn new(config: PatternConfig) -> Result<Self, DeidError> {
        let matchers = get_or_compile_matchers(&config)?;
        info!(
            "SafeHarborEngine ready: {} matchers compiled, {} skipped.",
            matchers.matchers.len(),
            matchers.skipped.len()
        );
        Ok(Self {
            config,
            matchers,
            key_provider: None,
            audit_sink: None,
        })
    }

    /// Builds an engine over the built-in Safe Harbor pattern library.
    pub fn with_default_patterns() -> Result<Self, DeidError> {
        let config = PatternConfig::load_default_patterns()
            .map_err(|e| DeidError::Config(e.to_string()))?;
        Self::new(config)
    }

    pub fn with_key_provider(mut self, provider: Arc<dyn KeyProvider>) -> Self {
        self.key_provider = Some(provider);
        self
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = Some(sink);
        self
    }

    /// Returns a reference to the engine's configuration.
    pub fn get_config(&self) -> &PatternConfig {
        &self.config
    }

    fn validate_input(&self, content: &str) -> Result<(), DeidError> {
        if content.trim().is_empty() {
            return Err(DeidError::InvalidInput("input text is empty".to_string()));
        }
        let max = self.config.limits.max_input_bytes;
        if content.len() > max {
            return Err(DeidError::InvalidInput(format!(
                "input of {} bytes exceeds the configured maximum of {} bytes",
                content.len(),
                max
            )));
        }
        Ok(())
    }

    /// Detection and resolution only: the final non-overlapping span list,
    /// without redacting anything. Spans carry raw matched values; callers
    /// presenting them (e.g. a review UI) must not log them.
    pub fn detect(&self, content: &str) -> Result<Vec<DetectedSpan>, DeidError> {
        self.validate_input(content)?;
        let mut warnings = Vec::new();
        let candidates = detect_spans(content, &self.matchers, &self.config.limits, &mut warnings);
        Ok(resolve_spans(candidates))
    }

    /// The synchronous CPU-bound stages shared by `scrub` and `deidentify`.
    fn run_pipeline(
        &self,
        content: &str,
        session_seed: Option<&str>,
    ) -> Result<(String, Vec<DetectedSpan>, TokenTable, Vec<String>), DeidError> {
        let mut warnings: Vec<String> = self.matchers.skipped.clone();

        let candidates = detect_spans(content, &self.matchers, &self.config.limits, &mut warnings);
        debug!("Detection produced {} candidates.", candidates.len());

        let resolved = resolve_spans(candidates);
        debug!("Resolution kept {} spans.", resolved.len());

        let (redacted, table) = tokenize_spans(
            content,
            &resolved,
            self.config.token_format.as_deref(),
            session_seed,
        )?;

        Ok((redacted, resolved, table, warnings))
    }

    /// One-shot, non-reversible, non-audited de-identification.
    ///
    /// Pure CPU work: no key resolution, no audit I/O. The per-call token
    /// table is dropped (and zeroized) before this returns.
    pub fn scrub(&self, content: &str) -> Result<DeidResponse, DeidError> {
        self.validate_input(content)?;
        let (redacted, resolved, table, warnings) =
            self.run_pipeline(content, None)?;
        drop(table);

        Ok(DeidResponse {
            deidentified: redacted,
            summary: aggregate(&resolved),
            token_map_export: None,
            metadata: self.metadata(warnings),
        })
    }

    /// The full stateless transform.
    ///
    /// Reversible mode resolves the caller's key handle before the CPU
    /// stages run and fails closed on any key or encryption problem: no
    /// redacted text, no partial token map. Audit failures fail open into
    /// `metadata.warnings`.
    pub async fn deidentify(
        &self,
        content: &str,
        options: &DeidOptions,
    ) -> Result<DeidResponse, DeidError> {
        self.validate_input(content)?;

        let key: Option<SecretKey> = if options.reversible {
            Some(self.resolve_key(options).await?)
        } else {
            None
        };

        let (redacted, resolved, table, mut warnings) =
            self.run_pipeline(content, options.session_seed.as_deref())?;

        let token_map_export: Option<TokenMapExport> = match &key {
            Some(key) => Some(seal_token_map(table.assignments(), key)?),
            None => None,
        };
        // In non-reversible mode raw values must not outlive tokenization.
        drop(table);

        let summary = aggregate(&resolved);

        if options.audit_log {
            self.record_audit(content, options, &summary, &mut warnings).await;
        }

        Ok(DeidResponse {
            deidentified: redacted,
            summary,
            token_map_export,
            metadata: self.metadata(warnings),
        })
    }

    async fn resolve_key(&self, options: &DeidOptions) -> Result<SecretKey, DeidError> {
        let handle = options.key.as_ref().ok_or_else(|| {
            DeidError::Encryption("reversible mode requires a key handle".to_string())
        })?;
        let provider = self.key_provider.as_ref().ok_or_else(|| {
            DeidError::Encryption("reversible mode requires a configured key provider".to_string())
        })?;
        provider.resolve(handle).await.map_err(|e| {
            DeidError::Encryption(format!("key resolution failed for handle '{}': {}", handle.0, e))
        })
    }

    /// Appends the audit record, downgrading every failure to a warning.
    async fn record_audit(
        &self,
        content: &str,
        options: &DeidOptions,
        summary: &Summary,
        warnings: &mut Vec<String>,
    ) {
        let Some(sink) = &self.audit_sink else {
            warnings.push("audit logging requested but no audit sink is configured".to_string());
            return;
        };

        let record = AuditRecord {
            timestamp: Utc::now().to_rfc3339(),
            method: DEID_METHOD.to_string(),
            version: ENGINE_VERSION.to_string(),
            reversible: options.reversible,
            total_detected: summary.total_detected,
            request_id: Uuid::new_v4().to_string(),
            input_hash: input_hash(content),
        };

        match tokio::time::timeout(AUDIT_WRITE_TIMEOUT, sink.append(&record)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let err = DeidError::AuditWrite(e.to_string());
                log::warn!("{}", err);
                warnings.push(err.to_string());
            }
            Err(_) => {
                let err = DeidError::AuditWrite(format!(
                    "audit sink did not respond within {:?}",
                    AUDIT_WRITE_TIMEOUT
                ));
                log::warn!("{}", err);
                warnings.push(err.to_string());
            }
        }
    }

    fn metadata(&self, warnings: Vec<String>) -> ResponseMetadata {
        ResponseMetadata {
            method: DEID_METHOD.to_string(),
            version: ENGINE_VERSION.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            warnings: if warnings.is_empty() { None } else { Some(warnings) },
        }
    }
}
