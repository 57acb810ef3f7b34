// deid-core/src/audit.rs
//! The Audit Recorder: appends content-free transformation records to an
//! external audit sink.
//!
//! Audit writes are fail-open, the mirror image of the vault's
//! fail-closed stance: a sink failure or timeout must never withhold the
//! de-identified result from the caller, but it is surfaced as a warning
//! in the response metadata. Records never contain PHI; the only
//! input-derived field is a SHA-256 hash.
//!
//! License: MIT OR APACHE 2.0

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::warn;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;
use tokio::sync::Mutex;

/// How long the facade waits for a sink append before giving up on it.
pub const AUDIT_WRITE_TIMEOUT: Duration = Duration::from_secs(2);

/// A single, content-free record of one de-identification call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub timestamp: String,
    pub method: String,
    pub version: String,
    pub reversible: bool,
    pub total_detected: usize,
    pub request_id: String,
    /// SHA-256 of the input text; correlates records without storing
    /// content.
    pub input_hash: String,
}

/// An external audit destination.
///
/// Implementations must be safe for concurrent use. Appends are invoked
/// under [`AUDIT_WRITE_TIMEOUT`] and their failures downgraded to
/// warnings by the facade.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, record: &AuditRecord) -> Result<()>;
}

/// An `AuditSink` that POSTs records as JSON to an HTTP endpoint.
pub struct HttpAuditSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpAuditSink {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl AuditSink for HttpAuditSink {
    async fn append(&self, record: &AuditRecord) -> Result<()> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(record)
            .send()
            .await
            .context("audit sink request failed")?;

        if !resp.status().is_success() {
            warn!("Audit sink returned status {}.", resp.status());
            anyhow::bail!("audit sink returned status {}", resp.status());
        }
        Ok(())
    }
}

/// An in-memory `AuditSink` for tests and embedded callers.
#[derive(Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, record: &AuditRecord) -> Result<()> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }
}

/// SHA-256 hex digest of the input text.
pub fn input_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> AuditRecord {
        AuditRecord {
            timestamp: "2025-01-01T00:00:00Z".to_string(),
            method: "HIPAA_SAFE_HARBOR".to_string(),
            version: "0.1.0".to_string(),
            reversible: false,
            total_detected: 4,
            request_id: "req-1".to_string(),
            input_hash: input_hash("some clinical text"),
        }
    }

    #[tokio::test]
    async fn test_memory_sink_stores_records() {
        let sink = MemoryAuditSink::new();
        sink.append(&record()).await.unwrap();
        sink.append(&record()).await.unwrap();
        assert_eq!(sink.records().await.len(), 2);
    }

    #[test]
    fn test_input_hash_is_stable_and_content_free() {
        let a = input_hash("same text");
        let b = input_hash("same text");
        let c = input_hash("other text");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
        assert!(!a.contains("same"));
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let json = serde_json::to_string(&record()).unwrap();
        assert!(json.contains("\"totalDetected\":4"));
        assert!(json.contains("\"requestId\""));
        assert!(json.contains("\"inputHash\""));
    }
}
