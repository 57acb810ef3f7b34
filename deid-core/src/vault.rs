// deid-core/src/vault.rs
//! The Reversible Vault: authenticated encryption of the value↔token
//! table for authorized re-identification.
//!
//! Only active when a caller requests `reversible = true`. Every entry is
//! sealed with AES-256-GCM under a caller-supplied key resolved through
//! the [`KeyProvider`] collaborator; each entry gets a fresh 96-bit nonce
//! and keeps its 16-byte authentication tag detached so the export matches
//! the wire contract. Keys are zeroized on drop and are never cached by
//! the engine.
//!
//! Failure anywhere in this module is fail-closed: the facade aborts the
//! whole call rather than returning a partial token map.
//!
//! License: MIT OR APACHE 2.0

use aes_gcm::aead::{Aead, AeadCore, OsRng as AeadOsRng};
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use anyhow::Result;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::category::PhiCategory;
use crate::errors::DeidError;
use crate::tokenizer::TokenAssignment;

/// AES-GCM nonce length in bytes.
pub const AES_NONCE_LEN: usize = 12;
/// AES-GCM authentication tag length in bytes.
pub const AES_TAG_LEN: usize = 16;

/// An opaque reference to an encryption key held by the caller's key
/// management system. The engine never sees key material except through
/// [`KeyProvider::resolve`], and never stores the handle beyond the call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyHandle(pub String);

impl KeyHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

/// 32 bytes of AES-256 key material, zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecretKey([u8; 32]);

impl SecretKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Generates a fresh random key. Intended for tests and demos; real
    /// callers hold keys in their key management system.
    pub fn generate() -> Self {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        Self(key)
    }

    fn expose(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey([REDACTED])")
    }
}

/// Resolves opaque key handles to key material.
///
/// Implementations must be safe for concurrent use; resolution is the only
/// I/O the vault performs and is awaited before the CPU-bound pipeline
/// stages run.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    async fn resolve(&self, handle: &KeyHandle) -> Result<SecretKey>;
}

/// A `KeyProvider` backed by an in-memory map. Serves tests and
/// single-process callers that manage their own key bytes.
#[derive(Default)]
pub struct StaticKeyProvider {
    keys: HashMap<String, [u8; 32]>,
}

impl StaticKeyProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, handle: KeyHandle, key: [u8; 32]) {
        self.keys.insert(handle.0, key);
    }
}

impl Drop for StaticKeyProvider {
    fn drop(&mut self) {
        for (_, mut key) in self.keys.drain() {
            key.zeroize();
        }
    }
}

#[async_trait]
impl KeyProvider for StaticKeyProvider {
    async fn resolve(&self, handle: &KeyHandle) -> Result<SecretKey> {
        self.keys
            .get(&handle.0)
            .map(|k| SecretKey::from_bytes(*k))
            .ok_or_else(|| anyhow::anyhow!("unknown key handle '{}'", handle.0))
    }
}

/// One sealed token-map entry. All binary fields are base64.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenMapEntry {
    pub token: String,
    pub category: PhiCategory,
    pub ciphertext: String,
    pub nonce: String,
    pub auth_tag: String,
}

/// The exportable encrypted token map returned to the caller when
/// reversible mode is active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenMapExport {
    pub entries: Vec<TokenMapEntry>,
}

/// Seals every token assignment under `key`, producing the exportable
/// encrypted token map.
///
/// Each entry receives a fresh nonce; nonce uniqueness within the export
/// is enforced, not assumed.
pub fn seal_token_map(
    assignments: &[TokenAssignment],
    key: &SecretKey,
) -> Result<TokenMapExport, DeidError> {
    let cipher = Aes256Gcm::new_from_slice(key.expose())
        .map_err(|e| DeidError::Encryption(format!("failed to initialize cipher: {}", e)))?;

    let mut used_nonces: HashSet<[u8; AES_NONCE_LEN]> = HashSet::with_capacity(assignments.len());
    let mut entries = Vec::with_capacity(assignments.len());

    for assignment in assignments {
        let nonce = loop {
            let candidate = Aes256Gcm::generate_nonce(&mut AeadOsRng);
            let bytes: [u8; AES_NONCE_LEN] = candidate.into();
            if used_nonces.insert(bytes) {
                break candidate;
            }
        };

        let mut combined = cipher
            .encrypt(&nonce, assignment.raw_value.as_bytes())
            .map_err(|_| {
                DeidError::Encryption(format!(
                    "AES-GCM encryption failed for token '{}'",
                    assignment.token
                ))
            })?;

        // The AEAD implementation appends the tag; the export carries it
        // detached.
        if combined.len() < AES_TAG_LEN {
            return Err(DeidError::Encryption(
                "AES-GCM produced an undersized ciphertext".to_string(),
            ));
        }
        let tag = combined.split_off(combined.len() - AES_TAG_LEN);

        entries.push(TokenMapEntry {
            token: assignment.token.clone(),
            category: assignment.category,
            ciphertext: general_purpose::STANDARD.encode(&combined),
            nonce: general_purpose::STANDARD.encode(nonce),
            auth_tag: general_purpose::STANDARD.encode(&tag),
        });
    }

    Ok(TokenMapExport { entries })
}

/// Decrypts and authenticates every entry of an export, returning
/// `(token, original value)` pairs in entry order.
///
/// Any entry failing authentication fails the whole call: a partially
/// recovered map is worse than none.
pub fn open_token_map(
    export: &TokenMapExport,
    key: &SecretKey,
) -> Result<Vec<(String, String)>, DeidError> {
    let cipher = Aes256Gcm::new_from_slice(key.expose())
        .map_err(|e| DeidError::Encryption(format!("failed to initialize cipher: {}", e)))?;

    let mut recovered = Vec::with_capacity(export.entries.len());
    for entry in &export.entries {
        let nonce_bytes = general_purpose::STANDARD
            .decode(&entry.nonce)
            .map_err(|_| bad_entry(&entry.token, "nonce is not valid base64"))?;
        if nonce_bytes.len() != AES_NONCE_LEN {
            return Err(bad_entry(&entry.token, "nonce has the wrong length"));
        }
        let mut combined = general_purpose::STANDARD
            .decode(&entry.ciphertext)
            .map_err(|_| bad_entry(&entry.token, "ciphertext is not valid base64"))?;
        let tag = general_purpose::STANDARD
            .decode(&entry.auth_tag)
            .map_err(|_| bad_entry(&entry.token, "auth tag is not valid base64"))?;
        if tag.len() != AES_TAG_LEN {
            return Err(bad_entry(&entry.token, "auth tag has the wrong length"));
        }
        combined.extend_from_slice(&tag);

        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), combined.as_ref())
            .map_err(|_| bad_entry(&entry.token, "authentication failed"))?;
        let value = String::from_utf8(plaintext)
            .map_err(|_| bad_entry(&entry.token, "decrypted value is not valid UTF-8"))?;
        recovered.push((entry.token.clone(), value));
    }

    Ok(recovered)
}

fn bad_entry(token: &str, reason: &str) -> DeidError {
    DeidError::Encryption(format!("token map entry '{}': {}", token, reason))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assignment(token: &str, raw: &str) -> TokenAssignment {
        TokenAssignment {
            token: token.to_string(),
            category: PhiCategory::Name,
            raw_value: raw.to_string(),
        }
    }

    #[test]
    fn test_seal_and_open_round_trip() {
        let key = SecretKey::generate();
        let assignments = vec![
            assignment("[NAME_1]", "María González García"),
            assignment("[NAME_2]", "João da Silva"),
        ];
        let export = seal_token_map(&assignments, &key).unwrap();
        let recovered = open_token_map(&export, &key).unwrap();

        assert_eq!(recovered.len(), 2);
        assert_eq!(recovered[0], ("[NAME_1]".to_string(), "María González García".to_string()));
        assert_eq!(recovered[1], ("[NAME_2]".to_string(), "João da Silva".to_string()));
    }

    #[test]
    fn test_nonces_are_unique_per_entry() {
        let key = SecretKey::generate();
        let assignments: Vec<TokenAssignment> = (0..50)
            .map(|i| assignment(&format!("[NAME_{}]", i), "same value"))
            .collect();
        let export = seal_token_map(&assignments, &key).unwrap();

        let nonces: HashSet<&String> = export.entries.iter().map(|e| &e.nonce).collect();
        assert_eq!(nonces.len(), export.entries.len());
    }

    #[test]
    fn test_wrong_key_fails_closed() {
        let key = SecretKey::generate();
        let export = seal_token_map(&[assignment("[NAME_1]", "secret")], &key).unwrap();

        let other = SecretKey::generate();
        assert!(matches!(
            open_token_map(&export, &other),
            Err(DeidError::Encryption(_))
        ));
    }

    #[test]
    fn test_tampered_ciphertext_fails_authentication() {
        let key = SecretKey::generate();
        let mut export = seal_token_map(&[assignment("[NAME_1]", "secret")], &key).unwrap();

        let mut raw = general_purpose::STANDARD
            .decode(&export.entries[0].ciphertext)
            .unwrap();
        raw[0] ^= 0x01;
        export.entries[0].ciphertext = general_purpose::STANDARD.encode(&raw);

        assert!(open_token_map(&export, &key).is_err());
    }

    #[test]
    fn test_error_messages_carry_no_plaintext() {
        let key = SecretKey::generate();
        let export = seal_token_map(&[assignment("[NAME_1]", "very secret value")], &key).unwrap();
        let err = open_token_map(&export, &SecretKey::generate()).unwrap_err();
        assert!(!err.to_string().contains("very secret value"));
    }

    #[tokio::test]
    async fn test_static_key_provider_resolves_known_handles() {
        let mut provider = StaticKeyProvider::new();
        let handle = KeyHandle::new("doc-key-1");
        provider.insert(handle.clone(), [7u8; 32]);

        assert!(provider.resolve(&handle).await.is_ok());
        assert!(provider.resolve(&KeyHandle::new("missing")).await.is_err());
    }
}
