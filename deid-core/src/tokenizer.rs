// deid-core/src/tokenizer.rs
//! The Tokenizer: replaces resolved spans with stable per-category tokens
//! and maintains the per-call value→token table.
//!
//! Token text follows the `[{category}_{index}]` template by default;
//! the template is configurable through `PatternConfig::token_format`.
//! When the caller supplies a session seed, the numeric index is replaced
//! by an HMAC-derived short hash so that identical values receive
//! identical tokens across calls made under the same seed.
//!
//! Normalization before table lookup is deliberately minimal (trim and
//! Unicode lowercase): collapsing accent or spacing variants risks
//! merging genuinely distinct identifiers.
//!
//! License: MIT OR APACHE 2.0

use anyhow::{anyhow, Context, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::{HashMap, HashSet};
use tinytemplate::TinyTemplate;
use zeroize::Zeroize;

use crate::category::PhiCategory;
use crate::errors::DeidError;
use crate::spans::DetectedSpan;

type HmacSha256 = Hmac<Sha256>;

/// The default token template.
pub const DEFAULT_TOKEN_FORMAT: &str = "[{category}_{index}]";

/// The token template applied when a session seed is in effect and no
/// explicit format was configured.
pub const SEEDED_TOKEN_FORMAT: &str = "[{category}_{shorthash}]";

// Domain separator for session-seed HMAC derivation.
const TOKEN_SEED_SALT: &[u8] = b"deid-core-token-seed-v1";

/// One minted token and the raw value it stands for.
///
/// `raw_value` is PHI; assignments only ever flow into the reversible
/// vault or get zeroized with the table.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenAssignment {
    pub token: String,
    pub category: PhiCategory,
    pub raw_value: String,
}

/// The per-call value→token table.
///
/// Lives strictly within one engine invocation. Dropping the table
/// zeroizes every raw value and normalized key it holds, so PHI does not
/// linger in memory after the tokenization stage in non-reversible calls.
#[derive(Debug, Default)]
pub struct TokenTable {
    entries: HashMap<(PhiCategory, String), String>,
    counters: HashMap<PhiCategory, usize>,
    minted_tokens: HashSet<String>,
    minted: Vec<TokenAssignment>,
}

impl TokenTable {
    /// Assignments in minting order, for the reversible vault.
    pub fn assignments(&self) -> &[TokenAssignment] {
        &self.minted
    }

    /// Number of distinct tokens minted this call.
    pub fn len(&self) -> usize {
        self.minted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.minted.is_empty()
    }

    fn lookup(&self, category: PhiCategory, normalized: &str) -> Option<&String> {
        self.entries.get(&(category, normalized.to_string()))
    }
}

impl Drop for TokenTable {
    fn drop(&mut self) {
        for ((_category, mut normalized), mut token) in self.entries.drain() {
            normalized.zeroize();
            token.zeroize();
        }
        for assignment in self.minted.iter_mut() {
            assignment.raw_value.zeroize();
        }
    }
}

/// How token suffixes are generated for this call.
enum SuffixMode {
    /// Per-category monotonically increasing counter.
    Counter,
    /// HMAC over `(category, normalized value)` under a derived seed, so
    /// token assignment is stable across calls sharing the seed.
    Seeded(Vec<u8>),
}

pub(crate) struct TokenMinter<'a> {
    format: &'a str,
    mode: SuffixMode,
}

#[derive(serde::Serialize)]
struct TokenContext<'a> {
    category: &'a str,
    index: usize,
    shorthash: &'a str,
}

impl<'a> TokenMinter<'a> {
    pub(crate) fn new(configured_format: Option<&'a str>, session_seed: Option<&str>) -> Result<Self> {
        let mode = match session_seed {
            Some(seed) => SuffixMode::Seeded(derive_token_seed(seed)?),
            None => SuffixMode::Counter,
        };
        let format = configured_format.unwrap_or(match mode {
            SuffixMode::Counter => DEFAULT_TOKEN_FORMAT,
            SuffixMode::Seeded(_) => SEEDED_TOKEN_FORMAT,
        });
        Ok(Self { format, mode })
    }

    /// Returns the existing token for `(category, value)` or mints a new
    /// one, recording the assignment in `table`.
    fn token_for(
        &self,
        table: &mut TokenTable,
        category: PhiCategory,
        raw_value: &str,
    ) -> Result<String> {
        let normalized = normalize_value(raw_value);
        if let Some(existing) = table.lookup(category, &normalized) {
            return Ok(existing.clone());
        }

        let index = table.counters.entry(category).or_insert(0);
        *index += 1;
        let index = *index;

        let token = match &self.mode {
            SuffixMode::Counter => {
                format_token(self.format, category.as_str(), index, "")?
            }
            SuffixMode::Seeded(seed) => {
                self.mint_seeded(&table.minted_tokens, seed, category, &normalized, index)?
            }
        };

        if !table.minted_tokens.insert(token.clone()) {
            // Counter tokens cannot collide; this guards custom formats
            // that ignore both {index} and {shorthash}.
            return Err(anyhow!(
                "token format '{}' produced a duplicate token for category {}",
                self.format,
                category
            ));
        }

        table
            .entries
            .insert((category, normalized), token.clone());
        table.minted.push(TokenAssignment {
            token: token.clone(),
            category,
            raw_value: raw_value.to_string(),
        });
        Ok(token)
    }

    /// Seeded minting: start from an 8-hex-char HMAC prefix and widen
    /// until the token is unique within the call.
    fn mint_seeded(
        &self,
        minted: &HashSet<String>,
        seed: &[u8],
        category: PhiCategory,
        normalized: &str,
        index: usize,
    ) -> Result<String> {
        let full_hash = token_value_hash(seed, category.as_str(), normalized)?;
        for width in [8usize, 12, 16, 24, 32, full_hash.len()] {
            let candidate = format_token(self.format, category.as_str(), index, &full_hash[..width])?;
            if !minted.contains(&candidate) {
                return Ok(candidate);
            }
        }
        Err(anyhow!(
            "exhausted token hash widths for category {}; seeded format cannot disambiguate",
            category
        ))
    }
}

/// Normalizes a raw value for table lookup: trim and Unicode lowercase.
pub fn normalize_value(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Derives the token-table seed from the caller's session seed string.
pub(crate) fn derive_token_seed(session_seed: &str) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(TOKEN_SEED_SALT)
        .map_err(|e| anyhow!("Failed to create HMAC: {}", e))?;
    mac.update(session_seed.trim().as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

fn token_value_hash(seed: &[u8], category: &str, normalized: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(seed)
        .map_err(|e| anyhow!("Failed to create HMAC from token seed: {}", e))?;
    mac.update(category.as_bytes());
    mac.update(b":");
    mac.update(normalized.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Renders one token through the configured template.
pub fn format_token(token_fmt: &str, category: &str, index: usize, shorthash: &str) -> Result<String> {
    let mut tt = TinyTemplate::new();
    tt.add_template("t", token_fmt)
        .context("Failed to parse token template")?;
    let ctx = TokenContext { category, index, shorthash };
    tt.render("t", &ctx)
        .map_err(|e| anyhow!("Failed to render token template: {}", e))
}

/// Walks resolved spans in order, replacing each with its token, and
/// returns the redacted text together with the per-call token table.
///
/// `spans` must already be resolved (non-overlapping, offset-ordered);
/// byte offsets are trusted to lie on character boundaries of `content`.
pub fn tokenize_spans(
    content: &str,
    spans: &[DetectedSpan],
    configured_format: Option<&str>,
    session_seed: Option<&str>,
) -> Result<(String, TokenTable), DeidError> {
    let minter = TokenMinter::new(configured_format, session_seed)
        .map_err(|e| DeidError::Config(format!("invalid token format: {}", e)))?;

    let mut table = TokenTable::default();
    let mut redacted = String::with_capacity(content.len());
    let mut last_end = 0usize;

    for span in spans {
        debug_assert!(span.byte_start >= last_end);
        let token = minter
            .token_for(&mut table, span.category, &span.raw_value)
            .map_err(|e| DeidError::Config(format!("token minting failed: {}", e)))?;
        redacted.push_str(&content[last_end..span.byte_start]);
        redacted.push_str(&token);
        last_end = span.byte_end;
    }
    redacted.push_str(&content[last_end..]);

    Ok((redacted, table))
}
