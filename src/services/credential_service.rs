//! Endpoint API tokens: generation and one-way hashing.
//!
//! Tokens are never stored in plaintext. The bcrypt hash is salted, which
//! rules out an equality index; resolution therefore verifies the presented
//! token against each active endpoint in turn.

use bcrypt::{hash, verify};
use rand::RngCore;

const TOKEN_BYTES: usize = 32;

#[cfg(not(test))]
const TOKEN_HASH_COST: u32 = bcrypt::DEFAULT_COST;
#[cfg(test)]
const TOKEN_HASH_COST: u32 = 4;

#[derive(Debug, thiserror::Error)]
#[error("Token hashing failed: {0}")]
pub struct TokenHashError(#[from] bcrypt::BcryptError);

/// Generates a fresh random token, hex-encoded.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn hash_token(token: &str) -> Result<String, TokenHashError> {
    Ok(hash(token, TOKEN_HASH_COST)?)
}

/// Returns `false` for a mismatch and for a malformed stored hash alike.
pub fn verify_token(token: &str, token_hash: &str) -> bool {
    verify(token, token_hash).unwrap_or(false)
}

/// Pulls the agent token out of request headers.
///
/// `X-API-Key` wins over `Authorization: Bearer`. Blank values count as absent.
pub fn extract_token(api_key: Option<&str>, authorization: Option<&str>) -> Option<String> {
    if let Some(key) = api_key.map(str::trim).filter(|k| !k.is_empty()) {
        return Some(key.to_string());
    }

    let auth = authorization?;
    let (scheme, rest) = auth.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = rest.trim();
    (!token.is_empty()).then(|| token.to_string())
}
