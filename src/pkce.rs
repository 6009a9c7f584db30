//! PKCE (Proof Key for Code Exchange) verification
//!
//! RFC 7636. `S256` hashes the verifier as `base64url(SHA-256(ASCII(v)))`
//! without padding; `plain` compares byte-for-byte. Either way the comparison
//! is constant time and any mismatch fails the grant.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Code-challenge transformation method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeChallengeMethod {
    #[serde(rename = "plain")]
    Plain,
    #[serde(rename = "S256")]
    S256,
}

impl CodeChallengeMethod {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "plain" => Some(Self::Plain),
            "S256" => Some(Self::S256),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::S256 => "S256",
        }
    }
}

/// Compute the S256 challenge for a verifier.
pub fn s256_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    base64_url::encode(&hasher.finalize())
}

/// Verify a code verifier against the stored challenge.
pub fn verify(method: CodeChallengeMethod, verifier: &str, challenge: &str) -> bool {
    let computed = match method {
        CodeChallengeMethod::S256 => s256_challenge(verifier),
        CodeChallengeMethod::Plain => verifier.to_string(),
    };
    bool::from(computed.as_bytes().ct_eq(challenge.as_bytes()))
}

/// RFC 7636 Section 4.1: 43-128 chars of `[A-Za-z0-9]` / `-` / `.` / `_` / `~`.
pub fn validate_code_verifier(verifier: &str) -> bool {
    let len = verifier.len();
    if !(43..=128).contains(&len) {
        return false;
    }
    verifier
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~'))
}

/// RFC 7636 Section 4.2: 43-128 chars of `[A-Za-z0-9]` / `-` / `_`.
pub fn validate_code_challenge(challenge: &str) -> bool {
    let len = challenge.len();
    if !(43..=128).contains(&len) {
        return false;
    }
    challenge
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
}
