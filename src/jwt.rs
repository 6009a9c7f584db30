//! JWT signing and verification
//!
//! Issued credentials are compact JWS over the claim set
//! `{iss, aud, azp, sub, client_id, scope?, jti, exp}`. The signing
//! algorithm and key material come from configuration; the HMAC, RSA and EC
//! families are admitted.

use jsonwebtoken::{
    decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::SigningConfig;

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("token generation failed: {0}")]
    Generation(String),

    #[error("token validation failed: {0}")]
    Validation(String),

    #[error("token expired")]
    Expired,

    #[error("invalid token format")]
    InvalidFormat,
}

/// Claims carried by both access and refresh credentials. `scope` is present
/// only on access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Issuer: the server's own base URL, captured from the request.
    pub iss: String,
    /// Audience: client domain, falling back to the client id.
    pub aud: String,
    /// Authorized party, same derivation as `aud`.
    pub azp: String,
    /// Subject: user id, or the client id for client_credentials.
    pub sub: String,
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Identifier of the persisted token record.
    pub jti: String,
    /// Expiration, Unix timestamp, equal to the record's `expires_at`.
    pub exp: i64,
}

/// Signs and verifies token JWTs with the configured algorithm.
pub struct TokenSigner {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenSigner {
    pub fn new(config: &SigningConfig) -> Result<Self, JwtError> {
        let encoding_key = match config.algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                EncodingKey::from_secret(&config.key)
            }
            Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512 => {
                EncodingKey::from_rsa_pem(&config.key)
                    .map_err(|e| JwtError::Generation(format!("invalid RSA private key: {e}")))?
            }
            Algorithm::ES256 | Algorithm::ES384 => EncodingKey::from_ec_pem(&config.key)
                .map_err(|e| JwtError::Generation(format!("invalid EC private key: {e}")))?,
            _ => return Err(JwtError::Generation("unsupported algorithm".to_string())),
        };

        let decoding_key = match config.algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                DecodingKey::from_secret(&config.key)
            }
            Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512 => {
                DecodingKey::from_rsa_pem(&config.key)
                    .map_err(|e| JwtError::Validation(format!("invalid RSA public key: {e}")))?
            }
            Algorithm::ES256 | Algorithm::ES384 => DecodingKey::from_ec_pem(&config.key)
                .map_err(|e| JwtError::Validation(format!("invalid EC public key: {e}")))?,
            _ => return Err(JwtError::Validation("unsupported algorithm".to_string())),
        };

        Ok(Self {
            algorithm: config.algorithm,
            encoding_key,
            decoding_key,
        })
    }

    pub fn sign(&self, claims: &Claims) -> Result<String, JwtError> {
        let header = Header::new(self.algorithm);
        encode(&header, claims, &self.encoding_key).map_err(|e| JwtError::Generation(e.to_string()))
    }

    /// Verify signature and expiry, returning the claims. Audience and issuer
    /// vary per client and per deployment, so only `exp` is checked here;
    /// the stored record resolved through `jti` is the source of truth for
    /// everything else.
    pub fn verify(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_aud = false;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
                jsonwebtoken::errors::ErrorKind::InvalidToken => JwtError::InvalidFormat,
                _ => JwtError::Validation(e.to_string()),
            })
    }
}
