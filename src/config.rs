//! Process-wide OAuth configuration
//!
//! Populated once at startup and read-only thereafter. Defaults work out of
//! the box for development; `OAuthConfig::from_env` overlays the recognized
//! environment variables on top of them.

use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};

use crate::models::ClientType;

/// Keyed-MAC algorithm used for client-secret derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HmacAlgorithm {
    Sha256,
    Sha512,
}

impl HmacAlgorithm {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" => Some(Self::Sha256),
            "sha512" => Some(Self::Sha512),
            _ => None,
        }
    }
}

/// Token lifetimes in seconds, keyed by client type and the internal flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtlTable {
    pub confidential_internal: i64,
    pub confidential_external: i64,
    pub public_internal: i64,
    pub public_external: i64,
}

impl TtlTable {
    pub fn seconds_for(&self, client_type: ClientType, internal: bool) -> i64 {
        match (client_type, internal) {
            (ClientType::Confidential, true) => self.confidential_internal,
            (ClientType::Confidential, false) => self.confidential_external,
            (ClientType::Public, true) => self.public_internal,
            (ClientType::Public, false) => self.public_external,
        }
    }
}

/// JWT signing material. The algorithm selects how `key` is interpreted:
/// raw secret bytes for the HMAC family, PEM for RSA and EC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningConfig {
    pub algorithm: Algorithm,
    #[serde(with = "serde_bytes_b64")]
    pub key: Vec<u8>,
}

/// Key material serialized as base64 so config files stay printable.
mod serde_bytes_b64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}

/// Authorization-server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// Secret for HMAC derivation of client secrets and the dialog payload MAC.
    pub secret_key: String,
    /// MAC algorithm for client-secret derivation.
    pub hmac_algorithm: HmacAlgorithm,
    /// Fixed string placed in token responses, typically `Bearer`.
    pub token_type: String,
    /// Access-token lifetimes.
    pub access_token_expires_in: TtlTable,
    /// Refresh-token lifetimes.
    pub refresh_token_expires_in: TtlTable,
    /// Authorization-code lifetime in seconds.
    pub authorization_code_expires_in: i64,
    /// JWT signing algorithm and key material.
    pub signing: SigningConfig,
    /// Display string shown in the login dialog.
    pub provider_name: String,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            secret_key: "change-me-in-production".to_string(),
            hmac_algorithm: HmacAlgorithm::Sha512,
            token_type: "Bearer".to_string(),
            access_token_expires_in: TtlTable {
                confidential_internal: 86_400,
                confidential_external: 3_600,
                public_internal: 86_400,
                public_external: 3_600,
            },
            refresh_token_expires_in: TtlTable {
                confidential_internal: 2_592_000,
                confidential_external: 1_209_600,
                public_internal: 2_592_000,
                public_external: 1_209_600,
            },
            authorization_code_expires_in: 300,
            signing: SigningConfig {
                algorithm: Algorithm::HS256,
                key: b"change-me-in-production".to_vec(),
            },
            provider_name: "tokensmith".to_string(),
        }
    }
}

impl OAuthConfig {
    /// Overlay the recognized environment variables on the defaults.
    ///
    /// Recognized: `OAUTH_SECRET_KEY`, `OAUTH_HMAC_ALGORITHM`,
    /// `OAUTH_TOKEN_TYPE`, `OAUTH_SIGNING_ALGORITHM`, `OAUTH_SIGNING_KEY`,
    /// `OAUTH_PROVIDER_NAME`, `OAUTH_AUTH_CODE_TTL`. Absent variables keep
    /// their defaults; TTL tables are configured programmatically.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("OAUTH_SECRET_KEY") {
            config.secret_key = v;
        }
        if let Ok(v) = std::env::var("OAUTH_HMAC_ALGORITHM") {
            if let Some(algorithm) = HmacAlgorithm::parse(&v) {
                config.hmac_algorithm = algorithm;
            } else {
                tracing::warn!(value = %v, "unrecognized OAUTH_HMAC_ALGORITHM, keeping default");
            }
        }
        if let Ok(v) = std::env::var("OAUTH_TOKEN_TYPE") {
            config.token_type = v;
        }
        if let Ok(v) = std::env::var("OAUTH_SIGNING_ALGORITHM") {
            match v.parse::<Algorithm>() {
                Ok(algorithm) => config.signing.algorithm = algorithm,
                Err(_) => {
                    tracing::warn!(value = %v, "unrecognized OAUTH_SIGNING_ALGORITHM, keeping default")
                }
            }
        }
        if let Ok(v) = std::env::var("OAUTH_SIGNING_KEY") {
            config.signing.key = v.into_bytes();
        }
        if let Ok(v) = std::env::var("OAUTH_PROVIDER_NAME") {
            config.provider_name = v;
        }
        if let Ok(v) = std::env::var("OAUTH_AUTH_CODE_TTL") {
            match v.parse::<i64>() {
                Ok(secs) if secs > 0 => config.authorization_code_expires_in = secs,
                _ => tracing::warn!(value = %v, "invalid OAUTH_AUTH_CODE_TTL, keeping default"),
            }
        }

        config
    }
}
