//! Keyed-MAC primitives
//!
//! Client secrets are not stored as independent random values: they are
//! derived from the client id with a keyed MAC over the process secret, so
//! verification can always recompute. The same MAC key authenticates the
//! opaque payload that travels through the login dialog.

use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::{Sha256, Sha512};
use subtle::ConstantTimeEq;

use crate::config::{HmacAlgorithm, OAuthConfig};

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

fn mac_bytes(algorithm: HmacAlgorithm, key: &[u8], data: &[u8]) -> Vec<u8> {
    match algorithm {
        HmacAlgorithm::Sha256 => {
            let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
            mac.update(data);
            mac.finalize().into_bytes().to_vec()
        }
        HmacAlgorithm::Sha512 => {
            let mut mac = HmacSha512::new_from_slice(key).expect("HMAC accepts any key length");
            mac.update(data);
            mac.finalize().into_bytes().to_vec()
        }
    }
}

/// Derive the secret for a client id: hex-encoded
/// `HMAC(algorithm, secret_key, client_id)`.
pub fn derive_client_secret(config: &OAuthConfig, client_id: &str) -> String {
    hex::encode(mac_bytes(
        config.hmac_algorithm,
        config.secret_key.as_bytes(),
        client_id.as_bytes(),
    ))
}

/// Recompute the secret for `client_id` and compare with the presented value
/// in constant time.
pub fn verify_client_secret(config: &OAuthConfig, client_id: &str, presented: &str) -> bool {
    let expected = derive_client_secret(config, client_id);
    bool::from(expected.as_bytes().ct_eq(presented.as_bytes()))
}

const OPAQUE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Generate a random opaque credential string (authorization codes,
/// generated client ids).
pub fn generate_opaque(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| {
            let idx = rng.gen_range(0..OPAQUE_CHARSET.len());
            OPAQUE_CHARSET[idx] as char
        })
        .collect()
}

/// Seal a payload into `base64url(data).base64url(tag)` where `tag` is the
/// MAC over `data`. The result is safe to hand to the user agent: any
/// tampering fails `open_payload`.
pub fn seal_payload(config: &OAuthConfig, data: &[u8]) -> String {
    let tag = mac_bytes(config.hmac_algorithm, config.secret_key.as_bytes(), data);
    format!("{}.{}", base64_url::encode(data), base64_url::encode(&tag))
}

/// Open a sealed payload, returning the data only when the tag verifies.
pub fn open_payload(config: &OAuthConfig, sealed: &str) -> Option<Vec<u8>> {
    let (data_part, tag_part) = sealed.split_once('.')?;
    let data = base64_url::decode(data_part).ok()?;
    let tag = base64_url::decode(tag_part).ok()?;
    let expected = mac_bytes(config.hmac_algorithm, config.secret_key.as_bytes(), &data);
    if bool::from(expected.as_slice().ct_eq(tag.as_slice())) {
        Some(data)
    } else {
        None
    }
}
