//! Robot request signing.
//!
//! DingTalk robots with "加签" enabled require every call to a webhook URL to
//! carry `timestamp` and `sign` query parameters, where `sign` is the
//! URL-encoded base64 HMAC-SHA256 of `"{timestamp}\n{secret}"` keyed by the
//! secret itself.

use {
    base64::Engine,
    hmac::{Hmac, Mac},
    sha2::Sha256,
};

use crate::{Error, Result, unix_now_millis};

type HmacSha256 = Hmac<Sha256>;

/// A signature valid for the timestamp it was computed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureResult {
    /// URL-encoded base64 digest, ready to embed in a query string.
    pub signature: String,
    /// Epoch millis the signature was computed for.
    pub timestamp: i64,
}

/// Sign for the current wall-clock time.
pub fn sign(secret_key: &str) -> Result<SignatureResult> {
    sign_at(secret_key, unix_now_millis())
}

/// Sign for an explicit timestamp.
pub fn sign_at(secret_key: &str, timestamp: i64) -> Result<SignatureResult> {
    if secret_key.is_empty() {
        return Err(Error::invalid_config("signing secret is empty"));
    }

    let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes())
        .map_err(|_| Error::invalid_config("signing secret rejected by HMAC"))?;
    mac.update(format!("{timestamp}\n{secret_key}").as_bytes());
    let digest = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());

    Ok(SignatureResult {
        signature: urlencoding::encode(&digest).into_owned(),
        timestamp,
    })
}

/// Append `timestamp` and `sign` to a webhook URL, respecting an existing
/// query string.
pub fn signed_url(webhook: &str, signature: &SignatureResult) -> String {
    let separator = if webhook.contains('?') {
        '&'
    } else {
        '?'
    };
    format!(
        "{webhook}{separator}timestamp={}&sign={}",
        signature.timestamp, signature.signature
    )
}
