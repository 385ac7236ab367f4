use secrecy::{ExposeSecret, Secret};

use crate::{Error, Result};

/// Header carrying the inbound webhook token.
pub const TOKEN_HEADER: &str = "token";

/// Environment variables consulted, in order, for the open-API access token.
pub const ACCESS_TOKEN_ENV_VARS: [&str; 2] = ["DINGTALK_ACCESS_TOKEN", "DINGTALK_APP_ACCESS_TOKEN"];

/// Check the inbound `token` header against the account secret.
///
/// The token is accepted when it is non-empty and the secret starts with
/// it. This is a prefix match, not equality, and is open as a security
/// review item.
pub fn verify_token(secret_key: &Secret<String>, token: Option<&str>) -> Result<()> {
    match token {
        Some(token) if !token.is_empty() && secret_key.expose_secret().starts_with(token) => {
            Ok(())
        },
        _ => Err(Error::AuthFailure),
    }
}

/// First non-empty (after trimming) candidate.
pub fn first_non_empty<I>(candidates: I) -> Option<String>
where
    I: IntoIterator<Item = Option<String>>,
{
    candidates
        .into_iter()
        .flatten()
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

/// Access token for file downloads: the account override, else the
/// environment. Empty when none is available.
pub fn resolve_access_token(configured: Option<&Secret<String>>) -> String {
    let configured = configured.map(|token| token.expose_secret().clone());
    first_non_empty(
        std::iter::once(configured)
            .chain(ACCESS_TOKEN_ENV_VARS.iter().map(|name| std::env::var(name).ok())),
    )
    .unwrap_or_default()
}
