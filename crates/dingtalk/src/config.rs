use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

use crate::{Error, Result, markdown::ChunkMode, outbound::ChunkSettings};

/// Webhook path used when an account does not configure one.
pub const DEFAULT_WEBHOOK_PATH: &str = "/dingtalk-channel/message";

/// Default per-message character budget for outbound chunks.
pub const DEFAULT_TEXT_CHUNK_LIMIT: usize = 4000;

/// Configuration for a single DingTalk robot account.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DingTalkAccountConfig {
    /// Whether the account should be started at all.
    pub enabled: bool,

    /// Robot signing secret (`SEC...`). Also authenticates inbound webhooks.
    #[serde(serialize_with = "serialize_secret")]
    pub secret_key: Secret<String>,

    /// Inbound webhook path override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_path: Option<String>,

    /// Open-API access token used to download message files. When unset the
    /// `DINGTALK_ACCESS_TOKEN` / `DINGTALK_APP_ACCESS_TOKEN` environment
    /// variables are consulted per message.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_option_secret"
    )]
    pub access_token: Option<Secret<String>>,

    /// Maximum characters per outbound markdown message.
    pub text_chunk_limit: usize,

    /// How outbound replies are split into chunks.
    pub chunk_mode: ChunkMode,
}

impl std::fmt::Debug for DingTalkAccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DingTalkAccountConfig")
            .field("enabled", &self.enabled)
            .field("secret_key", &"[REDACTED]")
            .field("webhook_path", &self.webhook_path)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("text_chunk_limit", &self.text_chunk_limit)
            .field("chunk_mode", &self.chunk_mode)
            .finish()
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}

impl Default for DingTalkAccountConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            secret_key: Secret::new(String::new()),
            webhook_path: None,
            access_token: None,
            text_chunk_limit: DEFAULT_TEXT_CHUNK_LIMIT,
            chunk_mode: ChunkMode::Length,
        }
    }
}

/// Normalize a configured webhook path: trimmed, defaulted when blank, and
/// always rooted.
pub fn resolve_webhook_path(raw: Option<&str>) -> String {
    let path = raw.map(str::trim).unwrap_or_default();
    if path.is_empty() {
        return DEFAULT_WEBHOOK_PATH.to_string();
    }
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// Account settings derived once at start. Never mutated; a config change
/// produces a new value.
#[derive(Clone)]
pub struct ResolvedDingTalkAccount {
    pub account_id: String,
    pub enabled: bool,
    pub secret_key: Secret<String>,
    pub access_token: Option<Secret<String>>,
    pub webhook_path: String,
    pub text_chunk_limit: usize,
    pub chunk_mode: ChunkMode,
}

impl ResolvedDingTalkAccount {
    /// Derive an account from its raw config. An empty secret is rejected.
    pub fn resolve(account_id: &str, config: DingTalkAccountConfig) -> Result<Self> {
        let account_id = match account_id.trim() {
            "" => crate::DEFAULT_ACCOUNT_ID,
            id => id,
        };
        let secret_key = config.secret_key.expose_secret().trim().to_string();
        if secret_key.is_empty() {
            return Err(Error::invalid_config(
                "channels.dingtalk.secret_key is required",
            ));
        }
        let access_token = config
            .access_token
            .map(|token| token.expose_secret().trim().to_string())
            .filter(|token| !token.is_empty())
            .map(Secret::new);

        Ok(Self {
            account_id: account_id.to_string(),
            enabled: config.enabled,
            secret_key: Secret::new(secret_key),
            access_token,
            webhook_path: resolve_webhook_path(config.webhook_path.as_deref()),
            text_chunk_limit: if config.text_chunk_limit == 0 {
                DEFAULT_TEXT_CHUNK_LIMIT
            } else {
                config.text_chunk_limit
            },
            chunk_mode: config.chunk_mode,
        })
    }

    pub fn chunk_settings(&self) -> ChunkSettings {
        ChunkSettings {
            limit: self.text_chunk_limit,
            mode: self.chunk_mode,
        }
    }

    /// Summary safe for UI listing.
    pub fn describe(&self) -> serde_json::Value {
        serde_json::json!({
            "account_id": self.account_id,
            "enabled": self.enabled,
            "configured": !self.secret_key.expose_secret().is_empty(),
        })
    }
}

impl std::fmt::Debug for ResolvedDingTalkAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedDingTalkAccount")
            .field("account_id", &self.account_id)
            .field("enabled", &self.enabled)
            .field("secret_key", &"[REDACTED]")
            .field("webhook_path", &self.webhook_path)
            .field("text_chunk_limit", &self.text_chunk_limit)
            .field("chunk_mode", &self.chunk_mode)
            .finish()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case(None, DEFAULT_WEBHOOK_PATH)]
    #[case(Some(""), DEFAULT_WEBHOOK_PATH)]
    #[case(Some("   "), DEFAULT_WEBHOOK_PATH)]
    #[case(Some("/bots/ding"), "/bots/ding")]
    #[case(Some(" bots/ding "), "/bots/ding")]
    fn webhook_path_normalization(#[case] raw: Option<&str>, #[case] expected: &str) {
        assert_eq!(resolve_webhook_path(raw), expected);
    }

    #[test]
    fn config_defaults_from_partial_json() {
        let cfg: DingTalkAccountConfig =
            serde_json::from_value(serde_json::json!({ "secret_key": "SECabc" })).unwrap();
        assert!(cfg.enabled);
        assert_eq!(cfg.text_chunk_limit, DEFAULT_TEXT_CHUNK_LIMIT);
        assert_eq!(cfg.chunk_mode, ChunkMode::Length);
        assert!(cfg.webhook_path.is_none());
    }

    #[test]
    fn resolve_rejects_empty_secret() {
        let cfg: DingTalkAccountConfig =
            serde_json::from_value(serde_json::json!({ "secret_key": "  " })).unwrap();
        let err = ResolvedDingTalkAccount::resolve("default", cfg).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }

    #[test]
    fn resolve_trims_and_defaults() {
        let cfg: DingTalkAccountConfig = serde_json::from_value(serde_json::json!({
            "secret_key": " SECabc ",
            "webhook_path": "hooks/ding",
            "access_token": "   ",
            "text_chunk_limit": 0,
        }))
        .unwrap();
        let account = ResolvedDingTalkAccount::resolve("  ", cfg).unwrap();

        assert_eq!(account.account_id, crate::DEFAULT_ACCOUNT_ID);
        assert_eq!(account.secret_key.expose_secret(), "SECabc");
        assert_eq!(account.webhook_path, "/hooks/ding");
        assert!(account.access_token.is_none());
        assert_eq!(account.text_chunk_limit, DEFAULT_TEXT_CHUNK_LIMIT);
    }

    #[test]
    fn debug_redacts_secrets() {
        let cfg: DingTalkAccountConfig = serde_json::from_value(serde_json::json!({
            "secret_key": "SECsupersecret",
            "access_token": "tok-123",
        }))
        .unwrap();
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("SECsupersecret"));
        assert!(!rendered.contains("tok-123"));

        let account = ResolvedDingTalkAccount::resolve("a", cfg).unwrap();
        assert!(!format!("{account:?}").contains("SECsupersecret"));
    }

    #[test]
    fn describe_reports_configured() {
        let cfg: DingTalkAccountConfig =
            serde_json::from_value(serde_json::json!({ "secret_key": "SECabc", "enabled": false }))
                .unwrap();
        let account = ResolvedDingTalkAccount::resolve("ops", cfg).unwrap();
        assert_eq!(
            account.describe(),
            serde_json::json!({ "account_id": "ops", "enabled": false, "configured": true })
        );
    }
}
