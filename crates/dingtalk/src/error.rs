use std::error::Error as StdError;

/// Crate-wide result type for DingTalk operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the DingTalk channel.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Account configuration is unusable (e.g. missing secret).
    #[error("invalid DingTalk config: {message}")]
    InvalidConfig { message: String },

    /// Inbound webhook token is missing or does not match the account secret.
    #[error("invalid DingTalk webhook token")]
    AuthFailure,

    /// No session webhook has been seen for the conversation.
    #[error("no session webhook cached for conversation {conversation_id}")]
    WebhookUnknown { conversation_id: String },

    /// The session webhook for the conversation is past its expiry.
    #[error("session webhook expired for conversation {conversation_id}")]
    WebhookExpired { conversation_id: String },

    /// DingTalk rejected an outbound message.
    #[error("DingTalk send failed: {reason}")]
    SendFailed { reason: String },

    /// A rich-text media file could not be fetched or stored.
    #[error("DingTalk media fetch failed: {reason}")]
    MediaFetchFailed { reason: String },

    /// The requested account is not running.
    #[error("unknown DingTalk account: {account_id}")]
    UnknownAccount { account_id: String },

    /// The chat pipeline rejected a normalized message.
    #[error("DingTalk dispatch failed: {message}")]
    Dispatch { message: String },

    /// Transport-level HTTP failure.
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// JSON (de)serialization failed.
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),

    /// Wrapped source error from another subsystem.
    #[error("{context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl Error {
    #[must_use]
    pub fn invalid_config(message: impl std::fmt::Display) -> Self {
        Self::InvalidConfig {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn send_failed(reason: impl std::fmt::Display) -> Self {
        Self::SendFailed {
            reason: reason.to_string(),
        }
    }

    #[must_use]
    pub fn media_fetch_failed(reason: impl std::fmt::Display) -> Self {
        Self::MediaFetchFailed {
            reason: reason.to_string(),
        }
    }

    #[must_use]
    pub fn unknown_account(account_id: impl std::fmt::Display) -> Self {
        Self::UnknownAccount {
            account_id: account_id.to_string(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }
}
