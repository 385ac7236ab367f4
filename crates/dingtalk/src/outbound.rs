use std::sync::Arc;

use {
    async_trait::async_trait,
    moltis_channels::plugin::{ChannelOutbound, ChannelReplyDelivery},
    moltis_common::types::ReplyPayload,
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
    tracing::{debug, warn},
};

use crate::{
    Error, Result,
    markdown::{ChunkMode, build_outbound_title, chunk_text},
    session_webhook::SessionWebhookCache,
    sign::{sign, signed_url},
    state::AccountStateMap,
    types::dedupe_ids,
    unix_now_millis,
};

#[derive(Debug, Serialize)]
struct MarkdownMessage<'a> {
    msgtype: &'static str,
    markdown: MarkdownBody<'a>,
    at: AtTargets,
}

#[derive(Debug, Serialize)]
struct MarkdownBody<'a> {
    title: String,
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AtTargets {
    at_mobiles: Vec<String>,
    at_user_ids: Vec<String>,
    is_at_all: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SendResponse {
    errcode: Option<i64>,
    errmsg: Option<String>,
}

/// Per-send chunking settings taken from the account.
#[derive(Debug, Clone, Copy)]
pub struct ChunkSettings {
    pub limit: usize,
    pub mode: ChunkMode,
}

/// POST one signed markdown message to a session webhook.
///
/// Fails with [`Error::SendFailed`] on a non-success status or a non-zero
/// `errcode`.
pub async fn send_markdown(
    http: &reqwest::Client,
    session_webhook: &str,
    secret_key: &str,
    text: &str,
    mention_ids: &[String],
) -> Result<()> {
    let signature = sign(secret_key)?;
    let url = signed_url(session_webhook, &signature);
    let body = MarkdownMessage {
        msgtype: "markdown",
        markdown: MarkdownBody {
            title: build_outbound_title(text),
            text,
        },
        at: AtTargets {
            at_mobiles: Vec::new(),
            at_user_ids: dedupe_ids(mention_ids.iter().map(String::as_str)),
            is_at_all: false,
        },
    };

    let resp = http.post(url).json(&body).send().await?;
    let status = resp.status();
    let raw = resp.text().await.unwrap_or_default();
    if !status.is_success() {
        return Err(Error::send_failed(format!("HTTP {status}: {raw}")));
    }
    let parsed: SendResponse = serde_json::from_str(&raw)
        .map_err(|e| Error::send_failed(format!("unreadable response: {e}")))?;
    if parsed.errcode != Some(0) {
        return Err(Error::send_failed(
            parsed.errmsg.unwrap_or_else(|| "unknown error".to_string()),
        ));
    }
    Ok(())
}

/// Trim, chunk and send `text` in order, stopping at the first failed chunk.
/// Returns the number of chunks sent; empty text sends nothing.
pub async fn send_chunked(
    http: &reqwest::Client,
    session_webhook: &str,
    secret_key: &str,
    text: &str,
    chunking: ChunkSettings,
    mention_ids: &[String],
) -> Result<usize> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(0);
    }
    let chunks = chunk_text(text, chunking.limit, chunking.mode);
    for chunk in &chunks {
        send_markdown(http, session_webhook, secret_key, chunk, mention_ids).await?;
    }
    Ok(chunks.len())
}

/// Reply callback bound to the session webhook of one inbound message.
pub struct SessionWebhookDelivery {
    pub(crate) http: reqwest::Client,
    pub(crate) account_id: String,
    pub(crate) conversation_id: String,
    pub(crate) session_webhook: String,
    pub(crate) expires_at: i64,
    pub(crate) secret_key: Secret<String>,
    pub(crate) chunking: ChunkSettings,
    pub(crate) mention_ids: Vec<String>,
}

impl SessionWebhookDelivery {
    async fn deliver_text(&self, text: &str) -> Result<usize> {
        if text.trim().is_empty() {
            return Ok(0);
        }
        if self.expires_at <= unix_now_millis() {
            return Err(Error::WebhookExpired {
                conversation_id: self.conversation_id.clone(),
            });
        }
        send_chunked(
            &self.http,
            &self.session_webhook,
            self.secret_key.expose_secret(),
            text,
            self.chunking,
            &self.mention_ids,
        )
        .await
    }
}

#[async_trait]
impl ChannelReplyDelivery for SessionWebhookDelivery {
    async fn deliver(&self, reply: &ReplyPayload) -> anyhow::Result<()> {
        match self.deliver_text(&reply.text).await {
            Ok(sent) => {
                debug!(
                    account_id = %self.account_id,
                    conversation_id = %self.conversation_id,
                    chunks = sent,
                    "dingtalk: reply delivered"
                );
                Ok(())
            },
            Err(e) => {
                warn!(
                    account_id = %self.account_id,
                    conversation_id = %self.conversation_id,
                    "dingtalk: reply failed: {e}"
                );
                Err(e.into())
            },
        }
    }
}

/// Outbound sender for proactive messages to cached conversations.
pub struct DingTalkOutbound {
    pub(crate) accounts: AccountStateMap,
}

struct AccountSnapshot {
    http: reqwest::Client,
    secret_key: Secret<String>,
    chunking: ChunkSettings,
    session_webhooks: Arc<SessionWebhookCache>,
}

impl DingTalkOutbound {
    fn account_snapshot(&self, account_id: &str) -> Result<AccountSnapshot> {
        let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
        let state = accounts
            .get(account_id)
            .ok_or_else(|| Error::unknown_account(account_id))?;
        Ok(AccountSnapshot {
            http: state.http.clone(),
            secret_key: state.account.secret_key.clone(),
            chunking: state.account.chunk_settings(),
            session_webhooks: Arc::clone(&state.session_webhooks),
        })
    }

    async fn send_to_conversation(&self, account_id: &str, conversation_id: &str, text: &str) -> Result<usize> {
        let snapshot = self.account_snapshot(account_id)?;
        let webhook = snapshot
            .session_webhooks
            .take_valid(conversation_id, unix_now_millis())?;
        send_chunked(
            &snapshot.http,
            &webhook,
            snapshot.secret_key.expose_secret(),
            text,
            snapshot.chunking,
            &[],
        )
        .await
    }
}

#[async_trait]
impl ChannelOutbound for DingTalkOutbound {
    async fn send_text(&self, account_id: &str, to: &str, text: &str) -> anyhow::Result<()> {
        let sent = self.send_to_conversation(account_id, to, text).await?;
        debug!(account_id, conversation_id = to, chunks = sent, "dingtalk: outbound text sent");
        Ok(())
    }
}
