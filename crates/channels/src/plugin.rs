use {
    anyhow::Result,
    async_trait::async_trait,
    moltis_common::types::ReplyPayload,
    std::sync::Arc,
};

use crate::context::ChannelInboundContext;

// ── Channel events (pub/sub) ────────────────────────────────────────────────

/// Events emitted by channel plugins for real-time UI updates.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChannelEvent {
    InboundMessage {
        channel_type: String,
        account_id: String,
        peer_id: String,
        sender_name: Option<String>,
        access_granted: bool,
    },
}

/// Sink for channel events. The gateway provides the concrete implementation.
#[async_trait]
pub trait ChannelEventSink: Send + Sync {
    /// Broadcast a channel event for real-time UI updates.
    async fn emit(&self, event: ChannelEvent);

    /// Hand a normalized inbound message to the chat pipeline.
    ///
    /// Replies produced for this message are pushed through `delivery`.
    /// Delivery failures are the pipeline's to report; an `Err` here means
    /// the dispatch itself failed.
    async fn dispatch_to_chat(
        &self,
        ctx: ChannelInboundContext,
        delivery: Arc<dyn ChannelReplyDelivery>,
    ) -> Result<()>;
}

/// Per-message reply callback supplied by the channel on dispatch.
#[async_trait]
pub trait ChannelReplyDelivery: Send + Sync {
    async fn deliver(&self, reply: &ReplyPayload) -> Result<()>;
}

/// Core channel plugin trait. Each messaging platform implements this.
#[async_trait]
pub trait ChannelPlugin: Send + Sync {
    /// Channel identifier (e.g. "dingtalk").
    fn id(&self) -> &str;

    /// Human-readable channel name.
    fn name(&self) -> &str;

    /// Start an account connection.
    async fn start_account(&mut self, account_id: &str, config: serde_json::Value) -> Result<()>;

    /// Stop an account connection.
    async fn stop_account(&mut self, account_id: &str) -> Result<()>;

    /// Get outbound adapter for sending messages.
    fn outbound(&self) -> Option<&dyn ChannelOutbound>;

    /// Get status adapter for health checks.
    fn status(&self) -> Option<&dyn ChannelStatus>;
}

/// Send messages to a channel.
#[async_trait]
pub trait ChannelOutbound: Send + Sync {
    async fn send_text(&self, account_id: &str, to: &str, text: &str) -> Result<()>;

    /// Send a reply that may carry media. Channels without native media
    /// upload append the media URL to the text.
    async fn send_media(&self, account_id: &str, to: &str, payload: &ReplyPayload) -> Result<()> {
        let mut text = payload.text.clone();
        if let Some(media) = payload.media.as_ref() {
            if !text.is_empty() {
                text.push_str("\n\n");
            }
            if media.url.starts_with("data:") {
                text.push_str("[media omitted: inline data URLs are not supported]");
            } else {
                text.push_str(&media.url);
            }
        }
        self.send_text(account_id, to, &text).await
    }
}

/// Probe channel account health.
#[async_trait]
pub trait ChannelStatus: Send + Sync {
    async fn probe(&self, account_id: &str) -> Result<ChannelHealthSnapshot>;
}

/// Channel health snapshot.
#[derive(Debug, Clone)]
pub struct ChannelHealthSnapshot {
    pub connected: bool,
    pub account_id: String,
    pub details: Option<String>,
}
