//! DingTalk robot channel plugin for moltis.
//!
//! Receives robot callbacks on an HTTP webhook, normalizes text and
//! rich-text messages (downloading embedded pictures when a media store is
//! configured) and replies through the per-conversation session webhook the
//! platform hands out with every event. Outbound calls are signed with the
//! robot secret.

pub mod auth;
pub mod config;
pub mod error;
pub mod handler;
pub mod inbound;
pub mod markdown;
pub mod media;
pub mod outbound;
pub mod plugin;
pub mod rich_text;
pub mod session_webhook;
pub mod sign;
pub mod state;
pub mod types;

/// Channel identifier used in routing ids and events.
pub const CHANNEL_ID: &str = "dingtalk";

/// Account id used when none is given.
pub const DEFAULT_ACCOUNT_ID: &str = "default";

/// Wall-clock time in epoch millis.
pub fn unix_now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}

pub use {
    config::{DingTalkAccountConfig, ResolvedDingTalkAccount},
    error::{Error, Result},
    handler::webhook_router,
    outbound::DingTalkOutbound,
    plugin::DingTalkPlugin,
    session_webhook::{SessionWebhookCache, SessionWebhookEntry},
    types::DingTalkInboundMessage,
};
