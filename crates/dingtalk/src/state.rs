use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use {moltis_channels::ChannelEventSink, reqwest::Client};

use crate::{
    config::ResolvedDingTalkAccount, media::MediaResolver, session_webhook::SessionWebhookCache,
};

/// Shared account state map.
pub type AccountStateMap = Arc<RwLock<HashMap<String, AccountState>>>;

/// Per-account runtime state. Cloning shares the session-webhook cache.
#[derive(Clone)]
pub struct AccountState {
    pub account: ResolvedDingTalkAccount,
    pub event_sink: Option<Arc<dyn ChannelEventSink>>,
    pub http: Client,
    pub session_webhooks: Arc<SessionWebhookCache>,
    pub media: MediaResolver,
}

impl AccountState {
    /// Fresh state with an empty cache, no event sink and no media store.
    pub fn new(account: ResolvedDingTalkAccount, http: Client) -> Self {
        Self {
            account,
            event_sink: None,
            media: MediaResolver::new(http.clone()),
            http,
            session_webhooks: Arc::new(SessionWebhookCache::new()),
        }
    }

    pub fn account_id(&self) -> &str {
        &self.account.account_id
    }
}
