use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use {
    anyhow::Result,
    async_trait::async_trait,
    tracing::{info, warn},
};

use {
    moltis_channels::{
        ChannelEventSink,
        plugin::{ChannelHealthSnapshot, ChannelOutbound, ChannelPlugin, ChannelStatus},
    },
    moltis_media::{MediaStore, MimeDetector},
};

use crate::{
    CHANNEL_ID,
    config::{DingTalkAccountConfig, ResolvedDingTalkAccount},
    handler::{WebhookRoutes, WebhookState, handle_inbound_message, webhook_router},
    media::{DINGTALK_API_BASE, MediaResolver},
    outbound::DingTalkOutbound,
    session_webhook::SessionWebhookEntry,
    state::{AccountState, AccountStateMap},
    types::DingTalkInboundMessage,
};

/// DingTalk robot channel plugin.
///
/// Accounts, their session-webhook caches and the webhook route table are
/// owned by the plugin instance.
pub struct DingTalkPlugin {
    accounts: AccountStateMap,
    routes: Arc<WebhookRoutes>,
    outbound: DingTalkOutbound,
    http: reqwest::Client,
    event_sink: Option<Arc<dyn ChannelEventSink>>,
    media_store: Option<Arc<dyn MediaStore>>,
    mime_detectors: Vec<Arc<dyn MimeDetector>>,
    api_base: String,
}

impl DingTalkPlugin {
    pub fn new() -> Self {
        let accounts: AccountStateMap = Arc::new(RwLock::new(HashMap::new()));
        let outbound = DingTalkOutbound {
            accounts: Arc::clone(&accounts),
        };
        Self {
            accounts,
            routes: Arc::new(WebhookRoutes::new()),
            outbound,
            http: reqwest::Client::new(),
            event_sink: None,
            media_store: None,
            mime_detectors: Vec::new(),
            api_base: DINGTALK_API_BASE.to_string(),
        }
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn ChannelEventSink>) -> Self {
        self.event_sink = Some(sink);
        self
    }

    /// Store for rich-text images. Without one, images stay placeholders.
    pub fn with_media_store(mut self, store: Arc<dyn MediaStore>) -> Self {
        self.media_store = Some(store);
        self
    }

    /// Append a MIME detector; detectors run in registration order.
    pub fn with_mime_detector(mut self, detector: Arc<dyn MimeDetector>) -> Self {
        self.mime_detectors.push(detector);
        self
    }

    /// Override the open-API host used for file downloads.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn shared_outbound(&self) -> Arc<dyn ChannelOutbound> {
        Arc::new(DingTalkOutbound {
            accounts: Arc::clone(&self.accounts),
        })
    }

    /// Router serving the webhook paths of every running account. Accounts
    /// started after the router is built are picked up.
    pub fn webhook_router(&self) -> axum::Router {
        webhook_router(WebhookState {
            accounts: Arc::clone(&self.accounts),
            routes: Arc::clone(&self.routes),
        })
    }

    pub fn webhook_paths(&self) -> Vec<String> {
        self.routes.paths()
    }

    pub fn account_ids(&self) -> Vec<String> {
        let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
        accounts.keys().cloned().collect()
    }

    pub fn has_account(&self, account_id: &str) -> bool {
        let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
        accounts.contains_key(account_id)
    }

    pub fn describe_account(&self, account_id: &str) -> Option<serde_json::Value> {
        let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
        accounts.get(account_id).map(|state| state.account.describe())
    }

    /// Cached session webhook for a conversation, expired or not.
    pub fn session_webhook(
        &self,
        account_id: &str,
        conversation_id: &str,
    ) -> Option<SessionWebhookEntry> {
        let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
        accounts
            .get(account_id)
            .and_then(|state| state.session_webhooks.get(conversation_id))
    }

    /// Replace a running account's settings. The session-webhook cache is
    /// kept; a changed webhook path is re-registered. Updating to
    /// `enabled: false` stops the account.
    pub fn update_account_config(&self, account_id: &str, config: serde_json::Value) -> Result<()> {
        let cfg: DingTalkAccountConfig = serde_json::from_value(config)?;
        let account = ResolvedDingTalkAccount::resolve(account_id, cfg)?;
        if !account.enabled {
            if !self.remove_account(account_id) {
                return Err(anyhow::anyhow!("account not found: {account_id}"));
            }
            info!(account_id, "dingtalk: account disabled, webhook route removed");
            return Ok(());
        }
        let mut accounts = self.accounts.write().unwrap_or_else(|e| e.into_inner());
        let Some(state) = accounts.get_mut(account_id) else {
            return Err(anyhow::anyhow!("account not found: {account_id}"));
        };
        self.routes.register(account_id, &account.webhook_path)?;
        state.account = account;
        Ok(())
    }

    /// Handle a payload that arrived outside the webhook router, skipping
    /// the token check.
    pub async fn ingest_message(&self, account_id: &str, payload: serde_json::Value) -> Result<()> {
        let msg: DingTalkInboundMessage = serde_json::from_value(payload)?;
        let state = {
            let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
            accounts
                .get(account_id)
                .cloned()
                .ok_or_else(|| crate::Error::unknown_account(account_id))?
        };
        handle_inbound_message(&state, msg).await?;
        Ok(())
    }

    fn account_state(&self, account: ResolvedDingTalkAccount) -> AccountState {
        let mut state = AccountState::new(account, self.http.clone());
        state.event_sink = self.event_sink.clone();
        state.media = MediaResolver::new(self.http.clone())
            .with_api_base(self.api_base.clone())
            .with_store(self.media_store.clone())
            .with_mime_detectors(self.mime_detectors.clone());
        state
    }

    fn remove_account(&self, account_id: &str) -> bool {
        self.routes.unregister(account_id);
        let mut accounts = self.accounts.write().unwrap_or_else(|e| e.into_inner());
        accounts.remove(account_id).is_some()
    }
}

impl Default for DingTalkPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelPlugin for DingTalkPlugin {
    fn id(&self) -> &str {
        CHANNEL_ID
    }

    fn name(&self) -> &str {
        "DingTalk"
    }

    async fn start_account(&mut self, account_id: &str, config: serde_json::Value) -> Result<()> {
        let cfg: DingTalkAccountConfig = serde_json::from_value(config)?;
        let account = ResolvedDingTalkAccount::resolve(account_id, cfg)?;
        let account_id = account.account_id.clone();

        if self.remove_account(&account_id) {
            info!(account_id, "dingtalk: replacing running account");
        }
        if !account.enabled {
            info!(account_id, "dingtalk: account disabled, not registering webhook");
            return Ok(());
        }

        let webhook_path = account.webhook_path.clone();
        self.routes.register(&account_id, &webhook_path)?;
        let state = self.account_state(account);
        {
            let mut accounts = self.accounts.write().unwrap_or_else(|e| e.into_inner());
            accounts.insert(account_id.clone(), state);
        }
        info!(account_id, webhook_path, "dingtalk: webhook route registered");
        Ok(())
    }

    async fn stop_account(&mut self, account_id: &str) -> Result<()> {
        if !self.remove_account(account_id) {
            warn!(account_id, "dingtalk account not found");
        }
        info!(account_id, "dingtalk: stopped");
        Ok(())
    }

    fn outbound(&self) -> Option<&dyn ChannelOutbound> {
        Some(&self.outbound)
    }

    fn status(&self) -> Option<&dyn ChannelStatus> {
        Some(self)
    }
}

#[async_trait]
impl ChannelStatus for DingTalkPlugin {
    async fn probe(&self, account_id: &str) -> Result<ChannelHealthSnapshot> {
        let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
        if let Some(state) = accounts.get(account_id) {
            let conversations = state.session_webhooks.len();
            let details = if conversations == 0 {
                "waiting for first inbound message".to_string()
            } else {
                format!("known conversations: {conversations}")
            };
            Ok(ChannelHealthSnapshot {
                connected: true,
                account_id: state.account_id().to_string(),
                details: Some(details),
            })
        } else {
            Ok(ChannelHealthSnapshot {
                connected: false,
                account_id: account_id.to_string(),
                details: Some("account not started".into()),
            })
        }
    }
}
