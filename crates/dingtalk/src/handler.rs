//! Inbound webhook endpoint.
//!
//! A single axum fallback resolves the request path against the routes
//! registered by running accounts, then walks each request through
//! auth check, body parse, normalization and dispatch.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use {
    axum::{
        Json, Router,
        body::Bytes,
        extract::State,
        http::{HeaderMap, Method, StatusCode, Uri},
        response::{IntoResponse, Response},
    },
    moltis_channels::{ChannelEvent, ChannelEventSink, ChannelInboundContext},
    tracing::{debug, error, info, warn},
};

use crate::{
    CHANNEL_ID, Error, Result,
    auth::{TOKEN_HEADER, verify_token},
    inbound::{Normalized, SkipReason, normalize},
    outbound::SessionWebhookDelivery,
    state::{AccountState, AccountStateMap},
    types::DingTalkInboundMessage,
    unix_now_millis,
};

/// Webhook path to owning account.
#[derive(Debug, Default)]
pub struct WebhookRoutes {
    by_path: RwLock<HashMap<String, String>>,
}

impl WebhookRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `path` to `account_id`, dropping any path the account held
    /// before. A path owned by another account is rejected.
    pub fn register(&self, account_id: &str, path: &str) -> Result<()> {
        let mut by_path = self.by_path.write().unwrap_or_else(|e| e.into_inner());
        if let Some(owner) = by_path.get(path)
            && owner != account_id
        {
            return Err(Error::invalid_config(format!(
                "webhook path {path} is already registered by account {owner}"
            )));
        }
        by_path.retain(|_, owner| owner != account_id);
        by_path.insert(path.to_string(), account_id.to_string());
        Ok(())
    }

    /// Remove the account's route, returning the path it held.
    pub fn unregister(&self, account_id: &str) -> Option<String> {
        let mut by_path = self.by_path.write().unwrap_or_else(|e| e.into_inner());
        let path = by_path
            .iter()
            .find(|(_, owner)| owner.as_str() == account_id)
            .map(|(path, _)| path.clone())?;
        by_path.remove(&path);
        Some(path)
    }

    pub fn resolve(&self, path: &str) -> Option<String> {
        let by_path = self.by_path.read().unwrap_or_else(|e| e.into_inner());
        by_path.get(path).cloned()
    }

    pub fn paths(&self) -> Vec<String> {
        let by_path = self.by_path.read().unwrap_or_else(|e| e.into_inner());
        by_path.keys().cloned().collect()
    }
}

/// Shared state behind the webhook router.
#[derive(Clone)]
pub struct WebhookState {
    pub(crate) accounts: AccountStateMap,
    pub(crate) routes: Arc<WebhookRoutes>,
}

/// Router answering on every registered webhook path.
pub fn webhook_router(state: WebhookState) -> Router {
    Router::new().fallback(handle_webhook).with_state(state)
}

fn respond(status: StatusCode, errcode: i64, errmsg: &str) -> Response {
    (
        status,
        Json(serde_json::json!({ "errcode": errcode, "errmsg": errmsg })),
    )
        .into_response()
}

async fn handle_webhook(
    State(state): State<WebhookState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let account = state.routes.resolve(uri.path()).and_then(|account_id| {
        let accounts = state.accounts.read().unwrap_or_else(|e| e.into_inner());
        accounts.get(&account_id).cloned()
    });
    let Some(account) = account else {
        return respond(StatusCode::NOT_FOUND, 1, "Not Found");
    };

    if method != Method::POST {
        return respond(StatusCode::METHOD_NOT_ALLOWED, 1, "Method Not Allowed");
    }

    let token = headers
        .get(TOKEN_HEADER)
        .and_then(|value| value.to_str().ok());
    if let Err(e) = verify_token(&account.account.secret_key, token) {
        debug!(account_id = account.account_id(), "dingtalk: {e}");
        return respond(StatusCode::UNAUTHORIZED, 1, "[dingtalk] invalid token");
    }

    match process_webhook_body(&account, &body).await {
        Ok(()) => respond(StatusCode::OK, 0, "ok"),
        Err(e) => {
            error!(account_id = account.account_id(), "dingtalk: inbound error: {e}");
            respond(StatusCode::INTERNAL_SERVER_ERROR, 1, "internal error")
        },
    }
}

/// Parse a raw webhook body and handle it. A blank body is treated as `{}`.
pub async fn process_webhook_body(state: &AccountState, body: &[u8]) -> Result<()> {
    let msg = parse_payload(body)?;
    handle_inbound_message(state, msg).await
}

fn parse_payload(body: &[u8]) -> Result<DingTalkInboundMessage> {
    if body.trim_ascii().is_empty() {
        return Ok(DingTalkInboundMessage::default());
    }
    Ok(serde_json::from_slice(body)?)
}

/// Normalize one payload, emit the inbound event and hand addressed
/// messages to the chat pipeline with a session-webhook reply callback.
pub async fn handle_inbound_message(state: &AccountState, msg: DingTalkInboundMessage) -> Result<()> {
    let account_id = state.account_id();
    let outcome = normalize(
        &state.account,
        &msg,
        &state.session_webhooks,
        &state.media,
        unix_now_millis(),
    )
    .await;

    let access_granted = match &outcome {
        Normalized::Dispatch(_) => true,
        Normalized::Skipped(SkipReason::NotAddressed) => false,
        Normalized::Skipped(_) => return Ok(()),
    };

    if let Some(sink) = state.event_sink.as_ref() {
        sink.emit(ChannelEvent::InboundMessage {
            channel_type: CHANNEL_ID.to_string(),
            account_id: account_id.to_string(),
            peer_id: msg.sender_id.clone(),
            sender_name: Some(msg.sender_nick.clone()).filter(|name| !name.is_empty()),
            access_granted,
        })
        .await;
    }

    let Normalized::Dispatch(ctx) = outcome else {
        return Ok(());
    };
    let Some(sink) = state.event_sink.clone() else {
        warn!(account_id, "dingtalk inbound message ignored: no channel event sink");
        return Ok(());
    };

    let delivery = Arc::new(SessionWebhookDelivery {
        http: state.http.clone(),
        account_id: account_id.to_string(),
        conversation_id: msg.conversation_id.clone(),
        session_webhook: msg.session_webhook.clone(),
        expires_at: msg.session_webhook_expired_time,
        secret_key: state.account.secret_key.clone(),
        chunking: state.account.chunk_settings(),
        mention_ids: msg.mention_candidate_ids(),
    });
    dispatch(sink.as_ref(), *ctx, delivery).await?;
    info!(
        account_id,
        conversation_id = %msg.conversation_id,
        "dingtalk: dispatched message"
    );
    Ok(())
}

async fn dispatch(
    sink: &dyn ChannelEventSink,
    ctx: ChannelInboundContext,
    delivery: Arc<SessionWebhookDelivery>,
) -> Result<()> {
    sink.dispatch_to_chat(ctx, delivery)
        .await
        .map_err(|e| Error::Dispatch {
            message: format!("{e:#}"),
        })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{config::ResolvedDingTalkAccount, session_webhook::SessionWebhookCache},
        async_trait::async_trait,
        axum::body::Body,
        axum::http::Request,
        moltis_channels::ChannelReplyDelivery,
        moltis_common::types::ReplyPayload,
        std::sync::Mutex,
        tower::ServiceExt,
    };

    const SECRET: &str = "SECabc123";
    const PATH: &str = "/dingtalk-channel/message";

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<ChannelEvent>>,
        dispatched: Mutex<Vec<ChannelInboundContext>>,
        reply: Option<String>,
        fail: bool,
    }

    #[async_trait]
    impl ChannelEventSink for RecordingSink {
        async fn emit(&self, event: ChannelEvent) {
            self.events.lock().unwrap().push(event);
        }

        async fn dispatch_to_chat(
            &self,
            ctx: ChannelInboundContext,
            delivery: Arc<dyn ChannelReplyDelivery>,
        ) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("pipeline offline");
            }
            self.dispatched.lock().unwrap().push(ctx);
            if let Some(reply) = self.reply.as_deref() {
                delivery.deliver(&ReplyPayload::text(reply)).await?;
            }
            Ok(())
        }
    }

    fn setup(sink: Arc<RecordingSink>) -> (Router, Arc<SessionWebhookCache>) {
        let account = ResolvedDingTalkAccount::resolve(
            "acct",
            serde_json::from_value(serde_json::json!({ "secret_key": SECRET })).unwrap(),
        )
        .unwrap();
        let mut state = AccountState::new(account, reqwest::Client::new());
        state.event_sink = Some(sink);
        let cache = Arc::clone(&state.session_webhooks);

        let routes = Arc::new(WebhookRoutes::new());
        routes.register("acct", PATH).unwrap();
        let accounts: AccountStateMap =
            Arc::new(RwLock::new(HashMap::from([("acct".to_string(), state)])));
        (webhook_router(WebhookState { accounts, routes }), cache)
    }

    fn post(token: Option<&str>, body: impl Into<Body>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(PATH)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header(TOKEN_HEADER, token);
        }
        builder.body(body.into()).unwrap()
    }

    fn text_payload(webhook: &str, expires_at: i64) -> String {
        serde_json::json!({
            "msgtype": "text",
            "text": { "content": "hello" },
            "conversationType": "1",
            "conversationId": "cid1",
            "senderId": "u1",
            "senderNick": "Alice",
            "sessionWebhook": webhook,
            "sessionWebhookExpiredTime": expires_at,
            "msgId": "m1",
            "createAt": unix_now_millis(),
        })
        .to_string()
    }

    async fn json_body(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn text_message_end_to_end() {
        let sink = Arc::new(RecordingSink::default());
        let (app, cache) = setup(Arc::clone(&sink));
        let expires_at = unix_now_millis() + 60_000;

        let resp = app
            .oneshot(post(Some("SECabc"), text_payload("https://x/y", expires_at)))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            json_body(resp).await,
            serde_json::json!({ "errcode": 0, "errmsg": "ok" })
        );
        let entry = cache.get("cid1").unwrap();
        assert_eq!(entry.url, "https://x/y");
        assert_eq!(entry.expires_at, expires_at);

        let dispatched = sink.dispatched.lock().unwrap();
        assert_eq!(dispatched.len(), 1);
        assert_eq!(dispatched[0].body, "Alice: hello");
        assert_eq!(dispatched[0].to, "user:u1");
        let events = sink.events.lock().unwrap();
        assert!(matches!(
            events.as_slice(),
            [ChannelEvent::InboundMessage { access_granted: true, .. }]
        ));
    }

    #[tokio::test]
    async fn wrong_token_is_rejected_without_side_effects() {
        let sink = Arc::new(RecordingSink::default());
        let (app, cache) = setup(Arc::clone(&sink));

        let resp = app
            .clone()
            .oneshot(post(Some("nope"), text_payload("https://x/y", unix_now_millis() + 60_000)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(resp).await["errcode"], 1);

        let resp = app
            .oneshot(post(None, text_payload("https://x/y", unix_now_millis() + 60_000)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        assert!(cache.is_empty());
        assert!(sink.dispatched.lock().unwrap().is_empty());
        assert!(sink.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_post_is_method_not_allowed() {
        let (app, _) = setup(Arc::new(RecordingSink::default()));
        let req = Request::builder()
            .method("GET")
            .uri(PATH)
            .header(TOKEN_HEADER, SECRET)
            .body(Body::empty())
            .unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn malformed_json_is_internal_error() {
        let (app, cache) = setup(Arc::new(RecordingSink::default()));

        let resp = app.oneshot(post(Some(SECRET), "{not json")).await.unwrap();

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json_body(resp).await,
            serde_json::json!({ "errcode": 1, "errmsg": "internal error" })
        );
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn empty_body_is_acknowledged() {
        let sink = Arc::new(RecordingSink::default());
        let (app, _) = setup(Arc::clone(&sink));

        let resp = app.oneshot(post(Some(SECRET), "")).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert!(sink.dispatched.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let (app, _) = setup(Arc::new(RecordingSink::default()));
        let req = Request::builder()
            .method("POST")
            .uri("/other")
            .header(TOKEN_HEADER, SECRET)
            .body(Body::from("{}"))
            .unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unaddressed_group_message_is_dropped() {
        let sink = Arc::new(RecordingSink::default());
        let (app, cache) = setup(Arc::clone(&sink));
        let body = serde_json::json!({
            "msgtype": "text",
            "text": { "content": "chatter" },
            "conversationType": "2",
            "conversationId": "gid",
            "chatbotUserId": "bot",
            "isInAtList": false,
            "atUsers": [{ "dingtalkId": "someone" }],
            "senderId": "u2",
            "sessionWebhook": "https://x/g",
            "sessionWebhookExpiredTime": unix_now_millis() + 60_000,
        })
        .to_string();

        let resp = app.oneshot(post(Some(SECRET), body)).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert!(sink.dispatched.lock().unwrap().is_empty());
        assert!(cache.get("gid").is_some());
        let events = sink.events.lock().unwrap();
        assert!(matches!(
            events.as_slice(),
            [ChannelEvent::InboundMessage { access_granted: false, .. }]
        ));
    }

    #[tokio::test]
    async fn dispatch_failure_is_internal_error() {
        let sink = Arc::new(RecordingSink {
            fail: true,
            ..RecordingSink::default()
        });
        let (app, _) = setup(sink);

        let resp = app
            .oneshot(post(Some(SECRET), text_payload("https://x/y", unix_now_millis() + 60_000)))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(resp).await["errmsg"], "internal error");
    }

    #[tokio::test]
    async fn reply_goes_to_session_webhook_with_mentions() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/session")
            .match_query(mockito::Matcher::Any)
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "msgtype": "markdown",
                "markdown": { "text": "pong" },
                "at": { "atUserIds": ["bot", "u9"] },
            })))
            .with_status(200)
            .with_body(r#"{"errcode":0,"errmsg":"ok"}"#)
            .expect(1)
            .create_async()
            .await;

        let sink = Arc::new(RecordingSink {
            reply: Some("pong".into()),
            ..RecordingSink::default()
        });
        let (app, _) = setup(Arc::clone(&sink));
        let body = serde_json::json!({
            "msgtype": "text",
            "text": { "content": "@bot ping" },
            "conversationType": "2",
            "conversationId": "gid",
            "chatbotUserId": "bot",
            "atUsers": [{ "dingtalkId": "bot" }, { "dingtalkId": "u9" }, { "dingtalkId": "bot" }],
            "senderId": "u1",
            "senderNick": "Alice",
            "sessionWebhook": format!("{}/session", server.url()),
            "sessionWebhookExpiredTime": unix_now_millis() + 60_000,
        })
        .to_string();

        let resp = app.oneshot(post(Some(SECRET), body)).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        mock.assert_async().await;
    }

    #[test]
    fn routes_register_and_unregister() {
        let routes = WebhookRoutes::new();
        routes.register("a", "/one").unwrap();
        routes.register("a", "/two").unwrap();
        assert_eq!(routes.resolve("/one"), None);
        assert_eq!(routes.resolve("/two").as_deref(), Some("a"));

        let err = routes.register("b", "/two").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));

        assert_eq!(routes.unregister("a").as_deref(), Some("/two"));
        assert_eq!(routes.unregister("a"), None);
        assert!(routes.paths().is_empty());
    }
}
