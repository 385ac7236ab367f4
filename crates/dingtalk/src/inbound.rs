use {
    moltis_channels::{ChannelInboundContext, ChannelPeer},
    moltis_common::types::ChatType,
    tracing::{debug, info},
};

use crate::{
    CHANNEL_ID,
    auth::resolve_access_token,
    config::ResolvedDingTalkAccount,
    media::{MediaResolver, SavedMedia},
    rich_text::{MediaFetchTask, flatten},
    session_webhook::SessionWebhookCache,
    types::DingTalkInboundMessage,
};

/// Where parsed text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextSource {
    Text,
    RichText,
}

/// Why an inbound payload produced no dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// `msgtype` is neither `text` nor `richText`.
    Unsupported,
    /// The message text is empty after trimming.
    EmptyContent,
    /// Group message that did not address the robot.
    NotAddressed,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unsupported => "unsupported",
            Self::EmptyContent => "empty",
            Self::NotAddressed => "not_addressed",
        }
    }
}

/// Result of extracting text from an inbound payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundText {
    Parsed {
        text: String,
        source: TextSource,
        media_tasks: Vec<MediaFetchTask>,
    },
    Skipped(SkipReason),
}

/// Extract trimmed text (and rich-text fetch tasks) from a payload.
pub fn parse_inbound_text(msg: &DingTalkInboundMessage) -> InboundText {
    let (text, source, media_tasks) = match msg.msgtype.as_str() {
        "text" => {
            let text = msg
                .text
                .as_ref()
                .map(|text| text.content.trim().to_string())
                .unwrap_or_default();
            (text, TextSource::Text, Vec::new())
        },
        "richText" => {
            let flat = flatten(msg.rich_text_nodes());
            (flat.text.trim().to_string(), TextSource::RichText, flat.media_tasks)
        },
        _ => return InboundText::Skipped(SkipReason::Unsupported),
    };

    if text.is_empty() {
        return InboundText::Skipped(SkipReason::EmptyContent);
    }
    InboundText::Parsed {
        text,
        source,
        media_tasks,
    }
}

/// Outcome of normalizing one inbound payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    Dispatch(Box<ChannelInboundContext>),
    Skipped(SkipReason),
}

/// Parse, resolve media, record the session webhook, gate on addressing and
/// build the pipeline context.
///
/// The session webhook is cached for every parsed payload, including group
/// chatter that is later dropped for not addressing the robot.
pub async fn normalize(
    account: &ResolvedDingTalkAccount,
    msg: &DingTalkInboundMessage,
    session_webhooks: &SessionWebhookCache,
    media: &MediaResolver,
    now_ms: i64,
) -> Normalized {
    let account_id = account.account_id.as_str();
    let (text, media_tasks) = match parse_inbound_text(msg) {
        InboundText::Parsed {
            text,
            source: TextSource::RichText,
            media_tasks,
        } => (text, media_tasks),
        InboundText::Parsed { text, .. } => (text, Vec::new()),
        InboundText::Skipped(reason) => {
            info!(
                account_id,
                msgtype = %msg.msgtype,
                reason = reason.as_str(),
                "dingtalk: ignoring inbound message"
            );
            return Normalized::Skipped(reason);
        },
    };

    let saved = if media_tasks.is_empty() {
        Vec::new()
    } else {
        let access_token = resolve_access_token(account.access_token.as_ref());
        media
            .resolve(account_id, &media_tasks, msg.robot_code.as_deref(), &access_token)
            .await
    };

    session_webhooks.put(
        &msg.conversation_id,
        &msg.session_webhook,
        msg.session_webhook_expired_time,
    );

    let was_mentioned = msg.is_addressed();
    if !was_mentioned {
        info!(
            account_id,
            conversation_id = %msg.conversation_id,
            "dingtalk: ignoring group message without mention"
        );
        return Normalized::Skipped(SkipReason::NotAddressed);
    }

    debug!(
        account_id,
        conversation_id = %msg.conversation_id,
        chat_type = %msg.chat_type(),
        media = saved.len(),
        "dingtalk: inbound message normalized"
    );
    Normalized::Dispatch(Box::new(build_inbound_context(
        account_id,
        msg,
        &text,
        &saved,
        was_mentioned,
        now_ms,
    )))
}

/// Map a payload onto the canonical inbound context.
pub fn build_inbound_context(
    account_id: &str,
    msg: &DingTalkInboundMessage,
    text: &str,
    saved: &[SavedMedia],
    was_mentioned: bool,
    now_ms: i64,
) -> ChannelInboundContext {
    let chat_type = msg.chat_type();
    let is_group = chat_type == ChatType::Group;

    let to = if is_group {
        format!("chat:{}", msg.conversation_id)
    } else {
        format!("user:{}", msg.sender_id)
    };
    let peer = ChannelPeer {
        kind: chat_type,
        id: if is_group {
            msg.conversation_id.clone()
        } else {
            msg.sender_id.clone()
        },
    };
    let envelope_from = if is_group {
        format!("{}:{}", msg.conversation_id, msg.sender_id)
    } else {
        msg.sender_id.clone()
    };
    let group_subject = is_group.then(|| {
        msg.conversation_title
            .as_deref()
            .filter(|title| !title.is_empty())
            .unwrap_or(&msg.conversation_id)
            .to_string()
    });

    let mut ctx = ChannelInboundContext {
        body: format!("{}: {}", msg.sender_nick, text),
        raw_body: text.to_string(),
        command_body: text.to_string(),
        from: format!("{CHANNEL_ID}:{}", msg.sender_id),
        to: to.clone(),
        peer,
        envelope_from,
        envelope_timestamp: if msg.create_at > 0 {
            msg.create_at
        } else {
            now_ms
        },
        account_id: account_id.to_string(),
        chat_type,
        group_subject,
        sender_name: msg.sender_nick.clone(),
        sender_id: msg.sender_id.clone(),
        provider: CHANNEL_ID.to_string(),
        surface: CHANNEL_ID.to_string(),
        message_sid: msg.msg_id.clone(),
        timestamp: now_ms,
        was_mentioned,
        command_authorized: true,
        originating_channel: CHANNEL_ID.to_string(),
        originating_to: to,
        media_path: None,
        media_type: None,
        media_paths: None,
        media_types: None,
    };
    attach_media(&mut ctx, saved);
    ctx
}

/// One path fills the scalar fields, several fill the plural ones. Types
/// are only attached when every path has one.
fn attach_media(ctx: &mut ChannelInboundContext, saved: &[SavedMedia]) {
    let paths: Vec<String> = saved
        .iter()
        .map(|media| media.path.clone())
        .filter(|path| !path.trim().is_empty())
        .collect();
    let types: Vec<String> = saved
        .iter()
        .map(|media| media.content_type.clone())
        .filter(|content_type| !content_type.trim().is_empty())
        .collect();

    match paths.len() {
        0 => {},
        1 => {
            ctx.media_type = types.into_iter().next();
            ctx.media_path = paths.into_iter().next();
        },
        _ => {
            if types.len() == paths.len() {
                ctx.media_types = Some(types);
            }
            ctx.media_paths = Some(paths);
        },
    }
}
