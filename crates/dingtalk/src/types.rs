use {moltis_common::types::ChatType, serde::Deserialize};

use crate::rich_text::RichTextNode;

/// Robot callback payload pushed to the inbound webhook.
///
/// Every field is optional on the wire; an empty body deserializes to a
/// payload with no `msgtype`, which is then skipped as unsupported.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DingTalkInboundMessage {
    pub msgtype: String,
    pub text: Option<TextContent>,
    pub content: Option<RichTextContent>,
    pub msg_id: String,
    /// `"1"` for one-to-one chats, `"2"` for groups.
    pub conversation_type: String,
    pub conversation_id: String,
    pub conversation_title: Option<String>,
    pub sender_id: String,
    pub sender_nick: String,
    pub chatbot_user_id: String,
    pub robot_code: Option<String>,
    /// Platform creation time, epoch millis.
    pub create_at: i64,
    pub is_in_at_list: bool,
    pub at_users: Vec<AtUser>,
    pub session_webhook: String,
    /// Epoch millis after which `session_webhook` is dead.
    pub session_webhook_expired_time: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TextContent {
    pub content: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RichTextContent {
    pub rich_text: Vec<RichTextNode>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AtUser {
    pub dingtalk_id: String,
}

impl DingTalkInboundMessage {
    pub fn is_group(&self) -> bool {
        self.conversation_type == "2"
    }

    pub fn chat_type(&self) -> ChatType {
        if self.is_group() {
            ChatType::Group
        } else {
            ChatType::Dm
        }
    }

    /// Whether the robot was addressed. Direct chats always are; in groups
    /// the platform flag or an explicit @ of the robot is required.
    pub fn is_addressed(&self) -> bool {
        !self.is_group()
            || self.is_in_at_list
            || self
                .at_users
                .iter()
                .any(|user| user.dingtalk_id == self.chatbot_user_id)
    }

    /// Trimmed, deduplicated ids from `atUsers`, in first-seen order.
    pub fn mention_candidate_ids(&self) -> Vec<String> {
        dedupe_ids(self.at_users.iter().map(|user| user.dingtalk_id.as_str()))
    }

    pub fn rich_text_nodes(&self) -> &[RichTextNode] {
        self.content
            .as_ref()
            .map(|content| content.rich_text.as_slice())
            .unwrap_or_default()
    }
}

/// Trim ids, drop empties and keep the first occurrence of each.
pub fn dedupe_ids<'a>(ids: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for id in ids.into_iter().map(str::trim).filter(|id| !id.is_empty()) {
        if !out.iter().any(|seen| seen == id) {
            out.push(id.to_string());
        }
    }
    out
}
