use {moltis_common::types::ChatType, serde::Serialize};

/// Routing peer for an inbound message: the sender for direct chats, the
/// conversation for groups.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChannelPeer {
    pub kind: ChatType,
    pub id: String,
}

/// Canonical inbound message handed to the chat pipeline.
///
/// Channels normalize their platform payloads into this shape; the pipeline
/// owns routing, envelope formatting and reply generation from here on.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChannelInboundContext {
    /// Display body (`"<sender>: <text>"`).
    pub body: String,
    pub raw_body: String,
    pub command_body: String,
    pub from: String,
    pub to: String,
    pub peer: ChannelPeer,
    /// Sender label used when formatting the agent envelope.
    pub envelope_from: String,
    /// Platform creation time of the message, epoch millis.
    pub envelope_timestamp: i64,
    pub account_id: String,
    pub chat_type: ChatType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_subject: Option<String>,
    pub sender_name: String,
    pub sender_id: String,
    pub provider: String,
    pub surface: String,
    pub message_sid: String,
    /// Receive time, epoch millis.
    pub timestamp: i64,
    pub was_mentioned: bool,
    pub command_authorized: bool,
    pub originating_channel: String,
    pub originating_to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_paths: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_types: Option<Vec<String>>,
}

impl ChannelInboundContext {
    /// All attached media paths, regardless of scalar or plural form.
    pub fn all_media_paths(&self) -> Vec<&str> {
        match (&self.media_path, &self.media_paths) {
            (Some(path), _) => vec![path.as_str()],
            (None, Some(paths)) => paths.iter().map(String::as_str).collect(),
            (None, None) => Vec::new(),
        }
    }
}
