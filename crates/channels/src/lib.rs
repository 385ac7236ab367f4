//! Channel plugin system.
//!
//! Each channel implements the [`ChannelPlugin`] trait with sub-traits for
//! outbound messaging and status, and hands normalized inbound messages to
//! the chat pipeline through a [`ChannelEventSink`].

pub mod context;
pub mod plugin;

pub use {
    context::{ChannelInboundContext, ChannelPeer},
    plugin::{
        ChannelEvent, ChannelEventSink, ChannelHealthSnapshot, ChannelOutbound, ChannelPlugin,
        ChannelReplyDelivery, ChannelStatus,
    },
};
