//! Shared types used across moltis channel crates.

pub mod types;

pub use types::{ChatType, MediaAttachment, ReplyPayload};
