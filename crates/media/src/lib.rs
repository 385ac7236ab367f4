//! Media capabilities shared by channels: persistent storage and MIME sniffing.

pub mod error;
pub mod mime;
pub mod store;

pub use {
    error::{Error, Result},
    mime::{MagicBytesDetector, MimeDetector, OCTET_STREAM},
    store::{FsMediaStore, MediaStore, StoredMedia},
};
