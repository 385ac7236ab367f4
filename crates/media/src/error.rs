use std::error::Error as StdError;

/// Errors raised by media capabilities.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An I/O or detector backend failed.
    #[error("{context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// The buffer is larger than the caller's ceiling.
    #[error("media exceeds {max_bytes} bytes ({size} bytes)")]
    TooLarge { size: usize, max_bytes: usize },

    #[error("{message}")]
    InvalidInput { message: String },
}

impl Error {
    #[must_use]
    pub fn external<E>(context: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }

    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
