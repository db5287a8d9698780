//! Error types, in the teacher's `thiserror`-enum style
//! (`ringmpsc::channel::ChannelError`, `ringmpsc_stream::error::StreamError`).

use std::sync::Arc;

/// Failure computing a value for a missing or stale key.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LoaderError {
    #[error("loader failed: {0}")]
    Failed(Arc<str>),
    #[error("loader panicked")]
    Panicked,
    #[error("loader timed out")]
    TimedOut,
}

impl LoaderError {
    pub fn from_message(message: impl Into<String>) -> Self {
        Self::Failed(Arc::from(message.into()))
    }
}

/// Top-level error type for fallible cache operations.
///
/// Mirrors `ringmpsc_stream::error::StreamError`'s split between
/// recoverable and terminal conditions: a load failure is recoverable (the
/// caller may retry), while a poisoned internal lock indicates the cache
/// should be treated as unusable.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    #[error(transparent)]
    Loader(#[from] LoaderError),
    #[error("cache is shutting down")]
    ShuttingDown,
    #[error("internal lock poisoned")]
    Poisoned,
}

impl CacheError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CacheError::Loader(_))
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_recoverable()
    }
}
