use thiserror::Error;

use super::kv::{KvError, KvKey};

/// Failure of the cache or allowlist backing store.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend failed during `{op}` on `{key}`: {source}")]
    Backend {
        op: &'static str,
        key: String,
        #[source]
        source: KvError,
    },
    #[error("corrupt cache record at `{key}`: {reason}")]
    Corrupt { key: String, reason: String },
}

impl CacheError {
    pub(crate) fn backend(op: &'static str, key: &KvKey, source: KvError) -> Self {
        Self::Backend {
            op,
            key: key.to_string(),
            source,
        }
    }

    pub(crate) fn backend_space(op: &'static str, prefix: &str, source: KvError) -> Self {
        Self::Backend {
            op,
            key: format!("{prefix}/*"),
            source,
        }
    }

    pub(crate) fn corrupt(key: &KvKey, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}
