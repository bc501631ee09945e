use thiserror::Error;

/// Errors returned by lovepage operations.
///
/// Webhook handlers must map every variant except [`LovepageError::Unauthorized`]
/// and [`LovepageError::Config`] to a 2xx response — payment providers retry
/// aggressively (or disable the endpoint) on anything else.
#[derive(Debug, Error)]
pub enum LovepageError {
    /// Missing server-side credential or secret. Fatal, never retried.
    #[error("missing configuration: {0}")]
    Config(&'static str),

    /// A required identifier was absent or malformed in the request.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Signature verification failed. Deliberately carries no detail about
    /// which check failed — the specifics go to the log, not the caller.
    #[error("authentication failed")]
    Unauthorized,

    /// A payment-gateway call failed. Safe for the caller to retry.
    #[error("provider error {code}: {detail}")]
    Provider { code: String, detail: String },

    #[error("draft not found: {0}")]
    DraftNotFound(String),

    #[error("object not found: {0}")]
    ObjectNotFound(String),

    #[error("storage error: {0}")]
    Storage(String),

    /// Failure during page materialization. Re-invocation is safe: the
    /// finalizer re-runs from the top and either short-circuits or redoes
    /// the incomplete steps.
    #[error("finalize failed during {stage}: {cause}")]
    Finalize { stage: &'static str, cause: String },

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl LovepageError {
    pub fn provider(code: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Provider {
            code: code.into(),
            detail: detail.into(),
        }
    }

    pub fn finalize(stage: &'static str, cause: impl std::fmt::Display) -> Self {
        Self::Finalize {
            stage,
            cause: cause.to_string(),
        }
    }
}

impl From<rusqlite::Error> for LovepageError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.to_string())
    }
}
