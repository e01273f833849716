use serde::Serialize;
use std::collections::BTreeMap;

/// Small diagnostic hints attached to an error (counts, ids, paths, provider name).
///
/// Never put document or query text in here.
pub type ErrorContext = BTreeMap<String, String>;

/// Codematch error types
///
/// Every classified variant maps onto one kind of the error taxonomy and carries a
/// human readable message plus a context map. `Io`, `Json` and `Other` are the
/// unclassified escape hatches used by `?` and get reported as index-build or
/// internal failures.
#[derive(Debug, thiserror::Error)]
pub enum CodematchError {
    /// Malformed or missing input, empty input, type mismatch
    #[error("Validation error: {message}")]
    DataValidation {
        message: String,
        context: ErrorContext,
    },

    /// Missing/mismatched vectoriser, bad paths, manifest mismatch
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    /// Embedding call failed or returned an inconsistent shape
    #[error("Vectorisation error: {message}")]
    Vectorisation {
        message: String,
        context: ErrorContext,
    },

    /// Embedding provider unavailable, timed out or rate limited
    #[error("External service error: {message}")]
    ExternalService {
        message: String,
        context: ErrorContext,
    },

    /// Snapshot persist/load failure
    #[error("Index build error: {message}")]
    IndexBuild {
        message: String,
        context: ErrorContext,
    },

    /// User supplied pre/post-processing hook failed
    #[error("Hook error: {message}")]
    Hook {
        message: String,
        context: ErrorContext,
    },

    /// A query produced no ranked candidates at all
    #[error("Empty response for input id '{input_id}'")]
    EmptyResponse { input_id: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// General error (anyhow integration)
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Structured error body returned across the network boundary
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorBody {
    /// Stable machine readable code
    pub error: String,

    /// Human readable description
    pub detail: String,

    /// Debug hints
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub context: ErrorContext,
}

impl CodematchError {
    /// Create data validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::DataValidation {
            message: msg.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create configuration error
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Self::Configuration {
            message: msg.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create vectorisation error
    pub fn vectorisation<S: Into<String>>(msg: S) -> Self {
        Self::Vectorisation {
            message: msg.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create external service error
    pub fn external_service<S: Into<String>>(msg: S) -> Self {
        Self::ExternalService {
            message: msg.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create index build error
    pub fn index_build<S: Into<String>>(msg: S) -> Self {
        Self::IndexBuild {
            message: msg.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create hook error
    pub fn hook<S: Into<String>>(msg: S) -> Self {
        Self::Hook {
            message: msg.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create empty response error
    pub fn empty_response<S: Into<String>>(input_id: S) -> Self {
        Self::EmptyResponse {
            input_id: input_id.into(),
        }
    }

    /// Attach a context entry, keeping the error kind.
    ///
    /// `Io` and `Json` errors are turned into index-build errors so the
    /// context has somewhere to live.
    pub fn with_context(self, key: impl Into<String>, value: impl ToString) -> Self {
        let mut err = match self {
            Self::Io(e) => Self::index_build(e.to_string()),
            Self::Json(e) => Self::index_build(e.to_string()),
            other => other,
        };
        if let Some(context) = err.context_mut() {
            context.insert(key.into(), value.to_string());
        }
        err
    }

    /// Wrap an unclassified error with `wrap`, leave classified ones untouched
    pub fn classify_with(self, wrap: impl FnOnce(String) -> Self) -> Self {
        if self.is_classified() {
            self
        } else {
            wrap(self.to_string())
        }
    }

    /// Whether the error already belongs to a taxonomy kind
    pub fn is_classified(&self) -> bool {
        !matches!(self, Self::Io(_) | Self::Json(_) | Self::Other(_))
    }

    /// Context map, if the variant carries one
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::DataValidation { context, .. }
            | Self::Configuration { context, .. }
            | Self::Vectorisation { context, .. }
            | Self::ExternalService { context, .. }
            | Self::IndexBuild { context, .. }
            | Self::Hook { context, .. } => Some(context),
            _ => None,
        }
    }

    fn context_mut(&mut self) -> Option<&mut ErrorContext> {
        match self {
            Self::DataValidation { context, .. }
            | Self::Configuration { context, .. }
            | Self::Vectorisation { context, .. }
            | Self::ExternalService { context, .. }
            | Self::IndexBuild { context, .. }
            | Self::Hook { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Stable machine readable code of the taxonomy kind
    pub fn code(&self) -> &'static str {
        match self {
            Self::DataValidation { .. } => "validation_error",
            Self::Configuration { .. } => "configuration_error",
            Self::Vectorisation { .. } => "vectorisation_error",
            Self::ExternalService { .. } => "external_service_error",
            Self::IndexBuild { .. } | Self::Io(_) | Self::Json(_) => "index_build_error",
            Self::Hook { .. } => "hook_error",
            Self::EmptyResponse { .. } => "empty_response",
            Self::Other(_) => "internal_error",
        }
    }

    /// Whether a caller may retry the failed operation with backoff
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Vectorisation { .. } | Self::ExternalService { .. })
    }

    /// Build the structured error body
    pub fn to_body(&self) -> ErrorBody {
        let detail = match self {
            Self::DataValidation { message, .. }
            | Self::Configuration { message, .. }
            | Self::Vectorisation { message, .. }
            | Self::ExternalService { message, .. }
            | Self::IndexBuild { message, .. }
            | Self::Hook { message, .. } => message.clone(),
            other => other.to_string(),
        };

        ErrorBody {
            error: self.code().to_string(),
            detail,
            context: self.context().cloned().unwrap_or_default(),
        }
    }
}

// HTTP response conversion
impl CodematchError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            Self::DataValidation { .. } => 400,
            Self::Configuration { .. } => 500,
            Self::Vectorisation { .. } => 500,
            Self::ExternalService { .. } => 503,
            Self::IndexBuild { .. } => 500,
            Self::Hook { .. } => 500,
            Self::EmptyResponse { .. } => 500,
            Self::Io(_) => 500,
            Self::Json(_) => 500,
            Self::Other(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(CodematchError::validation("bad").status_code(), 400);
        assert_eq!(CodematchError::external_service("down").status_code(), 503);
        assert_eq!(CodematchError::configuration("x").status_code(), 500);
        assert_eq!(CodematchError::empty_response("1").status_code(), 500);
    }

    #[test]
    fn test_with_context_keeps_kind() {
        let err = CodematchError::vectorisation("shape mismatch")
            .with_context("batch_index", 3)
            .with_context("provider", "OllamaVectoriser");

        assert_eq!(err.code(), "vectorisation_error");
        let context = err.context().unwrap();
        assert_eq!(context.get("batch_index").map(String::as_str), Some("3"));
        assert_eq!(
            context.get("provider").map(String::as_str),
            Some("OllamaVectoriser")
        );
    }

    #[test]
    fn test_io_error_with_context_becomes_index_build() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = CodematchError::from(io).with_context("path", "/tmp/x");
        assert!(matches!(err, CodematchError::IndexBuild { .. }));
        assert_eq!(err.to_body().context.get("path").unwrap(), "/tmp/x");
    }

    #[test]
    fn test_classify_with() {
        let unexpected = CodematchError::from(anyhow::anyhow!("boom"));
        let wrapped = unexpected.classify_with(CodematchError::hook);
        assert_eq!(wrapped.code(), "hook_error");

        let classified = CodematchError::validation("empty");
        let untouched = classified.classify_with(CodematchError::hook);
        assert_eq!(untouched.code(), "validation_error");
    }

    #[test]
    fn test_retryable() {
        assert!(CodematchError::external_service("429").is_retryable());
        assert!(CodematchError::vectorisation("timeout").is_retryable());
        assert!(!CodematchError::validation("bad").is_retryable());
        assert!(!CodematchError::index_build("io").is_retryable());
    }

    #[test]
    fn test_error_body() {
        let body = CodematchError::validation("'ids' must contain unique values.").to_body();
        assert_eq!(body.error, "validation_error");
        assert_eq!(body.detail, "'ids' must contain unique values.");

        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("context").is_none());
    }
}
