use thiserror::Error;

/// Failures of the chapter generation pipeline and its helpers.
///
/// Payloads are plain strings so that one failure can be handed to every
/// caller that joined the same in-flight generation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("malformed model response: {reason}")]
    MalformedResponse { reason: String },

    #[error("invalid content structure: {reason}")]
    InvalidStructure { reason: String },

    #[error("{provider} unavailable: {reason}")]
    ProviderUnavailable { provider: String, reason: String },

    #[error("stored chapter {chapter_id} of course {course_id} is corrupt: {reason}")]
    RecordCorrupt {
        course_id: String,
        chapter_id: usize,
        reason: String,
    },

    #[error("missing input: {what}")]
    MissingInput { what: String },

    #[error("chapter store error: {reason}")]
    Store { reason: String },

    #[error("generation for chapter {chapter_id} of course {course_id} was abandoned")]
    Abandoned { course_id: String, chapter_id: usize },
}

impl GenerationError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedResponse {
            reason: reason.into(),
        }
    }

    pub fn invalid_structure(reason: impl Into<String>) -> Self {
        Self::InvalidStructure {
            reason: reason.into(),
        }
    }

    pub fn unavailable(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ProviderUnavailable {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    pub fn missing(what: impl Into<String>) -> Self {
        Self::MissingInput { what: what.into() }
    }

    /// Wraps an `anyhow` chain coming out of a store adapter.
    pub fn store(err: &anyhow::Error) -> Self {
        Self::Store {
            reason: format!("{err:#}"),
        }
    }

    /// Short machine-readable kind, used in logs and HTTP error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedResponse { .. } => "malformed_response",
            Self::InvalidStructure { .. } => "invalid_structure",
            Self::ProviderUnavailable { .. } => "provider_unavailable",
            Self::RecordCorrupt { .. } => "record_corrupt",
            Self::MissingInput { .. } => "missing_input",
            Self::Store { .. } => "store",
            Self::Abandoned { .. } => "abandoned",
        }
    }
}

pub type Result<T> = std::result::Result<T, GenerationError>;
