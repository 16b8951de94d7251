use serde::{Deserialize, Serialize};

use crate::error::GenerationError;
use crate::formats::{ChapterContent, ChapterKey};
use crate::pipeline::ChapterOutcome;
use crate::status::GenerationStatus;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub kind: String,
    pub message: String,
}

impl From<&GenerationError> for ApiError {
    fn from(err: &GenerationError) -> Self {
        Self {
            kind: err.kind().to_owned(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterResponse {
    pub course_id: String,
    pub chapter_id: usize,
    /// `cached`, `generated` or `fallback`.
    pub source: String,
    pub content: ChapterContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

impl ChapterResponse {
    pub fn new(key: &ChapterKey, outcome: &ChapterOutcome) -> Self {
        Self {
            course_id: key.course_id.clone(),
            chapter_id: key.chapter_id,
            source: outcome.source_name().to_owned(),
            content: outcome.content.as_ref().clone(),
            error: outcome.error().map(ApiError::from),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegenerateAccepted {
    pub course_id: String,
    pub chapters: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub course_id: String,
    pub progress_percent: u32,
    #[serde(flatten)]
    pub status: GenerationStatus,
    /// Per chapter, in outline order: `idle`, `generating` or `ready`.
    #[serde(default)]
    pub chapters: Vec<String>,
}

impl StatusResponse {
    pub fn new(course_id: &str, status: GenerationStatus) -> Self {
        Self {
            course_id: course_id.to_owned(),
            progress_percent: status.progress_percent(),
            status,
            chapters: Vec::new(),
        }
    }

    pub fn with_chapters(mut self, chapters: Vec<String>) -> Self {
        self.chapters = chapters;
        self
    }
}
