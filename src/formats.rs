use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One entry of a course outline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterDescriptor {
    pub name: String,
    #[serde(default)]
    pub about: String,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub key_takeaways: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseOutline {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub learning_objectives: Vec<String>,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    pub chapters: Vec<ChapterDescriptor>,
}

/// Shape the outline prompt asks the model for: `{"course": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlineEnvelope {
    pub course: CourseOutline,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub course_id: String,
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub level: String,
    pub outline: CourseOutline,
    /// When false, chapters are generated without video search.
    #[serde(default = "default_true")]
    pub display_video: bool,
    /// Set once every chapter of the course has been through a full run.
    #[serde(default)]
    pub publish: bool,
    pub created_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl Course {
    pub fn chapter(&self, chapter_id: usize) -> Option<&ChapterDescriptor> {
        self.outline.chapters.get(chapter_id)
    }
}

/// Identity of a persisted chapter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChapterKey {
    pub course_id: String,
    pub chapter_id: usize,
}

impl ChapterKey {
    pub fn new(course_id: impl Into<String>, chapter_id: usize) -> Self {
        Self {
            course_id: course_id.into(),
            chapter_id,
        }
    }
}

impl std::fmt::Display for ChapterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.course_id, self.chapter_id)
    }
}

/// Generated content of one chapter: the unit that is persisted and rendered.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChapterContent {
    #[serde(default)]
    pub content: Vec<Section>,
    #[serde(default)]
    pub resources: Resources,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChapterContent {
    pub fn first_recommended_video(&self) -> &str {
        self.resources
            .recommended_videos
            .first()
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// A section of chapter content.
///
/// Only `title` and `description` are common to every role; the role-specific
/// fields (`keyPoints`, `trivia`, `sections`, `exercises`, `miniQuiz`, ...)
/// are kept as they were generated.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Section {
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl Section {
    pub fn text(&self, key: &str) -> Option<&str> {
        self.details
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    pub fn items(&self, key: &str) -> &[Value] {
        self.details
            .get(key)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn object(&self, key: &str) -> Option<&Map<String, Value>> {
        self.details.get(key).and_then(Value::as_object)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resources {
    #[serde(default)]
    pub recommended_videos: Vec<String>,
    #[serde(default)]
    pub alternative_videos: Vec<String>,
    #[serde(default)]
    pub expert_talks: Vec<String>,
    #[serde(default)]
    pub additional_reading: Vec<Reading>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Resources {
    /// Video buckets replace whatever placeholder values the model produced.
    pub fn apply_videos(&mut self, videos: VideoBuckets) {
        self.recommended_videos = videos.recommended_videos;
        self.alternative_videos = videos.alternative_videos;
        self.expert_talks = videos.expert_talks;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "ReadingRepr")]
pub struct Reading {
    pub title: String,
    pub url: String,
    pub description: String,
    pub key_points: Vec<String>,
}

// Models sometimes list readings as bare titles.
#[derive(Deserialize)]
#[serde(untagged)]
enum ReadingRepr {
    Title(String),
    Full(ReadingFields),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadingFields {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    key_points: Vec<String>,
}

impl From<ReadingRepr> for Reading {
    fn from(repr: ReadingRepr) -> Self {
        match repr {
            ReadingRepr::Title(title) => Reading {
                title,
                ..Reading::default()
            },
            ReadingRepr::Full(fields) => Reading {
                title: fields.title,
                url: fields.url,
                description: fields.description,
                key_points: fields.key_points,
            },
        }
    }
}

/// Ranked video identifiers attached to a chapter.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoBuckets {
    pub recommended_videos: Vec<String>,
    pub alternative_videos: Vec<String>,
    pub expert_talks: Vec<String>,
}

impl VideoBuckets {
    pub fn is_empty(&self) -> bool {
        self.recommended_videos.is_empty()
            && self.alternative_videos.is_empty()
            && self.expert_talks.is_empty()
    }
}

/// Row stored by the chapter store.
///
/// `content` is either a JSON document or a string holding serialized JSON;
/// older writers stored the latter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterRecord {
    pub course_id: String,
    pub chapter_id: usize,
    pub content: Value,
    #[serde(default)]
    pub video_id: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl ChapterRecord {
    pub fn key(&self) -> ChapterKey {
        ChapterKey::new(self.course_id.clone(), self.chapter_id)
    }

    pub fn parse_content(&self) -> Result<ChapterContent, serde_json::Error> {
        match &self.content {
            Value::String(raw) => serde_json::from_str(raw),
            other => serde_json::from_value(other.clone()),
        }
    }
}
