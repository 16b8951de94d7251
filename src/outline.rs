//! Course outline generation: the step that produces the chapter list the
//! content pipeline works through.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{GenerationError, Result};
use crate::formats::{Course, CourseOutline, OutlineEnvelope};
use crate::llm::TextModel;
use crate::normalize::extract_json_value;
use crate::prompt::outline_prompt;

/// Options collected by the course creation form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CourseInput {
    pub category: String,
    pub topic: String,
    pub description: String,
    pub level: String,
    pub duration: String,
    pub no_of_chapters: Option<u32>,
    pub display_video: Option<bool>,
}

impl CourseInput {
    /// Every missing required field, as `"<field> is required"`.
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let text_fields = [
            ("category", &self.category),
            ("topic", &self.topic),
            ("level", &self.level),
            ("duration", &self.duration),
        ];
        let mut errors = text_fields
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(field, _)| format!("{field} is required"))
            .collect::<Vec<_>>();
        if self.no_of_chapters.unwrap_or(0) == 0 {
            errors.push("noOfChapters is required".to_owned());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

pub async fn generate_outline(model: &dyn TextModel, input: &CourseInput) -> Result<CourseOutline> {
    input
        .validate()
        .map_err(|errors| GenerationError::missing(errors.join(", ")))?;

    tracing::info!(topic = %input.topic, chapters = ?input.no_of_chapters, "generating course outline");
    let raw = model.send_message(&outline_prompt(input)).await?;
    parse_outline(&raw)
}

pub fn parse_outline(raw: &str) -> Result<CourseOutline> {
    let value = extract_json_value(raw)?;
    let envelope: OutlineEnvelope = serde_json::from_value(value).map_err(|err| {
        GenerationError::invalid_structure(format!("outline does not match the course shape: {err}"))
    })?;
    if envelope.course.chapters.is_empty() {
        return Err(GenerationError::invalid_structure("outline has no chapters"));
    }
    Ok(envelope.course)
}

pub fn new_course(input: &CourseInput, outline: CourseOutline) -> Course {
    Course {
        course_id: uuid::Uuid::new_v4().to_string(),
        name: input.topic.trim().to_owned(),
        category: input.category.clone(),
        level: input.level.clone(),
        outline,
        display_video: input.display_video.unwrap_or(true),
        publish: false,
        created_at: Utc::now(),
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterEdit {
    pub name: Option<String>,
    pub about: Option<String>,
}

/// Applies an edit to the chapter at `chapter_id`. Generated content for the
/// chapter is left as is; regenerate to pick up the new name.
pub fn edit_chapter(course: &mut Course, chapter_id: usize, edit: ChapterEdit) -> Result<()> {
    let total = course.outline.chapters.len();
    let chapter = course.outline.chapters.get_mut(chapter_id).ok_or_else(|| {
        GenerationError::missing(format!("chapter {chapter_id} (course has {total})"))
    })?;
    if let Some(name) = edit.name.map(|n| n.trim().to_owned()) {
        if name.is_empty() {
            return Err(GenerationError::missing("chapter name"));
        }
        chapter.name = name;
    }
    if let Some(about) = edit.about {
        chapter.about = about;
    }
    Ok(())
}

/// `"1-2"` → `"1-2 hours"`; anything else is passed through unchanged.
pub fn format_duration(duration: &str) -> String {
    let parts = duration.split('-').map(str::trim).collect::<Vec<_>>();
    match parts.as_slice() {
        [min, max] if min.parse::<u32>().is_ok() && max.parse::<u32>().is_ok() => {
            format!("{min}-{max} hours")
        }
        _ => duration.to_owned(),
    }
}

pub fn progress_percentage(current: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    ((current as f64 / total as f64) * 100.0).round() as u32
}
