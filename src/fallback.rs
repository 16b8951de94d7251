use serde_json::{Map, json};

use crate::formats::{ChapterContent, Reading, Resources, Section};

pub const FALLBACK_TITLE: &str = "🚨 Content Generation Error";

/// Placeholder content shown when a chapter could not be generated or loaded.
pub fn fallback_content(chapter_name: &str, error_message: &str) -> ChapterContent {
    let mut details = Map::new();
    details.insert(
        "keyPoints".to_owned(),
        json!([
            format!("Error: {error_message}"),
            "The system will attempt to regenerate this content",
            "Please try again or regenerate this chapter",
        ]),
    );
    details.insert(
        "trivia".to_owned(),
        json!({
            "question": "Would you like to try regenerating the content?",
            "answer": "Yes, regenerate this chapter",
            "didYouKnow": "Generated content can differ on every attempt!",
        }),
    );

    ChapterContent {
        content: vec![Section {
            title: FALLBACK_TITLE.to_owned(),
            description: Some(format!(
                "We encountered an issue generating content for {chapter_name}."
            )),
            details,
        }],
        resources: Resources {
            additional_reading: vec![Reading {
                title: "System Documentation".to_owned(),
                url: "#".to_owned(),
                description: "Learn more about content generation".to_owned(),
                key_points: vec![
                    "Error handling".to_owned(),
                    "Regeneration process".to_owned(),
                    "Support contacts".to_owned(),
                ],
            }],
            ..Resources::default()
        },
        extra: Map::new(),
    }
}

pub fn is_fallback(content: &ChapterContent) -> bool {
    content.content.len() == 1 && content.content[0].title == FALLBACK_TITLE
}
