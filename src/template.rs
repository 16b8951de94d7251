//! The canonical shape of generated chapter content.
//!
//! The template doubles as the structural example embedded in prompts and as
//! the source of default values when merging model output. It is built once
//! and only ever cloned.

use std::sync::LazyLock;

use serde_json::{Value, json};

static CONTENT_TEMPLATE: LazyLock<Value> = LazyLock::new(|| {
    json!({
        "content": [
            {
                "title": "🎯 Chapter Introduction",
                "description": "",
                "keyPoints": [],
                "funFact": "",
                "trivia": {
                    "question": "",
                    "answer": "",
                    "didYouKnow": ""
                }
            },
            {
                "title": "🔍 Deep Dive into Concepts",
                "description": "",
                "sections": [
                    {
                        "title": "",
                        "introduction": "",
                        "explanation": "",
                        "codeExample": "",
                        "realWorldApplication": "",
                        "commonMistakes": [],
                        "proTips": []
                    }
                ]
            },
            {
                "title": "⚡ Interactive Learning",
                "description": "",
                "exercises": [
                    {
                        "type": "challenge",
                        "scenario": "",
                        "hints": [],
                        "solution": "",
                        "explanation": ""
                    }
                ],
                "miniQuiz": [
                    {
                        "question": "",
                        "options": [],
                        "correctAnswer": "",
                        "explanation": ""
                    }
                ]
            },
            {
                "title": "🎯 Chapter Summary",
                "keyTakeaways": [],
                "nextSteps": "",
                "cheatSheet": [],
                "furtherLearning": []
            }
        ],
        "resources": {
            "recommendedVideos": [],
            "alternativeVideos": [],
            "expertTalks": [],
            "additionalReading": [
                {
                    "title": "",
                    "url": "",
                    "description": "",
                    "keyPoints": []
                }
            ]
        }
    })
});

static CONTENT_TEMPLATE_PRETTY: LazyLock<String> = LazyLock::new(|| {
    serde_json::to_string_pretty(&*CONTENT_TEMPLATE).unwrap_or_else(|_| "{}".to_owned())
});

pub fn content_template() -> &'static Value {
    &CONTENT_TEMPLATE
}

/// Pretty-printed template, exactly as embedded in chapter prompts.
pub fn content_template_pretty() -> &'static str {
    &CONTENT_TEMPLATE_PRETTY
}

pub fn template_sections() -> &'static [Value] {
    CONTENT_TEMPLATE
        .get("content")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

pub fn template_resources() -> &'static Value {
    static EMPTY: Value = Value::Null;
    CONTENT_TEMPLATE.get("resources").unwrap_or(&EMPTY)
}

/// Index of the template section that supplies defaults for generated
/// section `index`: `min(index, len - 1)`.
pub fn template_index_for(index: usize) -> usize {
    index.min(template_sections().len().saturating_sub(1))
}

pub fn template_section(index: usize) -> &'static Value {
    &template_sections()[template_index_for(index)]
}
