use std::fmt::Write as _;

use serde_json::{Map, Value};

use crate::formats::{ChapterContent, ChapterDescriptor, Reading, Section};

pub fn youtube_watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

/// Renders a chapter as a standalone Markdown document.
pub fn chapter_markdown(chapter: &ChapterDescriptor, content: &ChapterContent) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {}\n", chapter.name.trim());
    if !chapter.about.trim().is_empty() {
        let _ = writeln!(out, "{}\n", chapter.about.trim());
    }
    if !chapter.duration.trim().is_empty() {
        let _ = writeln!(out, "_Duration: {}_\n", chapter.duration.trim());
    }

    for section in &content.content {
        render_section(&mut out, section);
    }
    render_resources(&mut out, content);

    let trimmed = out.trim_end().len();
    out.truncate(trimmed);
    out.push('\n');
    out
}

fn render_section(out: &mut String, section: &Section) {
    let _ = writeln!(out, "## {}\n", section.title.trim());
    if let Some(description) = section.description.as_deref().map(str::trim)
        && !description.is_empty()
    {
        let _ = writeln!(out, "{description}\n");
    }

    list(out, "Key points", section.items("keyPoints"));
    if let Some(fact) = section.text("funFact") {
        let _ = writeln!(out, "> **Fun fact:** {fact}\n");
    }
    if let Some(trivia) = section.object("trivia") {
        render_trivia(out, trivia);
    }
    for concept in section.items("sections").iter().filter_map(Value::as_object) {
        render_concept(out, concept);
    }
    for (i, exercise) in section
        .items("exercises")
        .iter()
        .filter_map(Value::as_object)
        .enumerate()
    {
        render_exercise(out, i + 1, exercise);
    }
    let quiz = match section.items("miniQuiz") {
        [] => section.items("interactiveQuiz"),
        quiz => quiz,
    };
    render_quiz(out, quiz);

    list(out, "Key takeaways", section.items("keyTakeaways"));
    match section.details.get("nextSteps") {
        Some(Value::Array(steps)) => list(out, "Next steps", steps),
        Some(Value::String(step)) if !step.trim().is_empty() => {
            let _ = writeln!(out, "### Next steps\n\n{}\n", step.trim());
        }
        _ => {}
    }
    list(out, "Cheat sheet", section.items("cheatSheet"));
    list(out, "Further learning", section.items("furtherLearning"));
}

fn render_trivia(out: &mut String, trivia: &Map<String, Value>) {
    let Some(question) = field(trivia, "question") else {
        return;
    };
    let _ = writeln!(out, "**Trivia:** {question}\n");
    if let Some(answer) = field(trivia, "answer") {
        let _ = writeln!(out, "<details><summary>Answer</summary>\n\n{answer}\n\n</details>\n");
    }
    if let Some(did_you_know) = field(trivia, "didYouKnow") {
        let _ = writeln!(out, "_Did you know?_ {did_you_know}\n");
    }
}

fn render_concept(out: &mut String, concept: &Map<String, Value>) {
    let Some(title) = field(concept, "title") else {
        return;
    };
    let _ = writeln!(out, "### {title}\n");
    for key in ["introduction", "explanation"] {
        if let Some(text) = field(concept, key) {
            let _ = writeln!(out, "{text}\n");
        }
    }
    if let Some(code) = field(concept, "codeExample") {
        let _ = writeln!(out, "```\n{code}\n```\n");
    }
    if let Some(application) = field(concept, "realWorldApplication") {
        let _ = writeln!(out, "**In practice:** {application}\n");
    }
    list_bold(out, "Common mistakes", items(concept, "commonMistakes"));
    list_bold(out, "Pro tips", items(concept, "proTips"));
}

fn render_exercise(out: &mut String, number: usize, exercise: &Map<String, Value>) {
    let Some(scenario) = field(exercise, "scenario") else {
        return;
    };
    match field(exercise, "type") {
        Some(kind) => {
            let _ = writeln!(out, "### Exercise {number} ({kind})\n");
        }
        None => {
            let _ = writeln!(out, "### Exercise {number}\n");
        }
    }
    let _ = writeln!(out, "{scenario}\n");
    list_bold(out, "Hints", items(exercise, "hints"));
    if let Some(solution) = field(exercise, "solution") {
        let _ = writeln!(out, "<details><summary>Solution</summary>\n\n```\n{solution}\n```\n\n</details>\n");
    }
    if let Some(explanation) = field(exercise, "explanation") {
        let _ = writeln!(out, "{explanation}\n");
    }
}

fn render_quiz(out: &mut String, quiz: &[Value]) {
    let questions = quiz
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|q| field(q, "question").map(|text| (text, q)))
        .collect::<Vec<_>>();
    if questions.is_empty() {
        return;
    }

    let _ = writeln!(out, "### Quiz\n");
    for (i, (question, q)) in questions.into_iter().enumerate() {
        let _ = writeln!(out, "{}. {question}", i + 1);
        for option in items(q, "options").iter().filter_map(item_text) {
            let _ = writeln!(out, "   - {option}");
        }
        out.push('\n');
        if let Some(answer) = field(q, "correctAnswer") {
            let _ = write!(out, "   _Answer:_ {answer}");
            match field(q, "explanation") {
                Some(explanation) => {
                    let _ = writeln!(out, " ({explanation})\n");
                }
                None => out.push_str("\n\n"),
            }
        }
    }
}

fn render_resources(out: &mut String, content: &ChapterContent) {
    let resources = &content.resources;
    let buckets = [
        ("Recommended videos", &resources.recommended_videos),
        ("More videos", &resources.alternative_videos),
        ("Expert talks", &resources.expert_talks),
    ];
    let readings = resources
        .additional_reading
        .iter()
        .filter(|r| !r.title.trim().is_empty())
        .collect::<Vec<_>>();
    if buckets.iter().all(|(_, ids)| ids.is_empty()) && readings.is_empty() {
        return;
    }

    let _ = writeln!(out, "## Resources\n");
    for (label, ids) in buckets {
        if ids.is_empty() {
            continue;
        }
        let _ = writeln!(out, "**{label}**\n");
        for id in ids {
            let _ = writeln!(out, "- <{}>", youtube_watch_url(id));
        }
        out.push('\n');
    }
    if !readings.is_empty() {
        let _ = writeln!(out, "**Further reading**\n");
        for reading in readings {
            render_reading(out, reading);
        }
        out.push('\n');
    }
}

fn render_reading(out: &mut String, reading: &Reading) {
    let title = reading.title.trim();
    match reading.url.trim() {
        "" | "#" => {
            let _ = write!(out, "- {title}");
        }
        url => {
            let _ = write!(out, "- [{title}]({url})");
        }
    }
    if !reading.description.trim().is_empty() {
        let _ = write!(out, ": {}", reading.description.trim());
    }
    out.push('\n');
}

fn list(out: &mut String, heading: &str, values: &[Value]) {
    let entries = values.iter().filter_map(item_text).collect::<Vec<_>>();
    if entries.is_empty() {
        return;
    }
    let _ = writeln!(out, "### {heading}\n");
    for entry in entries {
        let _ = writeln!(out, "- {entry}");
    }
    out.push('\n');
}

fn list_bold(out: &mut String, heading: &str, values: &[Value]) {
    let entries = values.iter().filter_map(item_text).collect::<Vec<_>>();
    if entries.is_empty() {
        return;
    }
    let _ = writeln!(out, "**{heading}**\n");
    for entry in entries {
        let _ = writeln!(out, "- {entry}");
    }
    out.push('\n');
}

fn field<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn items<'a>(map: &'a Map<String, Value>, key: &str) -> &'a [Value] {
    map.get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

// Lists are usually strings, but cheat sheets and further-learning entries
// sometimes come back as small objects.
fn item_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
        Value::Object(map) => {
            let parts = map
                .values()
                .filter_map(|v| match v {
                    Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect::<Vec<_>>();
            (!parts.is_empty()).then(|| parts.join(": "))
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::fallback::fallback_content;
    use crate::formats::VideoBuckets;

    fn chapter() -> ChapterDescriptor {
        ChapterDescriptor {
            name: "Intro to Loops".to_owned(),
            about: "Repeat yourself, on purpose.".to_owned(),
            duration: "15 min".to_owned(),
            key_takeaways: vec![],
        }
    }

    #[test]
    fn renders_sections_and_resources() -> anyhow::Result<()> {
        let mut content: ChapterContent = serde_json::from_value(json!({
            "content": [
                {
                    "title": "🎯 Chapter Introduction",
                    "description": "Loops run code many times.",
                    "keyPoints": ["for", "while"],
                    "funFact": "The first loop ran on a loom.",
                    "trivia": {"question": "Oldest loop?", "answer": "Jacquard", "didYouKnow": ""}
                },
                {
                    "title": "🔍 Deep Dive into Concepts",
                    "sections": [{"title": "for loops", "explanation": "Iterate a range.", "codeExample": "for i in range(3):\n    print(i)", "proTips": ["Use enumerate"]}]
                },
                {
                    "title": "⚡ Interactive Learning",
                    "exercises": [{"type": "challenge", "scenario": "Sum 1..10", "hints": [], "solution": "sum(range(11))"}],
                    "interactiveQuiz": [{"question": "Which loop?", "options": ["for", "while"], "correctAnswer": "for"}]
                },
                {
                    "title": "🎯 Chapter Summary",
                    "keyTakeaways": ["Loops repeat"],
                    "nextSteps": "Functions",
                    "cheatSheet": [{"term": "break", "meaning": "exit loop"}]
                }
            ],
            "resources": {"additionalReading": [{"title": "Python docs", "url": "https://docs.python.org", "description": "", "keyPoints": []}]}
        }))?;
        content.resources.apply_videos(VideoBuckets {
            recommended_videos: vec!["abc123".to_owned()],
            ..VideoBuckets::default()
        });

        let md = chapter_markdown(&chapter(), &content);
        assert!(md.starts_with("# Intro to Loops\n"));
        assert!(md.contains("_Duration: 15 min_"));
        assert!(md.contains("- while\n"));
        assert!(md.contains("> **Fun fact:** The first loop ran on a loom."));
        assert!(md.contains("```\nfor i in range(3):\n    print(i)\n```"));
        assert!(md.contains("### Exercise 1 (challenge)"));
        assert!(md.contains("1. Which loop?\n   - for\n   - while"));
        assert!(md.contains("### Next steps\n\nFunctions"));
        assert!(md.contains("- break: exit loop"));
        assert!(md.contains("- <https://www.youtube.com/watch?v=abc123>"));
        assert!(md.contains("- [Python docs](https://docs.python.org)"));
        assert!(!md.contains("Did you know"));
        assert!(md.ends_with('\n') && !md.ends_with("\n\n"));
        Ok(())
    }

    #[test]
    fn fallback_content_renders_error_and_placeholder_link() {
        let md = chapter_markdown(&chapter(), &fallback_content("Intro to Loops", "boom"));
        assert!(md.contains("- Error: boom"));
        assert!(md.contains("- System Documentation: Learn more"));
        assert!(!md.contains("](#)"));
    }
}
