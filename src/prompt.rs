use crate::formats::ChapterDescriptor;
use crate::outline::CourseInput;
use crate::template::content_template_pretty;

/// Leading words of every chapter prompt.
pub const CHAPTER_PROMPT_PREFIX: &str = "Generate educational content for chapter";

/// Leading words of every outline prompt; the noop engine keys on it.
pub const OUTLINE_PROMPT_PREFIX: &str = "Create an engaging and interactive course structure";

pub fn chapter_prompt(chapter: &ChapterDescriptor, course_name: &str) -> String {
    let mut prompt = format!(
        "{CHAPTER_PROMPT_PREFIX} \"{chapter}\" in the course \"{course_name}\".\n\
IMPORTANT: Return ONLY valid JSON matching this exact structure. No additional text or formatting.\n\
\n\
{template}\n\
\n",
        chapter = chapter.name,
        template = content_template_pretty(),
    );

    if !chapter.about.trim().is_empty() {
        prompt.push_str(&format!("Chapter summary: {}\n", chapter.about.trim()));
    }
    if !chapter.duration.trim().is_empty() {
        prompt.push_str(&format!("Target duration: {}\n", chapter.duration.trim()));
    }
    if !chapter.key_takeaways.is_empty() {
        prompt.push_str("Key takeaways to cover:\n");
        for takeaway in &chapter.key_takeaways {
            prompt.push_str(&format!("- {takeaway}\n"));
        }
    }
    if !prompt.ends_with("\n\n") {
        prompt.push('\n');
    }

    prompt.push_str(
        "REQUIREMENTS:\n\
1. Start with { and end with }\n\
2. Use double quotes for strings\n\
3. No trailing commas\n\
4. Match structure exactly\n\
5. Make content engaging and educational\n\
6. Include practical examples\n",
    );
    prompt
}

pub fn outline_prompt(input: &CourseInput) -> String {
    format!(
        "{OUTLINE_PROMPT_PREFIX} for:\n\
Topic: {topic}\n\
Category: {category}\n\
Level: {level}\n\
Duration: {duration}\n\
Number of Chapters: {chapters}\n\
{description}\
\n\
Include:\n\
1. Engaging emojis for each section\n\
2. Clear learning objectives\n\
3. Practical examples and exercises\n\
4. Interactive elements\n\
5. Knowledge checks\n\
6. Real-world applications\n\
\n\
Return a JSON object with this exact structure:\n\
{{\n\
    \"course\": {{\n\
        \"name\": \"Course Name\",\n\
        \"description\": \"Engaging course description with emojis\",\n\
        \"learningObjectives\": [\"objective1\", \"objective2\", \"objective3\"],\n\
        \"prerequisites\": [\"prerequisite1\", \"prerequisite2\"],\n\
        \"chapters\": [\n\
            {{\n\
                \"name\": \"Chapter Name with Emoji\",\n\
                \"about\": \"Engaging chapter description\",\n\
                \"duration\": \"Duration in minutes\",\n\
                \"keyTakeaways\": [\"takeaway1\", \"takeaway2\"]\n\
            }}\n\
        ]\n\
    }}\n\
}}\n",
        topic = input.topic,
        category = input.category,
        level = input.level,
        duration = input.duration,
        chapters = input.no_of_chapters.unwrap_or_default(),
        description = match input.description.trim() {
            "" => String::new(),
            description => format!("Description: {description}\n"),
        },
    )
}
