use serde_json::{Map, Value};

use crate::error::{GenerationError, Result};
use crate::formats::ChapterContent;
use crate::template::{content_template, template_resources, template_section, template_sections};

/// Turns raw model output into chapter content shaped like the template.
///
/// The result always has exactly as many sections as the template, in the
/// template's order. Generated fields win over template defaults; sections
/// past the template length are dropped. A typed field with the wrong JSON
/// type is turned into text when it can be, otherwise the template value is
/// kept. Only a missing `content` array rejects the response.
pub fn normalize_chapter_response(raw: &str, chapter_name: &str) -> Result<ChapterContent> {
    let parsed = extract_json_value(raw)?;
    let Value::Object(parsed) = parsed else {
        return Err(GenerationError::invalid_structure(format!(
            "response for {chapter_name:?} is not a JSON object"
        )));
    };

    let Some(Value::Array(sections)) = parsed.get("content") else {
        return Err(GenerationError::invalid_structure(format!(
            "response for {chapter_name:?} has no `content` array"
        )));
    };

    let template_len = template_sections().len();
    if sections.len() != template_len {
        tracing::debug!(
            chapter = chapter_name,
            generated = sections.len(),
            template = template_len,
            "section count differs from template"
        );
    }

    let mut merged_sections = Vec::with_capacity(template_len);
    for index in 0..template_len {
        let defaults = template_section(index);
        let section = match sections.get(index) {
            None => defaults.clone(),
            Some(Value::Object(generated)) => {
                let mut merged = merge_shallow(defaults, generated);
                coerce_section(&mut merged, defaults);
                Value::Object(merged)
            }
            Some(other) => {
                tracing::debug!(
                    chapter = chapter_name,
                    index,
                    kind = type_name(other),
                    "section is not an object; keeping template defaults"
                );
                defaults.clone()
            }
        };
        merged_sections.push(section);
    }

    let mut merged = content_template().as_object().cloned().unwrap_or_default();
    for (key, value) in &parsed {
        if key == "content" || key == "resources" {
            continue;
        }
        merged.insert(key.clone(), value.clone());
    }
    merged.insert("content".to_owned(), Value::Array(merged_sections));
    let resources = match parsed.get("resources") {
        Some(Value::Object(generated)) => {
            let mut merged = merge_shallow(template_resources(), generated);
            coerce_resources(&mut merged);
            Value::Object(merged)
        }
        _ => template_resources().clone(),
    };
    merged.insert("resources".to_owned(), resources);

    serde_json::from_value(Value::Object(merged)).map_err(|err| {
        GenerationError::invalid_structure(format!(
            "response for {chapter_name:?} does not fit the content template: {err}"
        ))
    })
}

/// Recovers a JSON value embedded in model output.
///
/// Strips code fences and invisible characters, slices from the first `{` to
/// the last `}`, then parses. A failed parse gets one more attempt after
/// collapsing whitespace and dropping trailing commas.
pub fn extract_json_value(raw: &str) -> Result<Value> {
    let cleaned = strip_formatting(raw);
    let span = json_object_span(&cleaned)?;

    match serde_json::from_str(span) {
        Ok(value) => Ok(value),
        Err(first) => {
            tracing::debug!(error = %first, "strict parse failed; retrying after cleanup");
            let repaired = remove_trailing_commas(&collapse_whitespace(span));
            serde_json::from_str(&repaired).map_err(|second| {
                GenerationError::malformed(format!(
                    "JSON parse failed ({first}); after cleanup ({second})"
                ))
            })
        }
    }
}

fn merge_shallow(defaults: &Value, generated: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = defaults.as_object().cloned().unwrap_or_default();
    for (key, value) in generated {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

fn coerce_section(section: &mut Map<String, Value>, defaults: &Value) {
    for key in ["title", "description"] {
        let Some(value) = section.get(key) else {
            continue;
        };
        let coerced = match text_of(value) {
            Some(text) => Value::String(text),
            None => defaults.get(key).cloned().unwrap_or(Value::Null),
        };
        section.insert(key.to_owned(), coerced);
    }
}

fn coerce_resources(resources: &mut Map<String, Value>) {
    for key in ["recommendedVideos", "alternativeVideos", "expertTalks"] {
        coerce_list(resources, key, |item| text_of(item).map(Value::String));
    }
    coerce_list(resources, "additionalReading", coerce_reading);
}

// A non-array falls back to the template list; unusable items are dropped.
fn coerce_list(map: &mut Map<String, Value>, key: &str, item: impl Fn(&Value) -> Option<Value>) {
    let Some(value) = map.get(key) else {
        return;
    };
    let coerced = match value {
        Value::Array(items) => Value::Array(items.iter().filter_map(&item).collect()),
        _ => template_resources()
            .get(key)
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new())),
    };
    map.insert(key.to_owned(), coerced);
}

fn coerce_reading(entry: &Value) -> Option<Value> {
    let Value::Object(fields) = entry else {
        return text_of(entry).map(Value::String);
    };
    let mut fields = fields.clone();
    for key in ["title", "url", "description"] {
        if let Some(value) = fields.get(key) {
            let text = text_of(value).unwrap_or_default();
            fields.insert(key.to_owned(), Value::String(text));
        }
    }
    if let Some(points) = fields.get("keyPoints") {
        let points = match points {
            Value::Array(items) => items.iter().filter_map(text_of).map(Value::String).collect(),
            other => text_of(other).map(Value::String).into_iter().collect(),
        };
        fields.insert("keyPoints".to_owned(), Value::Array(points));
    }
    Some(Value::Object(fields))
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_string) => Some(
            items
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(" "),
        ),
        _ => None,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn strip_formatting(raw: &str) -> String {
    let without_fences = strip_code_fences(raw.trim());
    without_fences
        .chars()
        .filter(|c| !is_invisible(*c))
        .collect()
}

fn is_invisible(c: char) -> bool {
    matches!(c, '\u{200B}'..='\u{200D}' | '\u{FEFF}')
        || (c.is_control() && (c as u32) < 0x20 && !matches!(c, '\t' | '\n' | '\r'))
}

// Removes "```" markers; an info string directly after a marker (```json)
// goes with it.
fn strip_code_fences(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = rest.find("```") {
        out.push_str(&rest[..pos]);
        rest = &rest[pos + 3..];

        let tag_len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '+')))
            .unwrap_or(rest.len());
        let after_tag = &rest[tag_len..];
        if after_tag.is_empty() || after_tag.starts_with(['\n', '\r']) {
            rest = after_tag;
        }
        rest = rest.strip_prefix("\r\n").unwrap_or(rest);
        rest = rest.strip_prefix('\n').unwrap_or(rest);
    }
    out.push_str(rest);
    out
}

fn json_object_span(text: &str) -> Result<&str> {
    let start = text
        .find('{')
        .ok_or_else(|| GenerationError::malformed("no `{` found in response"))?;
    let end = text
        .rfind('}')
        .ok_or_else(|| GenerationError::malformed("no `}` found in response"))?;
    if end <= start {
        return Err(GenerationError::malformed("invalid JSON object span"));
    }
    Ok(&text[start..=end])
}

fn collapse_whitespace(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_ws = false;
    for c in input.chars() {
        if c.is_whitespace() {
            if !in_ws {
                out.push(' ');
            }
            in_ws = true;
        } else {
            out.push(c);
            in_ws = false;
        }
    }
    out.trim().to_owned()
}

// `,` followed only by whitespace and then `}` or `]` is dropped.
fn remove_trailing_commas(input: &str) -> String {
    let chars = input.chars().collect::<Vec<_>>();
    let mut out = String::with_capacity(input.len());
    for (idx, c) in chars.iter().enumerate() {
        if *c == ',' {
            let next = chars[idx + 1..].iter().find(|c| !c.is_whitespace());
            if matches!(next, Some('}' | ']')) {
                continue;
            }
        }
        out.push(*c);
    }
    out
}
