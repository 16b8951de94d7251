use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use serde_json::Value;

#[derive(Debug, Clone, Default)]
pub struct ProviderStubConfig {
    /// Chapter prompts naming this chapter get a reply that is not JSON.
    pub malformed_chapter: Option<String>,
    /// Every generateContent call answers 503.
    pub model_down: bool,
    /// Every YouTube search answers 403.
    pub videos_down: bool,
}

/// Serves Gemini `generateContent` under `/v1beta` and YouTube `search`
/// under `/youtube/v3`.
pub struct ProviderStub {
    pub gemini_base_url: String,
    pub youtube_base_url: String,
    pub model_calls: Arc<AtomicUsize>,
    pub video_calls: Arc<AtomicUsize>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

#[allow(dead_code)]
impl ProviderStub {
    pub fn spawn(config: ProviderStubConfig) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start provider stub server");
        let addr = server.server_addr();
        let model_calls = Arc::new(AtomicUsize::new(0));
        let video_calls = Arc::new(AtomicUsize::new(0));

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let handle = {
            let model_calls = Arc::clone(&model_calls);
            let video_calls = Arc::clone(&video_calls);
            thread::spawn(move || {
                loop {
                    if shutdown_rx.try_recv().is_ok() {
                        break;
                    }

                    let mut request = match server.recv_timeout(Duration::from_millis(50)) {
                        Ok(Some(req)) => req,
                        Ok(None) => continue,
                        Err(_) => break,
                    };

                    let url = request.url().to_string();
                    let (path, query) = url.split_once('?').unwrap_or((url.as_str(), ""));

                    let (status, body) = if request.method() == &tiny_http::Method::Post
                        && path.starts_with("/v1beta/models/")
                        && path.ends_with(":generateContent")
                    {
                        model_calls.fetch_add(1, Ordering::SeqCst);
                        let mut raw = String::new();
                        if request.as_reader().read_to_string(&mut raw).is_err() {
                            (400, "invalid request body".to_owned())
                        } else {
                            generate_content(&config, &raw)
                        }
                    } else if request.method() == &tiny_http::Method::Get
                        && path == "/youtube/v3/search"
                    {
                        video_calls.fetch_add(1, Ordering::SeqCst);
                        search(&config, query)
                    } else {
                        (404, "not found".to_owned())
                    };

                    let header = tiny_http::Header::from_bytes(
                        &b"Content-Type"[..],
                        &b"application/json"[..],
                    )
                    .expect("build header");
                    let _ = request.respond(
                        tiny_http::Response::from_string(body)
                            .with_status_code(status)
                            .with_header(header),
                    );
                }
            })
        };

        Self {
            gemini_base_url: format!("http://{addr}/v1beta"),
            youtube_base_url: format!("http://{addr}/youtube/v3"),
            model_calls,
            video_calls,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn model_calls(&self) -> usize {
        self.model_calls.load(Ordering::SeqCst)
    }

    pub fn video_calls(&self) -> usize {
        self.video_calls.load(Ordering::SeqCst)
    }
}

impl Drop for ProviderStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn generate_content(config: &ProviderStubConfig, raw: &str) -> (u16, String) {
    if config.model_down {
        return (
            503,
            serde_json::json!({"error": {"code": 503, "message": "model overloaded"}}).to_string(),
        );
    }

    let Ok(request) = serde_json::from_str::<Value>(raw) else {
        return (400, "invalid json".to_owned());
    };
    let Some(prompt) = request
        .pointer("/contents/0/parts/0/text")
        .and_then(Value::as_str)
    else {
        return (400, "missing prompt".to_owned());
    };

    let text = if prompt.starts_with(courseforge::prompt::OUTLINE_PROMPT_PREFIX) {
        outline_reply(prompt)
    } else if prompt.starts_with(courseforge::prompt::CHAPTER_PROMPT_PREFIX) {
        let chapter = quoted(prompt).unwrap_or_default();
        if config
            .malformed_chapter
            .as_deref()
            .is_some_and(|name| name == chapter)
        {
            "Sorry, I cannot help with that.".to_owned()
        } else {
            chapter_reply(&chapter)
        }
    } else {
        return (400, "unknown prompt".to_owned());
    };

    let body = serde_json::json!({
        "candidates": [
            {"content": {"role": "model", "parts": [{"text": text}]}, "finishReason": "STOP"}
        ]
    });
    (200, body.to_string())
}

fn quoted(prompt: &str) -> Option<String> {
    let start = prompt.find('"')? + 1;
    let len = prompt[start..].find('"')?;
    Some(prompt[start..start + len].to_owned())
}

fn outline_reply(prompt: &str) -> String {
    let field = |label: &str| {
        prompt
            .lines()
            .find_map(|line| line.strip_prefix(label))
            .map(|v| v.trim().to_owned())
            .unwrap_or_default()
    };
    let topic = field("Topic:");
    let count = field("Number of Chapters:").parse::<usize>().unwrap_or(1);
    let chapters = (1..=count)
        .map(|n| {
            serde_json::json!({
                "name": format!("Stub Chapter {n}"),
                "about": format!("Part {n} of {topic}"),
                "duration": "10 minutes",
                "keyTakeaways": ["one", "two"],
            })
        })
        .collect::<Vec<_>>();
    let outline = serde_json::json!({
        "course": {
            "name": topic,
            "description": "Stub course",
            "learningObjectives": ["learn"],
            "prerequisites": [],
            "chapters": chapters,
        }
    });
    format!("Here is your course:\n```json\n{outline}\n```")
}

/// The content template with the first section retitled after the chapter,
/// fenced and with a trailing comma the normalizer has to repair.
fn chapter_reply(chapter: &str) -> String {
    let mut content = courseforge::template::content_template().clone();
    content["content"][0]["title"] = Value::String(format!("Welcome to {chapter}"));
    content["content"][0]["keyPoints"] = serde_json::json!(["stub point"]);
    let pretty = serde_json::to_string_pretty(&content).expect("serialize template");
    let with_trailing_comma = pretty.replacen("\"stub point\"", "\"stub point\",", 1);
    format!("```json\n{with_trailing_comma}\n```")
}

fn search(config: &ProviderStubConfig, query: &str) -> (u16, String) {
    if config.videos_down {
        return (
            403,
            serde_json::json!({"error": {"code": 403, "message": "quota exceeded"}}).to_string(),
        );
    }

    let max_results = query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "maxResults")
        .and_then(|(_, value)| value.parse::<usize>().ok())
        .unwrap_or(5);
    let items = (0..max_results)
        .map(|i| {
            serde_json::json!({
                "kind": "youtube#searchResult",
                "id": {"kind": "youtube#video", "videoId": format!("vid{i}")},
                "snippet": {"title": format!("Video {i}"), "description": "stub"},
            })
        })
        .collect::<Vec<_>>();
    (200, serde_json::json!({"items": items}).to_string())
}
