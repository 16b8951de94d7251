mod provider_stub;

use std::sync::Arc;
use std::time::Duration;

use courseforge::app::chapter_store::InMemoryChapterStore;
use courseforge::app::course_store::InMemoryCourseStore;
use courseforge::app::queue::InProcessQueue;
use courseforge::app::server::{AppState, router};
use courseforge::gemini::{GeminiConfig, GeminiModel};
use courseforge::llm::TextModel;
use courseforge::pipeline::ChapterPipeline;
use courseforge::status::StateBoard;
use courseforge::video::VideoEnricher;
use provider_stub::{ProviderStub, ProviderStubConfig};
use serde_json::{Value, json};

async fn serve(stub: &ProviderStub) -> anyhow::Result<String> {
    let model: Arc<dyn TextModel> = Arc::new(GeminiModel::new(
        GeminiConfig {
            api_key: Some("test-key".to_owned()),
            model: "gemini-1.5-flash".to_owned(),
            base_url: stub.gemini_base_url.clone(),
            temperature: 1.0,
            max_output_tokens: 8192,
        },
        Duration::from_secs(10),
    )?);
    let pipeline = ChapterPipeline::new(
        Arc::clone(&model),
        VideoEnricher::default(),
        Arc::new(InMemoryChapterStore::new()),
        Arc::new(StateBoard::new()),
    );
    let app = router(AppState {
        courses: Arc::new(InMemoryCourseStore::new()),
        pipeline: Arc::new(pipeline),
        model,
        queue: InProcessQueue::new(1),
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{addr}"))
}

async fn create_course(client: &reqwest::Client, base: &str) -> anyhow::Result<Value> {
    let response = client
        .post(format!("{base}/api/courses"))
        .json(&json!({
            "category": "Programming",
            "topic": "Python Basics",
            "level": "Beginner",
            "duration": "1-2",
            "noOfChapters": 2
        }))
        .send()
        .await?;
    assert_eq!(response.status(), reqwest::StatusCode::CREATED);
    Ok(response.json().await?)
}

#[tokio::test]
async fn course_and_chapter_lifecycle() -> anyhow::Result<()> {
    let stub = ProviderStub::spawn(ProviderStubConfig::default());
    let base = serve(&stub).await?;
    let client = reqwest::Client::new();

    let health = client.get(format!("{base}/healthz")).send().await?;
    assert_eq!(health.text().await?, "ok\n");

    let course = create_course(&client, &base).await?;
    let course_id = course["courseId"].as_str().expect("courseId").to_owned();
    assert_eq!(course["outline"]["chapters"].as_array().map(Vec::len), Some(2));
    assert_eq!(course["displayVideo"], true);

    let listed: Value = client
        .get(format!("{base}/api/courses"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(listed[0]["courseId"], course_id.as_str());

    let chapter_url = format!("{base}/api/courses/{course_id}/chapters/0");
    let chapter: Value = client.get(&chapter_url).send().await?.json().await?;
    assert_eq!(chapter["source"], "generated");
    assert_eq!(chapter["content"]["content"][0]["title"], "Welcome to Stub Chapter 1");

    let again: Value = client.get(&chapter_url).send().await?.json().await?;
    assert_eq!(again["source"], "cached");
    assert_eq!(stub.model_calls(), 2);

    let markdown = client
        .get(format!("{chapter_url}/markdown"))
        .send()
        .await?
        .text()
        .await?;
    assert!(markdown.starts_with("# Stub Chapter 1\n"), "{markdown}");

    let edited: Value = client
        .patch(&chapter_url)
        .json(&json!({"name": "Loops"}))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(edited["outline"]["chapters"][0]["name"], "Loops");

    let regenerated: Value = client
        .post(format!("{chapter_url}/regenerate"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(regenerated["source"], "generated");
    assert_eq!(regenerated["content"]["content"][0]["title"], "Welcome to Loops");
    Ok(())
}

#[tokio::test]
async fn batch_regeneration_reports_through_status() -> anyhow::Result<()> {
    let stub = ProviderStub::spawn(ProviderStubConfig::default());
    let base = serve(&stub).await?;
    let client = reqwest::Client::new();
    let course = create_course(&client, &base).await?;
    let course_id = course["courseId"].as_str().expect("courseId").to_owned();
    assert_eq!(course["publish"], false);

    let accepted = client
        .post(format!("{base}/api/courses/{course_id}/regenerate"))
        .send()
        .await?;
    assert_eq!(accepted.status(), reqwest::StatusCode::ACCEPTED);

    let mut status = Value::Null;
    for _ in 0..100 {
        status = client
            .get(format!("{base}/api/courses/{course_id}/status"))
            .send()
            .await?
            .json()
            .await?;
        if status["success"].is_boolean() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(status["success"], true, "{status}");
    assert_eq!(status["active"], false);
    assert_eq!(status["progressPercent"], 100);
    assert_eq!(status["message"], "Regenerated 2/2 chapters");
    assert_eq!(status["chapters"], json!(["ready", "ready"]));

    let mut published = Value::Null;
    for _ in 0..100 {
        published = client
            .get(format!("{base}/api/courses/{course_id}"))
            .send()
            .await?
            .json()
            .await?;
        if published["publish"] == true {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(published["publish"], true, "{published}");
    Ok(())
}

#[tokio::test]
async fn errors_map_to_status_codes() -> anyhow::Result<()> {
    let stub = ProviderStub::spawn(ProviderStubConfig::default());
    let base = serve(&stub).await?;
    let client = reqwest::Client::new();

    let invalid = client
        .post(format!("{base}/api/courses"))
        .json(&json!({"topic": "Python"}))
        .send()
        .await?;
    assert_eq!(invalid.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = invalid.json().await?;
    assert!(body["message"].as_str().unwrap_or_default().contains("category is required"));

    let missing = client
        .get(format!("{base}/api/courses/unknown-course"))
        .send()
        .await?;
    assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);

    let course = create_course(&client, &base).await?;
    let course_id = course["courseId"].as_str().expect("courseId").to_owned();
    let out_of_range = client
        .get(format!("{base}/api/courses/{course_id}/chapters/9"))
        .send()
        .await?;
    assert_eq!(out_of_range.status(), reqwest::StatusCode::NOT_FOUND);
    let body: Value = out_of_range.json().await?;
    assert_eq!(body["kind"], "missing_input");
    Ok(())
}

#[tokio::test]
async fn model_outage_is_bad_gateway() -> anyhow::Result<()> {
    let stub = ProviderStub::spawn(ProviderStubConfig {
        model_down: true,
        ..ProviderStubConfig::default()
    });
    let base = serve(&stub).await?;
    let response = reqwest::Client::new()
        .post(format!("{base}/api/courses"))
        .json(&json!({
            "category": "Programming",
            "topic": "Python Basics",
            "level": "Beginner",
            "duration": "1-2",
            "noOfChapters": 2
        }))
        .send()
        .await?;
    assert_eq!(response.status(), reqwest::StatusCode::BAD_GATEWAY);
    let body: Value = response.json().await?;
    assert_eq!(body["kind"], "provider_unavailable");
    Ok(())
}
