mod provider_stub;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use courseforge::app::chapter_store::{ChapterStore, InMemoryChapterStore};
use courseforge::formats::{ChapterDescriptor, Course, CourseOutline};
use courseforge::gemini::{GeminiConfig, GeminiModel};
use courseforge::llm::TextModel;
use courseforge::pipeline::{ChapterPipeline, ContentSource};
use courseforge::status::StateBoard;
use courseforge::video::{VideoEnricher, VideoSearch, YouTubeConfig, YouTubeSearch};
use provider_stub::{ProviderStub, ProviderStubConfig};

fn course(chapters: &[&str]) -> Course {
    Course {
        course_id: "course-stub".to_owned(),
        name: "Python Basics".to_owned(),
        category: "Programming".to_owned(),
        level: "Beginner".to_owned(),
        outline: CourseOutline {
            name: "Python Basics".to_owned(),
            description: String::new(),
            learning_objectives: vec![],
            prerequisites: vec![],
            chapters: chapters
                .iter()
                .map(|name| ChapterDescriptor {
                    name: (*name).to_owned(),
                    about: "...".to_owned(),
                    duration: "15 min".to_owned(),
                    key_takeaways: vec![],
                })
                .collect(),
        },
        display_video: true,
        publish: false,
        created_at: Utc::now(),
    }
}

fn pipeline(stub: &ProviderStub, store: Arc<InMemoryChapterStore>) -> anyhow::Result<ChapterPipeline> {
    let model = GeminiModel::new(
        GeminiConfig {
            api_key: Some("test-key".to_owned()),
            model: "gemini-1.5-flash".to_owned(),
            base_url: stub.gemini_base_url.clone(),
            temperature: 1.0,
            max_output_tokens: 8192,
        },
        Duration::from_secs(10),
    )?;
    let youtube = YouTubeSearch::new(YouTubeConfig {
        name: "youtube".to_owned(),
        api_key: Some("test-key".to_owned()),
        base_url: stub.youtube_base_url.clone(),
        max_results: 10,
    })?;
    Ok(ChapterPipeline::new(
        Arc::new(model) as Arc<dyn TextModel>,
        VideoEnricher::new(Some(Arc::new(youtube) as Arc<dyn VideoSearch>), None),
        store,
        Arc::new(StateBoard::new()),
    ))
}

#[tokio::test]
async fn generates_once_then_serves_from_store() -> anyhow::Result<()> {
    let stub = ProviderStub::spawn(ProviderStubConfig::default());
    let store = Arc::new(InMemoryChapterStore::new());
    let pipeline = pipeline(&stub, Arc::clone(&store))?;
    let course = course(&["Intro to Loops"]);

    let first = pipeline.get_or_generate(&course, 0).await?;
    assert_eq!(first.source, ContentSource::Generated);
    assert_eq!(first.content.content.len(), 4);
    assert_eq!(first.content.content[0].title, "Welcome to Intro to Loops");
    assert_eq!(first.content.content[0].items("keyPoints").len(), 1);
    assert_eq!(first.content.resources.recommended_videos, ["vid0", "vid1", "vid2"]);
    assert_eq!(first.content.resources.alternative_videos, ["vid3", "vid4", "vid5"]);
    assert_eq!(first.content.resources.expert_talks, ["vid6", "vid7"]);
    assert_eq!(stub.model_calls(), 1);
    assert_eq!(stub.video_calls(), 1);

    let record = store.get("course-stub", 0).await?.expect("record stored");
    assert_eq!(record.video_id, "vid0");

    let second = pipeline.get_or_generate(&course, 0).await?;
    assert_eq!(second.source, ContentSource::Cached);
    assert_eq!(second.content, first.content);
    assert_eq!(stub.model_calls(), 1);
    assert_eq!(stub.video_calls(), 1);
    Ok(())
}

#[tokio::test]
async fn model_outage_surfaces_and_stores_nothing() -> anyhow::Result<()> {
    let stub = ProviderStub::spawn(ProviderStubConfig {
        model_down: true,
        ..ProviderStubConfig::default()
    });
    let store = Arc::new(InMemoryChapterStore::new());
    let pipeline = pipeline(&stub, Arc::clone(&store))?;

    let err = pipeline
        .get_or_generate(&course(&["Intro to Loops"]), 0)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "provider_unavailable");
    assert!(err.to_string().contains("model overloaded"), "{err}");
    assert!(store.get("course-stub", 0).await?.is_none());
    assert_eq!(stub.video_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn video_outage_still_saves_content() -> anyhow::Result<()> {
    let stub = ProviderStub::spawn(ProviderStubConfig {
        videos_down: true,
        ..ProviderStubConfig::default()
    });
    let store = Arc::new(InMemoryChapterStore::new());
    let pipeline = pipeline(&stub, Arc::clone(&store))?;

    let outcome = pipeline
        .get_or_generate(&course(&["Intro to Loops"]), 0)
        .await?;
    assert_eq!(outcome.source, ContentSource::Generated);
    assert!(outcome.content.resources.recommended_videos.is_empty());
    assert!(outcome.content.resources.expert_talks.is_empty());

    let record = store.get("course-stub", 0).await?.expect("record stored");
    assert_eq!(record.video_id, "");
    Ok(())
}

#[tokio::test]
async fn batch_regeneration_isolates_a_malformed_chapter() -> anyhow::Result<()> {
    let stub = ProviderStub::spawn(ProviderStubConfig {
        malformed_chapter: Some("Functions".to_owned()),
        ..ProviderStubConfig::default()
    });
    let store = Arc::new(InMemoryChapterStore::new());
    let pipeline = pipeline(&stub, Arc::clone(&store))?;
    let course = course(&["Variables", "Functions", "Loops"]);

    let report = pipeline.regenerate_all(&course).await?;
    assert_eq!(report.attempted, 3);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failures[0].chapter_id, 1);
    assert!(report.failures[0].error.contains("malformed model response"));
    assert_eq!(stub.model_calls(), 3);

    let stored = store
        .list("course-stub")
        .await?
        .into_iter()
        .map(|r| r.chapter_id)
        .collect::<Vec<_>>();
    assert_eq!(stored, [0, 2]);

    let status = pipeline.board().status("course-stub").expect("status");
    assert_eq!(status.success, Some(false));
    assert!(status.error.unwrap_or_default().starts_with("chapter 1:"));
    Ok(())
}
