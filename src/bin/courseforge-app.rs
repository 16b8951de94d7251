use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use axum::response::Html;
use clap::{Parser, ValueEnum};
use tower_http::services::{ServeDir, ServeFile};

use courseforge::app::chapter_store::{ChapterStore, InMemoryChapterStore, LocalFsChapterStore};
use courseforge::app::course_store::{CourseStore, InMemoryCourseStore, LocalFsCourseStore};
use courseforge::app::queue::InProcessQueue;
use courseforge::app::server::{AppState, router};
use courseforge::llm::{LlmEngine, TextModel, build_model};
use courseforge::pipeline::ChapterPipeline;
use courseforge::status::StateBoard;
use courseforge::video::VideoEnricher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StoreKind {
    Fs,
    Memory,
}

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct AppArgs {
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: SocketAddr,

    #[arg(long, default_value = "workspace-app")]
    data_dir: PathBuf,

    #[arg(long, value_enum, default_value_t = StoreKind::Fs)]
    store: StoreKind,

    /// Model engine. Defaults to `COURSEFORGE_ENGINE`, then `gemini`.
    #[arg(long, value_enum)]
    engine: Option<LlmEngine>,

    /// Concurrent whole-course regenerations.
    #[arg(long, default_value_t = 1)]
    max_concurrency: usize,

    /// Static web assets directory (serve if exists).
    #[arg(long, default_value = "web/dist")]
    web_dir: PathBuf,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    courseforge::logging::init()?;

    let args = AppArgs::parse();
    tracing::info!(?args, "starting courseforge-app");

    let (courses, chapters): (Arc<dyn CourseStore>, Arc<dyn ChapterStore>) = match args.store {
        StoreKind::Fs => (
            Arc::new(LocalFsCourseStore::new(&args.data_dir)),
            Arc::new(LocalFsChapterStore::new(&args.data_dir)),
        ),
        StoreKind::Memory => (
            Arc::new(InMemoryCourseStore::new()),
            Arc::new(InMemoryChapterStore::new()),
        ),
    };

    let engine = match args.engine {
        Some(engine) => engine,
        None => LlmEngine::from_env()?.unwrap_or(LlmEngine::Gemini),
    };
    let model: Arc<dyn TextModel> = Arc::from(build_model(engine, None)?);
    let enricher = VideoEnricher::from_env().context("build video search clients")?;
    let pipeline = Arc::new(ChapterPipeline::new(
        Arc::clone(&model),
        enricher,
        chapters,
        Arc::new(StateBoard::new()),
    ));

    let state = AppState {
        courses,
        pipeline,
        model,
        queue: InProcessQueue::new(args.max_concurrency),
    };

    let mut app = router(state);
    let web_index = args.web_dir.join("index.html");
    if web_index.exists() {
        let static_files = ServeDir::new(&args.web_dir).not_found_service(ServeFile::new(web_index));
        app = app.fallback_service(static_files);
    } else {
        app = app.fallback(|| async {
            Html(
                r#"<!doctype html>
<html>
  <head><meta charset="utf-8"><title>courseforge-app</title></head>
  <body>
    <h1>courseforge-app</h1>
    <p>web assets not found. The JSON API is served under <code>/api</code>.</p>
  </body>
</html>
"#,
            )
        });
    }

    let listener = tokio::net::TcpListener::bind(args.addr)
        .await
        .map_err(|err| anyhow::anyhow!("bind {}: {err}", args.addr))?;
    tracing::info!(addr = %args.addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(%err, "ctrl-c handler unavailable");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
