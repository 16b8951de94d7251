use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;

use crate::app::chapter_store::LocalFsChapterStore;
use crate::cli::{ChapterArgs, EngineArgs, OutlineArgs, OutputFormat, RegenerateArgs};
use crate::formats::Course;
use crate::llm::{CommandConfig, LlmEngine, TextModel, build_model};
use crate::outline::{CourseInput, generate_outline, new_course};
use crate::pipeline::ChapterPipeline;
use crate::render::chapter_markdown;
use crate::status::StateBoard;
use crate::template::content_template_pretty;
use crate::video::VideoEnricher;

pub fn template() -> anyhow::Result<()> {
    println!("{}", content_template_pretty());
    Ok(())
}

pub async fn outline(args: OutlineArgs) -> anyhow::Result<()> {
    if args.out.exists() && !args.force {
        anyhow::bail!(
            "output already exists: {} (pass --force to overwrite)",
            args.out.display()
        );
    }

    let input = CourseInput {
        category: args.category,
        topic: args.topic,
        description: args.description,
        level: args.level,
        duration: args.duration,
        no_of_chapters: Some(args.chapters),
        display_video: Some(!args.engine.no_videos),
    };
    let model = model(&args.engine)?;
    let outline = generate_outline(model.as_ref(), &input)
        .await
        .context("generate outline")?;
    let course = new_course(&input, outline);

    write_course(&args.out, &course)?;
    tracing::info!(
        course_id = %course.course_id,
        chapters = course.outline.chapters.len(),
        out = %args.out.display(),
        "course written"
    );
    println!("{}", course.course_id);
    Ok(())
}

pub async fn chapter(args: ChapterArgs) -> anyhow::Result<()> {
    let course = read_course(&args.course)?;
    let pipeline = pipeline(&args.engine, &args.store)?;

    let outcome = pipeline
        .get_or_generate(&course, args.chapter)
        .await
        .with_context(|| format!("chapter {} of {}", args.chapter, course.course_id))?;
    if let Some(error) = outcome.error() {
        tracing::warn!(kind = error.kind(), %error, "showing fallback content");
    }

    match args.format {
        OutputFormat::Markdown => {
            let descriptor = course
                .chapter(args.chapter)
                .context("chapter disappeared from course")?;
            print!("{}", chapter_markdown(descriptor, &outcome.content));
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(outcome.content.as_ref())
                .context("serialize chapter content")?;
            println!("{json}");
        }
    }
    Ok(())
}

pub async fn regenerate(args: RegenerateArgs) -> anyhow::Result<()> {
    let mut course = read_course(&args.course)?;
    let pipeline = pipeline(&args.engine, &args.store)?;

    let mut updates = pipeline.board().subscribe(&course.course_id);
    let progress = tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let status = updates.borrow_and_update().clone();
            tracing::info!(
                step = ?status.step,
                progress = status.progress_percent(),
                "{}",
                status.message
            );
        }
    });

    let outcome = match args.chapter {
        Some(chapter_id) => pipeline
            .regenerate_one(&course, chapter_id)
            .await
            .map(|_| ())
            .with_context(|| format!("regenerate chapter {chapter_id}")),
        None => pipeline
            .regenerate_all(&course)
            .await
            .map(|_| ())
            .context("regenerate course"),
    };
    progress.abort();
    outcome?;

    if args.chapter.is_none() && !course.publish {
        course.publish = true;
        write_course(&args.course, &course)?;
    }

    let status = pipeline
        .board()
        .status(&course.course_id)
        .context("no generation status recorded")?;
    println!(
        "{}",
        serde_json::to_string_pretty(&status).context("serialize status")?
    );
    if let Some(error) = status.error.filter(|_| status.success == Some(false)) {
        anyhow::bail!("regeneration failed: {error}");
    }
    Ok(())
}

/// Reads a course file. JSON is accepted as YAML.
pub fn read_course(path: &Path) -> anyhow::Result<Course> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read course file: {}", path.display()))?;
    serde_yaml::from_str(&raw).with_context(|| format!("parse course file: {}", path.display()))
}

pub fn write_course(path: &Path, course: &Course) -> anyhow::Result<()> {
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml")
    );
    let text = if is_yaml {
        serde_yaml::to_string(course).context("serialize course yaml")?
    } else {
        let mut json = serde_json::to_string_pretty(course).context("serialize course json")?;
        json.push('\n');
        json
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create dir: {}", parent.display()))?;
    }
    std::fs::write(path, text).with_context(|| format!("write course file: {}", path.display()))
}

pub fn resolve_engine(flag: Option<LlmEngine>) -> anyhow::Result<LlmEngine> {
    match flag {
        Some(engine) => Ok(engine),
        None => Ok(LlmEngine::from_env()?.unwrap_or(LlmEngine::Gemini)),
    }
}

fn model(args: &EngineArgs) -> anyhow::Result<Arc<dyn TextModel>> {
    let engine = resolve_engine(args.engine)?;
    let command = args.model_command.as_ref().map(|program| CommandConfig {
        program: program.clone(),
        args: args.model_args.clone(),
    });
    Ok(Arc::from(build_model(engine, command)?))
}

fn pipeline(args: &EngineArgs, store_dir: &Path) -> anyhow::Result<ChapterPipeline> {
    let enricher = if args.no_videos {
        VideoEnricher::default()
    } else {
        VideoEnricher::from_env().context("build video search clients")?
    };
    Ok(ChapterPipeline::new(
        model(args)?,
        enricher,
        Arc::new(LocalFsChapterStore::new(store_dir)),
        Arc::new(StateBoard::new()),
    ))
}
