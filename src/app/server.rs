use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::app::course_store::{CourseStore, mark_published};
use crate::app::json_fs::ensure_path_safe_id;
use crate::app::model::{ApiError, ChapterResponse, RegenerateAccepted, StatusResponse};
use crate::app::queue::InProcessQueue;
use crate::error::GenerationError;
use crate::formats::{ChapterKey, Course};
use crate::llm::TextModel;
use crate::outline::{ChapterEdit, CourseInput, edit_chapter, generate_outline, new_course};
use crate::pipeline::ChapterPipeline;
use crate::render::chapter_markdown;
use crate::status::GenerationStatus;

#[derive(Clone)]
pub struct AppState {
    pub courses: Arc<dyn CourseStore>,
    pub pipeline: Arc<ChapterPipeline>,
    pub model: Arc<dyn TextModel>,
    pub queue: InProcessQueue,
}

/// JSON API routes. Static assets are mounted by the binary.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok\n" }))
        .route("/api/courses", post(create_course).get(list_courses))
        .route("/api/courses/:course_id", get(get_course))
        .route("/api/courses/:course_id/status", get(course_status))
        .route("/api/courses/:course_id/regenerate", post(regenerate_course))
        .route(
            "/api/courses/:course_id/chapters/:chapter_id",
            get(get_chapter).patch(patch_chapter),
        )
        .route(
            "/api/courses/:course_id/chapters/:chapter_id/markdown",
            get(get_chapter_markdown),
        )
        .route(
            "/api/courses/:course_id/chapters/:chapter_id/regenerate",
            post(regenerate_chapter),
        )
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

#[derive(Debug)]
pub struct ApiFailure {
    status: StatusCode,
    error: ApiError,
}

impl ApiFailure {
    fn new(status: StatusCode, kind: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            error: ApiError {
                kind: kind.to_owned(),
                message: message.into(),
            },
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }
}

impl From<GenerationError> for ApiFailure {
    fn from(err: GenerationError) -> Self {
        let status = match &err {
            GenerationError::MissingInput { .. } => StatusCode::NOT_FOUND,
            GenerationError::ProviderUnavailable { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            error: ApiError::from(&err),
        }
    }
}

impl From<anyhow::Error> for ApiFailure {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!(?err, "request failed");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "store", format!("{err:#}"))
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        (self.status, Json(self.error)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiFailure>;

async fn load_course(state: &AppState, course_id: &str) -> ApiResult<Course> {
    ensure_path_safe_id(course_id).map_err(|err| {
        ApiFailure::new(StatusCode::BAD_REQUEST, "missing_input", format!("{err:#}"))
    })?;
    state
        .courses
        .get(course_id)
        .await?
        .ok_or_else(|| ApiFailure::not_found(format!("course not found: {course_id}")))
}

async fn create_course(
    State(state): State<AppState>,
    Json(input): Json<CourseInput>,
) -> ApiResult<(StatusCode, Json<Course>)> {
    if let Err(errors) = input.validate() {
        return Err(ApiFailure::new(
            StatusCode::BAD_REQUEST,
            "missing_input",
            errors.join(", "),
        ));
    }

    let outline = generate_outline(state.model.as_ref(), &input).await?;
    let course = new_course(&input, outline);
    state.courses.create(&course).await?;
    tracing::info!(course_id = %course.course_id, chapters = course.outline.chapters.len(), "course created");
    Ok((StatusCode::CREATED, Json(course)))
}

async fn list_courses(State(state): State<AppState>) -> ApiResult<Json<Vec<Course>>> {
    Ok(Json(state.courses.list().await?))
}

async fn get_course(
    State(state): State<AppState>,
    Path(course_id): Path<String>,
) -> ApiResult<Json<Course>> {
    Ok(Json(load_course(&state, &course_id).await?))
}

async fn patch_chapter(
    State(state): State<AppState>,
    Path((course_id, chapter_id)): Path<(String, usize)>,
    Json(edit): Json<ChapterEdit>,
) -> ApiResult<Json<Course>> {
    let mut course = load_course(&state, &course_id).await?;
    edit_chapter(&mut course, chapter_id, edit)?;
    state.courses.put(&course).await?;
    Ok(Json(course))
}

async fn get_chapter(
    State(state): State<AppState>,
    Path((course_id, chapter_id)): Path<(String, usize)>,
) -> ApiResult<Json<ChapterResponse>> {
    let course = load_course(&state, &course_id).await?;
    let outcome = state.pipeline.get_or_generate(&course, chapter_id).await?;
    Ok(Json(ChapterResponse::new(
        &ChapterKey::new(course_id, chapter_id),
        &outcome,
    )))
}

async fn get_chapter_markdown(
    State(state): State<AppState>,
    Path((course_id, chapter_id)): Path<(String, usize)>,
) -> ApiResult<Response> {
    let course = load_course(&state, &course_id).await?;
    let outcome = state.pipeline.get_or_generate(&course, chapter_id).await?;
    let chapter = course
        .chapter(chapter_id)
        .ok_or_else(|| ApiFailure::not_found(format!("chapter not found: {chapter_id}")))?;
    Ok((
        [(header::CONTENT_TYPE, "text/markdown; charset=utf-8")],
        chapter_markdown(chapter, &outcome.content),
    )
        .into_response())
}

async fn regenerate_chapter(
    State(state): State<AppState>,
    Path((course_id, chapter_id)): Path<(String, usize)>,
) -> ApiResult<Json<ChapterResponse>> {
    let course = load_course(&state, &course_id).await?;
    let outcome = state.pipeline.regenerate_one(&course, chapter_id).await?;
    Ok(Json(ChapterResponse::new(
        &ChapterKey::new(course_id, chapter_id),
        &outcome,
    )))
}

async fn regenerate_course(
    State(state): State<AppState>,
    Path(course_id): Path<String>,
) -> ApiResult<(StatusCode, Json<RegenerateAccepted>)> {
    let course = load_course(&state, &course_id).await?;
    let accepted = RegenerateAccepted {
        course_id: course.course_id.clone(),
        chapters: course.outline.chapters.len(),
    };

    state.pipeline.board().set_status(
        &course.course_id,
        GenerationStatus::started("Queued", 0, accepted.chapters),
    );
    let pipeline = Arc::clone(&state.pipeline);
    let courses = Arc::clone(&state.courses);
    state
        .queue
        .spawn(format!("regenerate {course_id}"), async move {
            match pipeline.regenerate_all(&course).await {
                Ok(report) => match mark_published(courses.as_ref(), &course.course_id).await {
                    Ok(_) => {
                        tracing::info!(course_id = %course.course_id, failed = report.failures.len(), "course published");
                    }
                    Err(err) => {
                        tracing::error!(course_id = %course.course_id, ?err, "failed to publish course");
                    }
                },
                Err(err) => {
                    tracing::error!(course_id = %course.course_id, %err, "batch regeneration failed");
                    pipeline
                        .board()
                        .update_status(&course.course_id, |status| status.failed(err.to_string()));
                }
            }
        });
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

async fn course_status(
    State(state): State<AppState>,
    Path(course_id): Path<String>,
) -> ApiResult<Json<StatusResponse>> {
    let course = load_course(&state, &course_id).await?;
    let board = state.pipeline.board();
    let status = board
        .status(&course.course_id)
        .unwrap_or_else(GenerationStatus::idle);
    let chapters = (0..course.outline.chapters.len())
        .map(|chapter_id| {
            board
                .chapter(&ChapterKey::new(course.course_id.clone(), chapter_id))
                .map_or("idle", |view| view.label())
                .to_owned()
        })
        .collect();
    Ok(Json(
        StatusResponse::new(&course.course_id, status).with_chapters(chapters),
    ))
}
