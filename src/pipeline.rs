use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;

use crate::app::chapter_store::{ChapterStore, UndecodableRecord};
use crate::error::{GenerationError, Result};
use crate::fallback::fallback_content;
use crate::formats::{
    ChapterContent, ChapterDescriptor, ChapterKey, ChapterRecord, Course, VideoBuckets,
};
use crate::llm::TextModel;
use crate::normalize::normalize_chapter_response;
use crate::prompt::chapter_prompt;
use crate::status::{GenerationStatus, GenerationStep, StateBoard};
use crate::video::VideoEnricher;

#[derive(Debug, Clone, PartialEq)]
pub enum ContentSource {
    Cached,
    Generated,
    /// The content is fallback content describing `error`.
    Fallback { error: GenerationError },
}

#[derive(Debug, Clone)]
pub struct ChapterOutcome {
    pub content: Arc<ChapterContent>,
    pub source: ContentSource,
}

impl ChapterOutcome {
    pub fn error(&self) -> Option<&GenerationError> {
        match &self.source {
            ContentSource::Fallback { error } => Some(error),
            _ => None,
        }
    }

    pub fn source_name(&self) -> &'static str {
        match self.source {
            ContentSource::Cached => "cached",
            ContentSource::Generated => "generated",
            ContentSource::Fallback { .. } => "fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterFailure {
    pub chapter_id: usize,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failures: Vec<ChapterFailure>,
}

type SharedOutcome = Option<Result<ChapterOutcome>>;
type InFlight = Arc<Mutex<HashMap<ChapterKey, watch::Receiver<SharedOutcome>>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Marks a key as in flight until dropped. Callers that find the marker
/// wait on the channel instead of starting their own generation.
struct InFlightGuard {
    key: ChapterKey,
    tx: watch::Sender<SharedOutcome>,
    in_flight: InFlight,
}

impl InFlightGuard {
    fn finish(self, result: Result<ChapterOutcome>) -> Result<ChapterOutcome> {
        self.tx.send_replace(Some(result.clone()));
        result
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock(&self.in_flight).remove(&self.key);
    }
}

enum Slot {
    Leader(InFlightGuard),
    Follower(watch::Receiver<SharedOutcome>),
}

async fn join(mut rx: watch::Receiver<SharedOutcome>, key: &ChapterKey) -> Result<ChapterOutcome> {
    loop {
        if let Some(result) = rx.borrow_and_update().clone() {
            return result;
        }
        if rx.changed().await.is_err() {
            return rx.borrow().clone().unwrap_or_else(|| {
                Err(GenerationError::Abandoned {
                    course_id: key.course_id.clone(),
                    chapter_id: key.chapter_id,
                })
            });
        }
    }
}

/// Orchestrates prompt → model → normalize → videos → store for chapters,
/// publishing progress on a [`StateBoard`].
pub struct ChapterPipeline {
    model: Arc<dyn TextModel>,
    enricher: VideoEnricher,
    store: Arc<dyn ChapterStore>,
    board: Arc<StateBoard>,
    in_flight: InFlight,
}

impl ChapterPipeline {
    pub fn new(
        model: Arc<dyn TextModel>,
        enricher: VideoEnricher,
        store: Arc<dyn ChapterStore>,
        board: Arc<StateBoard>,
    ) -> Self {
        Self {
            model,
            enricher,
            store,
            board,
            in_flight: Arc::default(),
        }
    }

    pub fn board(&self) -> &Arc<StateBoard> {
        &self.board
    }

    /// Returns the stored content for the chapter, generating and storing it
    /// on a miss. Concurrent calls for the same chapter share one generation.
    ///
    /// The course status is only written when no other generation is active
    /// for the course, so a lookup never overwrites a running batch.
    pub async fn get_or_generate(&self, course: &Course, chapter_id: usize) -> Result<ChapterOutcome> {
        let chapter = resolve_chapter(course, chapter_id)?;
        let key = ChapterKey::new(course.course_id.clone(), chapter_id);

        let guard = match self.acquire(&key) {
            Slot::Leader(guard) => guard,
            Slot::Follower(rx) => {
                tracing::debug!(course_id = %key.course_id, chapter_id, "joining in-flight generation");
                return join(rx, &key).await;
            }
        };

        let tracked = self.board.begin_if_idle(
            &key.course_id,
            GenerationStatus::started(
                format!("Loading {}", chapter.name),
                chapter_id,
                course.outline.chapters.len(),
            )
            .with_step(GenerationStep::CheckingCache),
        );
        let result = match self.load_cached(&key, chapter).await {
            Ok(None) => {
                if tracked {
                    self.board.update_status(&key.course_id, |status| GenerationStatus {
                        message: format!("Generating {}", chapter.name),
                        updated_at: Utc::now(),
                        ..status
                    });
                }
                self.generate(course, &key, chapter).await
            }
            Ok(Some(outcome)) => Ok(outcome),
            Err(err) => Err(err),
        };
        if tracked {
            self.publish_result(&key, &result);
        }
        guard.finish(result)
    }

    /// Deletes the stored record for the chapter and generates it again.
    pub async fn regenerate_one(&self, course: &Course, chapter_id: usize) -> Result<ChapterOutcome> {
        let chapter = resolve_chapter(course, chapter_id)?;
        let key = ChapterKey::new(course.course_id.clone(), chapter_id);
        let guard = self.lead(&key).await;

        self.board.set_status(
            &key.course_id,
            GenerationStatus::started(
                format!("Regenerating {}", chapter.name),
                chapter_id,
                course.outline.chapters.len(),
            ),
        );
        let result = self.regenerate(course, &key, chapter).await;
        self.publish_result(&key, &result);
        guard.finish(result)
    }

    /// Regenerates every chapter in order. A failed chapter is recorded and
    /// the batch moves on; chapters already regenerated are kept.
    pub async fn regenerate_all(&self, course: &Course) -> Result<BatchReport> {
        if course.course_id.trim().is_empty() {
            return Err(GenerationError::missing("courseId"));
        }
        if course.outline.chapters.is_empty() {
            return Err(GenerationError::missing("chapters"));
        }
        let course_id = course.course_id.as_str();
        let total = course.outline.chapters.len();
        tracing::info!(course_id, total, "regenerating all chapters");

        self.board.set_status(
            course_id,
            GenerationStatus::started("Regenerating all chapters", 0, total),
        );

        let mut report = BatchReport::default();
        for (chapter_id, chapter) in course.outline.chapters.iter().enumerate() {
            let key = ChapterKey::new(course_id, chapter_id);
            let guard = self.lead(&key).await;
            self.board.update_status(course_id, |status| GenerationStatus {
                message: format!("Regenerating {} ({}/{total})", chapter.name, chapter_id + 1),
                current_chapter_index: chapter_id,
                step: Some(GenerationStep::Init),
                updated_at: Utc::now(),
                ..status
            });

            report.attempted += 1;
            let outcome = guard.finish(self.regenerate(course, &key, chapter).await);
            let failure = match &outcome {
                Ok(outcome) => outcome.error().map(ToString::to_string),
                Err(err) => Some(err.to_string()),
            };
            match failure {
                None => report.succeeded += 1,
                Some(error) => {
                    tracing::warn!(course_id, chapter_id, %error, "chapter regeneration failed");
                    self.board.update_status(course_id, |status| GenerationStatus {
                        error: Some(error.clone()),
                        updated_at: Utc::now(),
                        ..status
                    });
                    report.failures.push(ChapterFailure { chapter_id, error });
                }
            }
        }

        let summary = format!("Regenerated {}/{} chapters", report.succeeded, report.attempted);
        match report.failures.last() {
            None => self.board.update_status(course_id, |status| GenerationStatus {
                current_chapter_index: total,
                ..status.succeeded(summary)
            }),
            Some(last) => {
                let error = format!("chapter {}: {}", last.chapter_id, last.error);
                self.board.update_status(course_id, |status| GenerationStatus {
                    message: summary,
                    current_chapter_index: total,
                    ..status.failed(error)
                })
            }
        }
        tracing::info!(
            course_id,
            succeeded = report.succeeded,
            failed = report.failures.len(),
            "regeneration finished"
        );
        Ok(report)
    }

    fn acquire(&self, key: &ChapterKey) -> Slot {
        let mut in_flight = lock(&self.in_flight);
        if let Some(rx) = in_flight.get(key) {
            return Slot::Follower(rx.clone());
        }
        let (tx, rx) = watch::channel(None);
        in_flight.insert(key.clone(), rx);
        Slot::Leader(InFlightGuard {
            key: key.clone(),
            tx,
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    /// Waits out any in-flight generation for `key`, then takes the slot.
    async fn lead(&self, key: &ChapterKey) -> InFlightGuard {
        loop {
            match self.acquire(key) {
                Slot::Leader(guard) => return guard,
                Slot::Follower(rx) => {
                    let _ = join(rx, key).await;
                }
            }
        }
    }

    async fn load_cached(
        &self,
        key: &ChapterKey,
        chapter: &ChapterDescriptor,
    ) -> Result<Option<ChapterOutcome>> {
        let stored = match self.store.get(&key.course_id, key.chapter_id).await {
            Ok(None) => return Ok(None),
            Ok(Some(record)) => record.parse_content().map_err(|err| err.to_string()),
            Err(err) => match err.downcast_ref::<UndecodableRecord>() {
                Some(undecodable) => Err(undecodable.reason.clone()),
                None => return Err(GenerationError::store(&err)),
            },
        };

        let outcome = match stored {
            Ok(content) => {
                tracing::debug!(course_id = %key.course_id, chapter_id = key.chapter_id, "chapter loaded from store");
                ChapterOutcome {
                    content: Arc::new(content),
                    source: ContentSource::Cached,
                }
            }
            Err(reason) => {
                let error = GenerationError::RecordCorrupt {
                    course_id: key.course_id.clone(),
                    chapter_id: key.chapter_id,
                    reason,
                };
                tracing::warn!(course_id = %key.course_id, chapter_id = key.chapter_id, %error, "stored chapter is unreadable");
                ChapterOutcome {
                    content: Arc::new(fallback_content(&chapter.name, &error.to_string())),
                    source: ContentSource::Fallback { error },
                }
            }
        };
        self.board.put_chapter(key, Arc::clone(&outcome.content));
        Ok(Some(outcome))
    }

    async fn regenerate(
        &self,
        course: &Course,
        key: &ChapterKey,
        chapter: &ChapterDescriptor,
    ) -> Result<ChapterOutcome> {
        let existed = self
            .store
            .delete(&key.course_id, key.chapter_id)
            .await
            .map_err(|err| GenerationError::store(&err))?;
        self.board.forget_chapter(key);
        tracing::debug!(course_id = %key.course_id, chapter_id = key.chapter_id, existed, "deleted stored chapter");
        self.generate(course, key, chapter).await
    }

    async fn generate(
        &self,
        course: &Course,
        key: &ChapterKey,
        chapter: &ChapterDescriptor,
    ) -> Result<ChapterOutcome> {
        let course_id = key.course_id.as_str();
        let chapter_id = key.chapter_id;
        self.board.mark_generating(key);

        self.step(key, GenerationStep::Content);
        let raw = match self
            .model
            .send_message(&chapter_prompt(chapter, &course.name))
            .await
        {
            Ok(raw) => raw,
            Err(err) => {
                self.board.forget_chapter(key);
                return Err(err);
            }
        };

        let mut content = match normalize_chapter_response(&raw, &chapter.name) {
            Ok(content) => content,
            Err(error) => return Ok(self.fall_back(key, chapter, error)),
        };

        self.step(key, GenerationStep::Video);
        let videos = if course.display_video {
            self.enricher.enrich(chapter, &course.name).await
        } else {
            tracing::debug!(course_id, chapter_id, "videos disabled for course");
            VideoBuckets::default()
        };
        content.resources.apply_videos(videos);

        self.step(key, GenerationStep::Saving);
        let saved = match serde_json::to_value(&content) {
            Ok(value) => {
                let record = ChapterRecord {
                    course_id: course_id.to_owned(),
                    chapter_id,
                    content: value,
                    video_id: content.first_recommended_video().to_owned(),
                    created_at: Utc::now(),
                };
                self.store
                    .insert(&record)
                    .await
                    .map_err(|err| GenerationError::store(&err))
            }
            Err(err) => Err(GenerationError::Store {
                reason: format!("serialize chapter content: {err}"),
            }),
        };
        if let Err(error) = saved {
            return Ok(self.fall_back(key, chapter, error));
        }

        tracing::info!(course_id, chapter_id, model = self.model.name(), "chapter generated");
        let content = Arc::new(content);
        self.board.put_chapter(key, Arc::clone(&content));
        Ok(ChapterOutcome {
            content,
            source: ContentSource::Generated,
        })
    }

    fn fall_back(
        &self,
        key: &ChapterKey,
        chapter: &ChapterDescriptor,
        error: GenerationError,
    ) -> ChapterOutcome {
        tracing::warn!(
            course_id = %key.course_id,
            chapter_id = key.chapter_id,
            kind = error.kind(),
            %error,
            "using fallback content"
        );
        let content = Arc::new(fallback_content(&chapter.name, &error.to_string()));
        self.board.put_chapter(key, Arc::clone(&content));
        ChapterOutcome {
            content,
            source: ContentSource::Fallback { error },
        }
    }

    fn step(&self, key: &ChapterKey, step: GenerationStep) {
        tracing::debug!(course_id = %key.course_id, chapter_id = key.chapter_id, ?step, "generation step");
        self.board.set_step(&key.course_id, step);
    }

    fn publish_result(&self, key: &ChapterKey, result: &Result<ChapterOutcome>) {
        let error = match result {
            Ok(outcome) => outcome.error().map(ToString::to_string),
            Err(err) => Some(err.to_string()),
        };
        match error {
            None => self.board.update_status(&key.course_id, |status| {
                status.succeeded(format!("Chapter {} ready", key.chapter_id + 1))
            }),
            Some(error) => self
                .board
                .update_status(&key.course_id, |status| status.failed(error)),
        }
    }
}

fn resolve_chapter(course: &Course, chapter_id: usize) -> Result<&ChapterDescriptor> {
    if course.course_id.trim().is_empty() {
        return Err(GenerationError::missing("courseId"));
    }
    course.chapter(chapter_id).ok_or_else(|| {
        GenerationError::missing(format!(
            "chapter {chapter_id} of course {} ({} chapters)",
            course.course_id,
            course.outline.chapters.len()
        ))
    })
}
