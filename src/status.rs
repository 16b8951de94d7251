use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::formats::{ChapterContent, ChapterKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStep {
    Init,
    CheckingCache,
    Content,
    Video,
    Saving,
    Done,
    Failed,
}

/// Progress of the generation running for a course, as shown to the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationStatus {
    pub active: bool,
    pub message: String,
    pub current_chapter_index: usize,
    pub total_chapters: usize,
    pub step: Option<GenerationStep>,
    pub error: Option<String>,
    pub success: Option<bool>,
    pub updated_at: DateTime<Utc>,
}

impl GenerationStatus {
    pub fn started(message: impl Into<String>, chapter_index: usize, total_chapters: usize) -> Self {
        Self {
            active: true,
            message: message.into(),
            current_chapter_index: chapter_index,
            total_chapters,
            step: Some(GenerationStep::Init),
            error: None,
            success: None,
            updated_at: Utc::now(),
        }
    }

    pub fn idle() -> Self {
        Self {
            active: false,
            message: String::new(),
            current_chapter_index: 0,
            total_chapters: 0,
            step: None,
            error: None,
            success: None,
            updated_at: Utc::now(),
        }
    }

    pub fn with_step(mut self, step: GenerationStep) -> Self {
        self.step = Some(step);
        self.updated_at = Utc::now();
        self
    }

    pub fn succeeded(mut self, message: impl Into<String>) -> Self {
        self.active = false;
        self.message = message.into();
        self.step = Some(GenerationStep::Done);
        self.success = Some(true);
        self.updated_at = Utc::now();
        self
    }

    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.active = false;
        self.step = Some(GenerationStep::Failed);
        self.error = Some(error.into());
        self.success = Some(false);
        self.updated_at = Utc::now();
        self
    }

    pub fn progress_percent(&self) -> u32 {
        crate::outline::progress_percentage(self.current_chapter_index, self.total_chapters)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChapterView {
    Generating,
    Ready(Arc<ChapterContent>),
}

impl ChapterView {
    pub fn label(&self) -> &'static str {
        match self {
            ChapterView::Generating => "generating",
            ChapterView::Ready(_) => "ready",
        }
    }
}

/// Current view of every chapter and of each course's generation status.
///
/// Status updates are published on a per-course `watch` channel so a UI can
/// subscribe instead of polling.
#[derive(Debug, Default)]
pub struct StateBoard {
    statuses: Mutex<HashMap<String, watch::Sender<GenerationStatus>>>,
    chapters: Mutex<HashMap<ChapterKey, ChapterView>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl StateBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, course_id: &str) -> watch::Receiver<GenerationStatus> {
        lock(&self.statuses)
            .entry(course_id.to_owned())
            .or_insert_with(|| watch::channel(GenerationStatus::idle()).0)
            .subscribe()
    }

    pub fn status(&self, course_id: &str) -> Option<GenerationStatus> {
        lock(&self.statuses)
            .get(course_id)
            .map(|tx| tx.borrow().clone())
    }

    pub fn set_status(&self, course_id: &str, status: GenerationStatus) {
        let mut statuses = lock(&self.statuses);
        match statuses.get(course_id) {
            Some(tx) => {
                tx.send_replace(status);
            }
            None => {
                statuses.insert(course_id.to_owned(), watch::channel(status).0);
            }
        }
    }

    /// Publishes `status` unless a generation is active for the course.
    /// Returns whether it was published.
    pub fn begin_if_idle(&self, course_id: &str, status: GenerationStatus) -> bool {
        let mut statuses = lock(&self.statuses);
        match statuses.get(course_id) {
            Some(tx) if tx.borrow().active => false,
            Some(tx) => {
                tx.send_replace(status);
                true
            }
            None => {
                statuses.insert(course_id.to_owned(), watch::channel(status).0);
                true
            }
        }
    }

    pub fn update_status(&self, course_id: &str, f: impl FnOnce(GenerationStatus) -> GenerationStatus) {
        let mut statuses = lock(&self.statuses);
        let tx = statuses
            .entry(course_id.to_owned())
            .or_insert_with(|| watch::channel(GenerationStatus::idle()).0);
        tx.send_modify(|status| {
            let current = std::mem::replace(status, GenerationStatus::idle());
            *status = f(current);
        });
    }

    pub fn set_step(&self, course_id: &str, step: GenerationStep) {
        self.update_status(course_id, |status| status.with_step(step));
    }

    pub fn chapter(&self, key: &ChapterKey) -> Option<ChapterView> {
        lock(&self.chapters).get(key).cloned()
    }

    pub fn mark_generating(&self, key: &ChapterKey) {
        lock(&self.chapters).insert(key.clone(), ChapterView::Generating);
    }

    pub fn put_chapter(&self, key: &ChapterKey, content: Arc<ChapterContent>) {
        lock(&self.chapters).insert(key.clone(), ChapterView::Ready(content));
    }

    pub fn forget_chapter(&self, key: &ChapterKey) {
        lock(&self.chapters).remove(key);
    }
}
