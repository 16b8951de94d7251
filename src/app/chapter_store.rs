use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context as _;
use async_trait::async_trait;
use tokio::fs;
use tokio::sync::RwLock;

use crate::app::json_fs::{ensure_path_safe_id, read_bytes, write_json_atomic};
use crate::formats::{ChapterKey, ChapterRecord};

/// A stored record exists but cannot be decoded. Returned by
/// [`ChapterStore::get`] so callers can tell it apart from I/O failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("chapter record {key} cannot be decoded: {reason}")]
pub struct UndecodableRecord {
    pub key: ChapterKey,
    pub reason: String,
}

/// Chapter records keyed by `(course_id, chapter_id)`.
///
/// `insert` never overwrites: a second insert for the same key fails.
#[async_trait]
pub trait ChapterStore: Send + Sync {
    async fn get(&self, course_id: &str, chapter_id: usize) -> anyhow::Result<Option<ChapterRecord>>;
    async fn insert(&self, record: &ChapterRecord) -> anyhow::Result<()>;
    /// Returns whether a record existed.
    async fn delete(&self, course_id: &str, chapter_id: usize) -> anyhow::Result<bool>;
    async fn list(&self, course_id: &str) -> anyhow::Result<Vec<ChapterRecord>>;
}

#[derive(Debug, Clone)]
pub struct LocalFsChapterStore {
    base_dir: PathBuf,
}

impl LocalFsChapterStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn chapters_dir(&self, course_id: &str) -> PathBuf {
        self.base_dir.join("courses").join(course_id).join("chapters")
    }

    fn chapter_json_path(&self, course_id: &str, chapter_id: usize) -> PathBuf {
        self.chapters_dir(course_id).join(format!("{chapter_id}.json"))
    }
}

#[async_trait]
impl ChapterStore for LocalFsChapterStore {
    async fn get(&self, course_id: &str, chapter_id: usize) -> anyhow::Result<Option<ChapterRecord>> {
        ensure_path_safe_id(course_id)?;
        let path = self.chapter_json_path(course_id, chapter_id);
        let Some(bytes) = read_bytes(&path)
            .await
            .with_context(|| format!("read: {}", path.display()))?
        else {
            return Ok(None);
        };
        let record = serde_json::from_slice(&bytes).map_err(|err| UndecodableRecord {
            key: ChapterKey::new(course_id, chapter_id),
            reason: err.to_string(),
        })?;
        Ok(Some(record))
    }

    async fn insert(&self, record: &ChapterRecord) -> anyhow::Result<()> {
        ensure_path_safe_id(&record.course_id)?;
        let path = self.chapter_json_path(&record.course_id, record.chapter_id);
        if fs::try_exists(&path)
            .await
            .with_context(|| format!("stat: {}", path.display()))?
        {
            anyhow::bail!("chapter record already exists: {}", record.key());
        }
        write_json_atomic(&path, record)
            .await
            .context("write chapter record")
    }

    async fn delete(&self, course_id: &str, chapter_id: usize) -> anyhow::Result<bool> {
        ensure_path_safe_id(course_id)?;
        let path = self.chapter_json_path(course_id, chapter_id);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err).with_context(|| format!("remove: {}", path.display())),
        }
    }

    async fn list(&self, course_id: &str) -> anyhow::Result<Vec<ChapterRecord>> {
        ensure_path_safe_id(course_id)?;
        let dir = self.chapters_dir(course_id);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err).with_context(|| format!("read dir: {}", dir.display())),
        };

        let mut records = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .with_context(|| format!("list dir: {}", dir.display()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(bytes) = read_bytes(&path)
                .await
                .with_context(|| format!("read: {}", path.display()))?
            else {
                continue;
            };
            match serde_json::from_slice::<ChapterRecord>(&bytes) {
                Ok(record) => records.push(record),
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "skipping undecodable chapter record");
                }
            }
        }
        records.sort_by_key(|r| r.chapter_id);
        Ok(records)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryChapterStore {
    records: RwLock<BTreeMap<ChapterKey, ChapterRecord>>,
}

impl InMemoryChapterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChapterStore for InMemoryChapterStore {
    async fn get(&self, course_id: &str, chapter_id: usize) -> anyhow::Result<Option<ChapterRecord>> {
        let key = ChapterKey::new(course_id, chapter_id);
        Ok(self.records.read().await.get(&key).cloned())
    }

    async fn insert(&self, record: &ChapterRecord) -> anyhow::Result<()> {
        let mut records = self.records.write().await;
        let key = record.key();
        if records.contains_key(&key) {
            anyhow::bail!("chapter record already exists: {key}");
        }
        records.insert(key, record.clone());
        Ok(())
    }

    async fn delete(&self, course_id: &str, chapter_id: usize) -> anyhow::Result<bool> {
        let key = ChapterKey::new(course_id, chapter_id);
        Ok(self.records.write().await.remove(&key).is_some())
    }

    async fn list(&self, course_id: &str) -> anyhow::Result<Vec<ChapterRecord>> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.course_id == course_id)
            .cloned()
            .collect())
    }
}
