use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context as _;
use async_trait::async_trait;
use tokio::fs;
use tokio::sync::RwLock;

use crate::app::json_fs::{ensure_path_safe_id, read_json, write_json_atomic};
use crate::formats::Course;

#[async_trait]
pub trait CourseStore: Send + Sync {
    async fn create(&self, course: &Course) -> anyhow::Result<()>;
    async fn get(&self, course_id: &str) -> anyhow::Result<Option<Course>>;
    async fn put(&self, course: &Course) -> anyhow::Result<()>;
    /// Newest first.
    async fn list(&self) -> anyhow::Result<Vec<Course>>;
}

/// Sets `publish` on the stored course. The course is re-read first, so edits
/// made while chapters were generating are kept. Returns false if the course
/// is gone.
pub async fn mark_published(store: &dyn CourseStore, course_id: &str) -> anyhow::Result<bool> {
    let Some(mut course) = store.get(course_id).await? else {
        return Ok(false);
    };
    if !course.publish {
        course.publish = true;
        store.put(&course).await?;
    }
    Ok(true)
}

#[derive(Debug, Clone)]
pub struct LocalFsCourseStore {
    base_dir: PathBuf,
}

impl LocalFsCourseStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn courses_dir(&self) -> PathBuf {
        self.base_dir.join("courses")
    }

    fn course_json_path(&self, course_id: &str) -> PathBuf {
        self.courses_dir().join(course_id).join("course.json")
    }
}

#[async_trait]
impl CourseStore for LocalFsCourseStore {
    async fn create(&self, course: &Course) -> anyhow::Result<()> {
        ensure_path_safe_id(&course.course_id)?;
        let path = self.course_json_path(&course.course_id);
        if fs::try_exists(&path)
            .await
            .with_context(|| format!("stat: {}", path.display()))?
        {
            anyhow::bail!("course already exists: {}", course.course_id);
        }
        write_json_atomic(&path, course)
            .await
            .context("write course.json")
    }

    async fn get(&self, course_id: &str) -> anyhow::Result<Option<Course>> {
        ensure_path_safe_id(course_id)?;
        let path = self.course_json_path(course_id);
        read_json(&path)
            .await
            .with_context(|| format!("read: {}", path.display()))
    }

    async fn put(&self, course: &Course) -> anyhow::Result<()> {
        ensure_path_safe_id(&course.course_id)?;
        write_json_atomic(&self.course_json_path(&course.course_id), course)
            .await
            .context("write course.json")
    }

    async fn list(&self) -> anyhow::Result<Vec<Course>> {
        let dir = self.courses_dir();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err).with_context(|| format!("read dir: {}", dir.display())),
        };

        let mut courses = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .with_context(|| format!("list dir: {}", dir.display()))?
        {
            let path = entry.path().join("course.json");
            if let Some(course) = read_json::<Course>(&path)
                .await
                .with_context(|| format!("read: {}", path.display()))?
            {
                courses.push(course);
            }
        }
        courses.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(courses)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCourseStore {
    courses: RwLock<BTreeMap<String, Course>>,
}

impl InMemoryCourseStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CourseStore for InMemoryCourseStore {
    async fn create(&self, course: &Course) -> anyhow::Result<()> {
        let mut courses = self.courses.write().await;
        if courses.contains_key(&course.course_id) {
            anyhow::bail!("course already exists: {}", course.course_id);
        }
        courses.insert(course.course_id.clone(), course.clone());
        Ok(())
    }

    async fn get(&self, course_id: &str) -> anyhow::Result<Option<Course>> {
        Ok(self.courses.read().await.get(course_id).cloned())
    }

    async fn put(&self, course: &Course) -> anyhow::Result<()> {
        self.courses
            .write()
            .await
            .insert(course.course_id.clone(), course.clone());
        Ok(())
    }

    async fn list(&self) -> anyhow::Result<Vec<Course>> {
        let mut courses = self.courses.read().await.values().cloned().collect::<Vec<_>>();
        courses.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(courses)
    }
}
