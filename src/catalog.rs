use std::{collections::HashMap, fs, path::Path};

use async_trait::async_trait;

use crate::{archive::TEST_FILE, error::GradeError};

/// Content-lookup collaborator: resolves the hidden verification source
/// for an exercise. The source is never exposed to end users; it only ever
/// travels into the sandbox.
#[async_trait]
pub trait TaskCatalog: Send + Sync {
    async fn test_source(
        &self,
        chapter_slug: &str,
        task_slug: &str,
    ) -> Result<String, GradeError>;
}

/// Catalog backed by the on-disk content layout:
/// `<root>/<chapter>/<task>/solution_test.go`. Loaded eagerly at startup;
/// lookups afterwards are read-only.
pub struct FsTaskCatalog {
    tests: HashMap<String, HashMap<String, String>>,
}

impl FsTaskCatalog {
    pub fn load(root: &Path) -> anyhow::Result<Self> {
        let mut tests: HashMap<String, HashMap<String, String>> = HashMap::new();

        for chapter_entry in fs::read_dir(root)? {
            let chapter_entry = chapter_entry?;
            if !chapter_entry.file_type()?.is_dir() {
                continue;
            }
            let chapter_slug = chapter_entry.file_name().to_string_lossy().into_owned();

            let mut chapter_tests = HashMap::new();
            for task_entry in fs::read_dir(chapter_entry.path())? {
                let task_entry = task_entry?;
                if !task_entry.file_type()?.is_dir() {
                    continue;
                }
                let task_slug = task_entry.file_name().to_string_lossy().into_owned();

                match fs::read_to_string(task_entry.path().join(TEST_FILE)) {
                    Ok(source) => {
                        chapter_tests.insert(task_slug, source);
                    }
                    Err(err) => {
                        tracing::warn!(
                            chapter = %chapter_slug,
                            task = %task_slug,
                            error = %err,
                            "skipping task without test suite"
                        );
                    }
                }
            }

            tests.insert(chapter_slug, chapter_tests);
        }

        let total: usize = tests.values().map(HashMap::len).sum();
        tracing::info!(chapters = tests.len(), tasks = total, "task catalog loaded");

        Ok(Self { tests })
    }
}

#[async_trait]
impl TaskCatalog for FsTaskCatalog {
    async fn test_source(
        &self,
        chapter_slug: &str,
        task_slug: &str,
    ) -> Result<String, GradeError> {
        let chapter = self
            .tests
            .get(chapter_slug)
            .ok_or(GradeError::ChapterNotFound)?;
        chapter
            .get(task_slug)
            .cloned()
            .ok_or(GradeError::TaskNotFound)
    }
}
