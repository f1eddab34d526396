use super::{ProblemRepo, RepoError, SubmissionRepo};
use crate::{
    model::{Problem, Submission, SubmissionDraft, SubmissionPatch},
    prelude::FlowSnake,
};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::sync::Mutex;

/// Stores problems as `problems/<id>.toml` and submissions as
/// `submissions/<id>.json` under a root directory.
///
/// Updates to one submission are serialized inside this process. Files are
/// replaced by renaming a freshly written temporary file over them.
#[derive(Debug)]
pub struct FsStore {
    root: PathBuf,
    locks: DashMap<FlowSnake, Arc<Mutex<()>>>,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> FsStore {
        FsStore {
            root: root.into(),
            locks: DashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn problem_path(&self, id: &str) -> Option<PathBuf> {
        is_plain_name(id).then(|| self.root.join("problems").join(format!("{}.toml", id)))
    }

    fn submission_path(&self, id: FlowSnake) -> PathBuf {
        self.root.join("submissions").join(format!("{}.json", id))
    }

    /// Write `problem` to the data directory, replacing any previous version.
    pub async fn save_problem(&self, problem: &Problem) -> Result<(), RepoError> {
        let path = self
            .problem_path(&problem.id)
            .ok_or_else(|| RepoError::NotFound {
                kind: "problem",
                id: problem.id.clone(),
            })?;
        // Going through `Value` puts the test case tables after plain keys.
        let raw = toml::to_string(&toml::Value::try_from(problem)?)?;
        write_atomic(&path, raw.as_bytes()).await
    }

    async fn read_submission(&self, id: FlowSnake) -> Result<Option<Submission>, RepoError> {
        match tokio::fs::read(self.submission_path(id)).await {
            Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_submission(&self, sub: &Submission) -> Result<(), RepoError> {
        let raw = serde_json::to_vec_pretty(sub)?;
        write_atomic(&self.submission_path(sub.id), &raw).await
    }

    fn lock_for(&self, id: FlowSnake) -> Arc<Mutex<()>> {
        self.locks.entry(id).or_default().value().clone()
    }

    /// Forget the lock of `id` once nobody holds or waits on it.
    fn release_lock(&self, id: FlowSnake, lock: Arc<Mutex<()>>) {
        drop(lock);
        self.locks.remove_if(&id, |_, l| Arc::strong_count(l) == 1);
    }

    async fn update_locked(
        &self,
        id: FlowSnake,
        patch: SubmissionPatch,
    ) -> Result<bool, RepoError> {
        let mut sub = self
            .read_submission(id)
            .await?
            .ok_or_else(|| RepoError::NotFound {
                kind: "submission",
                id: id.to_string(),
            })?;
        let changed = sub.apply(patch, Utc::now())?;
        if changed {
            self.write_submission(&sub).await?;
        }
        Ok(changed)
    }
}

/// Ids become file names, so only accept ones without path separators or a
/// leading dot.
fn is_plain_name(id: &str) -> bool {
    !id.is_empty()
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
}

async fn write_atomic(path: &Path, data: &[u8]) -> Result<(), RepoError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, data).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl ProblemRepo for FsStore {
    async fn find_problem(&self, id: &str) -> Result<Option<Problem>, RepoError> {
        let path = match self.problem_path(id) {
            Some(path) => path,
            None => {
                tracing::warn!(id, "Refusing to look up problem with this id");
                return Ok(None);
            }
        };
        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => {
                let mut problem: Problem = toml::from_str(&raw)?;
                if problem.id.is_empty() {
                    problem.id = id.to_owned();
                }
                Ok(Some(problem))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl SubmissionRepo for FsStore {
    async fn create_submission(&self, draft: SubmissionDraft) -> Result<FlowSnake, RepoError> {
        let id = FlowSnake::generate();
        let sub = Submission::new(id, draft, Utc::now());
        self.write_submission(&sub).await?;
        tracing::debug!(%id, "Created submission");
        Ok(id)
    }

    async fn update_submission(
        &self,
        id: FlowSnake,
        patch: SubmissionPatch,
    ) -> Result<bool, RepoError> {
        let lock = self.lock_for(id);
        let res = {
            let _guard = lock.lock().await;
            self.update_locked(id, patch).await
        };
        self.release_lock(id, lock);
        res
    }

    async fn find_submission(&self, id: FlowSnake) -> Result<Option<Submission>, RepoError> {
        let lock = self.lock_for(id);
        let res = {
            let _guard = lock.lock().await;
            self.read_submission(id).await
        };
        self.release_lock(id, lock);
        res
    }
}
