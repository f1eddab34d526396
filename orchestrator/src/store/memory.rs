use super::{ProblemRepo, RepoError, SubmissionRepo};
use crate::{
    model::{Problem, Submission, SubmissionDraft, SubmissionPatch},
    prelude::FlowSnake,
};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

/// Keeps everything in memory. Contents are lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    problems: DashMap<String, Problem>,
    submissions: DashMap<FlowSnake, Submission>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    pub fn insert_problem(&self, problem: Problem) {
        self.problems.insert(problem.id.clone(), problem);
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.len()
    }

    /// Every stored submission, oldest first.
    pub fn submissions(&self) -> Vec<Submission> {
        let mut all: Vec<_> = self.submissions.iter().map(|s| s.value().clone()).collect();
        all.sort_by_key(|s| s.id);
        all
    }
}

#[async_trait]
impl ProblemRepo for MemoryStore {
    async fn find_problem(&self, id: &str) -> Result<Option<Problem>, RepoError> {
        Ok(self.problems.get(id).map(|p| p.value().clone()))
    }
}

#[async_trait]
impl SubmissionRepo for MemoryStore {
    async fn create_submission(&self, draft: SubmissionDraft) -> Result<FlowSnake, RepoError> {
        let id = FlowSnake::generate();
        self.submissions
            .insert(id, Submission::new(id, draft, Utc::now()));
        Ok(id)
    }

    async fn update_submission(
        &self,
        id: FlowSnake,
        patch: SubmissionPatch,
    ) -> Result<bool, RepoError> {
        let mut entry = self
            .submissions
            .get_mut(&id)
            .ok_or_else(|| RepoError::NotFound {
                kind: "submission",
                id: id.to_string(),
            })?;
        Ok(entry.apply(patch, Utc::now())?)
    }

    async fn find_submission(&self, id: FlowSnake) -> Result<Option<Submission>, RepoError> {
        Ok(self.submissions.get(&id).map(|s| s.value().clone()))
    }
}
