//! Persistence of problems and submissions.
//!
//! The orchestrator only sees the [`ProblemRepo`] and [`SubmissionRepo`]
//! traits. Two implementations ship with the crate: [`MemoryStore`] for tests
//! and embedding, and [`FsStore`] which keeps everything under a data
//! directory.

mod fs;
mod memory;

pub use fs::FsStore;
pub use memory::MemoryStore;

use crate::{
    model::{Problem, Submission, SubmissionDraft, SubmissionPatch, TransitionError},
    prelude::FlowSnake,
};
use async_trait::async_trait;
use err_derive::Error;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error(display = "I/O error: {}", _0)]
    Io(#[error(source)] std::io::Error),

    #[error(display = "JSON error: {}", _0)]
    Json(#[error(source)] serde_json::Error),

    #[error(display = "TOML error: {}", _0)]
    Toml(#[error(source)] toml::de::Error),

    #[error(display = "TOML error: {}", _0)]
    TomlSer(#[error(source)] toml::ser::Error),

    #[error(display = "{} `{}` not found", kind, id)]
    NotFound { kind: &'static str, id: String },

    #[error(display = "{}", _0)]
    Transition(#[error(source)] TransitionError),
}

impl RepoError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RepoError::NotFound { .. })
    }
}

#[async_trait]
pub trait ProblemRepo: Send + Sync {
    /// Look up a problem with its test cases. `Ok(None)` if there is none.
    async fn find_problem(&self, id: &str) -> Result<Option<Problem>, RepoError>;
}

#[async_trait]
pub trait SubmissionRepo: Send + Sync {
    /// Store a new `Pending` submission and return its id.
    async fn create_submission(&self, draft: SubmissionDraft) -> Result<FlowSnake, RepoError>;

    /// Apply `patch` to a stored submission. Returns whether the record
    /// changed.
    async fn update_submission(
        &self,
        id: FlowSnake,
        patch: SubmissionPatch,
    ) -> Result<bool, RepoError>;

    async fn find_submission(&self, id: FlowSnake) -> Result<Option<Submission>, RepoError>;
}
