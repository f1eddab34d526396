//! The judging workflow: validate, persist, submit, poll, aggregate, persist.

use crate::{
    aggregate::aggregate,
    config::OrchestratorConfig,
    judge::{JudgeApiError, JudgeService, JudgeToken, Language},
    model::{
        FailureKind, JudgedFields, Problem, Submission, SubmissionDraft, SubmissionPatch,
        TestCaseResult,
    },
    poller::{poll_all, PollOptions},
    prelude::{spawn_watchdog, CancellationToken, FlowSnake},
    store::{ProblemRepo, RepoError, SubmissionRepo},
    submitter::{build_requests, submit_batch},
    verdict::VerdictKind,
};
use dashmap::{mapref::entry::Entry, DashMap};
use err_derive::Error;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::field;
use tracing_futures::Instrument;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub problem_id: String,
    pub language: String,
    pub code: String,
    pub author_id: String,
}

/// What the caller gets back from a finished judging run. Hidden test cases
/// are redacted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOutcome {
    pub submission: Submission,
    pub verdict: VerdictKind,
    pub test_case_results: Vec<TestCaseResult>,
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(display = "Invalid submission: {}", _0)]
    Validation(String),

    #[error(display = "Not found: {}", _0)]
    NotFound(String),

    #[error(display = "{}: {}", message, details)]
    ExternalService {
        message: String,
        details: String,
        status: Option<u16>,
    },

    #[error(display = "Internal server error: {}", _0)]
    Server(String),
}

impl SubmitError {
    /// HTTP-style status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            SubmitError::Validation(_) => 400,
            SubmitError::NotFound(_) => 404,
            SubmitError::ExternalService { status, .. } => {
                status.filter(|s| *s >= 400).unwrap_or(502)
            }
            SubmitError::Server(_) => 500,
        }
    }

    /// Message safe to show to the caller. Server errors keep their detail to
    /// the logs and the stored diagnostic.
    pub fn public_message(&self) -> String {
        match self {
            SubmitError::ExternalService { message, .. } => message.clone(),
            SubmitError::Server(_) => "Internal server error".into(),
            e => e.to_string(),
        }
    }

    fn failure_kind(&self) -> FailureKind {
        match self {
            SubmitError::ExternalService { .. } => FailureKind::ExternalService,
            _ => FailureKind::Server,
        }
    }
}

impl From<RepoError> for SubmitError {
    fn from(e: RepoError) -> Self {
        SubmitError::Server(e.to_string())
    }
}

impl From<JudgeApiError> for SubmitError {
    fn from(e: JudgeApiError) -> Self {
        SubmitError::ExternalService {
            message: "Failed to submit the solution to the judge service".into(),
            details: e.to_string(),
            status: e.status(),
        }
    }
}

/// A failed judging run, with the first judge token if the batch got that far.
struct Failure {
    error: SubmitError,
    judge_token: Option<JudgeToken>,
}

impl From<SubmitError> for Failure {
    fn from(error: SubmitError) -> Self {
        Failure {
            error,
            judge_token: None,
        }
    }
}

impl From<RepoError> for Failure {
    fn from(e: RepoError) -> Self {
        SubmitError::from(e).into()
    }
}

impl From<JudgeApiError> for Failure {
    fn from(e: JudgeApiError) -> Self {
        SubmitError::from(e).into()
    }
}

/// Marks a submission id as owned by one running workflow. Released on drop.
struct Lease {
    id: FlowSnake,
    owned: Arc<DashMap<FlowSnake, ()>>,
}

impl Lease {
    fn acquire(owned: &Arc<DashMap<FlowSnake, ()>>, id: FlowSnake) -> Option<Lease> {
        match owned.entry(id) {
            Entry::Occupied(_) => None,
            Entry::Vacant(v) => {
                v.insert(());
                Some(Lease {
                    id,
                    owned: owned.clone(),
                })
            }
        }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.owned.remove(&self.id);
    }
}

struct Shared {
    cfg: Arc<OrchestratorConfig>,
    poll_opt: PollOptions,
    judge: Arc<dyn JudgeService>,
    problems: Arc<dyn ProblemRepo>,
    submissions: Arc<dyn SubmissionRepo>,
    /// Bounds status queries in flight across all running workflows.
    limiter: Arc<Semaphore>,
    owned: Arc<DashMap<FlowSnake, ()>>,
    shutdown: CancellationToken,
}

pub struct Orchestrator {
    shared: Arc<Shared>,
}

impl Orchestrator {
    pub fn new(
        cfg: Arc<OrchestratorConfig>,
        judge: Arc<dyn JudgeService>,
        problems: Arc<dyn ProblemRepo>,
        submissions: Arc<dyn SubmissionRepo>,
    ) -> Orchestrator {
        let shared = Shared {
            poll_opt: cfg.polling.to_options(),
            limiter: Arc::new(Semaphore::new(cfg.max_in_flight_requests)),
            cfg,
            judge,
            problems,
            submissions,
            owned: Arc::new(DashMap::new()),
            shutdown: CancellationToken::new(),
        };
        Orchestrator {
            shared: Arc::new(shared),
        }
    }

    /// Cancelling this token cancels the polling of every running workflow.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shared.shutdown.clone()
    }

    /// Number of submissions currently being judged.
    pub fn running(&self) -> usize {
        self.shared.owned.len()
    }

    pub async fn submit(&self, req: SubmitRequest) -> Result<SubmitOutcome, SubmitError> {
        self.submit_with_cancel(req, CancellationToken::new()).await
    }

    /// Like [`submit`](Self::submit). Cancelling `cancel` stops polling; test
    /// cases without a final result get the `Cancelled` verdict and the
    /// submission is still stored as judged.
    ///
    /// Dropping the returned future once the submission is stored counts as
    /// cancellation: judging finishes in the background and still writes a
    /// final state.
    pub async fn submit_with_cancel(
        &self,
        req: SubmitRequest,
        cancel: CancellationToken,
    ) -> Result<SubmitOutcome, SubmitError> {
        let span = tracing::info_span!(
            "submit",
            problem = %req.problem_id,
            author = %req.author_id,
            submission = field::Empty
        );
        self.run(req, cancel).instrument(span).await
    }

    /// Look up a stored submission, redacted like a submit outcome.
    pub async fn submission(&self, id: FlowSnake) -> Result<Submission, SubmitError> {
        self.shared
            .submissions
            .find_submission(id)
            .await?
            .map(|s| s.redacted())
            .ok_or_else(|| SubmitError::NotFound(format!("submission `{}`", id)))
    }

    async fn run(
        &self,
        req: SubmitRequest,
        cancel: CancellationToken,
    ) -> Result<SubmitOutcome, SubmitError> {
        let language = validate(&req)?;

        let problem = self
            .shared
            .problems
            .find_problem(&req.problem_id)
            .await?
            .ok_or_else(|| SubmitError::NotFound(format!("problem `{}`", req.problem_id)))?;
        if problem.test_cases.is_empty() {
            return Err(SubmitError::NotFound(format!(
                "test cases of problem `{}`",
                problem.id
            )));
        }

        let id = self
            .shared
            .submissions
            .create_submission(SubmissionDraft {
                problem_id: problem.id.clone(),
                author_id: req.author_id,
                code: req.code.clone(),
                language,
            })
            .await?;
        tracing::Span::current().record("submission", &field::display(id));
        tracing::info!("Created submission");

        // From here on the record exists, so the rest runs in its own task
        // and always ends with a terminal write, even if this future is
        // dropped. Dropping it cancels polling.
        let run_cancel = cancel.child_token();
        let _cancel_on_drop = run_cancel.clone().drop_guard();
        let shared = self.shared.clone();
        let code = req.code;
        let task = tokio::spawn(
            async move {
                shared
                    .judge(id, problem, language, code, run_cancel)
                    .await
            }
            .instrument(tracing::Span::current()),
        );

        match task.await {
            Ok(res) => res,
            Err(e) => {
                let error = SubmitError::Server(format!("judging task failed: {}", e));
                tracing::error!("{}", error);
                self.shared.record_failure(id, &error, None).await;
                Err(error)
            }
        }
    }
}

impl Shared {
    async fn judge(
        &self,
        id: FlowSnake,
        problem: Problem,
        language: Language,
        code: String,
        cancel: CancellationToken,
    ) -> Result<SubmitOutcome, SubmitError> {
        let lease = Lease::acquire(&self.owned, id);
        let res = match &lease {
            Some(_) => {
                self.judge_submission(id, &problem, language, &code, &cancel)
                    .await
            }
            None => Err(SubmitError::Server(format!(
                "submission {} is already being judged",
                id
            ))
            .into()),
        };

        match res {
            Ok(outcome) => {
                tracing::info!(verdict = %outcome.verdict, "Judging finished");
                Ok(outcome)
            }
            Err(Failure { error, judge_token }) => {
                tracing::error!("Judging failed: {}", error);
                self.record_failure(id, &error, judge_token).await;
                Err(error)
            }
        }
    }

    /// Best-effort terminal error write.
    async fn record_failure(
        &self,
        id: FlowSnake,
        error: &SubmitError,
        judge_token: Option<JudgeToken>,
    ) {
        let patch = SubmissionPatch::Failed {
            kind: error.failure_kind(),
            diagnostic: error.to_string(),
            judge_token,
        };
        let _ = self
            .submissions
            .update_submission(id, patch)
            .await
            .inspect_err(|e| tracing::error!("Failed to record the failure: {}", e));
    }

    async fn judge_submission(
        &self,
        id: FlowSnake,
        problem: &Problem,
        language: Language,
        code: &str,
        cancel: &CancellationToken,
    ) -> Result<SubmitOutcome, Failure> {
        self.submissions
            .update_submission(id, SubmissionPatch::Judging)
            .await?;

        let requests = build_requests(problem, code, language, &self.cfg.limits);
        let tokens = submit_batch(self.judge.as_ref(), &requests).await?;
        let judge_token = tokens.first().cloned();

        let test_case_results = self.poll(&tokens, problem, cancel).await;
        let agg = aggregate(&test_case_results);

        let patch = SubmissionPatch::Judged(Box::new(JudgedFields {
            verdict: agg.verdict.clone(),
            time: agg.time,
            memory: agg.memory,
            stdout: agg.stdout,
            stderr: agg.stderr,
            compile_output: agg.compile_output,
            judge_token: judge_token.clone(),
            test_case_results,
        }));
        let stored = match self.submissions.update_submission(id, patch).await {
            Ok(_) => self.submissions.find_submission(id).await,
            Err(e) => Err(e),
        };
        let stored = stored
            .map_err(|e| Failure {
                error: e.into(),
                judge_token: judge_token.clone(),
            })?
            .ok_or_else(|| Failure {
                error: SubmitError::Server(format!("submission {} vanished", id)),
                judge_token,
            })?;

        let submission = stored.redacted();
        Ok(SubmitOutcome {
            verdict: agg.verdict,
            test_case_results: submission.test_case_results.clone(),
            submission,
        })
    }

    /// Poll every token under the submission deadline. Outcomes are turned
    /// into results in test case order.
    async fn poll(
        &self,
        tokens: &[JudgeToken],
        problem: &Problem,
        cancel: &CancellationToken,
    ) -> Vec<TestCaseResult> {
        let poll_cancel = self.shutdown.child_token();
        let watchdog = spawn_watchdog(
            poll_cancel.clone(),
            Some(cancel.clone()),
            self.poll_opt.deadline,
        );

        let outcomes = poll_all(
            self.judge.as_ref(),
            tokens,
            &self.poll_opt,
            &self.limiter,
            &poll_cancel,
        )
        .await;
        watchdog.abort();

        if poll_cancel.is_cancelled() {
            tracing::warn!("Polling was cut short, unfinished test cases are marked cancelled");
        }

        outcomes
            .into_iter()
            .zip(&problem.test_cases)
            .map(|(outcome, case)| outcome.into_result(case))
            .collect()
    }
}

fn validate(req: &SubmitRequest) -> Result<Language, SubmitError> {
    if req.problem_id.trim().is_empty() {
        return Err(SubmitError::Validation("problem id is required".into()));
    }
    if req.author_id.trim().is_empty() {
        return Err(SubmitError::Validation("author id is required".into()));
    }
    if req.code.trim().is_empty() {
        return Err(SubmitError::Validation("code must not be empty".into()));
    }
    req.language
        .parse::<Language>()
        .map_err(|e| SubmitError::Validation(e.to_string()))
}
