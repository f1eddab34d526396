//! A scripted judge service for workflow tests.

use crate::{
    codec,
    config::OrchestratorConfig,
    judge::{JudgeApiError, JudgeRequest, JudgeService, JudgeStatus, JudgeStatusResponse, JudgeToken},
    model::{Problem, Submission, SubmissionDraft, SubmissionPatch, TestCase},
    orchestrator::Orchestrator,
    prelude::FlowSnake,
    store::{MemoryStore, RepoError, SubmissionRepo},
};
use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

/// How the judge answers status queries for one test input.
#[derive(Debug, Clone)]
pub struct Script {
    queued: u32,
    api_error: bool,
    status: String,
    stdout: Option<String>,
    stderr: Option<String>,
    compile_output: Option<String>,
    time: Option<f64>,
    memory: Option<u64>,
    delay: Duration,
}

impl Script {
    pub fn status(status: &str) -> Script {
        Script {
            queued: 0,
            api_error: false,
            status: status.into(),
            stdout: None,
            stderr: None,
            compile_output: None,
            time: None,
            memory: None,
            delay: Duration::from_millis(1),
        }
    }

    pub fn accepted(stdout: &str) -> Script {
        Script::status("Accepted").stdout(stdout)
    }

    /// Report `In Queue` for the first `n` queries.
    pub fn queued(mut self, n: u32) -> Self {
        self.queued = n;
        self
    }

    pub fn never_finishes(self) -> Self {
        self.queued(u32::MAX)
    }

    /// Every status query fails with a 500.
    pub fn api_error(mut self) -> Self {
        self.api_error = true;
        self
    }

    pub fn stdout(mut self, s: &str) -> Self {
        self.stdout = Some(s.into());
        self
    }

    pub fn stderr(mut self, s: &str) -> Self {
        self.stderr = Some(s.into());
        self
    }

    pub fn compile_output(mut self, s: &str) -> Self {
        self.compile_output = Some(s.into());
        self
    }

    pub fn time(mut self, t: f64) -> Self {
        self.time = Some(t);
        self
    }

    pub fn memory(mut self, m: u64) -> Self {
        self.memory = Some(m);
        self
    }

    /// How long each status query takes.
    pub fn delay(mut self, d: Duration) -> Self {
        self.delay = d;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchMode {
    Normal,
    /// The batch call fails with a transport-level error.
    Fail,
    /// One token fewer than requests comes back.
    Truncate,
}

struct TokenState {
    stdin: String,
    attempts: u32,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Answers by the decoded `stdin` of each request. Inputs without a script
/// are accepted right away with empty output.
pub struct MockJudge {
    scripts: HashMap<String, Script>,
    batch: BatchMode,
    next_token: AtomicUsize,
    submitted: Mutex<Vec<JudgeRequest>>,
    tokens: Mutex<HashMap<String, TokenState>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    status_calls: AtomicUsize,
}

impl MockJudge {
    pub fn new() -> MockJudge {
        MockJudge {
            scripts: HashMap::new(),
            batch: BatchMode::Normal,
            next_token: AtomicUsize::new(0),
            submitted: Mutex::new(vec![]),
            tokens: Mutex::new(HashMap::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
        }
    }

    pub fn when(mut self, stdin: &str, script: Script) -> Self {
        self.scripts.insert(stdin.into(), script);
        self
    }

    pub fn batch(mut self, mode: BatchMode) -> Self {
        self.batch = mode;
        self
    }

    /// Requests received by batch calls, in order.
    pub fn submitted(&self) -> Vec<JudgeRequest> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    /// Status queries made for the token handed out for `stdin`.
    pub fn attempts_for(&self, stdin: &str) -> u32 {
        self.tokens
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.stdin == stdin)
            .map(|t| t.attempts)
            .sum()
    }
}

#[async_trait]
impl JudgeService for MockJudge {
    async fn submit_batch(&self, requests: &[JudgeRequest]) -> Result<Vec<JudgeToken>, JudgeApiError> {
        self.submitted.lock().unwrap().extend(requests.iter().cloned());
        if self.batch == BatchMode::Fail {
            return Err(JudgeApiError::Unavailable("connection refused".into()));
        }
        let mut tokens = self.tokens.lock().unwrap();
        let mut res: Vec<JudgeToken> = requests
            .iter()
            .map(|req| {
                let token = format!("tok-{}", self.next_token.fetch_add(1, Ordering::SeqCst));
                tokens.insert(
                    token.clone(),
                    TokenState {
                        stdin: codec::decode(&req.stdin),
                        attempts: 0,
                    },
                );
                JudgeToken(token)
            })
            .collect();
        if self.batch == BatchMode::Truncate {
            res.pop();
        }
        Ok(res)
    }

    async fn fetch_status(&self, token: &JudgeToken) -> Result<JudgeStatusResponse, JudgeApiError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let (script, attempt) = {
            let mut tokens = self.tokens.lock().unwrap();
            let state = tokens.get_mut(&token.0).ok_or_else(|| JudgeApiError::Status {
                status: 404,
                body: "unknown token".into(),
            })?;
            state.attempts += 1;
            let script = self
                .scripts
                .get(&state.stdin)
                .cloned()
                .unwrap_or_else(|| Script::accepted(""));
            (script, state.attempts)
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);
        tokio::time::sleep(script.delay).await;

        if script.api_error {
            return Err(JudgeApiError::Status {
                status: 500,
                body: "judge exploded".into(),
            });
        }
        if attempt <= script.queued {
            return Ok(JudgeStatusResponse {
                status: JudgeStatus {
                    id: Some(1),
                    description: "In Queue".into(),
                },
                stdout: None,
                stderr: None,
                compile_output: None,
                message: None,
                time: None,
                memory: None,
            });
        }
        Ok(JudgeStatusResponse {
            status: JudgeStatus {
                id: None,
                description: script.status.clone(),
            },
            stdout: script.stdout.as_deref().map(codec::encode),
            stderr: script.stderr.as_deref().map(codec::encode),
            compile_output: script.compile_output.as_deref().map(codec::encode),
            message: None,
            time: script.time,
            memory: script.memory,
        })
    }
}

pub fn case(input: &str, expected: &str, hidden: bool) -> TestCase {
    TestCase {
        input: input.into(),
        expected_output: expected.into(),
        is_hidden: hidden,
    }
}

pub fn problem(id: &str, cases: Vec<TestCase>) -> Problem {
    Problem {
        id: id.into(),
        title: id.into(),
        test_cases: cases,
        ..Default::default()
    }
}

/// Defaults with fast polling.
pub fn test_config() -> OrchestratorConfig {
    let mut cfg = OrchestratorConfig::default();
    cfg.polling.interval_ms = 1;
    cfg.polling.max_attempts = 5;
    cfg
}

pub fn orchestrator(
    cfg: OrchestratorConfig,
    judge: Arc<MockJudge>,
    problems: Vec<Problem>,
) -> (Orchestrator, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    for p in problems {
        store.insert_problem(p);
    }
    let orchestrator = Orchestrator::new(Arc::new(cfg), judge, store.clone(), store.clone());
    (orchestrator, store)
}

/// Which submission write [`FailingRepo`] refuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOn {
    Judging,
    Judged,
}

/// Wraps a [`MemoryStore`] and fails one kind of submission update with an
/// I/O error. Error writes always go through.
pub struct FailingRepo {
    pub inner: Arc<MemoryStore>,
    pub fail_on: FailOn,
}

#[async_trait]
impl SubmissionRepo for FailingRepo {
    async fn create_submission(&self, draft: SubmissionDraft) -> Result<FlowSnake, RepoError> {
        self.inner.create_submission(draft).await
    }

    async fn update_submission(
        &self,
        id: FlowSnake,
        patch: SubmissionPatch,
    ) -> Result<bool, RepoError> {
        let fail = match (&patch, self.fail_on) {
            (SubmissionPatch::Judging, FailOn::Judging) => true,
            (SubmissionPatch::Judged(_), FailOn::Judged) => true,
            _ => false,
        };
        if fail {
            return Err(RepoError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )));
        }
        self.inner.update_submission(id, patch).await
    }

    async fn find_submission(&self, id: FlowSnake) -> Result<Option<Submission>, RepoError> {
        self.inner.find_submission(id).await
    }
}

/// Like [`orchestrator`], but submission writes go through a [`FailingRepo`].
pub fn failing_orchestrator(
    judge: Arc<MockJudge>,
    problems: Vec<Problem>,
    fail_on: FailOn,
) -> (Orchestrator, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    for p in problems {
        store.insert_problem(p);
    }
    let repo = Arc::new(FailingRepo {
        inner: store.clone(),
        fail_on,
    });
    let orchestrator = Orchestrator::new(Arc::new(test_config()), judge, store.clone(), repo);
    (orchestrator, store)
}
