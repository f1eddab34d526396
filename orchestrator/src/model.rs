//! Problems, submissions and the submission state machine.

use crate::{
    judge::{JudgeToken, Language},
    prelude::FlowSnake,
    verdict::VerdictKind,
};
use chrono::{DateTime, Utc};
use err_derive::Error;
use serde::{de::Visitor, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

pub const DEFAULT_TIME_LIMIT: f64 = 1.0;
pub const DEFAULT_MEMORY_LIMIT_KB: u64 = 2048;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
    /// File-backed problems may leave this out; the file name is used then.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
    /// Seconds.
    #[serde(default = "default_time_limit")]
    pub time_limit: f64,
    /// Kilobytes.
    #[serde(default = "default_memory_limit")]
    pub memory_limit: u64,
}

fn default_time_limit() -> f64 {
    DEFAULT_TIME_LIMIT
}

fn default_memory_limit() -> u64 {
    DEFAULT_MEMORY_LIMIT_KB
}

fn default_hidden() -> bool {
    true
}

impl Default for Problem {
    fn default() -> Self {
        Problem {
            id: String::new(),
            title: String::new(),
            test_cases: Vec::new(),
            time_limit: DEFAULT_TIME_LIMIT,
            memory_limit: DEFAULT_MEMORY_LIMIT_KB,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub input: String,
    pub expected_output: String,
    #[serde(default = "default_hidden")]
    pub is_hidden: bool,
}

/// Outcome of one test case. Text fields are decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseResult {
    pub input: String,
    pub expected_output: String,
    pub actual_output: Option<String>,
    pub verdict: VerdictKind,
    /// Seconds.
    pub time: Option<f64>,
    /// Kilobytes.
    pub memory: Option<u64>,
    pub stderr: Option<String>,
    pub compile_output: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub hidden: bool,
}

impl TestCaseResult {
    /// A result carrying only a verdict, for cases the judge never finished.
    pub fn synthetic(case: &TestCase, verdict: VerdictKind, message: Option<String>) -> Self {
        TestCaseResult {
            input: case.input.clone(),
            expected_output: case.expected_output.clone(),
            actual_output: None,
            verdict,
            time: None,
            memory: None,
            stderr: None,
            compile_output: None,
            message,
            hidden: case.is_hidden,
        }
    }

    /// Copy of this result with the test data of hidden cases removed.
    pub fn redacted(&self) -> TestCaseResult {
        if !self.hidden {
            return self.clone();
        }
        TestCaseResult {
            input: String::new(),
            expected_output: String::new(),
            actual_output: None,
            ..self.clone()
        }
    }
}

/// Lifecycle state of a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionStatus {
    Pending,
    Judging,
    /// Judging finished with this overall verdict.
    Judged(VerdictKind),
    /// Something went wrong on our side.
    ServerError,
    /// The judge service could not be used.
    ExternalServiceError,
}

impl SubmissionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SubmissionStatus::Pending | SubmissionStatus::Judging)
    }

    pub fn verdict(&self) -> Option<&VerdictKind> {
        match self {
            SubmissionStatus::Judged(v) => Some(v),
            _ => None,
        }
    }

    pub fn parse(s: &str) -> SubmissionStatus {
        match s {
            "Pending" => SubmissionStatus::Pending,
            "Judging" => SubmissionStatus::Judging,
            "Server Error" => SubmissionStatus::ServerError,
            "External Service Error" => SubmissionStatus::ExternalServiceError,
            other => SubmissionStatus::Judged(VerdictKind::from_description(other)),
        }
    }
}

impl Default for SubmissionStatus {
    fn default() -> Self {
        SubmissionStatus::Pending
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionStatus::Pending => f.write_str("Pending"),
            SubmissionStatus::Judging => f.write_str("Judging"),
            SubmissionStatus::Judged(v) => write!(f, "{}", v),
            SubmissionStatus::ServerError => f.write_str("Server Error"),
            SubmissionStatus::ExternalServiceError => f.write_str("External Service Error"),
        }
    }
}

impl Serialize for SubmissionStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

struct StatusVisitor;

impl<'de> Visitor<'de> for StatusVisitor {
    type Value = SubmissionStatus;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a submission status")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(SubmissionStatus::parse(v))
    }
}

impl<'de> Deserialize<'de> for SubmissionStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_str(StatusVisitor)
    }
}

/// The persisted record of one judging attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: FlowSnake,
    pub problem_id: String,
    pub author_id: String,
    pub code: String,
    pub language: Language,
    pub status: SubmissionStatus,
    /// Sum of test case times, in seconds.
    pub time: f64,
    /// Maximum of test case memory usage, in kilobytes.
    pub memory: u64,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub compile_output: Option<String>,
    /// Error detail when the submission ended in an error state.
    pub diagnostic: Option<String>,
    /// Token of the first test case, for looking things up on the judge side.
    pub judge_token: Option<JudgeToken>,
    pub test_case_results: Vec<TestCaseResult>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What the caller provides when a submission gets created.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionDraft {
    pub problem_id: String,
    pub author_id: String,
    pub code: String,
    pub language: Language,
}

/// Terminal fields of a successfully judged submission.
#[derive(Debug, Clone, PartialEq)]
pub struct JudgedFields {
    pub verdict: VerdictKind,
    pub time: f64,
    pub memory: u64,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub compile_output: Option<String>,
    pub judge_token: Option<JudgeToken>,
    pub test_case_results: Vec<TestCaseResult>,
}

/// Kinds of error a submission can end in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Server,
    ExternalService,
}

/// An update to a stored submission.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionPatch {
    /// The batch is about to be submitted.
    Judging,
    /// Judging completed.
    Judged(Box<JudgedFields>),
    /// Judging failed.
    Failed {
        kind: FailureKind,
        diagnostic: String,
        judge_token: Option<JudgeToken>,
    },
}

impl SubmissionPatch {
    pub fn target_status(&self) -> SubmissionStatus {
        match self {
            SubmissionPatch::Judging => SubmissionStatus::Judging,
            SubmissionPatch::Judged(fields) => SubmissionStatus::Judged(fields.verdict.clone()),
            SubmissionPatch::Failed {
                kind: FailureKind::Server,
                ..
            } => SubmissionStatus::ServerError,
            SubmissionPatch::Failed {
                kind: FailureKind::ExternalService,
                ..
            } => SubmissionStatus::ExternalServiceError,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error(display = "Submission cannot go from `{}` to `{}`", from, to)]
pub struct TransitionError {
    pub from: SubmissionStatus,
    pub to: SubmissionStatus,
}

impl Submission {
    pub fn new(id: FlowSnake, draft: SubmissionDraft, now: DateTime<Utc>) -> Submission {
        Submission {
            id,
            problem_id: draft.problem_id,
            author_id: draft.author_id,
            code: draft.code,
            language: draft.language,
            status: SubmissionStatus::Pending,
            time: 0.0,
            memory: 0,
            stdout: None,
            stderr: None,
            compile_output: None,
            diagnostic: None,
            judge_token: None,
            test_case_results: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Copy for callers outside the service, with hidden test cases redacted.
    pub fn redacted(&self) -> Submission {
        Submission {
            test_case_results: self
                .test_case_results
                .iter()
                .map(TestCaseResult::redacted)
                .collect(),
            ..self.clone()
        }
    }

    /// Apply `patch`, enforcing the lifecycle
    /// `Pending -> Judging -> terminal` (`Pending -> error` is allowed too).
    ///
    /// Writing a terminal state a second time with the same payload is a
    /// no-op and returns `Ok(false)`; any other write to a terminal record is
    /// rejected.
    pub fn apply(
        &mut self,
        patch: SubmissionPatch,
        now: DateTime<Utc>,
    ) -> Result<bool, TransitionError> {
        let to = patch.target_status();
        let is_judging = matches!(patch, SubmissionPatch::Judging);
        let is_judged = matches!(patch, SubmissionPatch::Judged(_));
        let allowed = match self.status {
            SubmissionStatus::Pending => !is_judged,
            SubmissionStatus::Judging if is_judging => return Ok(false),
            SubmissionStatus::Judging => true,
            _ => {
                let mut candidate = self.clone();
                candidate.write(patch);
                return if candidate == *self {
                    Ok(false)
                } else {
                    Err(TransitionError {
                        from: self.status.clone(),
                        to,
                    })
                };
            }
        };
        if !allowed {
            return Err(TransitionError {
                from: self.status.clone(),
                to,
            });
        }
        self.write(patch);
        self.updated_at = now;
        Ok(true)
    }

    fn write(&mut self, patch: SubmissionPatch) {
        self.status = patch.target_status();
        match patch {
            SubmissionPatch::Judging => {}
            SubmissionPatch::Judged(fields) => {
                let fields = *fields;
                self.time = fields.time;
                self.memory = fields.memory;
                self.stdout = fields.stdout;
                self.stderr = fields.stderr;
                self.compile_output = fields.compile_output;
                self.judge_token = fields.judge_token;
                self.test_case_results = fields.test_case_results;
            }
            SubmissionPatch::Failed {
                diagnostic,
                judge_token,
                ..
            } => {
                self.diagnostic = Some(diagnostic);
                if judge_token.is_some() {
                    self.judge_token = judge_token;
                }
            }
        }
    }
}
