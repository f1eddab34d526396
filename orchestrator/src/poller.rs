//! Waiting for the judge to finish each submitted test case.
//!
//! Every token is polled on its own: a token that fails or never finishes
//! only affects its own test case. Tokens of one submission are polled
//! concurrently up to [`PollOptions::concurrency`], and results always come
//! back in token order.

use crate::{
    codec,
    judge::{JudgeApiError, JudgeService, JudgeStatusResponse, JudgeToken},
    model::{TestCase, TestCaseResult},
    prelude::{cancellable, CancellationToken},
    verdict::VerdictKind,
};
use derive_builder::Builder;
use futures::{stream, FutureExt, StreamExt};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::instrument;

#[derive(Debug, Clone, Builder)]
#[builder(setter(into))]
pub struct PollOptions {
    /// Status queries per token before giving up.
    #[builder(default = "10")]
    pub max_attempts: u32,
    /// Delay between two queries of the same token.
    #[builder(default = "Duration::from_secs(1)")]
    pub interval: Duration,
    /// Tokens polled at the same time.
    #[builder(default = "4")]
    pub concurrency: usize,
    /// Time budget for polling all tokens of a submission.
    #[builder(default)]
    pub deadline: Option<Duration>,
}

/// How polling one token ended.
#[derive(Debug)]
pub enum PollOutcome {
    /// The judge reported a final status.
    Finished(JudgeStatusResponse),
    /// Still pending after the whole attempt budget.
    TimedOut { attempts: u32 },
    /// A status query failed; the token was not polled any further.
    Failed(JudgeApiError),
    /// Polling was cancelled before a final status arrived.
    Cancelled,
}

impl PollOutcome {
    /// Turn the outcome into the stored result of `case`.
    pub fn into_result(self, case: &TestCase) -> TestCaseResult {
        match self {
            PollOutcome::Finished(res) => TestCaseResult {
                input: case.input.clone(),
                expected_output: case.expected_output.clone(),
                verdict: res.verdict(),
                actual_output: codec::decode_opt(res.stdout.as_deref()),
                stderr: codec::decode_opt(res.stderr.as_deref()),
                compile_output: codec::decode_opt(res.compile_output.as_deref()),
                message: codec::decode_opt(res.message.as_deref()),
                time: res.time,
                memory: res.memory,
                hidden: case.is_hidden,
            },
            PollOutcome::TimedOut { attempts } => TestCaseResult::synthetic(
                case,
                VerdictKind::Timeout,
                Some(format!("No final status after {} attempts", attempts)),
            ),
            PollOutcome::Failed(e) => {
                TestCaseResult::synthetic(case, VerdictKind::JudgeApiError, Some(e.to_string()))
            }
            PollOutcome::Cancelled => TestCaseResult::synthetic(
                case,
                VerdictKind::Cancelled,
                Some("Polling was cancelled".into()),
            ),
        }
    }
}

/// Poll one token until it reaches a final status, the attempt budget runs
/// out, a query fails, or `cancel` fires.
///
/// `limiter` bounds the number of status queries in flight; a permit is held
/// only for the duration of one query.
#[instrument(skip(judge, opt, limiter, cancel))]
pub async fn poll_token(
    judge: &dyn JudgeService,
    token: &JudgeToken,
    opt: &PollOptions,
    limiter: &Semaphore,
    cancel: &CancellationToken,
) -> PollOutcome {
    for attempt in 1..=opt.max_attempts {
        let res = {
            let _permit = match cancellable(limiter.acquire(), cancel).await {
                None => return PollOutcome::Cancelled,
                Some(Ok(permit)) => permit,
                Some(Err(_)) => {
                    return PollOutcome::Failed(JudgeApiError::Unavailable(
                        "request limiter closed".into(),
                    ))
                }
            };
            match cancellable(judge.fetch_status(token), cancel).await {
                None => return PollOutcome::Cancelled,
                Some(res) => res,
            }
        };

        match res {
            Ok(status) if status.verdict().is_transient() => {
                tracing::trace!(attempt, status = %status.status.description, "Still pending");
            }
            Ok(status) => {
                tracing::debug!(attempt, status = %status.status.description, "Final status");
                return PollOutcome::Finished(status);
            }
            Err(e) => {
                tracing::warn!(attempt, "Status query failed: {}", e);
                return PollOutcome::Failed(e);
            }
        }

        if attempt < opt.max_attempts
            && cancellable(tokio::time::sleep(opt.interval), cancel)
                .await
                .is_none()
        {
            return PollOutcome::Cancelled;
        }
    }
    tracing::warn!(attempts = opt.max_attempts, "Gave up waiting for a final status");
    PollOutcome::TimedOut {
        attempts: opt.max_attempts,
    }
}

/// Poll every token with at most `opt.concurrency` tokens in progress.
/// The returned outcomes line up with `tokens`.
#[instrument(skip_all, fields(count = tokens.len()))]
pub async fn poll_all(
    judge: &dyn JudgeService,
    tokens: &[JudgeToken],
    opt: &PollOptions,
    limiter: &Semaphore,
    cancel: &CancellationToken,
) -> Vec<PollOutcome> {
    let concurrency = opt.concurrency.min(tokens.len()).max(1);
    stream::iter(tokens)
        .map(|token| poll_token(judge, token, opt, limiter, cancel))
        .buffered(concurrency)
        .collect::<Vec<_>>()
        .boxed()
        .await
}
