//! Turning a problem into one batch of judge requests.

use crate::{
    codec,
    config::LimitConfig,
    judge::{JudgeApiError, JudgeRequest, JudgeService, JudgeToken, Language},
    model::Problem,
};
use tracing::instrument;

/// Build one request per test case, in test case order.
pub fn build_requests(
    problem: &Problem,
    code: &str,
    language: Language,
    limits: &LimitConfig,
) -> Vec<JudgeRequest> {
    let source_code = codec::encode(code);
    let cpu_time_limit = limits.cpu_time_limit(problem);
    let memory_limit = limits.memory_ceiling.for_problem(problem);
    problem
        .test_cases
        .iter()
        .map(|case| JudgeRequest {
            source_code: source_code.clone(),
            language_id: language.judge_id(),
            stdin: codec::encode(&case.input),
            expected_output: codec::encode(&case.expected_output),
            cpu_time_limit,
            memory_limit,
        })
        .collect()
}

/// Submit `requests` as a single batch. Fails unless the judge hands back
/// exactly one token per request.
#[instrument(skip_all, fields(count = requests.len()))]
pub async fn submit_batch(
    judge: &dyn JudgeService,
    requests: &[JudgeRequest],
) -> Result<Vec<JudgeToken>, JudgeApiError> {
    let tokens = judge.submit_batch(requests).await?;
    if tokens.len() != requests.len() {
        return Err(JudgeApiError::TokenCountMismatch {
            expected: requests.len(),
            got: tokens.len(),
        });
    }
    tracing::info!("Batch submitted");
    Ok(tokens)
}
