//! Client side of the external judge service.

mod err;
pub mod http;
pub mod model;

pub use self::err::*;
pub use self::http::HttpJudgeClient;
pub use self::model::*;
use async_trait::async_trait;

/// Something that can run submissions against test cases for us.
#[async_trait]
pub trait JudgeService: Send + Sync {
    /// Submit all requests in one call. Tokens come back in request order.
    async fn submit_batch(&self, requests: &[JudgeRequest])
        -> Result<Vec<JudgeToken>, JudgeApiError>;

    /// Query the current state of one submitted test case.
    async fn fetch_status(&self, token: &JudgeToken) -> Result<JudgeStatusResponse, JudgeApiError>;
}
