use err_derive::Error;

/// Failure while talking to the judge service.
#[derive(Debug, Error)]
pub enum JudgeApiError {
    #[error(display = "Web request error: {}", _0)]
    Request(#[error(source)] reqwest::Error),

    #[error(display = "Judge service responded with status {}: {}", status, body)]
    Status { status: u16, body: String },

    #[error(display = "Malformed judge response: {}", _0)]
    Malformed(String),

    #[error(
        display = "Judge service returned {} tokens for {} submissions",
        got,
        expected
    )]
    TokenCountMismatch { expected: usize, got: usize },

    #[error(display = "Judge service unavailable: {}", _0)]
    Unavailable(String),
}

impl JudgeApiError {
    /// HTTP status reported by the judge, if it got that far.
    pub fn status(&self) -> Option<u16> {
        match self {
            JudgeApiError::Status { status, .. } => Some(*status),
            JudgeApiError::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for JudgeApiError {
    fn from(e: serde_json::Error) -> Self {
        JudgeApiError::Malformed(e.to_string())
    }
}
