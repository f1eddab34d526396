//! Wire models of the judge service.

use crate::{util::lenient_number, verdict::VerdictKind};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Languages accepted for submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Cpp,
    Java,
    Python,
    Javascript,
}

impl Language {
    pub const ALL: [Language; 4] = [
        Language::Cpp,
        Language::Java,
        Language::Python,
        Language::Javascript,
    ];

    /// The judge's language id.
    pub fn judge_id(self) -> u32 {
        match self {
            Language::Cpp => 54,        // C++ (GCC 9.2.0)
            Language::Java => 62,       // Java (OpenJDK 13.0.1)
            Language::Python => 71,     // Python (3.8.1)
            Language::Javascript => 63, // JavaScript (Node.js 12.14.0)
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Language::Cpp => "cpp",
            Language::Java => "java",
            Language::Python => "python",
            Language::Javascript => "javascript",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedLanguage(pub String);

impl fmt::Display for UnsupportedLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unsupported programming language: {}", self.0)
    }
}

impl std::error::Error for UnsupportedLanguage {}

impl FromStr for Language {
    type Err = UnsupportedLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Language::ALL
            .iter()
            .copied()
            .find(|l| l.name() == lower)
            .ok_or_else(|| UnsupportedLanguage(s.to_owned()))
    }
}

/// Opaque handle the judge hands out for every submitted test case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JudgeToken(pub String);

impl fmt::Display for JudgeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One test case submission. Text fields are already encoded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JudgeRequest {
    pub source_code: String,
    pub language_id: u32,
    pub stdin: String,
    pub expected_output: String,
    /// Seconds.
    pub cpu_time_limit: f64,
    /// Kilobytes.
    pub memory_limit: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct BatchRequest<'a> {
    pub submissions: &'a [JudgeRequest],
}

/// One element of the batch response. The judge reports per-item validation
/// failures in place of the token.
#[derive(Debug, Deserialize)]
pub(crate) struct BatchResponseItem {
    pub token: Option<String>,
    #[serde(flatten)]
    pub errors: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeStatus {
    #[serde(default)]
    pub id: Option<u32>,
    pub description: String,
}

/// Response of a status query. Text fields are still encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeStatusResponse {
    pub status: JudgeStatus,
    #[serde(default)]
    pub stdout: Option<String>,
    #[serde(default)]
    pub stderr: Option<String>,
    #[serde(default)]
    pub compile_output: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    /// Seconds.
    #[serde(default, deserialize_with = "lenient_number")]
    pub time: Option<f64>,
    /// Kilobytes.
    #[serde(default, deserialize_with = "lenient_number")]
    pub memory: Option<u64>,
}

impl JudgeStatusResponse {
    pub fn verdict(&self) -> VerdictKind {
        VerdictKind::from_description(&self.status.description)
    }
}
