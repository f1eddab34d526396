//! Orchestrator configuration.
//!
//! Everything the orchestrator needs is passed in through [`OrchestratorConfig`];
//! nothing is read from the process environment by the library itself.

use anyhow::{ensure, Context};
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    model::Problem,
    poller::{PollOptions, PollOptionsBuilder},
};

/// Memory ceiling sent along with every judge request, in kilobytes.
pub const DEFAULT_MEMORY_CEILING_KB: u64 = 2048;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OrchestratorConfig {
    pub judge: JudgeServiceConfig,
    pub limits: LimitConfig,
    pub polling: PollConfig,
    /// Upper bound of requests in flight to the judge service, shared by all
    /// submissions handled by one orchestrator.
    pub max_in_flight_requests: usize,
    /// Where the file store keeps problems and submissions.
    pub data_dir: PathBuf,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfig {
            judge: Default::default(),
            limits: Default::default(),
            polling: Default::default(),
            max_in_flight_requests: 16,
            data_dir: default_data_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct JudgeServiceConfig {
    pub base_url: String,
    /// RapidAPI key, for the hosted judge.
    pub api_key: Option<String>,
    /// RapidAPI host, for the hosted judge.
    pub api_host: Option<String>,
    /// `X-Auth-Token` of a self-hosted judge.
    pub auth_token: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for JudgeServiceConfig {
    fn default() -> Self {
        JudgeServiceConfig {
            base_url: "http://localhost:2358".into(),
            api_key: None,
            api_host: None,
            auth_token: None,
            request_timeout_secs: 30,
        }
    }
}

/// Which memory limit to ask the judge for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MemoryCeiling {
    /// The same ceiling for every problem, in kilobytes.
    Fixed(u64),
    /// The problem's own memory limit.
    Problem,
}

impl MemoryCeiling {
    pub fn for_problem(&self, problem: &Problem) -> u64 {
        match self {
            MemoryCeiling::Fixed(kb) => *kb,
            MemoryCeiling::Problem => problem.memory_limit,
        }
    }
}

impl Default for MemoryCeiling {
    fn default() -> Self {
        MemoryCeiling::Fixed(DEFAULT_MEMORY_CEILING_KB)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LimitConfig {
    /// Lower bound of the CPU time limit sent to the judge, in seconds.
    pub min_cpu_time_limit: f64,
    pub memory_ceiling: MemoryCeiling,
}

impl LimitConfig {
    pub fn cpu_time_limit(&self, problem: &Problem) -> f64 {
        problem.time_limit.max(self.min_cpu_time_limit)
    }
}

impl Default for LimitConfig {
    fn default() -> Self {
        LimitConfig {
            min_cpu_time_limit: 0.1,
            memory_ceiling: MemoryCeiling::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PollConfig {
    /// Status queries per test case before giving up.
    pub max_attempts: u32,
    /// Delay between two status queries of one test case.
    pub interval_ms: u64,
    /// Test cases of one submission polled at the same time.
    pub concurrency: usize,
    /// Overall time budget of the polling phase of one submission.
    pub submission_deadline_secs: Option<u64>,
}

impl Default for PollConfig {
    fn default() -> Self {
        PollConfig {
            max_attempts: 10,
            interval_ms: 1000,
            concurrency: 4,
            submission_deadline_secs: Some(120),
        }
    }
}

impl PollConfig {
    pub fn to_options(&self) -> PollOptions {
        PollOptionsBuilder::default()
            .max_attempts(self.max_attempts)
            .interval(Duration::from_millis(self.interval_ms))
            .concurrency(self.concurrency)
            .deadline(self.submission_deadline_secs.map(Duration::from_secs))
            .build()
            .expect("all poll options are set")
    }
}

pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".judge-orchestrator"))
        .unwrap_or_else(|| PathBuf::from(".judge-orchestrator"))
}

pub fn default_config_path() -> PathBuf {
    default_data_dir().join("config.toml")
}

impl OrchestratorConfig {
    /// Read configuration from a TOML file.
    pub async fn from_file(path: &Path) -> anyhow::Result<OrchestratorConfig> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading config file {}", path.display()))?;
        let cfg = toml::from_str::<OrchestratorConfig>(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(cfg)
    }

    /// Read `path` if given, otherwise the default config file if it exists,
    /// otherwise fall back to defaults.
    pub async fn load(path: Option<&Path>) -> anyhow::Result<OrchestratorConfig> {
        match path {
            Some(path) => Self::from_file(path).await,
            None => {
                let path = default_config_path();
                if tokio::fs::metadata(&path).await.is_ok() {
                    Self::from_file(&path).await
                } else {
                    tracing::debug!("No config file at {}, using defaults", path.display());
                    Ok(OrchestratorConfig::default())
                }
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            !self.judge.base_url.trim().is_empty(),
            "judge service base url is not set"
        );
        ensure!(
            self.polling.max_attempts > 0,
            "polling.maxAttempts must be at least 1"
        );
        ensure!(
            self.polling.concurrency > 0,
            "polling.concurrency must be at least 1"
        );
        ensure!(
            self.max_in_flight_requests > 0,
            "maxInFlightRequests must be at least 1"
        );
        ensure!(
            self.limits.min_cpu_time_limit > 0.0,
            "limits.minCpuTimeLimit must be positive"
        );
        Ok(())
    }
}
