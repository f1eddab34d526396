//! [`JudgeService`] over HTTP, speaking the Judge0 API.

use super::{
    model::{BatchRequest, BatchResponseItem},
    JudgeApiError, JudgeRequest, JudgeService, JudgeStatusResponse, JudgeToken,
};
use crate::config::JudgeServiceConfig;
use async_trait::async_trait;
use itertools::Itertools;
use reqwest::{Method, RequestBuilder, Response};
use std::time::Duration;
use tracing::instrument;

const STATUS_FIELDS: &str = "stdout,stderr,compile_output,message,time,memory,status";

#[derive(Debug, Clone)]
pub struct HttpJudgeClient {
    client: reqwest::Client,
    cfg: JudgeServiceConfig,
}

impl HttpJudgeClient {
    pub fn new(cfg: JudgeServiceConfig) -> Result<HttpJudgeClient, JudgeApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()?;
        Ok(HttpJudgeClient { client, cfg })
    }

    fn base(&self) -> &str {
        self.cfg.base_url.trim_end_matches('/')
    }

    pub fn batch_endpoint(&self) -> String {
        format!("{}/submissions/batch?base64_encoded=true", self.base())
    }

    pub fn status_endpoint(&self, token: &JudgeToken) -> String {
        format!(
            "{}/submissions/{}?base64_encoded=true&fields={}",
            self.base(),
            token,
            STATUS_FIELDS
        )
    }

    fn request(&self, method: Method, endpoint: &str) -> RequestBuilder {
        let mut req = self.client.request(method, endpoint);
        if let Some(key) = &self.cfg.api_key {
            req = req.header("X-RapidAPI-Key", key);
        }
        if let Some(host) = &self.cfg.api_host {
            req = req.header("X-RapidAPI-Host", host);
        }
        if let Some(token) = &self.cfg.auth_token {
            req = req.header("X-Auth-Token", token);
        }
        req
    }

    async fn check_status(res: Response) -> Result<Response, JudgeApiError> {
        let status = res.status().as_u16();
        if status >= 300 {
            let body = res.text().await.unwrap_or_default();
            tracing::error!(status, %body, "Judge service returned an error");
            return Err(JudgeApiError::Status { status, body });
        }
        Ok(res)
    }
}

/// Extract tokens from a batch response body, in order.
pub fn parse_batch_response(body: &[u8]) -> Result<Vec<JudgeToken>, JudgeApiError> {
    let items = serde_json::from_slice::<Vec<BatchResponseItem>>(body)?;
    items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| match item.token {
            Some(token) if !token.is_empty() => Ok(JudgeToken(token)),
            _ => Err(JudgeApiError::Malformed(format!(
                "no token for submission #{}: {}",
                idx,
                serde_json::Value::Object(item.errors)
            ))),
        })
        .collect()
}

#[async_trait]
impl JudgeService for HttpJudgeClient {
    #[instrument(skip_all, fields(count = requests.len()))]
    async fn submit_batch(
        &self,
        requests: &[JudgeRequest],
    ) -> Result<Vec<JudgeToken>, JudgeApiError> {
        let endpoint = self.batch_endpoint();
        tracing::debug!(%endpoint, "Submitting batch");
        let res = self
            .request(Method::POST, &endpoint)
            .json(&BatchRequest {
                submissions: requests,
            })
            .send()
            .await?;
        let body = Self::check_status(res).await?.bytes().await?;
        let tokens = parse_batch_response(&body)?;
        tracing::debug!(tokens = %tokens.iter().join(","), "Batch accepted");
        Ok(tokens)
    }

    #[instrument(skip(self))]
    async fn fetch_status(&self, token: &JudgeToken) -> Result<JudgeStatusResponse, JudgeApiError> {
        let res = self
            .request(Method::GET, &self.status_endpoint(token))
            .send()
            .await?;
        let body = Self::check_status(res).await?.bytes().await?;
        Ok(serde_json::from_slice::<JudgeStatusResponse>(&body)?)
    }
}
