//! HTTP implementation of the remote service traits.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use super::types::{
    CreateJobRequest, ExecuteTaskRequest, ExecuteTaskResponse, Job, SaveDailyStatsRequest,
};
use super::{AutomationClient, JobClient, ReportStore};
use crate::domain::{ReportEntry, Workflow};
use crate::{Error, Result};

/// Connection settings for [`HttpApiClient`].
#[derive(Debug, Clone)]
pub struct HttpApiConfig {
    /// API root, e.g. `https://agency.example.com/api/`.
    pub base_url: String,
    /// Bearer token sent with every request.
    pub token: Option<String>,
    /// Timeout for ordinary API calls.
    pub request_timeout: Duration,
    /// Timeout for a direct workflow execution. The remote side is expected
    /// to give up on its own before this fires.
    pub execute_timeout: Duration,
}

impl Default for HttpApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/api/".to_string(),
            token: None,
            request_timeout: Duration::from_secs(30),
            execute_timeout: Duration::from_millis(120_000),
        }
    }
}

/// Install the process-wide rustls crypto provider once.
pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateJobResponse {
    job_id: String,
}

/// reqwest-backed client for the automation and report endpoints.
pub struct HttpApiClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
    execute_timeout: Duration,
}

impl HttpApiClient {
    /// Create a new client.
    pub fn new(config: HttpApiConfig) -> Result<Self> {
        let mut base = config.base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)
            .map_err(|e| Error::config(format!("invalid API base URL '{}': {}", base, e)))?;

        install_rustls_provider();
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url,
            token: config.token.filter(|t| !t.is_empty()),
            execute_timeout: config.execute_timeout,
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::config(format!("invalid API path '{}': {}", path, e)))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = self.authorize(request).send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        warn!(status = %status, body = %body, "API request failed");
        Err(Error::Remote {
            status: status.as_u16(),
            message: if body.is_empty() {
                status.to_string()
            } else {
                body
            },
        })
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.send(request).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl AutomationClient for HttpApiClient {
    async fn get_workflows(&self) -> Result<Vec<Workflow>> {
        let url = self.url("automation/workflows")?;
        let workflows: Vec<Workflow> = self.send_json(self.client.get(url)).await?;
        debug!(count = workflows.len(), "Fetched workflow catalog");
        Ok(workflows)
    }

    async fn execute_task(&self, request: &ExecuteTaskRequest) -> Result<ExecuteTaskResponse> {
        let url = self.url("automation/execute")?;
        let builder = self
            .client
            .post(url)
            .timeout(self.execute_timeout)
            .json(request);
        self.send_json(builder).await
    }
}

#[async_trait]
impl JobClient for HttpApiClient {
    async fn create_job(&self, request: &CreateJobRequest) -> Result<String> {
        let url = self.url("scrape-jobs")?;
        let response: CreateJobResponse = self.send_json(self.client.post(url).json(request)).await?;
        debug!(
            job_id = %response.job_id,
            targets = request.targets.len(),
            "Created scrape job"
        );
        Ok(response.job_id)
    }

    async fn get_job(&self, job_id: &str) -> Result<Job> {
        let url = self.url(&format!("scrape-jobs/{}", job_id))?;
        match self.send_json(self.client.get(url)).await {
            Err(Error::Remote { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                Err(Error::not_found("Job", job_id))
            }
            other => other,
        }
    }

    async fn rerun_task(&self, task_id: &str) -> Result<()> {
        let url = self.url(&format!("scrape-tasks/{}/rerun", task_id))?;
        self.send(self.client.post(url)).await?;
        Ok(())
    }
}

#[async_trait]
impl ReportStore for HttpApiClient {
    async fn save_daily_stats(
        &self,
        project_id: &str,
        date: NaiveDate,
        data: &[ReportEntry],
    ) -> Result<()> {
        let url = self.url("daily-stats")?;
        let body = SaveDailyStatsRequest {
            project_id: project_id.to_string(),
            date,
            data: data.to_vec(),
        };
        self.send(self.client.post(url).json(&body)).await?;
        debug!(project_id, %date, entries = data.len(), "Saved daily stats");
        Ok(())
    }
}
