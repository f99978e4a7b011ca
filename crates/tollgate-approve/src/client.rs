use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, RequestBuilder, Url};
use serde::Serialize;
use tollgate_core::{
    Application, ApprovalRequest, RunDetail, RunSummary, ServiceConfig, TollgateError,
    TriggerRequest, TriggerResponse,
};
use tracing::debug;

use crate::decode;

/// Raw answer to an approval call, kept for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalReceipt {
    /// Endpoint that was called.
    pub url: String,
    /// Response body as returned by the service.
    pub body: Vec<u8>,
}

/// The remote calls the orchestrator needs from a build service.
///
/// [`WerckerClient`] talks to the real API; tests substitute a recording fake.
#[allow(async_fn_in_trait)]
pub trait BuildService {
    /// Look up an application by owner and name.
    async fn application(
        &self,
        username: &str,
        application: &str,
    ) -> Result<Application, TollgateError>;

    /// List the runs of an application for one commit.
    async fn runs(
        &self,
        application_id: &str,
        commit_hash: &str,
    ) -> Result<Vec<RunSummary>, TollgateError>;

    /// Fetch the full record of a single run.
    async fn run(&self, run_id: &str) -> Result<RunDetail, TollgateError>;

    /// Start a new run of a pipeline.
    async fn trigger(&self, request: &TriggerRequest) -> Result<TriggerResponse, TollgateError>;

    /// Approve a run that is waiting at a manual gate.
    async fn approve(&self, run_id: &str) -> Result<ApprovalReceipt, TollgateError>;
}

/// Wercker v3 REST API client.
///
/// Every request carries the bearer token and a JSON content type. There are
/// no retries.
///
/// # Examples
///
/// ```
/// use tollgate_approve::client::WerckerClient;
/// use tollgate_core::ServiceConfig;
///
/// let client = WerckerClient::new("secret", &ServiceConfig::default()).unwrap();
/// assert_eq!(
///     client.endpoint("runs/r1"),
///     "https://app.wercker.com/api/v3/runs/r1"
/// );
/// ```
pub struct WerckerClient {
    http: reqwest::Client,
    token: String,
    base_url: String,
}

impl WerckerClient {
    /// Create a client for the service described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`TollgateError::Config`] if the token is empty, or
    /// [`TollgateError::Transport`] if the HTTP client cannot be built.
    pub fn new(token: impl Into<String>, config: &ServiceConfig) -> Result<Self, TollgateError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(TollgateError::Config("auth token must not be empty".into()));
        }

        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder
            .build()
            .map_err(|e| TollgateError::Transport(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            token,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Absolute URL of an API v3 path.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/api/v3/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// URL of an API v3 resource, with each of `segments` percent-encoded as
    /// a single path segment.
    ///
    /// # Errors
    ///
    /// Returns [`TollgateError::Config`] if the base URL cannot be parsed or
    /// cannot carry a path.
    pub fn resource_url(&self, segments: &[&str]) -> Result<Url, TollgateError> {
        let mut url = Url::parse(&self.endpoint(""))
            .map_err(|e| TollgateError::Config(format!("invalid base URL '{}': {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|()| {
                TollgateError::Config(format!("base URL '{}' cannot carry a path", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Issue an authenticated GET and return the raw body.
    ///
    /// # Errors
    ///
    /// Returns [`TollgateError::Transport`] on network failure, or
    /// [`TollgateError::Http`] on a non-success status.
    pub async fn get(&self, url: &str) -> Result<Vec<u8>, TollgateError> {
        let request = self
            .http
            .get(url)
            .header(CONTENT_TYPE, "application/json");
        self.send(request, Method::GET, url).await
    }

    /// Issue an authenticated POST with a JSON body and return the raw body.
    ///
    /// # Errors
    ///
    /// Returns [`TollgateError::Transport`] on network failure, or
    /// [`TollgateError::Http`] on a non-success status.
    pub async fn post<B>(&self, url: &str, body: &B) -> Result<Vec<u8>, TollgateError>
    where
        B: Serialize + ?Sized,
    {
        let request = self.http.post(url).json(body);
        self.send(request, Method::POST, url).await
    }

    async fn send(
        &self,
        request: RequestBuilder,
        method: Method,
        url: &str,
    ) -> Result<Vec<u8>, TollgateError> {
        debug!(%method, url, "sending request");
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| TollgateError::Transport(format!("{method} {url} failed: {e}")))?;

        let status = response.status();
        debug!(%method, url, status = status.as_u16(), "received response");
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TollgateError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await.map_err(|e| {
            TollgateError::Transport(format!("failed to read response from {url}: {e}"))
        })?;
        Ok(body.to_vec())
    }
}

impl BuildService for WerckerClient {
    async fn application(
        &self,
        username: &str,
        application: &str,
    ) -> Result<Application, TollgateError> {
        let url = self.resource_url(&["applications", username, application])?;
        let body = self.get(url.as_str()).await?;
        decode::application(&body)
    }

    async fn runs(
        &self,
        application_id: &str,
        commit_hash: &str,
    ) -> Result<Vec<RunSummary>, TollgateError> {
        let mut url = self.resource_url(&["runs"])?;
        url.query_pairs_mut()
            .append_pair("applicationId", application_id)
            .append_pair("commitHash", commit_hash);
        let body = self.get(url.as_str()).await?;
        decode::runs(&body)
    }

    async fn run(&self, run_id: &str) -> Result<RunDetail, TollgateError> {
        let url = self.resource_url(&["runs", run_id])?;
        let body = self.get(url.as_str()).await?;
        decode::run(&body)
    }

    async fn trigger(&self, request: &TriggerRequest) -> Result<TriggerResponse, TollgateError> {
        let url = self.endpoint("runs");
        let body = self.post(&url, request).await?;
        decode::trigger(&body)
    }

    async fn approve(&self, run_id: &str) -> Result<ApprovalReceipt, TollgateError> {
        let url = self.endpoint("trigger/runs/approve");
        let request = ApprovalRequest {
            run_id: run_id.to_string(),
        };
        let body = self.post(&url, &request).await?;
        Ok(ApprovalReceipt { url, body })
    }
}
