//! Delivery: pushes a converged run's branch and opens a pull request
//! through a thin `VCSClient` interface. The concrete GitHub-backed client
//! is the narrow external collaborator; the coordinator only depends on
//! the trait, matching how it depends on `AgentDriver` rather than an
//! agent binary directly.

use agentgate_core::{Error, Result};
use async_trait::async_trait;

#[derive(Clone, Debug)]
pub struct DeliveryRequest {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub base_branch: String,
    pub title: String,
    pub body: String,
}

#[derive(Clone, Debug, Default)]
pub struct DeliveryResult {
    pub pr_url: Option<String>,
    pub pr_number: Option<u64>,
}

#[async_trait]
pub trait VCSClient: Send + Sync {
    async fn open_pull_request(&self, request: &DeliveryRequest) -> Result<DeliveryResult>;
}

/// Used when no GitHub token is configured — delivery is skipped and the
/// branch is left pushed (or local-only) with no pull request opened.
pub struct NoopVcsClient;

#[async_trait]
impl VCSClient for NoopVcsClient {
    async fn open_pull_request(&self, _request: &DeliveryRequest) -> Result<DeliveryResult> {
        Ok(DeliveryResult::default())
    }
}

#[derive(serde::Deserialize)]
struct CreatePrResponse {
    html_url: String,
    number: u64,
}

/// Opens a pull request via the GitHub REST API. Pushing the branch itself
/// is the coordinator's job (plain `git push` in the sandbox); this client
/// only covers the PR-creation call.
pub struct GitHubVcsClient {
    client: reqwest::Client,
    token: String,
}

impl GitHubVcsClient {
    pub fn new(token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
        }
    }
}

#[async_trait]
impl VCSClient for GitHubVcsClient {
    async fn open_pull_request(&self, request: &DeliveryRequest) -> Result<DeliveryResult> {
        let url = format!(
            "https://api.github.com/repos/{}/{}/pulls",
            request.owner, request.repo
        );
        let body = serde_json::json!({
            "title": request.title,
            "head": request.branch,
            "base": request.base_branch,
            "body": request.body,
        });
        let response = self
            .client
            .post(&url)
            .header("User-Agent", "agentgate")
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Internal(format!("github pull request create failed: {e}")))?
            .error_for_status()
            .map_err(|e| Error::Internal(format!("github pull request create failed: {e}")))?;
        let parsed: CreatePrResponse = response
            .json()
            .await
            .map_err(|e| Error::Internal(format!("github pull request response decode failed: {e}")))?;
        Ok(DeliveryResult {
            pr_url: Some(parsed.html_url),
            pr_number: Some(parsed.number),
        })
    }
}

/// Branch name a converged run delivers under: short enough to read in a
/// GitHub branch list, unique per run.
pub fn delivery_branch_name(run_id: &str) -> String {
    let short = &run_id[..run_id.len().min(8)];
    format!("agentgate/{short}")
}
