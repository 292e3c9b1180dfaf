use crate::adapter::AdapterError;
use crate::adapters::http::{self, check_status};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::config::BASE_URL;

#[derive(Debug, Deserialize)]
pub struct CommitAuthor {
    pub name: String,
    pub date: String,
}

#[derive(Debug, Deserialize)]
pub struct CommitDetail {
    pub message: String,
    pub author: CommitAuthor,
}

/// Entry of `GET /repos/{owner}/{repo}/commits`.
#[derive(Debug, Deserialize)]
pub struct GitHubCommit {
    pub sha: String,
    pub html_url: String,
    pub commit: CommitDetail,
}

#[derive(Debug, Deserialize)]
pub struct PullRequestUser {
    pub login: String,
}

#[derive(Debug, Deserialize)]
pub struct GitHubPullRequest {
    pub number: u64,
    pub title: String,
    pub html_url: String,
    pub state: String,
    pub created_at: String,
    pub user: PullRequestUser,
}

#[derive(Debug, Deserialize)]
pub struct GitHubIssue {
    pub number: u64,
    pub title: String,
    pub html_url: String,
}

#[derive(Debug, Serialize)]
struct NewIssue<'a> {
    title: &'a str,
    body: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct GitHubUser {
    pub login: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GitHubEmail {
    pub email: String,
    pub primary: bool,
    #[serde(default)]
    pub verified: bool,
}

/// HTTP client for the GitHub REST API.
///
/// Authenticates with a Bearer token and sets a User-Agent header.
pub struct GitHubClient {
    access_token: String,
    http_client: Client,
    base_url: String,
}

impl GitHubClient {
    pub fn new(access_token: String) -> Result<Self, AdapterError> {
        Self::with_base_url(access_token, BASE_URL.to_string())
    }

    /// Create a client with a custom base URL (for testing with a mock server).
    pub fn with_base_url(access_token: String, base_url: String) -> Result<Self, AdapterError> {
        Ok(Self {
            access_token,
            http_client: http::client()?,
            base_url,
        })
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, AdapterError> {
        let response = self
            .http_client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.access_token)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await?;
        Ok(check_status(response).await?.json::<T>().await?)
    }

    /// Most recent commits on the default branch, newest first.
    pub async fn fetch_commits(&self, repo: &str) -> Result<Vec<GitHubCommit>, AdapterError> {
        self.get(&format!("/repos/{}/commits?per_page=10", repo)).await
    }

    /// Most recently opened pull requests (any state), newest first.
    pub async fn fetch_pull_requests(
        &self,
        repo: &str,
    ) -> Result<Vec<GitHubPullRequest>, AdapterError> {
        self.get(&format!(
            "/repos/{}/pulls?state=all&sort=created&direction=desc&per_page=10",
            repo
        ))
        .await
    }

    pub async fn create_issue(
        &self,
        repo: &str,
        title: &str,
        body: &str,
    ) -> Result<GitHubIssue, AdapterError> {
        let response = self
            .http_client
            .post(format!("{}/repos/{}/issues", self.base_url, repo))
            .bearer_auth(&self.access_token)
            .header("Accept", "application/vnd.github+json")
            .json(&NewIssue { title, body })
            .send()
            .await?;
        Ok(check_status(response).await?.json::<GitHubIssue>().await?)
    }

    pub async fn fetch_user(&self) -> Result<GitHubUser, AdapterError> {
        self.get("/user").await
    }

    pub async fn fetch_emails(&self) -> Result<Vec<GitHubEmail>, AdapterError> {
        self.get("/user/emails").await
    }
}
