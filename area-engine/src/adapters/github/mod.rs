pub mod api;
pub mod config;

use crate::adapter::{
    parse_options, require_credentials, ActionPoller, AdapterError, Identity, OAuthConfig,
    PollOutcome, PollRequest, ReactionInvoker, ReactionRequest, ServiceAdapter,
};
use area::credentials::Credentials;
use area::store::{ActionDescriptor, ReactionDescriptor, ServiceDescriptor};
use area::Cursor;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use self::api::GitHubClient;
use self::config::{AUTH_URL, BASE_URL, SCOPES, TOKEN_URL};

pub const SERVICE: &str = "github";
pub const NEW_COMMIT_IN_REPO: &str = "new_commit_in_repo";
pub const NEW_PULL_REQUEST_IN_REPO: &str = "new_pull_request_in_repo";
pub const GET_LATEST_COMMIT_IN_REPO: &str = "get_latest_commit_in_repo";
pub const CREATE_ISSUE: &str = "create_issue";

#[derive(Debug, Deserialize)]
struct RepoOptions {
    repo: String,
}

impl RepoOptions {
    fn validated(options: &serde_json::Value) -> Result<Self, AdapterError> {
        let parsed: RepoOptions = parse_options(options)?;
        match parsed.repo.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(parsed)
            }
            _ => Err(AdapterError::InvalidOptions(format!(
                "repo must look like OWNER/REPO, got '{}'",
                parsed.repo
            ))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct IssueOptions {
    repo: String,
    title: String,
    #[serde(default)]
    body: String,
}

/// Newest item already reported for the Area.
#[derive(Debug, Serialize, Deserialize)]
struct LastSeen {
    last_seen: DateTime<Utc>,
}

/// GitHub service: commits and pull requests of one repository.
pub struct GitHubAdapter {
    base_url: String,
}

impl GitHubAdapter {
    pub fn new() -> Self {
        Self {
            base_url: BASE_URL.to_string(),
        }
    }

    /// Create an adapter with a custom API base URL (for testing).
    pub fn with_base_url(base_url: String) -> Self {
        Self { base_url }
    }

    fn client(&self, credentials: &Credentials) -> Result<GitHubClient, AdapterError> {
        GitHubClient::with_base_url(credentials.access_token.clone(), self.base_url.clone())
    }
}

impl Default for GitHubAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServiceAdapter for GitHubAdapter {
    fn service(&self) -> ServiceDescriptor {
        ServiceDescriptor {
            name: SERVICE.to_string(),
            description: "This service is a code repository service".to_string(),
            oauth: true,
            color: "#000000".to_string(),
            icon: "https://api.iconify.design/mdi:github.svg?color=%23FFFFFF".to_string(),
        }
    }

    fn actions(&self) -> Vec<ActionDescriptor> {
        vec![
            ActionDescriptor {
                name: NEW_COMMIT_IN_REPO.to_string(),
                description: "Triggers when a new commit is pushed to a repository".to_string(),
                default_options: json!({"repo": "OWNER/REPO"}),
                minimum_interval_secs: 10,
            },
            ActionDescriptor {
                name: NEW_PULL_REQUEST_IN_REPO.to_string(),
                description: "Triggers when a new pull request is opened on a repository"
                    .to_string(),
                default_options: json!({"repo": "OWNER/REPO"}),
                minimum_interval_secs: 10,
            },
        ]
    }

    fn reactions(&self) -> Vec<ReactionDescriptor> {
        vec![
            ReactionDescriptor {
                name: GET_LATEST_COMMIT_IN_REPO.to_string(),
                description: "Gets the latest commit of a repository".to_string(),
                default_options: json!({"repo": "OWNER/REPO"}),
            },
            ReactionDescriptor {
                name: CREATE_ISSUE.to_string(),
                description: "Opens an issue on a repository".to_string(),
                default_options: json!({"repo": "OWNER/REPO", "title": "", "body": ""}),
            },
        ]
    }

    fn action_handler(&self, name: &str) -> Option<Arc<dyn ActionPoller>> {
        let kind = match name {
            NEW_COMMIT_IN_REPO => Feed::Commits,
            NEW_PULL_REQUEST_IN_REPO => Feed::PullRequests,
            _ => return None,
        };
        Some(Arc::new(NewItemInRepo {
            base_url: self.base_url.clone(),
            kind,
        }))
    }

    fn reaction_handler(&self, name: &str) -> Option<Arc<dyn ReactionInvoker>> {
        match name {
            GET_LATEST_COMMIT_IN_REPO => Some(Arc::new(LatestCommit {
                base_url: self.base_url.clone(),
            })),
            CREATE_ISSUE => Some(Arc::new(CreateIssue {
                base_url: self.base_url.clone(),
            })),
            _ => None,
        }
    }

    fn oauth_config(&self) -> Option<OAuthConfig> {
        Some(OAuthConfig {
            auth_url: AUTH_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
            scopes: SCOPES.iter().map(|s| s.to_string()).collect(),
        })
    }

    async fn fetch_identity(&self, credentials: &Credentials) -> Result<Identity, AdapterError> {
        let client = self.client(credentials)?;
        let user = client.fetch_user().await?;

        // A private profile email comes back as null; ask for the primary address.
        let email = match user.email.filter(|e| !e.is_empty()) {
            Some(email) => email,
            None => {
                let emails = client.fetch_emails().await?;
                emails
                    .iter()
                    .find(|e| e.primary && e.verified)
                    .or_else(|| emails.iter().find(|e| e.primary))
                    .map(|e| e.email.clone())
                    .ok_or_else(|| {
                        AdapterError::Rejected("account has no primary email".to_string())
                    })?
            }
        };

        Ok(Identity {
            email,
            display_name: user.name.filter(|n| !n.is_empty()).unwrap_or(user.login),
        })
    }
}

#[derive(Clone, Copy, Debug)]
enum Feed {
    Commits,
    PullRequests,
}

/// Item of a feed, reduced to what the poller compares and reports.
struct FeedItem {
    at: DateTime<Utc>,
    payload: serde_json::Value,
}

fn parse_date(raw: &str) -> Result<DateTime<Utc>, AdapterError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AdapterError::Rejected(format!("invalid date '{}': {}", raw, e)))
}

fn encode_cursor(last_seen: DateTime<Utc>) -> Result<Cursor, AdapterError> {
    Cursor::encode(&LastSeen { last_seen }).map_err(|e| AdapterError::Rejected(e.to_string()))
}

struct NewItemInRepo {
    base_url: String,
    kind: Feed,
}

impl NewItemInRepo {
    async fn fetch(&self, client: &GitHubClient, repo: &str) -> Result<Vec<FeedItem>, AdapterError> {
        match self.kind {
            Feed::Commits => client
                .fetch_commits(repo)
                .await?
                .into_iter()
                .map(|c| -> Result<FeedItem, AdapterError> {
                    Ok(FeedItem {
                        at: parse_date(&c.commit.author.date)?,
                        payload: json!({
                            "repo": repo,
                            "sha": c.sha,
                            "message": c.commit.message,
                            "author": c.commit.author.name,
                            "url": c.html_url,
                        }),
                    })
                })
                .collect(),
            Feed::PullRequests => client
                .fetch_pull_requests(repo)
                .await?
                .into_iter()
                .map(|pr| -> Result<FeedItem, AdapterError> {
                    Ok(FeedItem {
                        at: parse_date(&pr.created_at)?,
                        payload: json!({
                            "repo": repo,
                            "number": pr.number,
                            "title": pr.title,
                            "state": pr.state,
                            "author": pr.user.login,
                            "url": pr.html_url,
                        }),
                    })
                })
                .collect(),
        }
    }
}

#[async_trait]
impl ActionPoller for NewItemInRepo {
    async fn poll(&self, request: PollRequest) -> Result<PollOutcome, AdapterError> {
        let options = RepoOptions::validated(&request.options)?;
        let credentials = require_credentials(&request.credentials)?;
        let client =
            GitHubClient::with_base_url(credentials.access_token.clone(), self.base_url.clone())?;

        let items = self.fetch(&client, &options.repo).await?;
        let newest = items.into_iter().max_by_key(|item| item.at);

        let Some(last) = request.cursor.decode::<LastSeen>() else {
            // First poll: remember where the feed stands without firing.
            let start = newest.map(|item| item.at).unwrap_or_else(Utc::now);
            return Ok(PollOutcome::NoEvent {
                cursor: Some(encode_cursor(start)?),
            });
        };

        match newest {
            Some(item) if item.at > last.last_seen => Ok(PollOutcome::Event {
                cursor: encode_cursor(item.at)?,
                payload: item.payload,
            }),
            _ => Ok(PollOutcome::idle()),
        }
    }
}

struct LatestCommit {
    base_url: String,
}

#[async_trait]
impl ReactionInvoker for LatestCommit {
    async fn invoke(&self, request: ReactionRequest) -> Result<String, AdapterError> {
        let options = RepoOptions::validated(&request.options)?;
        let credentials = require_credentials(&request.credentials)?;
        let client =
            GitHubClient::with_base_url(credentials.access_token.clone(), self.base_url.clone())?;

        let commits = client.fetch_commits(&options.repo).await?;
        Ok(match commits.first() {
            Some(c) => format!(
                "latest commit in {} is {} by {}: {}",
                options.repo,
                c.sha.chars().take(7).collect::<String>(),
                c.commit.author.name,
                c.commit.message.lines().next().unwrap_or_default()
            ),
            None => format!("no commit in {}", options.repo),
        })
    }
}

struct CreateIssue {
    base_url: String,
}

#[async_trait]
impl ReactionInvoker for CreateIssue {
    async fn invoke(&self, request: ReactionRequest) -> Result<String, AdapterError> {
        RepoOptions::validated(&request.options)?;
        let options: IssueOptions = parse_options(&request.options)?;
        if options.title.trim().is_empty() {
            return Err(AdapterError::InvalidOptions("title must not be empty".to_string()));
        }
        let credentials = require_credentials(&request.credentials)?;
        let client =
            GitHubClient::with_base_url(credentials.access_token.clone(), self.base_url.clone())?;

        // Without a configured body the issue carries the triggering event.
        let body = if options.body.trim().is_empty() {
            serde_json::to_string_pretty(&request.event).unwrap_or_default()
        } else {
            options.body
        };

        let issue = client
            .create_issue(&options.repo, &options.title, &body)
            .await?;
        Ok(format!(
            "created issue #{} in {}: {}",
            issue.number, options.repo, issue.html_url
        ))
    }
}
