//! GitHub Meta Source
//!
//! Pages through a repository's issues and pull requests with the GitHub
//! GraphQL API, `PAGE_SIZE` nodes per request.

use std::time::Duration;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::json;
use super::error::{MetaError, MetaResult};
use super::{EventKind, IssueEvent, MetaSource, RepoIdentity};

pub const GITHUB_GRAPHQL_ENDPOINT: &str = "https://api.github.com/graphql";
pub const DEFAULT_TOKEN_ENV: &str = "GITHUB_TOKEN";
const PAGE_SIZE: u32 = 100;

const ISSUES_QUERY: &str = r#"
query($owner: String!, $name: String!, $first: Int!, $cursor: String) {
  repository(owner: $owner, name: $name) {
    connection: issues(first: $first, after: $cursor, orderBy: {field: CREATED_AT, direction: ASC}) {
      pageInfo { hasNextPage endCursor }
      nodes { number state createdAt closedAt }
    }
  }
}"#;

const PULL_REQUESTS_QUERY: &str = r#"
query($owner: String!, $name: String!, $first: Int!, $cursor: String) {
  repository(owner: $owner, name: $name) {
    connection: pullRequests(first: $first, after: $cursor, orderBy: {field: CREATED_AT, direction: ASC}) {
      pageInfo { hasNextPage endCursor }
      nodes { number state createdAt closedAt }
    }
  }
}"#;

#[derive(Debug, Clone)]
pub struct GithubMetaSource {
    client: reqwest::Client,
    endpoint: String,
    token: String,
}

impl GithubMetaSource {
    pub fn new(token: impl Into<String>, endpoint: impl Into<String>, timeout: Duration) -> MetaResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("gevol/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            token: token.into(),
        })
    }

    /// Read the bearer token from `token_env`
    pub fn from_env(token_env: &str, endpoint: impl Into<String>, timeout: Duration) -> MetaResult<Self> {
        let token = std::env::var(token_env)
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| MetaError::MissingToken(token_env.to_owned()))?;
        Self::new(token, endpoint, timeout)
    }

    async fn fetch_kind(&self, repo: &RepoIdentity, kind: EventKind) -> MetaResult<Vec<IssueEvent>> {
        let query = match kind {
            EventKind::Issue => ISSUES_QUERY,
            EventKind::PullRequest => PULL_REQUESTS_QUERY,
        };

        let mut events = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let request = GraphQlRequest {
                query,
                variables: json!({ "owner": repo.owner, "name": repo.name, "first": PAGE_SIZE, "cursor": cursor }),
            };

            let body = self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.token)
                .json(&request)
                .send()
                .await?
                .error_for_status()?
                .json::<GraphQlResponse>()
                .await?;

            let page = parse_page(body, repo, kind)?;
            debug!("{}: fetched {} {:?} events", repo, page.events.len(), kind);
            events.extend(page.events);

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(events)
    }
}

#[async_trait]
impl MetaSource for GithubMetaSource {
    fn name(&self) -> &str {
        "github"
    }

    async fn fetch_events(&self, repo: &RepoIdentity) -> MetaResult<Vec<IssueEvent>> {
        let (issues, pulls) = tokio::try_join!(
            self.fetch_kind(repo, EventKind::Issue),
            self.fetch_kind(repo, EventKind::PullRequest),
        )?;
        let mut events = issues;
        events.extend(pulls);
        Ok(events)
    }
}

/// One page of events plus the cursor for the next page, if any
#[derive(Debug)]
struct Page {
    events: Vec<IssueEvent>,
    next_cursor: Option<String>,
}

fn parse_page(body: GraphQlResponse, repo: &RepoIdentity, kind: EventKind) -> MetaResult<Page> {
    if let Some(errors) = body.errors.filter(|errors| !errors.is_empty()) {
        let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
        return Err(MetaError::GraphQl(messages.join("; ")));
    }

    let connection = body
        .data
        .and_then(|data| data.repository)
        .ok_or_else(|| MetaError::NotFound(repo.to_string()))?
        .connection;

    let events = connection
        .nodes
        .into_iter()
        .map(|node| {
            Ok(IssueEvent {
                number: node.number,
                kind,
                state: node.state.parse()?,
                created_at: node.created_at,
                closed_at: node.closed_at,
            })
        })
        .collect::<MetaResult<Vec<_>>>()?;

    let next_cursor = if connection.page_info.has_next_page {
        connection.page_info.end_cursor
    } else {
        None
    };

    Ok(Page { events, next_cursor })
}

#[derive(Debug, Serialize)]
struct GraphQlRequest {
    query: &'static str,
    variables: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<ResponseData>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResponseData {
    repository: Option<RepositoryNode>,
}

#[derive(Debug, Deserialize)]
struct RepositoryNode {
    connection: Connection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Connection {
    page_info: PageInfo,
    #[serde(default)]
    nodes: Vec<EventNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventNode {
    number: u64,
    state: String,
    created_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
}
