//! devRant API client.
//!
//! Every call is a single GET against the public API, tagged with the fixed
//! `app` identifier. A call succeeds only when the HTTP status is 2xx and
//! the body reports `"success": true`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://www.devrant.io/api";

/// Client identifier sent as the `app` query parameter on every request.
const CLIENT_APP_ID: &str = "3";

/// Number of rants requested by list-style calls when no limit is given.
pub const DEFAULT_LIMIT: u32 = 10;

/// Image attached to a rant.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AttachedImage {
    pub url: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

/// A single rant as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Rant {
    pub id: u64,
    pub text: String,
    pub score: i64,
    #[serde(default)]
    pub created_time: i64,
    /// The API sends `""` instead of an object when there is no image.
    #[serde(default, deserialize_with = "image_or_empty")]
    pub attached_image: Option<AttachedImage>,
    #[serde(default)]
    pub num_comments: u64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub user_id: u64,
    pub user_username: String,
    #[serde(default)]
    pub user_score: i64,
}

fn image_or_empty<'de, D>(deserializer: D) -> Result<Option<AttachedImage>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Image(AttachedImage),
        Other(serde::de::IgnoredAny),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Image(image)) => Some(image),
        Some(Raw::Other(_)) | None => None,
    })
}

/// Ordering of rant lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sort {
    Algo,
    Recent,
    Top,
    /// Passed to the API verbatim.
    Other(String),
}

impl Sort {
    pub fn as_str(&self) -> &str {
        match self {
            Sort::Algo => "algo",
            Sort::Recent => "recent",
            Sort::Top => "top",
            Sort::Other(s) => s,
        }
    }
}

impl From<&str> for Sort {
    fn from(s: &str) -> Self {
        match s {
            "algo" => Sort::Algo,
            "recent" => Sort::Recent,
            "top" => Sort::Top,
            other => Sort::Other(other.to_string()),
        }
    }
}

/// Parameters for the rant feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub skip: Option<u32>,
    pub limit: Option<u32>,
    pub sort: Sort,
}

impl ListQuery {
    pub fn recent() -> Self {
        Self {
            skip: None,
            limit: Some(DEFAULT_LIMIT),
            sort: Sort::Recent,
        }
    }
}

/// Parameters for a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub term: String,
    pub limit: Option<u32>,
    pub skip: Option<u32>,
    pub sort: Option<Sort>,
}

impl SearchQuery {
    pub fn new(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            limit: Some(DEFAULT_LIMIT),
            skip: None,
            sort: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The API could not be reached or the body could not be read.
    Transport(String),
    /// The API answered but reported a failure.
    Upstream(String),
    /// The requested resource does not exist.
    NotFound(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Transport(e) => write!(f, "transport error: {e}"),
            Error::Upstream(e) => write!(f, "devRant error: {e}"),
            Error::NotFound(what) => write!(f, "not found: {what}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Transport(format!("request timed out: {err}"))
        } else {
            Error::Transport(err.to_string())
        }
    }
}

/// Source of rants. Implemented by [`Client`]; the router only sees this.
#[async_trait]
pub trait RantSource: Send + Sync {
    async fn fetch_by_id(&self, id: u64) -> Result<Rant, Error>;
    async fn fetch_list(&self, query: &ListQuery) -> Result<Vec<Rant>, Error>;
    async fn search(&self, query: &SearchQuery) -> Result<Vec<Rant>, Error>;
    async fn fetch_random(&self) -> Result<Rant, Error>;
    async fn fetch_weekly(&self, limit: u32) -> Result<Vec<Rant>, Error>;
}

#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    success: bool,
    error: Option<String>,
    rant: Option<Rant>,
    #[serde(default)]
    rants: Vec<Rant>,
    #[serde(default)]
    results: Vec<Rant>,
}

pub struct Client {
    base_url: String,
    http: reqwest::Client,
}

impl Client {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .gzip(true)
            .user_agent(concat!("devrant-bot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    async fn get(&self, path: &str, params: &[(&str, String)]) -> Result<ApiResponse, Error> {
        let url = format!("{}/{}", self.base_url, path);
        debug!("GET {url} {params:?}");

        let response = self
            .http
            .get(&url)
            .query(&[("app", CLIENT_APP_ID)])
            .query(params)
            .send()
            .await?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Transport(format!("failed to read response: {e}")))?;

        match serde_json::from_str::<ApiResponse>(&body) {
            Ok(api) if status.is_success() && api.success => Ok(api),
            _ if status == reqwest::StatusCode::NOT_FOUND => Err(Error::NotFound(path.to_string())),
            Ok(api) => Err(Error::Upstream(
                api.error.unwrap_or_else(|| format!("request failed with status {status}")),
            )),
            Err(e) => Err(Error::Upstream(format!("unreadable response ({status}): {e}"))),
        }
    }
}

#[async_trait]
impl RantSource for Client {
    async fn fetch_by_id(&self, id: u64) -> Result<Rant, Error> {
        let api = self.get(&format!("devrant/rants/{id}"), &[]).await?;
        let rant = api
            .rant
            .ok_or_else(|| Error::Upstream("response has no rant".to_string()))?;

        if rant.id != id {
            return Err(Error::Upstream(format!("asked for rant {id}, got {}", rant.id)));
        }
        Ok(rant)
    }

    async fn fetch_list(&self, query: &ListQuery) -> Result<Vec<Rant>, Error> {
        let mut params = vec![("sort", query.sort.as_str().to_string())];
        if let Some(limit) = query.limit {
            params.push(("limit", limit.to_string()));
        }
        if let Some(skip) = query.skip {
            params.push(("skip", skip.to_string()));
        }

        let mut rants = self.get("devrant/rants", &params).await?.rants;
        if let Some(limit) = query.limit {
            rants.truncate(limit as usize);
        }
        Ok(rants)
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<Rant>, Error> {
        let mut params = vec![("term", query.term.clone())];
        if let Some(limit) = query.limit {
            params.push(("limit", limit.to_string()));
        }
        if let Some(skip) = query.skip {
            params.push(("skip", skip.to_string()));
        }
        if let Some(ref sort) = query.sort {
            params.push(("sort", sort.as_str().to_string()));
        }

        let mut results = self.get("devrant/search", &params).await?.results;
        if let Some(limit) = query.limit {
            results.truncate(limit as usize);
        }
        Ok(results)
    }

    async fn fetch_random(&self) -> Result<Rant, Error> {
        self.get("devrant/rants/surprise", &[])
            .await?
            .rant
            .ok_or_else(|| Error::Upstream("response has no rant".to_string()))
    }

    async fn fetch_weekly(&self, limit: u32) -> Result<Vec<Rant>, Error> {
        let params = [
            ("limit", limit.to_string()),
            ("sort", Sort::Recent.as_str().to_string()),
        ];
        let mut rants = self.get("devrant/weekly-rants", &params).await?.rants;
        rants.truncate(limit as usize);
        Ok(rants)
    }
}
