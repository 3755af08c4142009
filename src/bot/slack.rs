//! Slack Web API client.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::bot::format::Reply;

pub const DEFAULT_API_URL: &str = "https://slack.com/api";

#[derive(Debug)]
pub enum SlackError {
    /// Request could not be sent or the response could not be read.
    Http(String),
    /// Slack answered with `ok: false`.
    Api(String),
    WebSocket(String),
    Json(String),
}

impl std::fmt::Display for SlackError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SlackError::Http(e) => write!(f, "HTTP error: {e}"),
            SlackError::Api(e) => write!(f, "Slack API error: {e}"),
            SlackError::WebSocket(e) => write!(f, "WebSocket error: {e}"),
            SlackError::Json(e) => write!(f, "JSON error: {e}"),
        }
    }
}

impl std::error::Error for SlackError {}

/// Slack error codes that retrying cannot fix.
const AUTH_FAILURES: &[&str] = &[
    "invalid_auth",
    "not_authed",
    "account_inactive",
    "token_revoked",
    "token_expired",
    "not_allowed_token_type",
    "missing_scope",
];

impl SlackError {
    /// True when Slack rejected the token itself.
    pub fn is_auth_failure(&self) -> bool {
        match self {
            SlackError::Api(msg) => msg
                .rsplit_once(": ")
                .is_some_and(|(_, code)| AUTH_FAILURES.contains(&code)),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for SlackError {
    fn from(err: reqwest::Error) -> Self {
        SlackError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for SlackError {
    fn from(err: serde_json::Error) -> Self {
        SlackError::Json(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SlackError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        SlackError::WebSocket(err.to_string())
    }
}

/// Where a reply goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub channel: String,
    pub thread_ts: Option<String>,
}

impl Destination {
    pub fn channel(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            thread_ts: None,
        }
    }
}

/// Outbound side of the chat platform, as seen by the router.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_reply(&self, to: &Destination, reply: &Reply) -> Result<(), SlackError>;

    /// Open (or reuse) the IM channel with a user and return its id.
    async fn open_direct(&self, user: &str) -> Result<String, SlackError>;
}

/// Identity of the bot, from `auth.test`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    pub user_id: String,
    pub team_id: Option<String>,
}

#[derive(Deserialize)]
struct ApiResponse {
    ok: bool,
    error: Option<String>,
    #[serde(flatten)]
    rest: serde_json::Map<String, serde_json::Value>,
}

impl ApiResponse {
    fn str_field(&self, name: &str) -> Option<String> {
        self.rest.get(name).and_then(|v| v.as_str()).map(str::to_string)
    }
}

pub struct SlackClient {
    api_url: String,
    bot_token: String,
    http: reqwest::Client,
}

impl SlackClient {
    pub fn new(api_url: impl Into<String>, bot_token: impl Into<String>) -> Result<Self, SlackError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| SlackError::Http(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            bot_token: bot_token.into(),
            http,
        })
    }

    async fn call(&self, token: &str, method: &str, body: &serde_json::Value) -> Result<ApiResponse, SlackError> {
        debug!("Slack API call: {method}");

        let response = self
            .http
            .post(format!("{}/{}", self.api_url, method))
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("?")
                .to_string();
            warn!("Slack rate limited {method}, retry after {retry_after}s");
            return Err(SlackError::Api(format!("{method}: ratelimited")));
        }

        let parsed: ApiResponse = response.json().await?;
        if !parsed.ok {
            let error = parsed.error.as_deref().unwrap_or("unknown");
            return Err(SlackError::Api(format!("{method}: {error}")));
        }
        Ok(parsed)
    }

    /// Check the bot token and learn the bot's own user id.
    pub async fn auth_test(&self) -> Result<BotIdentity, SlackError> {
        let response = self.call(&self.bot_token, "auth.test", &json!({})).await?;
        let user_id = response
            .str_field("user_id")
            .ok_or_else(|| SlackError::Api("auth.test: missing user_id".to_string()))?;
        let team_id = response.str_field("team_id");

        info!("Authenticated as bot user {user_id}");
        Ok(BotIdentity { user_id, team_id })
    }

    /// Get a Socket Mode WebSocket URL using the app-level token.
    pub async fn open_connection(&self, app_token: &str) -> Result<String, SlackError> {
        let response = self.call(app_token, "apps.connections.open", &json!({})).await?;
        response
            .str_field("url")
            .ok_or_else(|| SlackError::Api("apps.connections.open: missing url".to_string()))
    }
}

#[async_trait]
impl Messenger for SlackClient {
    async fn send_reply(&self, to: &Destination, reply: &Reply) -> Result<(), SlackError> {
        let mut body = serde_json::to_value(reply)?;
        body["channel"] = json!(to.channel);
        if let Some(ref ts) = to.thread_ts {
            body["thread_ts"] = json!(ts);
        }

        self.call(&self.bot_token, "chat.postMessage", &body).await.map(|_| ())
    }

    async fn open_direct(&self, user: &str) -> Result<String, SlackError> {
        let response = self
            .call(&self.bot_token, "conversations.open", &json!({ "users": user }))
            .await?;

        response
            .rest
            .get("channel")
            .and_then(|c| c.get("id"))
            .and_then(|id| id.as_str())
            .map(str::to_string)
            .ok_or_else(|| SlackError::Api("conversations.open: missing channel id".to_string()))
    }
}
