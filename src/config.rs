use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::devrant;

/// Errors that can occur when loading configuration.
#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is not set.
    Missing(&'static str),
    /// A variable is set but unusable.
    Invalid { var: &'static str, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing(var) => write!(f, "missing required environment variable {var}"),
            Self::Invalid { var, reason } => write!(f, "invalid {var}: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Production,
    Development,
    Test,
}

impl Environment {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "development" | "dev" => Ok(Self::Development),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::Invalid {
                var: "APP_ENV",
                reason: format!("unknown environment '{other}'"),
            }),
        }
    }
}

/// Slack credentials for one installation.
#[derive(Clone, PartialEq, Eq)]
pub struct SlackCredentials {
    /// Bot token (xoxb-...).
    pub bot_token: String,
    /// App-level token for Socket Mode (xapp-...).
    pub app_token: String,
}

impl fmt::Debug for SlackCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlackCredentials")
            .field("bot_token", &"[REDACTED]")
            .field("app_token", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    /// `None` only in the test environment.
    pub slack: Option<SlackCredentials>,
    pub slack_api_url: String,
    /// User greeted when the bot first connects.
    pub installer_user: Option<String>,
    /// Slack incoming webhook that receives errors.
    pub error_webhook_url: Option<String>,
    pub log_file: PathBuf,
    pub devrant_api_url: String,
    /// Deadline for each devRant request.
    pub devrant_timeout: Duration,
}

const DEFAULT_LOG_FILE: &str = "logs/devrant-bot.log";
const DEFAULT_TIMEOUT_SECS: u64 = 15;

impl Config {
    /// Load from the process environment, after reading `.env` if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load using `lookup` to read variables. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let environment = match get("APP_ENV") {
            Some(value) => Environment::parse(&value)?,
            None => Environment::Production,
        };

        let slack = match (get("SLACK_BOT_TOKEN"), get("SLACK_APP_TOKEN")) {
            (Some(bot_token), Some(app_token)) => {
                validate_token("SLACK_BOT_TOKEN", &bot_token, "xoxb-")?;
                validate_token("SLACK_APP_TOKEN", &app_token, "xapp-")?;
                Some(SlackCredentials { bot_token, app_token })
            }
            _ if environment == Environment::Test => None,
            (None, _) => return Err(ConfigError::Missing("SLACK_BOT_TOKEN")),
            (_, None) => return Err(ConfigError::Missing("SLACK_APP_TOKEN")),
        };

        let error_webhook_url = get("ERROR_WEBHOOK_URL");
        if let Some(ref url) = error_webhook_url
            && !url.starts_with("https://")
            && !url.starts_with("http://")
        {
            return Err(ConfigError::Invalid {
                var: "ERROR_WEBHOOK_URL",
                reason: "expected an http(s) URL".into(),
            });
        }

        let devrant_timeout = match get("DEVRANT_TIMEOUT_SECS") {
            Some(value) => {
                let secs: u64 = value.parse().map_err(|_| ConfigError::Invalid {
                    var: "DEVRANT_TIMEOUT_SECS",
                    reason: format!("'{value}' is not a number of seconds"),
                })?;
                if secs == 0 {
                    return Err(ConfigError::Invalid {
                        var: "DEVRANT_TIMEOUT_SECS",
                        reason: "must be greater than zero".into(),
                    });
                }
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        Ok(Self {
            environment,
            slack,
            slack_api_url: get("SLACK_API_URL")
                .unwrap_or_else(|| crate::bot::slack::DEFAULT_API_URL.to_string()),
            installer_user: get("SLACK_INSTALLER_USER"),
            error_webhook_url,
            log_file: get("LOG_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE)),
            devrant_api_url: get("DEVRANT_API_URL")
                .unwrap_or_else(|| devrant::DEFAULT_BASE_URL.to_string()),
            devrant_timeout,
        })
    }
}

fn validate_token(var: &'static str, token: &str, prefix: &str) -> Result<(), ConfigError> {
    if !token.starts_with(prefix) || token.len() == prefix.len() {
        return Err(ConfigError::Invalid {
            var,
            reason: format!("appears invalid (expected format: {prefix}...)"),
        });
    }
    Ok(())
}
