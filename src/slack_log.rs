//! Forwards warnings and errors to a Slack incoming webhook.

use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

/// Slack truncates long webhook messages; stay well under the limit.
const MAX_LOG_LENGTH: usize = 3000;

/// Log message with priority.
enum LogMessage {
    /// ERROR - send immediately
    Urgent(String),
    /// WARN - batch and send periodically
    Warning(String),
}

pub struct SlackLogLayer {
    tx: mpsc::UnboundedSender<LogMessage>,
}

impl SlackLogLayer {
    /// Must be called from within a tokio runtime.
    pub fn new(webhook_url: String) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<LogMessage>();
        let http = reqwest::Client::new();

        tokio::spawn(async move {
            let mut warn_buffer: Vec<String> = Vec::new();
            let mut interval = tokio::time::interval(Duration::from_secs(5));

            loop {
                tokio::select! {
                    msg = rx.recv() => {
                        match msg {
                            Some(LogMessage::Urgent(text)) => {
                                send_log(&http, &webhook_url, &text).await;
                            }
                            Some(LogMessage::Warning(text)) => {
                                warn_buffer.push(text);
                                if warn_buffer.len() >= 50 {
                                    flush_buffer(&http, &webhook_url, &mut warn_buffer).await;
                                }
                            }
                            None => break,
                        }
                    }
                    _ = interval.tick() => {
                        if !warn_buffer.is_empty() {
                            flush_buffer(&http, &webhook_url, &mut warn_buffer).await;
                        }
                    }
                }
            }
        });

        Self { tx }
    }
}

async fn send_log(http: &reqwest::Client, webhook_url: &str, text: &str) {
    let text = if text.chars().count() > MAX_LOG_LENGTH {
        let truncated: String = text.chars().take(MAX_LOG_LENGTH).collect();
        format!("{}...", truncated)
    } else {
        text.to_string()
    };
    // Logging from here would loop back into this layer.
    if let Err(e) = http.post(webhook_url).json(&json!({ "text": text })).send().await {
        eprintln!("Failed to send log to Slack: {e}");
    }
}

async fn flush_buffer(http: &reqwest::Client, webhook_url: &str, buffer: &mut Vec<String>) {
    if buffer.is_empty() {
        return;
    }
    let combined = buffer.join("\n");
    buffer.clear();
    send_log(http, webhook_url, &combined).await;
}

struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let fields = std::mem::take(&mut self.message);
            self.message = format!("{:?}", value);
            if !fields.is_empty() {
                self.message.push_str(&format!(" ({fields})"));
            }
        } else if self.message.is_empty() {
            self.message = format!("{} = {:?}", field.name(), value);
        } else {
            self.message
                .push_str(&format!(", {} = {:?}", field.name(), value));
        }
    }
}

impl<S: Subscriber> Layer<S> for SlackLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = *event.metadata().level();

        // Only WARN and ERROR are tracked
        if level > Level::WARN {
            return;
        }

        // HTTP internals log through reqwest/hyper; forwarding those would recurse
        let target = event.metadata().target();
        if target.starts_with("reqwest") || target.starts_with("hyper") {
            return;
        }

        let mut visitor = MessageVisitor {
            message: String::new(),
        };
        event.record(&mut visitor);

        let msg = match level {
            Level::ERROR => LogMessage::Urgent(format!(":x: [{target}] {}", visitor.message)),
            _ => LogMessage::Warning(format!(":warning: [{target}] {}", visitor.message)),
        };

        if self.tx.send(msg).is_err() {
            eprintln!("Log channel closed, message dropped");
        }
    }
}
