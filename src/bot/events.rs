//! Inbound Slack events.
//!
//! Socket Mode delivers events wrapped in envelopes. Message and mention
//! events are classified into a [`ChannelKind`] and reduced to an
//! [`InboundMessage`] the router understands.

use serde::{Deserialize, Serialize};

use crate::bot::commands::ChannelKind;
use crate::bot::slack::Destination;

/// Socket Mode envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    /// Absent on `hello` and `disconnect`.
    pub envelope_id: Option<String>,
    #[serde(rename = "type")]
    pub envelope_type: String,
    pub payload: Option<EventPayload>,
    /// Set on `disconnect` (e.g. "refresh_requested", "link_disabled").
    pub reason: Option<String>,
}

/// `events_api` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct EventPayload {
    pub event: Option<serde_json::Value>,
}

/// Acknowledgement sent back for every envelope.
#[derive(Debug, Clone, Serialize)]
pub struct Ack {
    pub envelope_id: String,
}

/// A `message` or `app_mention` event.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub user: Option<String>,
    #[serde(default)]
    pub text: String,
    pub channel: String,
    pub channel_type: Option<String>,
    pub thread_ts: Option<String>,
    pub subtype: Option<String>,
    pub bot_id: Option<String>,
}

impl MessageEvent {
    pub fn is_direct_message(&self) -> bool {
        self.channel_type.as_deref() == Some("im") || self.channel.starts_with('D')
    }

    /// Bot posts, edits, joins and other subtyped messages are not commands.
    pub fn is_ignorable(&self) -> bool {
        self.bot_id.is_some() || self.subtype.is_some() || self.user.is_none()
    }
}

/// A user message addressed to (or overheard by) the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub channel: String,
    pub user: String,
    /// Text with a leading bot mention removed.
    pub text: String,
    pub kind: ChannelKind,
    pub thread_ts: Option<String>,
}

impl InboundMessage {
    /// Replies stay in the thread the message came from.
    pub fn destination(&self) -> Destination {
        Destination {
            channel: self.channel.clone(),
            thread_ts: self.thread_ts.clone(),
        }
    }
}

/// Strip a leading `<@BOT>` (optionally followed by `:`) from `text`.
fn strip_leading_mention<'a>(text: &'a str, bot_user_id: &str) -> Option<&'a str> {
    let rest = text.trim_start().strip_prefix("<@")?;
    let end = rest.find('>')?;
    let id = rest[..end].split('|').next().unwrap_or_default();
    if id != bot_user_id {
        return None;
    }
    let rest = rest[end + 1..].trim_start();
    Some(rest.strip_prefix(':').unwrap_or(rest).trim_start())
}

fn mentions(text: &str, bot_user_id: &str) -> bool {
    text.contains(&format!("<@{bot_user_id}>")) || text.contains(&format!("<@{bot_user_id}|"))
}

/// Classify an event. Returns `None` for events that must not reach the
/// router: bot traffic, subtyped messages, and channel `message` events
/// that mention the bot (those also arrive as `app_mention`).
pub fn classify(event: &MessageEvent, bot_user_id: &str) -> Option<InboundMessage> {
    if event.is_ignorable() {
        return None;
    }
    let user = event.user.clone()?;
    if user == bot_user_id {
        return None;
    }

    let (kind, text) = if event.is_direct_message() {
        let text = strip_leading_mention(&event.text, bot_user_id).unwrap_or(&event.text);
        (ChannelKind::DirectMessage, text.to_string())
    } else if let Some(rest) = strip_leading_mention(&event.text, bot_user_id) {
        if event.event_type != "app_mention" {
            return None;
        }
        (ChannelKind::DirectMention, rest.to_string())
    } else if mentions(&event.text, bot_user_id) {
        if event.event_type != "app_mention" {
            return None;
        }
        (ChannelKind::Mention, event.text.clone())
    } else {
        (ChannelKind::Ambient, event.text.clone())
    };

    Some(InboundMessage {
        channel: event.channel.clone(),
        user,
        text,
        kind,
        thread_ts: event.thread_ts.clone(),
    })
}

/// Pull a message-like event out of an `events_api` payload.
pub fn parse_event(payload: &EventPayload) -> Option<MessageEvent> {
    let event = payload.event.as_ref()?;
    match event.get("type").and_then(|t| t.as_str()) {
        Some("message") | Some("app_mention") => serde_json::from_value(event.clone()).ok(),
        _ => None,
    }
}
