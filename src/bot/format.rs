//! Reply formatting.
//!
//! Turns a fetched rant into the attachment Slack renders as a card.

use serde::Serialize;

use crate::devrant::Rant;

/// Max chars of rant text used as the attachment title.
const MAX_TITLE_LENGTH: usize = 100;

const ELLIPSIS: &str = "...";

const ACCENT_COLOR: &str = "#f99a66";

const RANT_URL: &str = "https://www.devrant.io/rants";
const USER_URL: &str = "https://www.devrant.io/users";
const REFERRAL: &str = "ref=devrant-bot";

/// A labeled value shown under the attachment title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachmentField {
    pub title: String,
    pub value: String,
    pub short: bool,
}

/// Legacy Slack message attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplyAttachment {
    pub color: String,
    pub author_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub title: String,
    pub title_link: String,
    pub author_link: String,
    pub fields: Vec<AttachmentField>,
}

/// An outgoing message: plain text, attachments, or both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Reply {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<ReplyAttachment>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            attachments: Vec::new(),
        }
    }

    pub fn rant(rant: &Rant) -> Self {
        Self {
            text: None,
            attachments: vec![format_rant(rant)],
        }
    }
}

/// Truncate to `max_chars` characters, appending an ellipsis only when
/// something was cut.
pub fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}{}", &s[..end], ELLIPSIS),
        None => s.to_string(),
    }
}

pub fn rant_link(id: u64) -> String {
    format!("{RANT_URL}/{id}?{REFERRAL}")
}

pub fn user_link(username: &str) -> String {
    format!("{USER_URL}/{}?{REFERRAL}", urlencoding::encode(username))
}

pub fn format_rant(rant: &Rant) -> ReplyAttachment {
    ReplyAttachment {
        color: ACCENT_COLOR.to_string(),
        author_name: rant.user_username.clone(),
        image_url: rant.attached_image.as_ref().map(|image| image.url.clone()),
        title: truncate(&rant.text, MAX_TITLE_LENGTH),
        title_link: rant_link(rant.id),
        author_link: user_link(&rant.user_username),
        fields: vec![
            AttachmentField {
                title: "Score".to_string(),
                value: rant.score.to_string(),
                short: true,
            },
            AttachmentField {
                title: "Comments".to_string(),
                value: rant.num_comments.to_string(),
                short: true,
            },
        ],
    }
}
