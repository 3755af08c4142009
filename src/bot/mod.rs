//! Slack bot - relays devRant content in response to chat commands.

pub mod commands;
pub mod events;
pub mod format;
pub mod router;
pub mod sessions;
pub mod slack;
pub mod socket;


pub use commands::{ChannelKind, Command, CommandTable};
pub use events::InboundMessage;
pub use format::{Reply, ReplyAttachment};
pub use router::{Dispatch, Router};
pub use sessions::SessionRegistry;
pub use slack::{Destination, Messenger, SlackClient, SlackError};
pub use socket::{SocketSession, Started};
