//! Command router - turns recognized messages into devRant lookups and replies.

use std::sync::{Arc, Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::bot::commands::{Command, CommandTable, HELP_LINES};
use crate::bot::events::InboundMessage;
use crate::bot::format::Reply;
use crate::bot::slack::{Destination, Messenger};
use crate::devrant::{self, ListQuery, Rant, RantSource, SearchQuery};
use crate::report::ErrorReporter;

/// Random picks are drawn from this many leading results.
pub const PICK_WINDOW: usize = 10;

const HELP_FAILED: &str = "I was unable to get the list of commands for you, sorry :cry:.";

/// What the router did with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// No command matched (or its argument was unusable). Nothing was sent.
    Ignored,
    /// A rant (or the help text) was sent.
    Replied(Command),
    /// The lookup succeeded but returned nothing to show.
    NoResults(Command),
    /// The lookup failed; the user got an apology.
    Apologized(Command),
}

/// Fixed apology for a failed command.
pub fn apology(command: &Command) -> &'static str {
    match command {
        Command::Help => HELP_FAILED,
        Command::Latest => "I had trouble getting the latest rants, sorry :cry:.",
        Command::Rant(_) => "I had trouble getting that rant, sorry :cry:.",
        Command::Search(_) => "I had trouble searching for rants, sorry :cry:.",
        Command::Surprise => "I had trouble getting a surprise rant, sorry :cry:.",
        Command::Weekly => "I had trouble getting the weekly rants, sorry :cry:.",
    }
}

fn no_results(command: &Command) -> String {
    match command {
        Command::Search(term) => format!("I couldn't find any rants matching `{term}`, sorry :cry:."),
        _ => "There are no rants to show right now, sorry :cry:.".to_string(),
    }
}

/// Pick an index uniformly from `[0, min(PICK_WINDOW, len))`.
pub fn pick_index<R: Rng + ?Sized>(len: usize, rng: &mut R) -> Option<usize> {
    let window = len.min(PICK_WINDOW);
    if window == 0 {
        return None;
    }
    Some(rng.random_range(0..window))
}

pub struct Router {
    table: CommandTable,
    rants: Arc<dyn RantSource>,
    messenger: Arc<dyn Messenger>,
    reporter: Arc<dyn ErrorReporter>,
    rng: Mutex<StdRng>,
}

impl Router {
    pub fn new(
        rants: Arc<dyn RantSource>,
        messenger: Arc<dyn Messenger>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        Self::with_rng(rants, messenger, reporter, StdRng::from_os_rng())
    }

    /// Router with a caller-supplied RNG; a seeded one makes picks reproducible.
    pub fn with_rng(
        rants: Arc<dyn RantSource>,
        messenger: Arc<dyn Messenger>,
        reporter: Arc<dyn ErrorReporter>,
        rng: StdRng,
    ) -> Self {
        Self {
            table: CommandTable::new(),
            rants,
            messenger,
            reporter,
            rng: Mutex::new(rng),
        }
    }

    /// Handle one inbound message: at most one lookup, at most one reply.
    pub async fn handle(&self, msg: &InboundMessage) -> Dispatch {
        let Some(command) = self.table.recognize(msg.kind, &msg.text) else {
            debug!("No command in {:?} message from {}", msg.kind, msg.user);
            return Dispatch::Ignored;
        };

        info!("⚡ {} from {} in {}", command.name(), msg.user, msg.channel);

        let result = match &command {
            Command::Help => return self.send_help(msg).await,
            Command::Latest => self.rants.fetch_list(&ListQuery::recent()).await.map(|r| self.pick(r)),
            Command::Rant(id) => self.rants.fetch_by_id(*id).await.map(Some),
            Command::Search(term) => self.rants.search(&SearchQuery::new(term.as_str())).await.map(|r| self.pick(r)),
            Command::Surprise => self.rants.fetch_random().await.map(Some),
            Command::Weekly => self
                .rants
                .fetch_weekly(devrant::DEFAULT_LIMIT)
                .await
                .map(|r| self.pick(r)),
        };

        let (reply, dispatch) = match result {
            Ok(Some(rant)) => {
                info!("Replying with rant {} by {}", rant.id, rant.user_username);
                (Reply::rant(&rant), Dispatch::Replied(command))
            }
            Ok(None) => {
                info!("No rants for {}", command.name());
                (Reply::text(no_results(&command)), Dispatch::NoResults(command))
            }
            Err(e) => {
                warn!("{} failed: {e}", command.name());
                self.reporter.report(command.name(), &e);
                (Reply::text(apology(&command)), Dispatch::Apologized(command))
            }
        };

        self.deliver(&msg.destination(), &reply, &dispatch).await;
        dispatch
    }

    fn pick(&self, mut rants: Vec<Rant>) -> Option<Rant> {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let index = pick_index(rants.len(), &mut *rng)?;
        Some(rants.swap_remove(index))
    }

    /// The command list goes to the user privately.
    async fn send_help(&self, msg: &InboundMessage) -> Dispatch {
        let sent = match self.messenger.open_direct(&msg.user).await {
            Ok(channel) => {
                let reply = Reply::text(HELP_LINES.join("\n"));
                self.messenger.send_reply(&Destination::channel(channel), &reply).await
            }
            Err(e) => Err(e),
        };

        match sent {
            Ok(()) => Dispatch::Replied(Command::Help),
            Err(e) => {
                warn!("Failed to send help to {}: {e}", msg.user);
                self.reporter.report(Command::Help.name(), &e);
                let dispatch = Dispatch::Apologized(Command::Help);
                self.deliver(&msg.destination(), &Reply::text(HELP_FAILED), &dispatch).await;
                dispatch
            }
        }
    }

    async fn deliver(&self, to: &Destination, reply: &Reply, dispatch: &Dispatch) {
        if let Err(e) = self.messenger.send_reply(to, reply).await {
            let name = match dispatch {
                Dispatch::Replied(c) | Dispatch::NoResults(c) | Dispatch::Apologized(c) => c.name(),
                Dispatch::Ignored => "reply",
            };
            warn!("Failed to deliver {name} reply to {}: {e}", to.channel);
            self.reporter.report(name, &e);
        }
    }
}
