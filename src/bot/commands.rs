//! Command recognition.
//!
//! Patterns are tried in declaration order and the first hit wins, so
//! overlapping triggers ("search" vs "get") resolve by position.

use regex::Regex;

/// How a message reached the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// Sent in an IM with the bot.
    DirectMessage,
    /// Channel message that starts with a mention of the bot.
    DirectMention,
    /// Channel message that mentions the bot somewhere else.
    Mention,
    /// Any other channel message.
    Ambient,
}

/// A recognized command with its argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Latest,
    Rant(u64),
    Search(String),
    Surprise,
    Weekly,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Help => "help",
            Command::Latest => "latest",
            Command::Rant(_) => "rant",
            Command::Search(_) => "search",
            Command::Surprise => "surprise",
            Command::Weekly => "weekly",
        }
    }
}

/// Builds a command from the first capture group, if the pattern has one.
/// Returning `None` means the capture was unusable.
type Build = fn(Option<&str>) -> Option<Command>;

/// Trigger patterns mapped to a command.
pub struct CommandPattern {
    triggers: Vec<Regex>,
    kinds: &'static [ChannelKind],
    build: Build,
}

const ADDRESSED: &[ChannelKind] = &[ChannelKind::DirectMessage, ChannelKind::DirectMention];

impl CommandPattern {
    fn new(triggers: &[&str], kinds: &'static [ChannelKind], build: Build) -> Self {
        let triggers = triggers
            .iter()
            .map(|p| Regex::new(p).expect("command patterns are valid regexes"))
            .collect();
        Self { triggers, kinds, build }
    }

    pub fn applies_to(&self, kind: ChannelKind) -> bool {
        self.kinds.contains(&kind)
    }

    /// `Some(result)` when a trigger matched; the inner `None` is a match
    /// whose capture could not be turned into a command.
    fn recognize(&self, text: &str) -> Option<Option<Command>> {
        let captures = self.triggers.iter().find_map(|re| re.captures(text))?;
        let argument = captures.get(1).map(|m| m.as_str());
        Some((self.build)(argument))
    }
}

/// The fixed, ordered command set.
pub struct CommandTable {
    patterns: Vec<CommandPattern>,
}

impl CommandTable {
    pub fn new() -> Self {
        let patterns = vec![
            CommandPattern::new(&["help"], ADDRESSED, |_| Some(Command::Help)),
            CommandPattern::new(&["latest", "recent", "newest"], ADDRESSED, |_| {
                Some(Command::Latest)
            }),
            CommandPattern::new(&["rant ([0-9]{4,})"], ADDRESSED, |arg| {
                arg?.parse().ok().map(Command::Rant)
            }),
            CommandPattern::new(&["search (.*)", "find (.*)", "get (.*)"], ADDRESSED, |arg| {
                let term = arg?.trim();
                if term.is_empty() {
                    None
                } else {
                    Some(Command::Search(term.to_string()))
                }
            }),
            CommandPattern::new(&["surprise", "random"], ADDRESSED, |_| {
                Some(Command::Surprise)
            }),
            CommandPattern::new(&["weekly"], ADDRESSED, |_| Some(Command::Weekly)),
        ];
        Self { patterns }
    }

    /// Find the command for a message. The first pattern that applies to
    /// `kind` and matches decides; a malformed capture yields `None` rather
    /// than falling through to later patterns.
    pub fn recognize(&self, kind: ChannelKind, text: &str) -> Option<Command> {
        self.patterns
            .iter()
            .filter(|p| p.applies_to(kind))
            .find_map(|p| p.recognize(text))
            .flatten()
    }
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Lines sent in reply to `help`.
pub const HELP_LINES: &[&str] = &[
    "`rant [id]` - Get a rant.",
    "`latest` - Get the latest rant.",
    "`search [term]` or `find [term]` - Get a rant matching the term.",
    "`surprise` or `random` - Get a surprise (random) rant.",
    "`weekly` - Get a weekly rant.",
];

#[cfg(test)]
mod tests {
    use super::*;

    fn dm(text: &str) -> Option<Command> {
        CommandTable::new().recognize(ChannelKind::DirectMessage, text)
    }

    #[test]
    fn test_keywords() {
        assert_eq!(dm("help"), Some(Command::Help));
        assert_eq!(dm("latest"), Some(Command::Latest));
        assert_eq!(dm("recent"), Some(Command::Latest));
        assert_eq!(dm("newest"), Some(Command::Latest));
        assert_eq!(dm("surprise"), Some(Command::Surprise));
        assert_eq!(dm("random"), Some(Command::Surprise));
        assert_eq!(dm("weekly"), Some(Command::Weekly));
    }

    #[test]
    fn test_rant_id() {
        assert_eq!(dm("rant 1234567"), Some(Command::Rant(1234567)));
    }

    #[test]
    fn test_rant_id_too_short() {
        assert_eq!(dm("rant 123"), None);
    }

    #[test]
    fn test_rant_id_overflow_is_ignored() {
        assert_eq!(dm("rant 99999999999999999999999"), None);
    }

    #[test]
    fn test_search_aliases() {
        assert_eq!(dm("search golang"), Some(Command::Search("golang".into())));
        assert_eq!(dm("find php"), Some(Command::Search("php".into())));
        assert_eq!(dm("get rust memes"), Some(Command::Search("rust memes".into())));
    }

    #[test]
    fn test_empty_capture_is_ignored() {
        assert_eq!(dm("search "), None);
        assert_eq!(dm("search    "), None);
    }

    #[test]
    fn test_case_sensitive() {
        assert_eq!(dm("HELP"), None);
        assert_eq!(dm("Weekly"), None);
    }

    #[test]
    fn test_first_match_wins() {
        // "help" is declared before "search"
        assert_eq!(dm("help me search golang"), Some(Command::Help));
        // "latest" comes before "get"
        assert_eq!(dm("get latest"), Some(Command::Latest));
        // "search" comes before "random"
        assert_eq!(dm("search random"), Some(Command::Search("random".into())));
    }

    #[test]
    fn test_unknown_text() {
        assert_eq!(dm("hello there"), None);
    }

    #[test]
    fn test_channel_kinds() {
        let table = CommandTable::new();
        assert_eq!(table.recognize(ChannelKind::DirectMention, "weekly"), Some(Command::Weekly));
        assert_eq!(table.recognize(ChannelKind::Mention, "weekly"), None);
        assert_eq!(table.recognize(ChannelKind::Ambient, "weekly"), None);
    }
}
