//! Seams to the chat host.
//!
//! The host owns message delivery, command dispatch and permissions. It calls
//! into [`crate::Karma`] with a [`Message`] and hands over a [`Responder`]
//! through which replies flow back. Per-channel behavior comes from a
//! [`PolicyProvider`].

use crate::config::ChannelSettings;

/// Reply sink supplied by the host for one incoming message.
pub trait Responder {
    /// Send a normal reply.
    fn reply(&mut self, text: &str);

    /// Send an error reply.
    fn error(&mut self, text: &str);

    /// Acknowledge a successful action.
    fn reply_success(&mut self);

    /// Explicitly stay silent.
    fn no_reply(&mut self) {}
}

/// Source of per-channel settings.
pub trait PolicyProvider: Send + Sync {
    /// Effective settings for `channel`.
    fn settings(&self, channel: &str) -> ChannelSettings;

    /// Shortcut for the self-rating policy.
    fn allow_self_rating(&self, channel: &str) -> bool {
        self.settings(channel).allow_self_rating
    }
}

/// One line of chat text as delivered by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Target the message was sent to.
    pub target: String,
    /// Nick of the sender.
    pub nick: String,
    /// Message body.
    pub text: String,
    /// Whether the bot was addressed directly (by nick or command prefix).
    pub addressed: bool,
}

impl Message {
    /// Build an unaddressed message.
    pub fn new(target: impl Into<String>, nick: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            nick: nick.into(),
            text: text.into(),
            addressed: false,
        }
    }

    /// Mark the message as addressed to the bot.
    #[must_use]
    pub const fn addressed(mut self, addressed: bool) -> Self {
        self.addressed = addressed;
        self
    }

    /// Whether the target is a channel rather than a private query.
    pub fn is_channel(&self) -> bool {
        is_channel(&self.target)
    }
}

/// Why a karma expression was dropped without touching storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The name was empty after stripping quotes and parentheses.
    EmptyName,
    /// The expression was an arrow such as `<--` or `<!--`.
    Arrow,
    /// The text did not end with a karma operator.
    NoOperator,
}

/// Result of submitting one karma expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Counters were updated; `respond` says whether to acknowledge.
    Applied {
        /// Name that was rated, after cleanup.
        name: String,
        /// Whether the host should send a success reply.
        respond: bool,
    },
    /// The sender tried to rate themselves while that is disabled.
    RejectedSelfRating,
    /// Nothing to do.
    Ignored(IgnoreReason),
}

/// Message text sent when a self rating is rejected.
pub const SELF_RATING_ERROR: &str = "You're not allowed to adjust your own karma.";

/// Whether `target` names a channel (`#`, `&`, `+` or `!` prefix).
pub fn is_channel(target: &str) -> bool {
    target.len() > 1 && target.starts_with(['#', '&', '+', '!'])
}

/// Lowercase `s` with RFC1459 case mapping, where `[]\~` are the uppercase
/// forms of `{}|^`.
pub fn irc_lower(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '[' => '{',
            ']' => '}',
            '\\' => '|',
            '~' => '^',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

/// Case-insensitive nick comparison under RFC1459 mapping.
pub fn nick_eq(a: &str, b: &str) -> bool {
    a.len() == b.len() && irc_lower(a) == irc_lower(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_irc_lower_maps_brackets() {
        assert_eq!(irc_lower("Foo[Bar]\\~"), "foo{bar}|^");
        assert!(nick_eq("Dan[away]", "dan{AWAY}"));
        assert!(!nick_eq("dan", "danny"));
    }

    #[test]
    fn test_is_channel() {
        assert!(is_channel("#rust"));
        assert!(is_channel("&local"));
        assert!(!is_channel("alice"));
        assert!(!is_channel("#"));
    }

    #[test]
    fn test_message_builder() {
        let msg = Message::new("#rust", "alice", "bob++").addressed(true);
        assert!(msg.addressed);
        assert!(msg.is_channel());
    }
}
