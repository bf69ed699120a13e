//! Karma orchestration.
//!
//! Sits between the chat host and the [`KarmaStore`]: turns tokenized chat
//! lines into counter updates, applies the self-rating policy, and renders
//! query answers as reply text.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{resolve_in, ChannelSettings, KarmaConfig};
use crate::error::{KarmaError, Result};
use crate::host::{
    nick_eq, IgnoreReason, Message, Outcome, PolicyProvider, Responder, SELF_RATING_ERROR,
};
use crate::render::{comma_and, has_have, quoted, times};
use crate::store::{KarmaStore, MostKind};
use crate::tokenizer::{tokenize, Operator};

/// Name parts that are really arrows (`<--`, `<!--`, `---`).
const ARROWS: [&str; 3] = ["<", "-", "<!"];

/// The karma service a host talks to.
#[derive(Clone)]
pub struct Karma {
    store: KarmaStore,
    policy: Arc<dyn PolicyProvider>,
    data_dir: PathBuf,
}

impl std::fmt::Debug for Karma {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Karma")
            .field("store", &self.store)
            .field("data_dir", &self.data_dir)
            .finish_non_exhaustive()
    }
}

impl Karma {
    /// Assemble from parts. Relative dump/load names resolve against `data_dir`.
    pub fn new(store: KarmaStore, policy: Arc<dyn PolicyProvider>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            policy,
            data_dir: data_dir.into(),
        }
    }

    /// Build the configured backend and use the configuration as policy.
    pub fn from_config(config: KarmaConfig) -> Self {
        let store = KarmaStore::open(&config);
        let data_dir = config.data_dir.clone();
        Self::new(store, Arc::new(config), data_dir)
    }

    /// Underlying store.
    pub const fn store(&self) -> &KarmaStore {
        &self.store
    }

    /// Effective settings for `channel`.
    pub fn settings(&self, channel: &str) -> ChannelSettings {
        self.policy.settings(channel)
    }

    /// Apply one raw karma expression such as `bob++` or `"the build"--` on
    /// behalf of `identity`.
    pub fn submit_expression(&self, channel: &str, identity: &str, raw: &str) -> Result<Outcome> {
        let Some(operator) = Operator::parse_suffix(raw) else {
            return Ok(Outcome::Ignored(IgnoreReason::NoOperator));
        };
        let body = &raw[..raw.len() - 2];
        if ARROWS.contains(&body) {
            return Ok(Outcome::Ignored(IgnoreReason::Arrow));
        }

        let unquoted = body.trim_matches(|c| c == '\'' || c == '"');
        if unquoted.is_empty() {
            return Ok(Outcome::Ignored(IgnoreReason::EmptyName));
        }
        let name = strip_parens(unquoted);

        if !self.policy.allow_self_rating(channel)
            && (nick_eq(unquoted, identity) || nick_eq(name, identity))
        {
            info!(channel, identity, "Rejected self rating");
            return Ok(Outcome::RejectedSelfRating);
        }
        if name.is_empty() {
            return Ok(Outcome::Ignored(IgnoreReason::EmptyName));
        }

        self.store.adjust(
            channel,
            name,
            u64::from(operator.increments()),
            u64::from(operator.decrements()),
        )?;
        debug!(channel, identity, name, %operator, "Applied karma");
        Ok(Outcome::Applied {
            name: name.to_string(),
            respond: self.settings(channel).response,
        })
    }

    /// Tokenize `text` and submit every karma expression in it.
    pub fn process_line(&self, channel: &str, identity: &str, text: &str) -> Result<Vec<Outcome>> {
        tokenize(text)
            .map(|token| self.submit_expression(channel, identity, &token.to_string()))
            .collect()
    }

    /// Handle a chat line delivered by the host, replying through `responder`.
    ///
    /// Private messages are ignored. Lines not addressed to the bot are only
    /// considered when the channel allows unaddressed karma.
    pub fn handle_message(&self, responder: &mut dyn Responder, msg: &Message) {
        if !msg.is_channel() {
            return;
        }
        if !msg.addressed && !self.settings(&msg.target).allow_unaddressed_karma {
            return;
        }

        for token in tokenize(&msg.text) {
            match self.submit_expression(&msg.target, &msg.nick, &token.to_string()) {
                Ok(Outcome::Applied { respond: true, .. }) => responder.reply_success(),
                Ok(Outcome::Applied { respond: false, .. }) => responder.no_reply(),
                Ok(Outcome::RejectedSelfRating) => responder.error(SELF_RATING_ERROR),
                Ok(Outcome::Ignored(_)) => {}
                Err(e) => {
                    warn!(channel = %msg.target, error = %e, "Karma update failed");
                    responder.error(&e.to_string());
                    return;
                }
            }
        }
    }

    /// Answer a karma query.
    ///
    /// No names gives the highest/lowest summary plus the rank of `identity`.
    /// Otherwise the words form a single name, unless the channel enables
    /// multi-name queries, in which case each word is reported separately.
    pub fn query<S: AsRef<str>>(&self, channel: &str, identity: &str, names: &[S]) -> Result<String> {
        let settings = self.settings(channel);
        let names: Vec<&str> = names
            .iter()
            .map(AsRef::as_ref)
            .filter(|n| !n.is_empty())
            .collect();

        if names.is_empty() {
            return self.summary(channel, identity, &settings);
        }
        if names.len() > 1 && settings.multi_name_query {
            return self.many(channel, &names);
        }

        let name = names.join(" ");
        let Some(entry) = self.store.entry(channel, &name)? else {
            return Ok(format!("{name} has neutral karma."));
        };
        if settings.simple_output {
            Ok(format!("{name}: {}", entry.total()))
        } else {
            Ok(format!(
                "Karma for {} has been increased {} and decreased {} for a total karma of {}.",
                quoted(&name),
                times(entry.added),
                times(entry.subtracted),
                entry.total()
            ))
        }
    }

    fn summary(&self, channel: &str, identity: &str, settings: &ChannelSettings) -> Result<String> {
        let limit = settings.ranking_display;
        let highest: Vec<String> = self
            .store
            .top(channel, limit)?
            .into_iter()
            .map(|(name, total)| format!("{} ({total})", quoted(&name)))
            .collect();
        let lowest: Vec<String> = self
            .store
            .bottom(channel, limit)?
            .into_iter()
            .map(|(name, total)| format!("{} ({total})", quoted(&name)))
            .collect();
        if highest.is_empty() || lowest.is_empty() {
            return Err(KarmaError::EmptyChannel);
        }

        let rank = match self.store.rank(channel, identity)? {
            Some(rank) => format!(
                "  You ({identity}) are ranked {rank} out of {}.",
                self.store.size(channel)?
            ),
            None => String::new(),
        };
        Ok(format!(
            "Highest karma: {}.  Lowest karma: {}.{rank}",
            comma_and(&highest),
            comma_and(&lowest)
        ))
    }

    fn many(&self, channel: &str, names: &[&str]) -> Result<String> {
        let summary = self.store.get_many(channel, names)?;
        if summary.known.is_empty() {
            return Ok("I didn't know the karma for any of those things.".to_string());
        }
        let known: Vec<String> = summary
            .known
            .iter()
            .map(|(name, total)| format!("{name}: {total}"))
            .collect();
        let mut reply = comma_and(&known);
        if !summary.neutral.is_empty() {
            let neutral: Vec<String> = summary.neutral.iter().map(|n| quoted(n)).collect();
            reply.push_str(&format!(
                ".  {} {} neutral karma",
                comma_and(&neutral),
                has_have(neutral.len())
            ));
        }
        reply.push('.');
        Ok(reply)
    }

    /// The most increased, decreased or active names. `kind` may be any
    /// unambiguous prefix of those words.
    pub fn most(&self, channel: &str, kind: &str) -> Result<String> {
        let kind: MostKind = kind.parse()?;
        let limit = self.settings(channel).most_display;
        let rows = self.store.most(channel, kind, limit)?;
        if rows.is_empty() {
            return Err(KarmaError::EmptyChannel);
        }
        let items: Vec<String> = rows
            .iter()
            .map(|(name, metric)| format!("{}: {metric}", quoted(name)))
            .collect();
        Ok(comma_and(&items))
    }

    /// Reset the counters of `name` to zero.
    pub fn clear(&self, channel: &str, name: &str) -> Result<()> {
        self.store.clear(channel, name)?;
        info!(channel, name, "Cleared karma");
        Ok(())
    }

    /// Export the channel to `filename` (relative to the data directory).
    pub fn dump(&self, channel: &str, filename: impl AsRef<Path>) -> Result<usize> {
        self.store.dump(channel, &resolve_in(&self.data_dir, filename))
    }

    /// Replace the channel with the contents of `filename`.
    pub fn load(&self, channel: &str, filename: impl AsRef<Path>) -> Result<usize> {
        self.store.load(channel, &resolve_in(&self.data_dir, filename))
    }

    /// Flush outstanding writes before the host shuts down.
    pub fn close(&self) -> Result<()> {
        self.store.flush()
    }
}

fn strip_parens(name: &str) -> &str {
    name.strip_prefix('(')
        .and_then(|inner| inner.strip_suffix(')'))
        .unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelOverrides;

    const CH: &str = "#test";

    #[derive(Debug, Default)]
    struct Recorder {
        replies: Vec<String>,
        errors: Vec<String>,
        successes: usize,
        silences: usize,
    }

    impl Responder for Recorder {
        fn reply(&mut self, text: &str) {
            self.replies.push(text.to_string());
        }
        fn error(&mut self, text: &str) {
            self.errors.push(text.to_string());
        }
        fn reply_success(&mut self) {
            self.successes += 1;
        }
        fn no_reply(&mut self) {
            self.silences += 1;
        }
    }

    fn karma_with(overrides: ChannelOverrides) -> Karma {
        let mut config = KarmaConfig {
            backend: crate::config::BackendKind::Memory,
            ..KarmaConfig::default()
        };
        config.set_channel(CH, overrides);
        Karma::from_config(config)
    }

    fn karma() -> Karma {
        karma_with(ChannelOverrides::default())
    }

    #[test]
    fn test_plus_minus_moves_both_counters() {
        let k = karma();
        let outcome = k.submit_expression(CH, "alice", "Dave+-").unwrap();
        assert_eq!(
            outcome,
            Outcome::Applied {
                name: "Dave".into(),
                respond: false
            }
        );
        assert_eq!(k.store().get(CH, "dave").unwrap(), Some((1, 1)));
        k.submit_expression(CH, "alice", "dave-+").unwrap();
        assert_eq!(k.store().get(CH, "dave").unwrap(), Some((2, 2)));
    }

    #[test]
    fn test_self_rating_rejected() {
        let k = karma();
        assert_eq!(
            k.submit_expression(CH, "Alice", "alice++").unwrap(),
            Outcome::RejectedSelfRating
        );
        assert_eq!(
            k.submit_expression(CH, "alice", "(ALICE)++").unwrap(),
            Outcome::RejectedSelfRating
        );
        assert_eq!(k.store().get(CH, "alice").unwrap(), None);
    }

    #[test]
    fn test_self_rating_allowed_when_enabled() {
        let k = karma_with(ChannelOverrides {
            allow_self_rating: Some(true),
            ..ChannelOverrides::default()
        });
        assert!(matches!(
            k.submit_expression(CH, "alice", "alice++").unwrap(),
            Outcome::Applied { .. }
        ));
        assert_eq!(k.store().get(CH, "alice").unwrap(), Some((1, 0)));
    }

    #[test]
    fn test_name_cleanup() {
        let k = karma();
        k.submit_expression(CH, "me", r#""Bob and Carol"--"#).unwrap();
        assert_eq!(k.store().get(CH, "bob and carol").unwrap(), Some((0, 1)));
        k.submit_expression(CH, "me", "(rust)++").unwrap();
        assert_eq!(k.store().get(CH, "rust").unwrap(), Some((1, 0)));
        k.submit_expression(CH, "me", "((nested))++").unwrap();
        assert_eq!(k.store().get(CH, "(nested)").unwrap(), Some((1, 0)));
    }

    #[test]
    fn test_ignored_expressions() {
        let k = karma();
        assert_eq!(
            k.submit_expression(CH, "me", "\"\"++").unwrap(),
            Outcome::Ignored(IgnoreReason::EmptyName)
        );
        assert_eq!(
            k.submit_expression(CH, "me", "()++").unwrap(),
            Outcome::Ignored(IgnoreReason::EmptyName)
        );
        assert_eq!(
            k.submit_expression(CH, "me", "<--").unwrap(),
            Outcome::Ignored(IgnoreReason::Arrow)
        );
        assert_eq!(
            k.submit_expression(CH, "me", "<!--").unwrap(),
            Outcome::Ignored(IgnoreReason::Arrow)
        );
        assert_eq!(
            k.submit_expression(CH, "me", "plain").unwrap(),
            Outcome::Ignored(IgnoreReason::NoOperator)
        );
        assert_eq!(k.store().size(CH).unwrap(), 0);
    }

    #[test]
    fn test_process_line_applies_each_token() {
        let k = karma();
        let outcomes = k
            .process_line(CH, "me", r#"thanks john++ and "the team"++ but not bugs--"#)
            .unwrap();
        assert_eq!(outcomes.len(), 3);
        assert_eq!(k.store().get(CH, "john").unwrap(), Some((1, 0)));
        assert_eq!(k.store().get(CH, "the team").unwrap(), Some((1, 0)));
        assert_eq!(k.store().get(CH, "bugs").unwrap(), Some((0, 1)));
    }

    #[test]
    fn test_handle_message_respects_addressing() {
        let k = karma();
        let mut r = Recorder::default();

        k.handle_message(&mut r, &Message::new(CH, "me", "bob++"));
        assert_eq!(k.store().get(CH, "bob").unwrap(), None);

        k.handle_message(&mut r, &Message::new(CH, "me", "bob++").addressed(true));
        assert_eq!(k.store().get(CH, "bob").unwrap(), Some((1, 0)));
        assert_eq!(r.silences, 1);

        k.handle_message(&mut r, &Message::new("me", "you", "bob++").addressed(true));
        assert_eq!(k.store().get(CH, "bob").unwrap(), Some((1, 0)));
    }

    #[test]
    fn test_handle_message_unaddressed_with_response() {
        let k = karma_with(ChannelOverrides {
            allow_unaddressed_karma: Some(true),
            response: Some(true),
            ..ChannelOverrides::default()
        });
        let mut r = Recorder::default();
        k.handle_message(&mut r, &Message::new(CH, "alice", "bob++ alice++ carol--"));
        assert_eq!(r.successes, 2);
        assert_eq!(r.errors, vec![SELF_RATING_ERROR.to_string()]);
        assert_eq!(k.store().get(CH, "alice").unwrap(), None);
    }

    #[test]
    fn test_single_name_query() {
        let k = karma();
        assert_eq!(k.query(CH, "me", &["ghost"]).unwrap(), "ghost has neutral karma.");

        k.store().adjust(CH, "Ferris", 3, 1).unwrap();
        assert_eq!(
            k.query(CH, "me", &["ferris"]).unwrap(),
            "Karma for \"ferris\" has been increased 3 times and decreased 1 time for a total karma of 2."
        );

        k.store().adjust(CH, "the crab", 1, 0).unwrap();
        assert_eq!(
            k.query(CH, "me", &["the", "crab"]).unwrap(),
            "Karma for \"the crab\" has been increased 1 time and decreased 0 times for a total karma of 1."
        );
    }

    #[test]
    fn test_simple_output() {
        let k = karma_with(ChannelOverrides {
            simple_output: Some(true),
            ..ChannelOverrides::default()
        });
        k.store().adjust(CH, "x", 1, 4).unwrap();
        assert_eq!(k.query(CH, "me", &["x"]).unwrap(), "x: -3");
    }

    #[test]
    fn test_multi_name_query() {
        let k = karma_with(ChannelOverrides {
            multi_name_query: Some(true),
            ..ChannelOverrides::default()
        });
        assert_eq!(
            k.query(CH, "me", &["a", "b"]).unwrap(),
            "I didn't know the karma for any of those things."
        );
        k.store().adjust(CH, "a", 2, 0).unwrap();
        k.store().adjust(CH, "b", 5, 0).unwrap();
        assert_eq!(
            k.query(CH, "me", &["a", "b", "z"]).unwrap(),
            "b: 5 and a: 2.  \"z\" has neutral karma."
        );
    }

    #[test]
    fn test_summary_query() {
        let k = karma();
        assert!(matches!(
            k.query::<&str>(CH, "me", &[]),
            Err(KarmaError::EmptyChannel)
        ));

        k.store().adjust(CH, "a", 5, 0).unwrap();
        k.store().adjust(CH, "me", 2, 0).unwrap();
        k.store().adjust(CH, "c", 0, 3).unwrap();
        k.store().adjust(CH, "d", 1, 0).unwrap();
        assert_eq!(
            k.query::<&str>(CH, "me", &[]).unwrap(),
            "Highest karma: \"a\" (5), \"me\" (2), and \"d\" (1).  \
             Lowest karma: \"c\" (-3), \"d\" (1), and \"me\" (2).  \
             You (me) are ranked 2 out of 4."
        );
        assert_eq!(
            k.query::<&str>(CH, "stranger", &[]).unwrap(),
            "Highest karma: \"a\" (5), \"me\" (2), and \"d\" (1).  \
             Lowest karma: \"c\" (-3), \"d\" (1), and \"me\" (2)."
        );
    }

    #[test]
    fn test_most() {
        let k = karma();
        assert!(matches!(k.most(CH, "active"), Err(KarmaError::EmptyChannel)));
        k.store().adjust(CH, "x", 4, 0).unwrap();
        k.store().adjust(CH, "y", 1, 6).unwrap();
        assert_eq!(k.most(CH, "inc").unwrap(), "\"x\": 4 and \"y\": 1");
        assert_eq!(k.most(CH, "active").unwrap(), "\"y\": 7 and \"x\": 4");
        assert!(matches!(
            k.most(CH, "loudest"),
            Err(KarmaError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_clear() {
        let k = karma();
        k.store().adjust(CH, "x", 4, 2).unwrap();
        k.clear(CH, "X").unwrap();
        assert_eq!(k.store().get(CH, "x").unwrap(), Some((0, 0)));
        k.clear(CH, "missing").unwrap();
    }

    #[test]
    fn test_strip_parens() {
        assert_eq!(strip_parens("(a)"), "a");
        assert_eq!(strip_parens("(a"), "(a");
        assert_eq!(strip_parens("("), "(");
        assert_eq!(strip_parens("()"), "");
    }
}
