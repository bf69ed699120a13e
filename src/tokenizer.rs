//! Karma expression tokenizer.
//!
//! Scans a line of chat text left to right and yields every candidate karma
//! expression: a word or a quoted phrase immediately followed by one of the
//! operator suffixes `++`, `--`, `+-` or `-+`. Anything else is skipped.
//!
//! ```
//! use karma_ledger::tokenizer::tokenize;
//!
//! let tokens: Vec<String> = tokenize(r#"Alice++ "Bob and Carol"-- Dave+-"#)
//!     .map(|t| t.to_string())
//!     .collect();
//! assert_eq!(tokens, vec!["Alice++", r#""Bob and Carol"--"#, "Dave+-"]);
//! ```

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

static DOUBLE_QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)^"((?:[^"\\]|\\.)*)""#).expect("valid regex"));

static SINGLE_QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^'((?:[^'\\]|\\.)*)'").expect("valid regex"));

/// The two-character suffix that turns text into a karma expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `++`
    Increment,
    /// `--`
    Decrement,
    /// `+-`, applies both counters
    PlusMinus,
    /// `-+`, applies both counters
    MinusPlus,
}

impl Operator {
    /// Parse the operator at the very start of `s`.
    pub fn parse_prefix(s: &str) -> Option<Self> {
        match s.as_bytes() {
            [b'+', b'+', ..] => Some(Self::Increment),
            [b'-', b'-', ..] => Some(Self::Decrement),
            [b'+', b'-', ..] => Some(Self::PlusMinus),
            [b'-', b'+', ..] => Some(Self::MinusPlus),
            _ => None,
        }
    }

    /// Parse the operator at the end of `s`.
    pub fn parse_suffix(s: &str) -> Option<Self> {
        let start = s.len().checked_sub(2)?;
        s.get(start..).and_then(Self::parse_prefix)
    }

    /// Suffix as written.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Increment => "++",
            Self::Decrement => "--",
            Self::PlusMinus => "+-",
            Self::MinusPlus => "-+",
        }
    }

    /// Whether this operator moves the `added` counter.
    pub const fn increments(self) -> bool {
        !matches!(self, Self::Decrement)
    }

    /// Whether this operator moves the `subtracted` counter.
    pub const fn decrements(self) -> bool {
        !matches!(self, Self::Increment)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A karma expression found in text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KarmaToken {
    /// Word or unescaped phrase content, without quotes or suffix.
    pub text: String,
    /// Quote character when the token was a quoted phrase.
    pub quote: Option<char>,
    /// Trailing operator.
    pub operator: Operator,
}

/// Renders the token the way it is handed to the orchestration layer:
/// quotes re-added around phrases, operator appended.
impl fmt::Display for KarmaToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.quote {
            Some(q) => write!(f, "{q}{}{q}{}", self.text, self.operator),
            None => write!(f, "{}{}", self.text, self.operator),
        }
    }
}

/// Lazy iterator over the karma expressions of a line.
///
/// Holds only a cursor into the borrowed text, so tokenizing the same text
/// twice yields the same sequence.
#[derive(Debug, Clone)]
pub struct Tokens<'a> {
    text: &'a str,
    pos: usize,
}

/// Tokenize `text` into karma expressions.
pub const fn tokenize(text: &str) -> Tokens<'_> {
    Tokens { text, pos: 0 }
}

impl Tokens<'_> {
    fn skip_whitespace(&mut self) {
        let rest = &self.text[self.pos..];
        let trimmed = rest.trim_start();
        self.pos += rest.len() - trimmed.len();
    }

    fn skip_word(&mut self) {
        let rest = &self.text[self.pos..];
        self.pos += rest.find(char::is_whitespace).unwrap_or(rest.len());
    }

    /// Try a quoted phrase at the cursor. Always advances the cursor.
    fn quoted(&mut self, quote: char) -> Option<KarmaToken> {
        let rest = &self.text[self.pos..];
        let re = if quote == '"' { &*DOUBLE_QUOTED } else { &*SINGLE_QUOTED };
        let Some(caps) = re.captures(rest) else {
            // never closed
            self.skip_word();
            return None;
        };
        let end = caps.get(0).map_or(0, |m| m.end());
        let inner = caps.get(1).map_or("", |m| m.as_str());
        match Operator::parse_prefix(&rest[end..]) {
            Some(operator) => {
                self.pos += end + 2;
                Some(KarmaToken {
                    text: unescape(inner, quote),
                    quote: Some(quote),
                    operator,
                })
            }
            None => {
                self.pos += end;
                None
            }
        }
    }

    /// Try an unquoted run at the cursor. The run ends at the first operator
    /// suffix, so `foo++bar--` yields two tokens. Always advances the cursor.
    fn unquoted(&mut self) -> Option<KarmaToken> {
        let rest = &self.text[self.pos..];
        for (idx, c) in rest.char_indices() {
            if c.is_whitespace() {
                self.pos += idx;
                return None;
            }
            if idx == 0 {
                continue;
            }
            if let Some(operator) = Operator::parse_prefix(&rest[idx..]) {
                self.pos += idx + 2;
                return Some(KarmaToken {
                    text: rest[..idx].to_string(),
                    quote: None,
                    operator,
                });
            }
        }
        self.pos = self.text.len();
        None
    }
}

impl Iterator for Tokens<'_> {
    type Item = KarmaToken;

    fn next(&mut self) -> Option<KarmaToken> {
        loop {
            self.skip_whitespace();
            let first = self.text[self.pos..].chars().next()?;
            let token = match first {
                '"' | '\'' => self.quoted(first),
                _ => self.unquoted(),
            };
            if token.is_some() {
                return token;
            }
        }
    }
}

fn unescape(inner: &str, quote: char) -> String {
    let escaped_quote = format!("\\{quote}");
    inner
        .replace(&escaped_quote, &quote.to_string())
        .replace("\\\\", "\\")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(text: &str) -> Vec<String> {
        tokenize(text).map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_plain_text_yields_nothing() {
        assert!(raw(r#"This is "a person's" test."#).is_empty());
        assert!(raw("").is_empty());
        assert!(raw("   \t ").is_empty());
    }

    #[test]
    fn test_mixed_expressions() {
        assert_eq!(
            raw(r#"Alice++ "Bob and Carol"-- Dave+-"#),
            vec!["Alice++", r#""Bob and Carol"--"#, "Dave+-"]
        );
    }

    #[test]
    fn test_expression_inside_sentence() {
        assert_eq!(raw("thanks. john++ you're awesome"), vec!["john++"]);
    }

    #[test]
    fn test_adjacent_expressions() {
        assert_eq!(raw("foo++bar--"), vec!["foo++", "bar--"]);
    }

    #[test]
    fn test_all_operators() {
        let ops: Vec<Operator> = tokenize("a++ b-- c+- d-+").map(|t| t.operator).collect();
        assert_eq!(
            ops,
            vec![
                Operator::Increment,
                Operator::Decrement,
                Operator::PlusMinus,
                Operator::MinusPlus
            ]
        );
    }

    #[test]
    fn test_single_quoted_phrase() {
        let tokens: Vec<KarmaToken> = tokenize("'the build'++").collect();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].text, "the build");
        assert_eq!(tokens[0].quote, Some('\''));
        assert_eq!(tokens[0].to_string(), "'the build'++");
    }

    #[test]
    fn test_escaped_quotes_are_unescaped() {
        let tokens: Vec<KarmaToken> = tokenize(r#""say \"hi\" \\ now"++"#).collect();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].text, r#"say "hi" \ now"#);

        let tokens: Vec<KarmaToken> = tokenize(r"'Bob\'s cat'--").collect();
        assert_eq!(tokens[0].text, "Bob's cat");
        assert_eq!(tokens[0].operator, Operator::Decrement);
    }

    #[test]
    fn test_unclosed_quote_yields_nothing_for_segment() {
        assert!(raw(r#""oops++"#).is_empty());
        assert_eq!(raw(r#""never closed bob++"#), vec!["bob++"]);
        assert_eq!(raw("'tis bob++"), vec!["bob++"]);
    }

    #[test]
    fn test_quoted_phrase_without_suffix_is_skipped() {
        assert_eq!(raw(r#""just quoting" rust++"#), vec!["rust++"]);
    }

    #[test]
    fn test_restartable() {
        let text = "x++ y--";
        assert_eq!(raw(text), raw(text));
        let iter = tokenize(text);
        let again = iter.clone();
        assert_eq!(iter.count(), again.count());
    }

    #[test]
    fn test_unicode_names() {
        assert_eq!(raw("café++ über--"), vec!["café++", "über--"]);
    }

    #[test]
    fn test_operator_parsing() {
        assert_eq!(Operator::parse_suffix("c++"), Some(Operator::Increment));
        assert_eq!(Operator::parse_suffix("+"), None);
        assert_eq!(Operator::parse_suffix("abc"), None);
        assert!(Operator::PlusMinus.increments() && Operator::PlusMinus.decrements());
        assert!(!Operator::Increment.decrements());
        assert!(!Operator::Decrement.increments());
    }
}
