//! Small text helpers for chat replies.

/// Join items as an English list: `a`, `a and b`, `a, b, and c`.
pub fn comma_and<S: AsRef<str>>(items: &[S]) -> String {
    match items {
        [] => String::new(),
        [one] => one.as_ref().to_string(),
        [a, b] => format!("{} and {}", a.as_ref(), b.as_ref()),
        [init @ .., last] => {
            let head: Vec<&str> = init.iter().map(AsRef::as_ref).collect();
            format!("{}, and {}", head.join(", "), last.as_ref())
        }
    }
}

/// Double-quote `s`, escaping backslashes and double quotes.
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// `1 time`, `2 times`.
pub fn times(n: u64) -> String {
    if n == 1 {
        "1 time".to_string()
    } else {
        format!("{n} times")
    }
}

/// `has` for one subject, `have` otherwise.
pub const fn has_have(count: usize) -> &'static str {
    if count == 1 {
        "has"
    } else {
        "have"
    }
}
