//! Balanced-span scanning over quote-aware source text.
//!
//! One implementation of delimiter matching shared by the statement locator
//! (line-by-line depth counting) and the payload extractor (single-span
//! lookup). Characters inside single-, double-, or backtick-quoted runs are
//! ignored; a backslash escapes the following character inside a run.

use crate::types::{EngineError, Result};

/// Find the matching closing delimiter for the opener at `start`.
///
/// `start` is a byte offset that must point at `open`. Returns the byte
/// offset of the matching `close`, skipping quoted runs.
///
/// # Errors
///
/// Returns `EngineError::UnbalancedSpan` if `start` does not point at `open`
/// or the text ends before the span closes.
pub fn find_balanced_span(text: &str, start: usize, open: char, close: char) -> Result<usize> {
    let mut chars = text[start..].char_indices();
    match chars.next() {
        Some((_, c)) if c == open => {}
        _ => {
            return Err(EngineError::UnbalancedSpan(format!(
                "expected '{open}' at offset {start}"
            )))
        }
    }

    let mut depth: usize = 1;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (offset, c) in chars {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        if c == '\'' || c == '"' || c == '`' {
            quote = Some(c);
        } else if c == open {
            depth += 1;
        } else if c == close {
            depth -= 1;
            if depth == 0 {
                return Ok(start + offset);
            }
        }
    }

    Err(EngineError::UnbalancedSpan(format!(
        "no matching '{close}' for '{open}' at offset {start}"
    )))
}

/// Incremental net-depth tracker for `{}` and `()` pairs.
///
/// Fed one line at a time by the statement locator; quote state carries
/// across lines so backtick template strings spanning lines do not skew the
/// count.
#[derive(Debug, Default)]
pub struct DepthTracker {
    paren: i64,
    brace: i64,
    quote: Option<char>,
    escaped: bool,
}

impl DepthTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed every character of a line.
    pub fn feed_line(&mut self, line: &str) {
        for c in line.chars() {
            self.feed(c);
        }
    }

    fn feed(&mut self, c: char) {
        if let Some(q) = self.quote {
            if self.escaped {
                self.escaped = false;
            } else if c == '\\' {
                self.escaped = true;
            } else if c == q {
                self.quote = None;
            }
            return;
        }
        match c {
            '\'' | '"' | '`' => self.quote = Some(c),
            '(' => self.paren += 1,
            ')' => self.paren -= 1,
            '{' => self.brace += 1,
            '}' => self.brace -= 1,
            _ => {}
        }
    }

    /// Both pair depths back at (or past) net zero, outside any quote run.
    pub fn balanced(&self) -> bool {
        self.paren <= 0 && self.brace <= 0 && self.quote.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_simple_span() {
        let text = "(abc)";
        assert_eq!(find_balanced_span(text, 0, '(', ')').unwrap(), 4);
    }

    #[test]
    fn test_nested_span() {
        let text = "{ a: { b: [1, 2] } } tail";
        assert_eq!(find_balanced_span(text, 0, '{', '}').unwrap(), 19);
    }

    #[test]
    fn test_ignores_delimiters_in_quotes() {
        let text = r#"({ title: "closing ) inside" })"#;
        assert_eq!(
            find_balanced_span(text, 0, '(', ')').unwrap(),
            text.len() - 1
        );
    }

    #[test]
    fn test_backslash_escapes_quote() {
        let text = r#"("a \" ) still quoted" )"#;
        assert_eq!(
            find_balanced_span(text, 0, '(', ')').unwrap(),
            text.len() - 1
        );
    }

    #[test]
    fn test_backtick_quotes() {
        let text = "(`) not a close`)";
        assert_eq!(
            find_balanced_span(text, 0, '(', ')').unwrap(),
            text.len() - 1
        );
    }

    #[test]
    fn test_unbalanced_errors() {
        assert!(find_balanced_span("(abc", 0, '(', ')').is_err());
        assert!(find_balanced_span("abc)", 0, '(', ')').is_err());
    }

    #[test]
    fn test_start_must_point_at_opener() {
        assert!(find_balanced_span("x(y)", 0, '(', ')').is_err());
    }

    #[test]
    fn test_depth_tracker_across_lines() {
        let mut tracker = DepthTracker::new();
        tracker.feed_line("const u = await client.user.findMany({");
        assert!(!tracker.balanced());
        tracker.feed_line("  where: { published: true },");
        assert!(!tracker.balanced());
        tracker.feed_line("})");
        assert!(tracker.balanced());
    }

    #[test]
    fn test_depth_tracker_quote_spans_lines() {
        let mut tracker = DepthTracker::new();
        tracker.feed_line("f(`template (");
        assert!(!tracker.balanced());
        tracker.feed_line("still open }`)");
        assert!(tracker.balanced());
    }

    fn balanced_text() -> impl Strategy<Value = String> {
        "[a-z ,:0-9]{0,8}".prop_recursive(4, 64, 4, |inner| {
            prop::collection::vec(inner, 1..4).prop_map(|parts| {
                let mut out = String::new();
                for (i, p) in parts.iter().enumerate() {
                    if i % 2 == 0 {
                        out.push('{');
                        out.push_str(p);
                        out.push('}');
                    } else {
                        out.push('(');
                        out.push_str(p);
                        out.push(')');
                    }
                }
                out
            })
        })
    }

    proptest! {
        #[test]
        fn prop_wrapped_text_closes_at_end(body in balanced_text()) {
            let text = format!("({body})");
            let end = find_balanced_span(&text, 0, '(', ')').unwrap();
            prop_assert_eq!(end, text.len() - 1);
        }

        #[test]
        fn prop_quoted_body_is_opaque(body in "[^'\\\\]{0,16}") {
            let text = format!("('{body}')");
            let end = find_balanced_span(&text, 0, '(', ')').unwrap();
            prop_assert_eq!(end, text.len() - 1);
        }
    }
}
