//! Active statement location within pasted source text.
//!
//! A paste may declare several candidate calls; exactly one is "active". The
//! selection convention: the last log-of-binding call (a call whose sole
//! argument is a bare identifier) names the target binding, and that
//! binding's await-of-entrypoint declaration is the active statement. With
//! no log call, the first await-of-entrypoint declaration wins.

use crate::scan::{find_balanced_span, DepthTracker};
use crate::types::{EngineError, Result};
use regex::Regex;

/// Keyword heads that look like calls but are control flow.
const RESERVED_HEADS: &[&str] = &[
    "if", "for", "while", "switch", "catch", "return", "function", "typeof", "await", "new",
];

/// The active statement extracted from a paste.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedStatement {
    pub model_name: String,
    pub action_name: String,
    /// Raw argument text between the call's parentheses, untrimmed of
    /// comments (the payload evaluator owns that).
    pub payload_text: String,
    /// 1-based inclusive line range of the statement block.
    pub line_range: (usize, usize),
    /// Set when the block hit the bounded line cap and was cut short.
    pub truncated: bool,
}

/// Locator configured with the entrypoint object names and the block cap.
pub struct StatementLocator {
    entrypoints: Vec<String>,
    max_block_lines: usize,
    log_call: Regex,
    first_decl: Regex,
    call: Regex,
}

impl StatementLocator {
    /// Build a locator for the given entrypoint object names.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Config` if `entrypoints` is empty.
    pub fn new(entrypoints: &[String], max_block_lines: usize) -> Result<Self> {
        if entrypoints.is_empty() {
            return Err(EngineError::config("at least one entrypoint name required"));
        }
        let eps = entrypoints
            .iter()
            .map(|e| regex::escape(e))
            .collect::<Vec<_>>()
            .join("|");

        let log_call = compile_pattern(
            r"([A-Za-z_$][A-Za-z0-9_$]*(?:\s*\.\s*[A-Za-z_$][A-Za-z0-9_$]*)*)\s*\(\s*([A-Za-z_$][A-Za-z0-9_$]*)\s*\)",
        )?;
        let first_decl = compile_pattern(&format!(
            r"(?:const|let|var)\s+([A-Za-z_$][A-Za-z0-9_$]*)\s*=\s*await\s+(?:{eps})\s*\."
        ))?;
        let call = compile_pattern(&format!(
            r"\b(?:{eps})\s*\.\s*([A-Za-z_$][A-Za-z0-9_$]*)\s*\.\s*([A-Za-z_$][A-Za-z0-9_$]*)\s*\("
        ))?;

        Ok(Self {
            entrypoints: entrypoints.to_vec(),
            max_block_lines,
            log_call,
            first_decl,
            call,
        })
    }

    /// Locate the active statement in `source`.
    ///
    /// # Errors
    ///
    /// `NoActiveStatement` when neither selection rule finds a declaration,
    /// `MethodNotFound` when the block holds no entrypoint call,
    /// `UnbalancedSpan` when the call's argument span never closes.
    pub fn locate(&self, source: &str) -> Result<ParsedStatement> {
        let lines: Vec<&str> = source.lines().collect();

        let target = self.find_logged_binding(&lines);
        let decl_idx = match &target {
            Some(name) => {
                let decl = self.binding_decl(name)?;
                lines
                    .iter()
                    .position(|l| !is_comment_line(l) && decl.is_match(l))
                    .ok_or(EngineError::NoActiveStatement)?
            }
            None => lines
                .iter()
                .position(|l| !is_comment_line(l) && self.first_decl.is_match(l))
                .ok_or(EngineError::NoActiveStatement)?,
        };

        let (block, end_idx, truncated) = self.accumulate_block(&lines, decl_idx);

        let caps = self.call.captures(&block).ok_or(EngineError::MethodNotFound)?;
        let (model_name, action_name, call_end) = match (caps.get(1), caps.get(2), caps.get(0)) {
            (Some(m), Some(a), Some(whole)) => (
                m.as_str().to_string(),
                a.as_str().to_string(),
                whole.end(),
            ),
            _ => return Err(EngineError::MethodNotFound),
        };

        // The match ends one past the opening paren.
        let open = call_end - 1;
        let payload_text = match find_balanced_span(&block, open, '(', ')') {
            Ok(close) => block[open + 1..close].trim().to_string(),
            // The cap cut the block before the span closed; take what is
            // there and let payload evaluation degrade from it.
            Err(_) if truncated => block[open + 1..].trim().to_string(),
            Err(e) => return Err(e),
        };

        Ok(ParsedStatement {
            model_name,
            action_name,
            payload_text,
            line_range: (decl_idx + 1, end_idx + 1),
            truncated,
        })
    }

    /// Last log-of-binding call wins; later statements override earlier ones.
    fn find_logged_binding(&self, lines: &[&str]) -> Option<String> {
        let mut target = None;
        for line in lines {
            if is_comment_line(line) {
                continue;
            }
            for caps in self.log_call.captures_iter(line) {
                let callee = match caps.get(1) {
                    Some(m) => m.as_str(),
                    None => continue,
                };
                let head = callee.split('.').next().unwrap_or("").trim();
                if RESERVED_HEADS.contains(&head) {
                    continue;
                }
                if self.entrypoints.iter().any(|e| e == head) {
                    continue;
                }
                if let Some(ident) = caps.get(2) {
                    target = Some(ident.as_str().to_string());
                }
            }
        }
        target
    }

    /// Accumulate the statement block from the declaration line until both
    /// pair depths return to net zero on a plausibly-terminal line, or the
    /// bounded line cap cuts the block short.
    fn accumulate_block(&self, lines: &[&str], decl_idx: usize) -> (String, usize, bool) {
        let mut tracker = DepthTracker::new();
        let mut block = String::new();
        let mut end_idx = decl_idx;
        let mut truncated = false;

        for idx in decl_idx..lines.len() {
            if idx - decl_idx >= self.max_block_lines {
                truncated = true;
                break;
            }
            let line = lines[idx];
            block.push_str(line);
            block.push('\n');
            end_idx = idx;

            if is_comment_line(line) {
                continue;
            }
            tracker.feed_line(line);

            let trimmed = line.trim();
            let tail = trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end();
            let terminal =
                tail.ends_with(')') || tail.ends_with("),") || tail.ends_with(")},");
            if tracker.balanced() && terminal {
                break;
            }
        }
        (block, end_idx, truncated)
    }

    fn binding_decl(&self, name: &str) -> Result<Regex> {
        let eps = self
            .entrypoints
            .iter()
            .map(|e| regex::escape(e))
            .collect::<Vec<_>>()
            .join("|");
        compile_pattern(&format!(
            r"(?:const|let|var)\s+{}\s*=\s*await\s+(?:{eps})\s*\.",
            regex::escape(name)
        ))
    }
}

fn compile_pattern(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| EngineError::Internal(format!("bad pattern: {e}")))
}

fn is_comment_line(line: &str) -> bool {
    line.trim_start().starts_with("//")
}
