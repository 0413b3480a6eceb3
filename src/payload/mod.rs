//! Payload evaluation: restricted literal grammar over call-argument text.
//!
//! The argument text of the active call is evaluated into a structured value
//! without executing any code: objects, arrays, quoted strings, numbers,
//! booleans, and null only. Identifiers and call expressions are rejected,
//! which removes the code-injection hazard of evaluating pasted text.
//!
//! When evaluation fails, a per-action fallback keeps the pipeline moving:
//! read actions get an empty filter, write actions a minimal placeholder
//! record. Every fallback use is reported back to the caller so the trace
//! records the degraded parse.

use crate::compile::Action;
use crate::types::{EngineError, Result};
use serde_json::{json, Map, Number, Value};

/// Evaluation result: the structured payload (if any) plus a notice when the
/// fallback policy was applied.
#[derive(Debug, Clone)]
pub struct EvaluatedPayload {
    /// `None` for no-argument calls.
    pub value: Option<Value>,
    pub fallback_notice: Option<String>,
}

/// Evaluate the raw argument text of a call for the given action.
pub fn evaluate(payload_text: &str, action: Action) -> EvaluatedPayload {
    let stripped = strip_comments(payload_text);
    let trimmed = stripped.trim();
    let trimmed = trimmed
        .strip_suffix(',')
        .map(str::trim_end)
        .unwrap_or(trimmed);

    if trimmed.is_empty() {
        return EvaluatedPayload {
            value: None,
            fallback_notice: None,
        };
    }

    match parse_literal(trimmed) {
        Ok(value) => EvaluatedPayload {
            value: Some(value),
            fallback_notice: None,
        },
        Err(e) => {
            let kind = if action.is_read() {
                "empty-filter"
            } else {
                "placeholder-record"
            };
            EvaluatedPayload {
                value: Some(fallback_for(action)),
                fallback_notice: Some(format!(
                    "payload evaluation failed ({e}); substituted {kind} fallback for {}",
                    action.as_str()
                )),
            }
        }
    }
}

/// Fallback payload per action. Total over the action set.
fn fallback_for(action: Action) -> Value {
    match action {
        Action::FindMany
        | Action::FindUnique
        | Action::FindFirst
        | Action::Count
        | Action::Aggregate
        | Action::GroupBy => json!({}),
        Action::Create => json!({ "data": {} }),
        Action::CreateMany => json!({ "data": [{}] }),
        Action::Update | Action::UpdateMany => json!({ "where": {}, "data": {} }),
        Action::Upsert => json!({ "where": {}, "create": {}, "update": {} }),
        Action::Delete | Action::DeleteMany => json!({ "where": {} }),
    }
}

/// Strip `//` line comments and `/* */` block comments outside quoted runs.
pub fn strip_comments(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    while i < chars.len() {
        let c = chars[i];
        if let Some(q) = quote {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match c {
            '\'' | '"' | '`' => {
                quote = Some(c);
                out.push(c);
                i += 1;
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                while i + 1 < chars.len() && !(chars[i] == '*' && chars[i + 1] == '/') {
                    i += 1;
                }
                i = (i + 2).min(chars.len());
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

/// Parse comment-free text as a literal structured value.
///
/// # Errors
///
/// Returns `EngineError::MalformedPayload` on anything outside the literal
/// grammar (identifiers, calls, malformed nesting).
pub fn parse_literal(text: &str) -> Result<Value> {
    LiteralParser::new(text).parse()
}

struct LiteralParser {
    chars: Vec<char>,
    pos: usize,
}

impl LiteralParser {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
        }
    }

    fn parse(mut self) -> Result<Value> {
        self.skip_ws();
        let value = self.parse_value()?;
        self.skip_ws();
        if self.pos != self.chars.len() {
            return Err(self.err("trailing characters after literal"));
        }
        Ok(value)
    }

    fn err(&self, msg: &str) -> EngineError {
        EngineError::MalformedPayload(format!("{msg} at position {}", self.pos))
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn parse_value(&mut self) -> Result<Value> {
        match self.peek() {
            Some('{') => self.parse_object(),
            Some('[') => self.parse_array(),
            Some(q @ ('\'' | '"' | '`')) => self.parse_string(q).map(Value::String),
            Some(c) if c == '-' || c.is_ascii_digit() => self.parse_number(),
            Some(c) if c.is_alphabetic() => self.parse_word(),
            Some(_) => Err(self.err("unexpected character")),
            None => Err(self.err("unexpected end of input")),
        }
    }

    fn parse_object(&mut self) -> Result<Value> {
        self.bump();
        let mut map = Map::new();
        loop {
            self.skip_ws();
            match self.peek() {
                Some('}') => {
                    self.bump();
                    break;
                }
                None => return Err(self.err("unterminated object")),
                _ => {}
            }
            let key = self.parse_key()?;
            self.skip_ws();
            if self.bump() != Some(':') {
                return Err(self.err("expected ':' after object key"));
            }
            self.skip_ws();
            let value = self.parse_value()?;
            map.insert(key, value);
            self.skip_ws();
            match self.peek() {
                Some(',') => {
                    self.bump();
                }
                Some('}') => {
                    self.bump();
                    break;
                }
                _ => return Err(self.err("expected ',' or '}' in object")),
            }
        }
        Ok(Value::Object(map))
    }

    fn parse_array(&mut self) -> Result<Value> {
        self.bump();
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                Some(']') => {
                    self.bump();
                    break;
                }
                None => return Err(self.err("unterminated array")),
                _ => {}
            }
            items.push(self.parse_value()?);
            self.skip_ws();
            match self.peek() {
                Some(',') => {
                    self.bump();
                }
                Some(']') => {
                    self.bump();
                    break;
                }
                _ => return Err(self.err("expected ',' or ']' in array")),
            }
        }
        Ok(Value::Array(items))
    }

    fn parse_key(&mut self) -> Result<String> {
        match self.peek() {
            Some(q @ ('\'' | '"' | '`')) => self.parse_string(q),
            Some(c) if c == '_' || c == '$' || c.is_alphabetic() => {
                let mut key = String::new();
                while let Some(c) = self.peek() {
                    if c == '_' || c == '$' || c.is_alphanumeric() {
                        key.push(c);
                        self.pos += 1;
                    } else {
                        break;
                    }
                }
                Ok(key)
            }
            _ => Err(self.err("expected object key")),
        }
    }

    fn parse_string(&mut self, quote: char) -> Result<String> {
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.err("unterminated string")),
                Some('\\') => match self.bump() {
                    None => return Err(self.err("unterminated escape")),
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some(c) => out.push(c),
                },
                Some(c) if c == quote => break,
                Some(c) => out.push(c),
            }
        }
        Ok(out)
    }

    fn parse_number(&mut self) -> Result<Value> {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.pos += 1;
        }
        let mut is_float = false;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' => self.pos += 1,
                '.' | 'e' | 'E' => {
                    is_float = true;
                    self.pos += 1;
                }
                '+' | '-' if is_float => self.pos += 1,
                _ => break,
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        if is_float {
            let f: f64 = text.parse().map_err(|_| self.err("invalid number"))?;
            Number::from_f64(f)
                .map(Value::Number)
                .ok_or_else(|| self.err("invalid number"))
        } else {
            let i: i64 = text.parse().map_err(|_| self.err("invalid number"))?;
            Ok(Value::Number(Number::from(i)))
        }
    }

    fn parse_word(&mut self) -> Result<Value> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '$' {
                self.pos += 1;
            } else {
                break;
            }
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        match word.as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            "null" => Ok(Value::Null),
            _ => Err(EngineError::MalformedPayload(format!(
                "identifier '{word}' is not a literal"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flat_object() {
        let value = parse_literal(r#"{ where: { published: true }, take: 5 }"#).unwrap();
        assert_eq!(value["where"]["published"], json!(true));
        assert_eq!(value["take"], json!(5));
    }

    #[test]
    fn test_key_order_preserved() {
        let value = parse_literal("{ b: 1, a: 2, c: 3 }").unwrap();
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys, ["b", "a", "c"]);
    }

    #[test]
    fn test_quote_styles_and_escapes() {
        let value = parse_literal(r#"{ a: 'single', b: "dou\"ble", c: `tick` }"#).unwrap();
        assert_eq!(value["a"], json!("single"));
        assert_eq!(value["b"], json!("dou\"ble"));
        assert_eq!(value["c"], json!("tick"));
    }

    #[test]
    fn test_numbers_and_nulls() {
        let value = parse_literal("[1, -2, 3.5, 1e3, true, false, null]").unwrap();
        assert_eq!(value, json!([1, -2, 3.5, 1000.0, true, false, null]));
    }

    #[test]
    fn test_trailing_commas_tolerated() {
        let value = parse_literal("{ a: [1, 2,], }").unwrap();
        assert_eq!(value, json!({ "a": [1, 2] }));
    }

    #[test]
    fn test_identifier_rejected() {
        assert!(matches!(
            parse_literal("{ createdAt: new Date() }"),
            Err(EngineError::MalformedPayload(_))
        ));
        assert!(matches!(
            parse_literal("someVariable"),
            Err(EngineError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_strip_comments() {
        let text = "{\n  a: 1, // trailing note\n  /* block */ b: 2,\n  c: \"// not a comment\"\n}";
        let value = parse_literal(&strip_comments(text)).unwrap();
        assert_eq!(value, json!({ "a": 1, "b": 2, "c": "// not a comment" }));
    }

    #[test]
    fn test_evaluate_empty_is_none() {
        let result = evaluate("", Action::Count);
        assert!(result.value.is_none());
        assert!(result.fallback_notice.is_none());
    }

    #[test]
    fn test_evaluate_comment_only_is_none() {
        let result = evaluate("// nothing here", Action::FindMany);
        assert!(result.value.is_none());
    }

    #[test]
    fn test_evaluate_top_level_trailing_comma() {
        let result = evaluate("{ take: 1 },", Action::FindMany);
        assert_eq!(result.value.unwrap()["take"], json!(1));
        assert!(result.fallback_notice.is_none());
    }

    #[test]
    fn test_read_fallback_is_empty_filter() {
        let result = evaluate("{ where: someVar }", Action::FindMany);
        assert_eq!(result.value.unwrap(), json!({}));
        let notice = result.fallback_notice.unwrap();
        assert!(notice.contains("empty-filter"));
        assert!(notice.contains("findMany"));
    }

    #[test]
    fn test_write_fallback_is_placeholder_record() {
        let result = evaluate("{ data: { title: t } }", Action::Create);
        assert_eq!(result.value.unwrap(), json!({ "data": {} }));
        assert!(result.fallback_notice.unwrap().contains("placeholder-record"));
    }

    #[test]
    fn test_upsert_fallback_shape() {
        let result = evaluate("not a literal", Action::Upsert);
        assert_eq!(
            result.value.unwrap(),
            json!({ "where": {}, "create": {}, "update": {} })
        );
    }
}
