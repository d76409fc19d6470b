//! Free text to JSON recovery
//!
//! Model output is meant to be JSON but often arrives wrapped in prose or a
//! markdown fence. Recovery runs in tiers:
//!
//! 1. [`decode_direct`]: the trimmed text (or fenced block) parses as is.
//! 2. [`extract_balanced`]: the first balanced `{...}` / `[...]` substring
//!    that parses.
//! 3. The caller substitutes its own fixed default when [`recover`] fails.

use serde_json::Value;
use thiserror::Error;

/// Expected top-level JSON shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Object,
    Array,
}

impl Shape {
    fn delimiters(self) -> (char, char) {
        match self {
            Shape::Object => ('{', '}'),
            Shape::Array => ('[', ']'),
        }
    }

    fn matches(self, value: &Value) -> bool {
        match self {
            Shape::Object => value.is_object(),
            Shape::Array => value.is_array(),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Shape::Object => "object",
            Shape::Array => "array",
        }
    }
}

/// Which tier produced the value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryTier {
    Direct,
    Extracted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Recovered {
    pub value: Value,
    pub tier: RecoveryTier,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecoveryError {
    #[error("no JSON {0} found in model output")]
    NotFound(&'static str),
}

/// Tier 1: parse the whole text
pub fn decode_direct(text: &str, shape: Shape) -> Option<Value> {
    let candidate = strip_fence(text.trim());
    serde_json::from_str::<Value>(candidate)
        .ok()
        .filter(|v| shape.matches(v))
}

/// Tier 2 helper: first balanced substring delimited by `open`/`close`
///
/// Delimiters inside string literals (including escaped quotes) are ignored.
pub fn extract_balanced(text: &str, open: char, close: char) -> Option<&str> {
    balanced_from(text, 0, open, close).map(|(start, end)| &text[start..end])
}

/// Run tiers 1 and 2
pub fn recover(text: &str, shape: Shape) -> Result<Recovered, RecoveryError> {
    if let Some(value) = decode_direct(text, shape) {
        return Ok(Recovered {
            value,
            tier: RecoveryTier::Direct,
        });
    }

    let (open, close) = shape.delimiters();
    let mut from = 0;
    while let Some((start, end)) = balanced_from(text, from, open, close) {
        if let Ok(value) = serde_json::from_str::<Value>(&text[start..end]) {
            if shape.matches(&value) {
                return Ok(Recovered {
                    value,
                    tier: RecoveryTier::Extracted,
                });
            }
        }
        from = start + open.len_utf8();
    }

    Err(RecoveryError::NotFound(shape.name()))
}

/// Byte range of the first balanced span starting at or after `from`
fn balanced_from(text: &str, from: usize, open: char, close: char) -> Option<(usize, usize)> {
    let mut search = from;
    loop {
        let start = search + text.get(search..)?.find(open)?;
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;

        for (offset, ch) in text[start..].char_indices() {
            if in_string {
                if escaped {
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == '"' {
                    in_string = false;
                }
                continue;
            }
            if ch == '"' {
                in_string = true;
            } else if ch == open {
                depth += 1;
            } else if ch == close {
                depth -= 1;
                if depth == 0 {
                    return Some((start, start + offset + ch.len_utf8()));
                }
            }
        }

        // Unbalanced from this opener; try the next one
        search = start + open.len_utf8();
    }
}

/// Contents of a markdown code fence, or the text unchanged
fn strip_fence(text: &str) -> &str {
    let Some(start) = text.find("```") else {
        return text;
    };
    let rest = &text[start + 3..];
    let Some(end) = rest.find("```") else {
        return text;
    };
    let inner = rest[..end].trim_start();
    // Skip a language tag such as `json`
    match inner.find('\n') {
        Some(nl) if !inner[..nl].trim_start().starts_with(['{', '[']) => inner[nl + 1..].trim(),
        _ => inner.trim(),
    }
}
