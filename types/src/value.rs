//! Typed tag payloads.
//!
//! A `TagValue` is the value side of an entity's tag map. Values are
//! serde-serializable for config embedding, and carry their own textual
//! encoding for the line-oriented world-save format (`name = value`).

use serde::{Deserialize, Serialize};
use std::fmt;

/// An arbitrary typed value attached to an entity under a tag key.
///
/// Entity references are stored as raw ids so this crate stays free of
/// the core's id types; the core converts at the boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    /// Reference to another entity by id.
    Entity(u64),
}

impl TagValue {
    /// Encode into the world-save textual form.
    ///
    /// Integers and booleans print plainly, floats always keep a decimal
    /// point (so they re-parse as floats), strings are quoted with `\`
    /// escapes, and entity references use a `#` prefix.
    ///
    /// # Examples
    /// ```
    /// use weald_types::TagValue;
    /// assert_eq!(TagValue::Int(42).encode(), "42");
    /// assert_eq!(TagValue::Float(1.0).encode(), "1.0");
    /// assert_eq!(TagValue::Str("hi".into()).encode(), "\"hi\"");
    /// assert_eq!(TagValue::Entity(7).encode(), "#7");
    /// ```
    pub fn encode(&self) -> String {
        match self {
            Self::Int(n) => n.to_string(),
            // {:?} keeps the decimal point on round values (1.0, not 1)
            Self::Float(f) => format!("{f:?}"),
            Self::Bool(b) => b.to_string(),
            Self::Str(s) => quote(s),
            Self::Entity(id) => format!("#{id}"),
        }
    }

    /// Parse the textual form produced by [`TagValue::encode`].
    ///
    /// Returns `None` for input that matches no value form; the caller
    /// decides whether that is a per-object load error.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Some(rest) = text.strip_prefix('#') {
            return rest.parse().ok().map(Self::Entity);
        }
        if text.starts_with('"') {
            return unquote(text).map(Self::Str);
        }
        match text {
            "true" => return Some(Self::Bool(true)),
            "false" => return Some(Self::Bool(false)),
            _ => {}
        }
        if let Ok(n) = text.parse::<i64>() {
            return Some(Self::Int(n));
        }
        if let Ok(f) = text.parse::<f64>() {
            if f.is_finite() {
                return Some(Self::Float(f));
            }
        }
        None
    }

    /// The contained integer, if this is an `Int`.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// The contained string slice, if this is a `Str`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

fn unquote(s: &str) -> Option<String> {
    let inner = s.strip_prefix('"')?.strip_suffix('"')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next()? {
                '"' => out.push('"'),
                '\\' => out.push('\\'),
                'n' => out.push('\n'),
                _ => return None,
            }
        } else {
            out.push(c);
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_variant() {
        let values = [
            TagValue::Int(-17),
            TagValue::Float(2.5),
            TagValue::Float(10.0),
            TagValue::Bool(true),
            TagValue::Str("plain".into()),
            TagValue::Str("with \"quotes\" and \\slash".into()),
            TagValue::Str(String::new()),
            TagValue::Entity(901),
        ];
        for v in values {
            let text = v.encode();
            assert_eq!(TagValue::parse(&text), Some(v), "via {text:?}");
        }
    }

    #[test]
    fn round_float_stays_float() {
        let reparsed = TagValue::parse(&TagValue::Float(3.0).encode()).unwrap();
        assert_eq!(reparsed, TagValue::Float(3.0));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(TagValue::parse("nonsense"), None);
        assert_eq!(TagValue::parse("\"unterminated"), None);
        assert_eq!(TagValue::parse("#abc"), None);
        assert_eq!(TagValue::parse("inf"), None);
    }
}
