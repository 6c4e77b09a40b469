//! Interpolated strings: `${!function(args)}` segments inside config values.
//!
//! Supported functions:
//!
//! | function            | value                                             |
//! |---------------------|---------------------------------------------------|
//! | `count("name")`     | next value of a process-wide counter, from 1      |
//! | `content()`         | the part's content as text                        |
//! | `metadata("key")`   | a metadata value of the part, or empty            |
//! | `timestamp_unix()`  | current Unix time in seconds                      |
//! | `uuid_v4()`         | a random UUID                                     |
//!
//! Strings are parsed once, when a processor or sink is built. Every render
//! evaluates the functions again, so each render advances the counters it
//! references.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;
use transaction_protocol::Part;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InterpolationError {
    #[error("Unterminated interpolation in '{0}'")]
    Unterminated(String),

    #[error("Unknown function '{0}'")]
    UnknownFunction(String),

    #[error("Bad arguments for '{function}': {reason}")]
    BadArguments { function: String, reason: String },
}

fn counters() -> &'static Mutex<HashMap<String, u64>> {
    static COUNTERS: OnceLock<Mutex<HashMap<String, u64>>> = OnceLock::new();
    COUNTERS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Advance the named counter and return its new value.
///
/// Counters live for the whole process and are shared by every pipeline.
pub fn next_count(name: &str) -> u64 {
    let mut counters = counters().lock();
    let value = counters.entry(name.to_string()).or_insert(0);
    *value += 1;
    *value
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Function {
    Count(String),
    Content,
    Metadata(String),
    TimestampUnix,
    UuidV4,
}

impl Function {
    fn parse(expr: &str) -> Result<Self, InterpolationError> {
        let open = expr
            .find('(')
            .ok_or_else(|| InterpolationError::UnknownFunction(expr.to_string()))?;
        let name = expr[..open].trim();
        let args = expr[open + 1..]
            .trim_end()
            .strip_suffix(')')
            .ok_or_else(|| InterpolationError::BadArguments {
                function: name.to_string(),
                reason: "missing closing parenthesis".to_string(),
            })?;
        let arg = parse_argument(name, args.trim())?;

        let needs_arg = |arg: Option<String>| {
            arg.ok_or_else(|| InterpolationError::BadArguments {
                function: name.to_string(),
                reason: "expected one string argument".to_string(),
            })
        };
        let no_arg = |arg: Option<String>, function: Function| match arg {
            None => Ok(function),
            Some(_) => Err(InterpolationError::BadArguments {
                function: name.to_string(),
                reason: "takes no arguments".to_string(),
            }),
        };

        match name {
            "count" => Ok(Function::Count(needs_arg(arg)?)),
            "metadata" => Ok(Function::Metadata(needs_arg(arg)?)),
            "content" => no_arg(arg, Function::Content),
            "timestamp_unix" => no_arg(arg, Function::TimestampUnix),
            "uuid_v4" => no_arg(arg, Function::UuidV4),
            other => Err(InterpolationError::UnknownFunction(other.to_string())),
        }
    }

    fn render(&self, part: &Part, out: &mut String) {
        match self {
            Function::Count(name) => out.push_str(&next_count(name).to_string()),
            Function::Content => out.push_str(&String::from_utf8_lossy(part.data())),
            Function::Metadata(key) => out.push_str(part.metadata(key).unwrap_or_default()),
            Function::TimestampUnix => out.push_str(&chrono::Utc::now().timestamp().to_string()),
            Function::UuidV4 => out.push_str(&Uuid::new_v4().to_string()),
        }
    }
}

/// Parse an empty argument list or a single double-quoted string.
fn parse_argument(function: &str, raw: &str) -> Result<Option<String>, InterpolationError> {
    if raw.is_empty() {
        return Ok(None);
    }

    let bad = |reason: &str| InterpolationError::BadArguments {
        function: function.to_string(),
        reason: reason.to_string(),
    };

    let inner = raw
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .ok_or_else(|| bad("argument must be a quoted string"))?;

    let mut value = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(escaped) => value.push(escaped),
                None => return Err(bad("dangling escape")),
            },
            '"' => return Err(bad("unescaped quote")),
            c => value.push(c),
        }
    }
    Ok(Some(value))
}

/// Byte offset of the `}` closing an interpolation, ignoring quoted text.
fn closing_brace(s: &str) -> Option<usize> {
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            '}' if !in_quotes => return Some(i),
            _ => {}
        }
    }
    None
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Function(Function),
}

/// A string with embedded function calls, parsed once and rendered per part.
#[derive(Clone, PartialEq, Eq)]
pub struct InterpolatedString {
    raw: String,
    segments: Vec<Segment>,
}

impl InterpolatedString {
    pub fn parse(raw: &str) -> Result<Self, InterpolationError> {
        let mut segments = Vec::new();
        let mut rest = raw;

        while let Some(start) = rest.find("${!") {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            let body = &rest[start + 3..];
            let end =
                closing_brace(body).ok_or_else(|| InterpolationError::Unterminated(raw.to_string()))?;
            segments.push(Segment::Function(Function::parse(body[..end].trim())?));
            rest = &body[end + 1..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// Whether rendering always yields the same text.
    pub fn is_static(&self) -> bool {
        self.segments
            .iter()
            .all(|s| matches!(s, Segment::Literal(_)))
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Evaluate against `part`, advancing any referenced counters.
    pub fn render(&self, part: &Part) -> String {
        let mut out = String::with_capacity(self.raw.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Function(function) => function.render(part, &mut out),
            }
        }
        out
    }
}

impl fmt::Debug for InterpolatedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("InterpolatedString").field(&self.raw).finish()
    }
}

impl fmt::Display for InterpolatedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
