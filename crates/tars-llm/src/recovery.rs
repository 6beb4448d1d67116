//! Recovery of tool calls from rejected generations
//!
//! Some OpenAI-compatible vendors (notably Groq) reject a response when the
//! model writes its tool call as text instead of structured output, and
//! return the attempted text inside the error. Recovery runs in two stages:
//! [`find_fragments`] locates candidate calls and [`repair_arguments`] turns
//! each argument text into an object.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::LlmError;
use crate::types::{ContentBlock, LlmResponse, ToolCall, Usage, generate_call_id};

// -- Regex patterns compiled once via LazyLock --

static FAILED_GENERATION_SINGLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)'failed_generation':\s*'(.+?)'\s*\}").expect("must be valid regex"));
static FAILED_GENERATION_DOUBLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)"failed_generation":\s*"(.+?)"\s*\}"#).expect("must be valid regex"));
static TAG_IN_ERROR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<function=\w+.*?</function>").expect("must be valid regex"));
static ATTEMPTED_CALL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)attempted to call tool\s*'(\w+=\{.+)").expect("must be valid regex"));

static TAG_CALL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<function=(\w+)>?\s*(.*?)\s*<?/function>").expect("must be valid regex"));
static BARE_CALL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\w+)\s*=\s*\{").expect("must be valid regex"));
static PAREN_CALL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\w+)\s*\(\s*\{").expect("must be valid regex"));
static TRAILING_COMMA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*\}").expect("must be valid regex"));

/// Argument text of one recovered call that could not be parsed
#[derive(Debug, Error)]
#[error("unparseable tool arguments: {reason}")]
pub struct RecoveryParseError {
    reason: String,
}

/// One candidate call located in a rejected generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragment<'a> {
    /// Tool name
    pub name: &'a str,
    /// Raw argument text
    pub arguments: &'a str,
}

/// Candidate calls plus any prose the model wrote before the first one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragments<'a> {
    pub leading_text: &'a str,
    pub calls: Vec<Fragment<'a>>,
}

/// Rebuild a response from a malformed tool call rejection
///
/// Returns `None` when the error carries no attempted generation or when no
/// call in it survives argument repair. Recovered calls get fresh ids and the
/// response reports zero usage.
pub fn recover(error: &LlmError) -> Option<LlmResponse> {
    let generation = failed_generation(error)?;
    let Some(fragments) = find_fragments(&generation) else {
        tracing::debug!("rejected generation contains no recognizable tool call");
        return None;
    };

    let mut content = Vec::with_capacity(fragments.calls.len() + 1);
    if !fragments.leading_text.is_empty() {
        content.push(ContentBlock::text(fragments.leading_text));
    }

    let mut names = Vec::new();
    for fragment in &fragments.calls {
        match repair_arguments(fragment.arguments) {
            Ok(arguments) => {
                names.push(fragment.name);
                content.push(ContentBlock::ToolCall(ToolCall::new(
                    generate_call_id(),
                    fragment.name,
                    arguments,
                )));
            }
            Err(e) => {
                tracing::warn!(
                    tool = fragment.name,
                    error = %e,
                    arguments = %fragment.arguments.chars().take(200).collect::<String>(),
                    "dropping recovered tool call with unparseable arguments"
                );
            }
        }
    }

    if names.is_empty() {
        return None;
    }

    tracing::info!(count = names.len(), tools = ?names, "recovered malformed tool calls");

    Some(LlmResponse::new(content, Usage::default()))
}

/// Extract the model's attempted generation from a rejection
///
/// Checked in order: the structured `failed_generation` field, a quoted
/// `failed_generation` value in the error text, a `<function=...>` tag in the
/// error text, and an `attempted to call tool '...'` phrase.
pub fn failed_generation(error: &LlmError) -> Option<String> {
    if let LlmError::MalformedToolCall { body: Some(body), .. } = error {
        let structured = ["/failed_generation", "/error/failed_generation"]
            .iter()
            .find_map(|pointer| body.pointer(pointer).and_then(Value::as_str))
            .filter(|text| !text.is_empty());
        if let Some(text) = structured {
            return Some(text.to_owned());
        }
    }

    let text = match error {
        LlmError::MalformedToolCall { raw, .. } => raw.clone(),
        other => other.to_string(),
    };

    if let Some(caps) = FAILED_GENERATION_SINGLE_RE
        .captures(&text)
        .or_else(|| FAILED_GENERATION_DOUBLE_RE.captures(&text))
    {
        return Some(caps[1].replace("\\\"", "\"").replace("\\'", "'"));
    }

    if let Some(m) = TAG_IN_ERROR_RE.find(&text) {
        return Some(m.as_str().to_owned());
    }

    ATTEMPTED_CALL_RE
        .captures(&text)
        .map(|caps| caps[1].trim_end_matches(['\'', '"']).to_owned())
}

/// Locate candidate tool calls in a generation
///
/// Tries tag-delimited calls, then `name={...}`, then `name({...})`. The
/// first syntax with at least one match wins; matches are never mixed across
/// syntaxes.
pub fn find_fragments(generation: &str) -> Option<Fragments<'_>> {
    tagged_fragments(generation)
        .or_else(|| assigned_fragments(generation, &BARE_CALL_RE))
        .or_else(|| assigned_fragments(generation, &PAREN_CALL_RE))
}

fn tagged_fragments(text: &str) -> Option<Fragments<'_>> {
    let mut first_start = None;
    let calls: Vec<_> = TAG_CALL_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            first_start.get_or_insert(whole.start());
            Some(Fragment {
                name: caps.get(1)?.as_str(),
                arguments: caps.get(2).map_or("", |m| m.as_str()),
            })
        })
        .collect();

    let start = first_start?;
    Some(Fragments {
        leading_text: text[..start].trim(),
        calls,
    })
}

/// Calls written as `name` followed by an object literal
///
/// The object extends to its matching brace, so several calls in one
/// generation are split correctly.
fn assigned_fragments<'a>(text: &'a str, pattern: &Regex) -> Option<Fragments<'a>> {
    let mut calls = Vec::new();
    let mut first_start = None;
    let mut pos = 0;

    while let Some(caps) = pattern.captures_at(text, pos) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            break;
        };
        let open = whole.end() - 1;
        let close = object_end(text, open).unwrap_or(text.len());

        first_start.get_or_insert(whole.start());
        calls.push(Fragment {
            name: name.as_str(),
            arguments: &text[open..close],
        });
        pos = close;
    }

    let start = first_start?;
    Some(Fragments {
        leading_text: text[..start].trim(),
        calls,
    })
}

/// Index just past the brace closing the object opened at `open`
///
/// Quotes may appear escaped (`\"`) throughout when the generation was
/// double-encoded; that form is detected from the first key.
fn object_end(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let escaped_quotes = text[open + 1..].trim_start().starts_with("\\\"");
    let mut depth = 0_usize;
    let mut in_string = false;
    let mut i = open;

    while i < bytes.len() {
        match bytes[i] {
            b'\\' if escaped_quotes && bytes.get(i + 1) == Some(&b'"') => {
                in_string = !in_string;
                i += 1;
            }
            b'\\' if in_string => i += 1,
            b'"' if !escaped_quotes => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
        i += 1;
    }

    None
}

/// Parse recovered argument text into an object
///
/// A stray trailing `>` is dropped and text that is not an object literal
/// yields no arguments. On a parse failure, trailing commas are removed and
/// escaped quotes unescaped before one more attempt.
pub fn repair_arguments(raw: &str) -> Result<Map<String, Value>, RecoveryParseError> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_suffix('>').map_or(trimmed, str::trim_end);

    if !trimmed.starts_with('{') {
        return Ok(Map::new());
    }

    if let Ok(Value::Object(map)) = serde_json::from_str(trimmed) {
        return Ok(map);
    }

    let cleaned = TRAILING_COMMA_RE.replace_all(trimmed, "}").replace("\\\"", "\"");
    match serde_json::from_str(&cleaned) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(RecoveryParseError {
            reason: format!("expected an object, found {other}"),
        }),
        Err(e) => Err(RecoveryParseError { reason: e.to_string() }),
    }
}
