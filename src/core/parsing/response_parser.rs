// =============================================================================
// RESPONSE PARSER
// =============================================================================
//
// Turns free text returned by the language model into structured records.
//
// The model is asked for JSON but does not always comply. It may answer with
// a bare literal, wrap JSON in a fenced code block, or get cut off halfway
// through. Attempts run in order and the first success wins:
//
// 1. the whole output read as a lenient literal (JSON5)
// 2. the first fenced block read as strict JSON
// 3. that block (or the outermost bracketed span when there is no fence)
//    run through structural repair and read leniently
//
// Model output is data, never code. Nothing here evaluates it.

use serde_json::Value;
use thiserror::Error;

use super::json_repair::repair_json;
use super::records::Record;

const FENCE: &str = "```";

/// Why model output could not be turned into records.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseFailureReason {
    #[error("no fenced block found")]
    NoFencedBlock,

    #[error("JSON decode error: {0}")]
    JsonDecode(String),

    #[error("repair failed: {0}")]
    RepairFailed(String),

    #[error("expected an object or a list of objects, got {0}")]
    UnsupportedShape(String),
}

/// Model output that is not structured data. Carries the original text so the
/// caller can show or log it.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("model output is not structured data: {reason}")]
pub struct ParseFailure {
    pub original: String,
    pub reason: ParseFailureReason,
}

/// A single mapping or a sequence of mappings.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedOutput {
    Single(Record),
    Many(Vec<Record>),
}

impl ParsedOutput {
    pub fn into_records(self) -> Vec<Record> {
        match self {
            ParsedOutput::Single(record) => vec![record],
            ParsedOutput::Many(records) => records,
        }
    }

}

/// Parses model output into one or more records.
pub fn parse(model_output: &str) -> Result<ParsedOutput, ParseFailure> {
    let fail = |reason| ParseFailure {
        original: model_output.to_string(),
        reason,
    };

    // A literal that parses but is not a container is still the whole answer;
    // there is no fenced block to fall back on.
    if let Ok(value) = json5::from_str::<Value>(model_output.trim()) {
        return into_output(value).map_err(fail);
    }

    if let Some(block) = fenced_block(model_output) {
        let strict_error = match serde_json::from_str::<Value>(block) {
            Ok(value) => return into_output(value).map_err(fail),
            Err(e) => e.to_string(),
        };

        let repaired = repair_json(block);
        return match json5::from_str::<Value>(&repaired) {
            Ok(value) => into_output(value).map_err(fail),
            Err(_) if repaired == block => Err(fail(ParseFailureReason::JsonDecode(strict_error))),
            Err(e) => Err(fail(ParseFailureReason::RepairFailed(e.to_string()))),
        };
    }

    match bracketed_span(model_output) {
        Some(span) => json5::from_str::<Value>(&repair_json(span))
            .map_err(|e| fail(ParseFailureReason::RepairFailed(e.to_string())))
            .and_then(|value| into_output(value).map_err(fail)),
        None => Err(fail(ParseFailureReason::NoFencedBlock)),
    }
}

fn into_output(value: Value) -> Result<ParsedOutput, ParseFailureReason> {
    match value {
        Value::Object(fields) => Ok(ParsedOutput::Single(Record::from_map(fields))),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(fields) => Ok(Record::from_map(fields)),
                other => Err(ParseFailureReason::UnsupportedShape(format!(
                    "a list containing {}",
                    kind_name(&other)
                ))),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(ParsedOutput::Many),
        other => Err(ParseFailureReason::UnsupportedShape(
            kind_name(&other).to_string(),
        )),
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

/// Inner text of the first fenced block. An opening fence without a closing
/// one (truncated output) runs to the end of the text. A leading language tag
/// line such as `json` is dropped.
fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find(FENCE)? + FENCE.len();
    let rest = &text[start..];
    let inner = match rest.find(FENCE) {
        Some(end) => &rest[..end],
        None => rest,
    };
    Some(strip_language_tag(inner).trim())
}

fn strip_language_tag(inner: &str) -> &str {
    let trimmed = inner.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return trimmed;
    }
    match inner.split_once('\n') {
        Some((tag, body))
            if tag
                .trim()
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') =>
        {
            body
        }
        _ => inner,
    }
}

/// From the first `{`/`[` to the last `}`/`]` after it, or to the end of the
/// text when the answer was cut off before closing.
fn bracketed_span(text: &str) -> Option<&str> {
    let start = text.find(|c: char| c == '{' || c == '[')?;
    let tail = &text[start..];
    match tail.rfind(|c: char| c == '}' || c == ']') {
        Some(end) => Some(&tail[..=end]),
        None => Some(tail),
    }
}
