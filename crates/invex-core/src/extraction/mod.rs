//! Language-model extraction, verification and retry control.

mod extract;
pub mod prompts;
mod retry;
mod verify;

pub use extract::{extract_main_info, parse_main_info, CONTENT_FILTER_NOTE};
pub use retry::{Decision, RetryPolicy, DEFAULT_MAX_RETRIES};
pub use verify::{parse_verdict, verify_main_info, Verdict};

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

lazy_static! {
    static ref CODE_FENCE: Regex = Regex::new(r"(?s)^\s*```[a-zA-Z]*\s*(.*?)\s*```\s*$").unwrap();
}

/// Pull a JSON object out of a model response.
///
/// Accepts bare JSON, JSON wrapped in a markdown code fence, or JSON
/// surrounded by prose. Returns `None` when nothing parses.
pub(crate) fn parse_json_object(content: &str) -> Option<Value> {
    let body = CODE_FENCE
        .captures(content)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(content)
        .trim();

    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(body) {
        return Some(value);
    }

    let start = body.find('{')?;
    let end = body.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&body[start..=end]) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}
