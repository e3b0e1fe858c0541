//! Extraction of code and JSON from free-form model replies

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

/// Content of the first fenced block, or the whole reply when unfenced
///
/// Handles ```` ```lang ```` and bare ```` ``` ```` fences; a missing closing
/// fence takes everything up to the end.
pub fn extract_code_block(text: &str) -> String {
    let Some(open) = text.find("```") else {
        return text.trim().to_string();
    };
    let after_fence = &text[open + 3..];
    // Skip the language tag on the opening line
    let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(after_fence.len());
    let body = &after_fence[body_start..];
    let body = match body.find("```") {
        Some(close) => &body[..close],
        None => body,
    };
    body.trim().to_string()
}

/// Drop everything before `declaration` (stray prose or imports in front)
pub fn strip_before(source: &str, declaration: &str) -> String {
    match source.find(declaration) {
        Some(idx) if idx > 0 => {
            tracing::info!("Dropping {} bytes before {:?}", idx, declaration);
            source[idx..].to_string()
        }
        _ => source.to_string(),
    }
}

/// Parse a JSON value out of a reply, tolerating fences and single quotes
pub fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T> {
    let body = extract_code_block(text);
    let body = json_span(&body).unwrap_or(&body);
    match serde_json::from_str(body) {
        Ok(value) => Ok(value),
        Err(_) => serde_json::from_str(&body.replace('\'', "\""))
            .with_context(|| format!("Reply is not valid JSON: {}", preview(body))),
    }
}

/// Outermost `{...}` or `[...]` in `text`
fn json_span(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let close = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

fn preview(text: &str) -> String {
    text.chars().take(200).collect()
}
