//! JSON extraction from LLM responses.
//!
//! Models wrap their JSON in prose, markdown fences or reasoning preambles.
//! [`try_extract_json_from_response`] tries, in order:
//!
//! 1. A ```` ```json ```` fenced block
//! 2. Any fenced block containing an object
//! 3. The whole trimmed content, if it is a JSON object
//! 4. The largest valid object anywhere, preferring later ones on ties
//!
//! and reports truncation when an object starts but never closes.
//!
//! # Example
//!
//! ```
//! use synth_forge::utils::json_extraction::extract_json_object;
//!
//! let response = "Sure! ```json\n{\"verdict\": \"approved\"}\n```";
//! let object = extract_json_object(response).unwrap();
//! assert_eq!(object["verdict"], "approved");
//! ```

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

/// Error type for JSON extraction failures.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum JsonExtractionError {
    #[error("JSON appears truncated ({unclosed_braces} unclosed braces). Partial: {partial_preview}...")]
    Truncated {
        partial_preview: String,
        unclosed_braces: usize,
    },
    #[error("No JSON object found in response. Content starts with: '{content_preview}'")]
    NotFound { content_preview: String },
}

/// Result of a JSON extraction attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonExtractionResult {
    /// A complete, parseable JSON object.
    Success(String),
    /// An object started but did not close.
    Truncated {
        partial_json: String,
        unclosed_braces: usize,
    },
    NotFound,
}

impl JsonExtractionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, JsonExtractionResult::Success(_))
    }

    /// Converts to a `Result`, using `content` for the not-found preview.
    pub fn into_result_with_context(self, content: &str) -> Result<String, JsonExtractionError> {
        match self {
            JsonExtractionResult::Success(json) => Ok(json),
            JsonExtractionResult::Truncated {
                partial_json,
                unclosed_braces,
            } => Err(JsonExtractionError::Truncated {
                partial_preview: preview(&partial_json, 100),
                unclosed_braces,
            }),
            JsonExtractionResult::NotFound => Err(JsonExtractionError::NotFound {
                content_preview: preview(content.trim(), 50),
            }),
        }
    }
}

fn preview(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

fn fenced_block_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```(\w+)?\s*\n?([\s\S]*?)\n?```").ok())
        .as_ref()
}

fn is_json_object(candidate: &str) -> bool {
    matches!(serde_json::from_str::<Value>(candidate), Ok(Value::Object(_)))
}

/// Tries every extraction strategy on `content`.
pub fn try_extract_json_from_response(content: &str) -> JsonExtractionResult {
    let trimmed = content.trim();

    // Fenced blocks: prefer ones tagged json.
    let mut fenced: Vec<(bool, &str)> = fenced_block_regex()
        .map(|re| {
            re.captures_iter(trimmed)
                .filter_map(|caps| {
                    let tagged_json = caps.get(1).map_or(false, |m| m.as_str() == "json");
                    caps.get(2).map(|body| (tagged_json, body.as_str().trim()))
                })
                .collect()
        })
        .unwrap_or_default();
    fenced.sort_by_key(|(tagged_json, _)| !tagged_json);

    for (_, body) in fenced {
        if let Some(start) = body.find('{') {
            if let Some(end) = find_matching_brace(&body[start..]) {
                let candidate = &body[start..=start + end];
                if is_json_object(candidate) {
                    return JsonExtractionResult::Success(candidate.to_string());
                }
            }
        }
    }

    if is_json_object(trimmed) {
        return JsonExtractionResult::Success(trimmed.to_string());
    }

    if let Some(json) = extract_largest_json_object(trimmed) {
        return JsonExtractionResult::Success(json);
    }

    if let Some(start) = trimmed.find('{') {
        let unclosed_braces = count_unclosed_braces(&trimmed[start..]);
        if unclosed_braces > 0 {
            return JsonExtractionResult::Truncated {
                partial_json: trimmed[start..].to_string(),
                unclosed_braces,
            };
        }
    }

    JsonExtractionResult::NotFound
}

/// Extracts and parses the JSON object in an LLM response.
pub fn extract_json_object(content: &str) -> Result<Map<String, Value>, JsonExtractionError> {
    let json = try_extract_json_from_response(content).into_result_with_context(content)?;
    match serde_json::from_str::<Value>(&json) {
        Ok(Value::Object(map)) => Ok(map),
        _ => Err(JsonExtractionError::NotFound {
            content_preview: preview(content.trim(), 50),
        }),
    }
}

/// Index of the brace closing the object that starts at `s[0]`.
///
/// Braces inside string literals (including escaped quotes) are ignored.
pub fn find_matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }

    None
}

fn count_unclosed_braces(s: &str) -> usize {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for c in s.chars() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => depth = depth.saturating_sub(1),
            _ => {}
        }
    }

    depth
}

/// Largest valid JSON object in `content`, later occurrences winning ties.
///
/// Reasoning models often echo small example objects before the real answer.
pub fn extract_largest_json_object(content: &str) -> Option<String> {
    content
        .char_indices()
        .filter(|(_, c)| *c == '{')
        .filter_map(|(start, _)| {
            let end = find_matching_brace(&content[start..])?;
            let candidate = &content[start..=start + end];
            is_json_object(candidate).then(|| (start, candidate))
        })
        .max_by(|(pos_a, a), (pos_b, b)| a.len().cmp(&b.len()).then(pos_a.cmp(pos_b)))
        .map(|(_, json)| json.to_string())
}
