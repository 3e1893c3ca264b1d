//! Unwrapping the vision model's answer down to a layout JSON object.
//!
//! Models are told to answer with bare JSON but routinely wrap it in a
//! ```` ```json ```` fence, prefix a sentence, or trail a remark. The rules,
//! in order:
//!
//! 1. A ```` ```json ```` fence wins; its body is the candidate.
//! 2. Otherwise the first ```` ``` ```` fence of any language.
//! 3. A fence with no closing marker runs to the end of the text.
//! 4. If the candidate still does not start with `{`, the span from the
//!    first `{` to the last `}` is taken.

use crate::layout::{LayoutParseError, PageLayout};
use once_cell::sync::Lazy;
use regex::Regex;

static RE_JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?si)```json[ \t]*\n?(.*?)(?:```|\z)").unwrap());

static RE_ANY_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\n?(.*?)(?:```|\z)").unwrap());

/// Isolate the JSON text inside a model response.
pub fn extract_json_text(raw: &str) -> &str {
    let candidate = RE_JSON_FENCE
        .captures(raw)
        .or_else(|| RE_ANY_FENCE.captures(raw))
        .and_then(|c| c.get(1))
        .map_or(raw, |m| m.as_str())
        .trim();

    if candidate.starts_with('{') {
        return candidate;
    }
    match (candidate.find('{'), candidate.rfind('}')) {
        (Some(start), Some(end)) if end > start => &candidate[start..=end],
        _ => candidate,
    }
}

/// Parse a raw model response into a layout.
pub fn parse_layout_response(raw: &str) -> Result<PageLayout, LayoutParseError> {
    PageLayout::from_json_str(extract_json_text(raw))
}
