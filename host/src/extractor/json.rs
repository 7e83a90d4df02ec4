//! JSON value selection with dot/bracket paths.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use crate::error::HostError;

lazy_static! {
    /// `.[n]` and `[n]` index forms, rewritten to plain `.n` segments.
    static ref INDEX_FORM: Regex = Regex::new(r"\.?\[(\d+)\]").unwrap();
}

/// Select one value out of a JSON body with a dot/bracket path like
/// `tokens[0]` or `data.price`.
pub fn select_json(body: &[u8], selector: &str) -> Result<String, HostError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| HostError::DecodingJsonResponse(e.to_string()))?;

    let path = to_json_path(selector);
    let matches = jsonpath_lib::select(&value, &path)
        .map_err(|_| HostError::SelectorNotFound(selector.to_string()))?;
    let found: &Value = matches
        .first()
        .copied()
        .ok_or_else(|| HostError::SelectorNotFound(selector.to_string()))?;

    let text = match found {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    };
    if text.is_empty() {
        return Err(HostError::EmptyAttestationData);
    }
    Ok(text)
}

/// Rewrite index forms to dot segments, then build a JSONPath expression.
fn to_json_path(selector: &str) -> String {
    let normalized = INDEX_FORM.replace_all(selector.trim(), ".$1");
    let mut path = String::from("$");
    for segment in normalized.split('.').filter(|s| !s.is_empty()) {
        if segment.bytes().all(|b| b.is_ascii_digit()) {
            path.push_str(&format!("[{segment}]"));
        } else {
            path.push('.');
            path.push_str(segment);
        }
    }
    path
}
