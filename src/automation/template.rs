use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").expect("valid regex"));

/// Substitutes `{{field}}` placeholders with the record's top-level field
/// values. Unknown or null placeholders stay verbatim so a typo shows up in
/// the delivered mail instead of vanishing silently.
pub fn render(template: &str, record: &Value) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures<'_>| {
            match record.get(&caps[1]) {
                Some(Value::String(text)) => text.clone(),
                Some(Value::Null) | None => caps[0].to_string(),
                Some(other) => other.to_string(),
            }
        })
        .to_string()
}
